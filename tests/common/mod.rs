#![allow(dead_code)]

use std::cell::RefCell;

use smbus_engine::{StopStrategy, Transceiver};

/// Every operation the engine drives on the hardware, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwCall {
    OriginateTransmit(u8, StopStrategy),
    OriginateReceive(u8, StopStrategy),
    StopNow,
    StopBeforeNextByte,
    Disable,
    Enable(bool),
}

/// Transceiver double that records the engine's hardware calls.
#[derive(Default)]
pub struct MockXcvr {
    calls: RefCell<Vec<HwCall>>,
}

impl MockXcvr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains and returns the recorded calls.
    pub fn take(&self) -> Vec<HwCall> {
        self.calls.take()
    }

    pub fn is_quiet(&self) -> bool {
        self.calls.borrow().is_empty()
    }

    fn record(&self, call: HwCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl Transceiver for MockXcvr {
    fn originate_transmit(&self, peer: u8, stop: StopStrategy) {
        self.record(HwCall::OriginateTransmit(peer, stop));
    }

    fn originate_receive(&self, peer: u8, stop: StopStrategy) {
        self.record(HwCall::OriginateReceive(peer, stop));
    }

    fn request_stop_now(&self) {
        self.record(HwCall::StopNow);
    }

    fn request_stop_before_next_byte(&self) {
        self.record(HwCall::StopBeforeNextByte);
    }

    fn disable(&self) {
        self.record(HwCall::Disable);
    }

    fn enable(&self, as_master: bool) {
        self.record(HwCall::Enable(as_master));
    }
}
