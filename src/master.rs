//! Master-side phase machine.
//!
//! Entry points are invoked synchronously from the transceiver's interrupt
//! handler; they mutate the transaction record, drive the transceiver, and
//! return the protocol state to surface to the application.

use core::cell::RefCell;

use atomic::{Atomic, Ordering};
use critical_section::Mutex;

use crate::phase::PhaseHolder;
use crate::transaction::{StickyStatus, Transaction};
use crate::transceiver::{StopStrategy, Transceiver};
use crate::{Phase, ProtocolState, Role, MAX_BLOCK_LEN, MAX_PACKET_LEN};

#[cfg(feature = "dump")]
use crate::phase::PhaseDump;

/// One bus interface in the master role.
///
/// `TX`/`RX` are buffer capacities in bytes; each must hold a full packet
/// (command, count byte, payload, PEC) for block shapes to be usable.
pub struct MasterEngine<const TX: usize, const RX: usize> {
    record: Mutex<RefCell<Transaction<TX, RX>>>,
    phase: PhaseHolder,
    reported: Atomic<ProtocolState>,
}

enum TxNext {
    Byte(u8),
    /// The trailing PEC byte; the peer may legitimately NACK it.
    PecByte(u8),
    SwitchToReceive,
    Finish,
    Unexpected,
}

enum RxAct {
    Continue,
    StopBeforeLast,
    StopNow,
    Fail(ProtocolState),
}

impl<const TX: usize, const RX: usize> MasterEngine<TX, RX> {
    pub const fn new(pec_enabled: bool) -> Self {
        Self {
            record: Mutex::new(RefCell::new(Transaction::new(Role::Master, pec_enabled))),
            phase: PhaseHolder::new(),
            reported: Atomic::new(ProtocolState::Ok),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub fn is_idle(&self) -> bool {
        self.phase.get() == Phase::Idle
    }

    /// Last protocol-state code surfaced by the machine.
    pub fn reported_state(&self) -> ProtocolState {
        self.reported.load(Ordering::SeqCst)
    }

    /// Clears the reported code and re-arms an errored interface.
    pub fn acknowledge(&self) {
        self.reported.store(ProtocolState::Ok, Ordering::SeqCst);
        if self.phase.get() == Phase::Error {
            self.phase.set(Phase::Idle);
        }
    }

    pub fn status(&self) -> StickyStatus {
        self.with_record(|t| t.sticky)
    }

    pub fn clear_status(&self) {
        self.with_record(|t| t.sticky.clear());
    }

    #[cfg(feature = "dump")]
    pub fn dump(&self) -> PhaseDump {
        self.phase.dump()
    }

    pub(crate) fn with_record<R>(&self, f: impl FnOnce(&mut Transaction<TX, RX>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.record.borrow_ref_mut(cs)))
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.phase.set(phase);
    }

    fn report(&self, state: ProtocolState) -> ProtocolState {
        self.reported.store(state, Ordering::SeqCst);
        state
    }

    /// Originates a write-direction transfer. The record must already be
    /// populated; `quick` appends the stop right after the address byte.
    pub(crate) fn begin_transmit<X: Transceiver>(&self, xcvr: &X, peer: u8, quick: bool) {
        self.with_record(|t| {
            t.peer = peer << 1;
            let addressed = t.peer;
            t.fold(addressed);
        });
        self.report(ProtocolState::Ok);
        xcvr.originate_transmit(
            peer,
            if quick {
                StopStrategy::Immediate
            } else {
                StopStrategy::None
            },
        );
    }

    /// Originates a read-direction transfer, directly for pure reads or as
    /// the repeated start of a read-after-write shape.
    pub(crate) fn begin_receive<X: Transceiver>(&self, xcvr: &X, peer: u8) {
        let (strategy, block) = self.with_record(|t| {
            t.peer = (peer << 1) | 1;
            let addressed = t.peer;
            t.fold(addressed);

            let wire_len = t.rx.wire_len();
            t.rx.reset(wire_len);
            t.did_rx = true;
            t.count_seen = false;

            let strategy = if t.rx_is_block {
                StopStrategy::Deferred
            } else {
                match wire_len {
                    0 => StopStrategy::Immediate,
                    1 => StopStrategy::AfterAddress,
                    2 => StopStrategy::BeforeFinalReadByte,
                    _ => StopStrategy::Deferred,
                }
            };
            (strategy, t.rx_is_block)
        });

        self.phase.set(if block {
            Phase::ReceivingBlock
        } else {
            Phase::Receiving
        });
        xcvr.originate_receive(peer, strategy);
    }

    /// Transmit side ready for the next byte.
    ///
    /// `None` means no byte was supplied: the machine switched to a
    /// repeated-start receive or requested the stop instead.
    pub fn process_byte_requested<X: Transceiver>(&self, xcvr: &X) -> Option<u8> {
        let next = match self.phase.get() {
            Phase::Transmitting | Phase::TransmittingBlock => self.with_record(|t| {
                if let Some(byte) = t.tx.next() {
                    t.fold(byte);
                    TxNext::Byte(byte)
                } else if t.has_rx {
                    TxNext::SwitchToReceive
                } else if t.pec_enabled && !t.pec_sent {
                    t.pec_sent = true;
                    TxNext::PecByte(t.pec.value())
                } else {
                    TxNext::Finish
                }
            }),
            Phase::Ending => TxNext::Finish,
            _ => TxNext::Unexpected,
        };

        match next {
            TxNext::Byte(byte) => {
                self.report(ProtocolState::Ok);
                Some(byte)
            }
            TxNext::PecByte(byte) => {
                self.phase.set(Phase::Ending);
                self.report(ProtocolState::Ok);
                Some(byte)
            }
            TxNext::SwitchToReceive => {
                let peer = self.with_record(|t| t.peer >> 1);
                self.begin_receive(xcvr, peer);
                None
            }
            TxNext::Finish => {
                self.phase.set(Phase::Ending);
                xcvr.request_stop_now();
                None
            }
            TxNext::Unexpected => {
                self.with_record(|t| t.sticky.packet_error = true);
                self.report(ProtocolState::MasterError);
                None
            }
        }
    }

    /// One byte arrived during a receive phase.
    pub fn process_received_byte<X: Transceiver>(&self, xcvr: &X, byte: u8) -> ProtocolState {
        let phase = self.phase.get();
        if !matches!(phase, Phase::Receiving | Phase::ReceivingBlock) {
            self.with_record(|t| t.sticky.packet_error = true);
            return self.report(ProtocolState::MasterError);
        }

        let act = self.with_record(|t| {
            let ceiling = t.rx.wire_len().min(MAX_PACKET_LEN);
            if t.rx.pos() >= ceiling {
                t.sticky.packet_overrun = true;
                return RxAct::Fail(ProtocolState::DataSizeError);
            }

            if matches!(phase, Phase::ReceivingBlock) && !t.count_seen {
                // First byte of a block read is the payload count.
                t.count_seen = true;
                t.fold(byte);
                if byte == 0 || byte as usize > MAX_BLOCK_LEN {
                    t.sticky.packet_error = true;
                    return RxAct::Fail(ProtocolState::DataSizeError);
                }
                let wire_len = byte as usize + 1 + t.pec_enabled as usize;
                t.rx.set_wire_len(wire_len);
                t.rx.push_wire(byte, false);
            } else {
                t.fold(byte);
                let trailer = t.pec_enabled && t.rx.pos() == t.rx.wire_len() - 1;
                t.rx.push_wire(byte, !trailer);
            }

            match t.rx.remaining() {
                2 => RxAct::StopBeforeLast,
                0 => RxAct::StopNow,
                _ => RxAct::Continue,
            }
        });

        match act {
            RxAct::Continue => self.report(ProtocolState::Ok),
            RxAct::StopBeforeLast => {
                xcvr.request_stop_before_next_byte();
                self.report(ProtocolState::Ok)
            }
            RxAct::StopNow => {
                self.phase.set(Phase::Ending);
                xcvr.request_stop_now();
                self.report(ProtocolState::Ok)
            }
            RxAct::Fail(state) => {
                xcvr.request_stop_now();
                self.phase.set(Phase::Error);
                self.report(state)
            }
        }
    }

    /// The peer (or the hardware, for the final read byte) did not
    /// acknowledge. Expected only while the transaction is ending.
    pub fn process_not_acknowledged<X: Transceiver>(&self, xcvr: &X) -> ProtocolState {
        if self.phase.get() == Phase::Ending {
            self.report(ProtocolState::Ok)
        } else {
            xcvr.request_stop_now();
            self.phase.set(Phase::Error);
            self.report(ProtocolState::MasterNack)
        }
    }

    /// The stop condition went out on the wire.
    pub fn process_stop_completed(&self) -> ProtocolState {
        if self.phase.get() == Phase::Error {
            // The forced stop of a failed transaction; keep the fault code.
            return self.reported_state();
        }

        let state = self.with_record(|t| {
            if t.did_rx && t.pec_enabled && t.rx.pos() > 0 && t.pec.value() != 0 {
                t.sticky.pec_error = true;
                ProtocolState::PecError
            } else {
                ProtocolState::CommandComplete
            }
        });
        self.phase.set(Phase::Idle);
        self.report(state)
    }

    /// Another master won the bus.
    pub fn process_arbitration_lost(&self) -> ProtocolState {
        self.phase.set(Phase::Error);
        self.report(ProtocolState::ArbitrationLost)
    }

    /// Bus-stuck watchdog fired. Unconditional: no partial recovery.
    pub fn process_timeout<X: Transceiver>(&self, xcvr: &X) -> ProtocolState {
        let as_master = self.with_record(|t| {
            t.sticky.timeout = true;
            t.reset_transfer();
            t.role == Role::Master
        });
        xcvr.disable();
        xcvr.enable(as_master);
        self.phase.set(Phase::Idle);
        self.report(ProtocolState::TimeoutError)
    }
}
