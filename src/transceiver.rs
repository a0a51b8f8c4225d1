//! The seam between the protocol engine and the physical bus hardware.
//!
//! A transceiver implementation owns the register-level driver: it calls the
//! engine's `process_*` entry points from its interrupt handler and carries
//! out the operations below when the engine drives a transfer.

/// How the transceiver should arrange the stop condition for an originated
/// transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopStrategy {
    /// No stop arranged yet; decided later, byte by byte.
    None,
    /// Stop immediately after the address byte (quick commands, zero-byte
    /// receives).
    Immediate,
    /// Stop right after the address acknowledgment (one-byte receives).
    AfterAddress,
    /// Stop arranged before the final read byte so it is NACKed per bus
    /// convention (two-byte receives).
    BeforeFinalReadByte,
    /// Length not yet known (block reads); the engine requests the stop once
    /// the count byte arrives.
    Deferred,
}

/// Operations the engine invokes to drive the bus.
///
/// `peer` is always the 7-bit address; the direction is implied by which
/// originate call is made.
pub trait Transceiver {
    /// Originate a start condition in transmit mode.
    fn originate_transmit(&self, peer: u8, stop: StopStrategy);

    /// Originate a start (or repeated start) in receive mode.
    fn originate_receive(&self, peer: u8, stop: StopStrategy);

    /// Send a stop after the byte currently on the wire.
    fn request_stop_now(&self);

    /// Arrange a stop before the next read byte so it is NACKed.
    fn request_stop_before_next_byte(&self);

    fn disable(&self);

    fn enable(&self, as_master: bool);
}

impl<T: Transceiver> Transceiver for &T {
    fn originate_transmit(&self, peer: u8, stop: StopStrategy) {
        (*self).originate_transmit(peer, stop)
    }

    fn originate_receive(&self, peer: u8, stop: StopStrategy) {
        (*self).originate_receive(peer, stop)
    }

    fn request_stop_now(&self) {
        (*self).request_stop_now()
    }

    fn request_stop_before_next_byte(&self) {
        (*self).request_stop_before_next_byte()
    }

    fn disable(&self) {
        (*self).disable()
    }

    fn enable(&self, as_master: bool) {
        (*self).enable(as_master)
    }
}
