#![no_std]

//! SMBus protocol engine: byte-at-a-time master and slave phase machines
//! driven from an interrupt context, with packet error checking and the
//! full set of SMBus transaction shapes on the application side.
//!
//! The physical transceiver lives behind the [`Transceiver`] trait; this
//! crate is only the protocol state machine and its observable contract.

#[cfg(test)]
extern crate std;

mod host;
mod master;
mod pec;
mod phase;
mod slave;
mod transaction;
mod transceiver;

pub use host::SmbusMaster;
pub use master::MasterEngine;
pub use pec::Pec;
pub use slave::{SlaveEngine, SlaveFault, SmbusSlave};
pub use transaction::StickyStatus;
pub use transceiver::{StopStrategy, Transceiver};

#[cfg(feature = "dump")]
pub use phase::PhaseDump;

/// Largest block-transfer payload the protocol allows.
pub const MAX_BLOCK_LEN: usize = 32;

/// Hard ceiling on wire bytes after the address: count byte, payload, PEC.
pub const MAX_PACKET_LEN: usize = MAX_BLOCK_LEN + 3;

/// Byte a slave shifts out when it has nothing queued. The bus idles high.
pub const NOTHING_TO_REPORT: u8 = 0xFF;

/// Bus role, fixed when an engine is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Master,
    Slave,
}

/// Protocol phase of the in-progress transaction. This is the protocol
/// state, not the hardware signal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Phase {
    Idle,
    Receiving,
    Transmitting,
    TransmittingQuickCommand,
    TransmittingResponse,
    TransmittingBlock,
    ReceivingBlock,
    Ending,
    Error,
}

/// State code surfaced to the application after each bus event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::NoUninit)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ProtocolState {
    /// Nothing to report; the transaction is progressing normally.
    Ok,
    /// First byte of a slave packet arrived; the application should
    /// validate it as a command code.
    FirstByte,
    ByteReceived,
    CommandComplete,
    QuickCommand,
    DataSizeError,
    PecError,
    TimeoutError,
    MasterNack,
    ArbitrationLost,
    SlaveNotReady,
    SlaveError,
    MasterError,
    CommandError,
    PacketError,
}

/// Synchronous rejection of an application request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestError {
    /// A transaction is already in flight on this interface.
    Busy,
    /// A size argument is outside the protocol's legal range.
    DataSize,
}
