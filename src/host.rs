//! Application request builder for the master role: the eight SMBus
//! transaction shapes, plus completion polling and result collection.
//!
//! Every operation is non-blocking: it validates sizes, rejects if a
//! transaction is already in flight, populates the record, and originates
//! the transfer. Completion is observed through [`SmbusMaster::wait_until_idle`]
//! and the reported-state query.

use crate::master::MasterEngine;
use crate::transaction::StickyStatus;
use crate::transceiver::Transceiver;
use crate::{Phase, ProtocolState, RequestError, MAX_BLOCK_LEN, MAX_PACKET_LEN};

/// Foreground handle for a master interface.
pub struct SmbusMaster<'d, X: Transceiver, const TX: usize, const RX: usize> {
    engine: &'d MasterEngine<TX, RX>,
    xcvr: X,
}

impl<'d, X: Transceiver, const TX: usize, const RX: usize> SmbusMaster<'d, X, TX, RX> {
    pub fn new(engine: &'d MasterEngine<TX, RX>, xcvr: X) -> Self {
        Self { engine, xcvr }
    }

    /// Address-plus-direction only, no command, no payload.
    pub fn quick_command(&self, address: u8, write: bool) -> Result<(), RequestError> {
        self.claim()?;
        self.engine.with_record(|t| t.reset_transfer());
        if write {
            self.engine.set_phase(Phase::TransmittingQuickCommand);
            self.engine.begin_transmit(&self.xcvr, address, true);
        } else {
            // Zero-byte receive: stop immediately after the address.
            self.engine.begin_receive(&self.xcvr, address);
        }
        Ok(())
    }

    pub fn send_byte(&self, address: u8, byte: u8) -> Result<(), RequestError> {
        self.claim()?;
        self.load(|t| {
            t.reset_transfer();
            t.tx.push(byte)
        })?;
        self.engine.set_phase(Phase::Transmitting);
        self.engine.begin_transmit(&self.xcvr, address, false);
        Ok(())
    }

    pub fn receive_byte(&self, address: u8) -> Result<(), RequestError> {
        self.claim()?;
        self.engine.with_record(|t| {
            t.reset_transfer();
            let wire_len = 1 + t.pec_enabled as usize;
            t.rx.reset(wire_len);
        });
        self.engine.begin_receive(&self.xcvr, address);
        Ok(())
    }

    /// `data` must be exactly 1 or 2 bytes.
    pub fn write_byte_word(
        &self,
        address: u8,
        command: u8,
        data: &[u8],
    ) -> Result<(), RequestError> {
        if data.is_empty() || data.len() > 2 {
            return Err(RequestError::DataSize);
        }
        self.claim()?;
        self.load(|t| {
            t.reset_transfer();
            t.command = command;
            t.tx.push(command)?;
            t.tx.extend(data)
        })?;
        self.engine.set_phase(Phase::Transmitting);
        self.engine.begin_transmit(&self.xcvr, address, false);
        Ok(())
    }

    /// `size` must be 1 or 2; collect the result with
    /// [`SmbusMaster::read_received`] once idle.
    pub fn read_byte_word(
        &self,
        address: u8,
        command: u8,
        size: usize,
    ) -> Result<(), RequestError> {
        if size == 0 || size > 2 {
            return Err(RequestError::DataSize);
        }
        self.claim()?;
        self.load(|t| {
            t.reset_transfer();
            t.command = command;
            t.has_rx = true;
            t.rx.reset(size + t.pec_enabled as usize);
            t.tx.push(command)
        })?;
        self.engine.set_phase(Phase::Transmitting);
        self.engine.begin_transmit(&self.xcvr, address, false);
        Ok(())
    }

    /// Payload must be 1..=32 bytes; framed as command, count, payload.
    pub fn block_write(&self, address: u8, command: u8, data: &[u8]) -> Result<(), RequestError> {
        if data.is_empty() || data.len() > MAX_BLOCK_LEN {
            return Err(RequestError::DataSize);
        }
        self.claim()?;
        self.load(|t| {
            t.reset_transfer();
            t.command = command;
            t.tx.push(command)?;
            t.tx.push(data.len() as u8)?;
            t.tx.extend(data)
        })?;
        self.engine.set_phase(Phase::TransmittingBlock);
        self.engine.begin_transmit(&self.xcvr, address, false);
        Ok(())
    }

    /// The peer supplies the count byte; the payload lands in the receive
    /// window, collected with [`SmbusMaster::read_received`].
    pub fn block_read(&self, address: u8, command: u8) -> Result<(), RequestError> {
        self.claim()?;
        self.load(|t| {
            t.reset_transfer();
            t.command = command;
            t.has_rx = true;
            t.rx_is_block = true;
            t.rx.reset(MAX_PACKET_LEN);
            t.tx.push(command)
        })?;
        self.engine.set_phase(Phase::Transmitting);
        self.engine.begin_transmit(&self.xcvr, address, false);
        Ok(())
    }

    /// Two-byte write then two-byte read, joined by a repeated start.
    pub fn process_call(
        &self,
        address: u8,
        command: u8,
        data: &[u8; 2],
    ) -> Result<(), RequestError> {
        self.claim()?;
        self.load(|t| {
            t.reset_transfer();
            t.command = command;
            t.has_rx = true;
            t.rx.reset(2 + t.pec_enabled as usize);
            t.tx.push(command)?;
            t.tx.extend(data)
        })?;
        self.engine.set_phase(Phase::Transmitting);
        self.engine.begin_transmit(&self.xcvr, address, false);
        Ok(())
    }

    /// Block write then block read, joined by a repeated start.
    pub fn block_process_call(
        &self,
        address: u8,
        command: u8,
        data: &[u8],
    ) -> Result<(), RequestError> {
        if data.is_empty() || data.len() > MAX_BLOCK_LEN {
            return Err(RequestError::DataSize);
        }
        self.claim()?;
        self.load(|t| {
            t.reset_transfer();
            t.command = command;
            t.has_rx = true;
            t.rx_is_block = true;
            t.rx.reset(MAX_PACKET_LEN);
            t.tx.push(command)?;
            t.tx.push(data.len() as u8)?;
            t.tx.extend(data)
        })?;
        self.engine.set_phase(Phase::TransmittingBlock);
        self.engine.begin_transmit(&self.xcvr, address, false);
        Ok(())
    }

    /// Polls for `Phase::Idle` with a bounded attempt budget.
    ///
    /// The budget counts polling attempts, not wall-clock time: the same
    /// number spans different real durations depending on CPU speed. Already
    /// idle returns immediately without touching anything.
    ///
    /// `Err(Busy)` means the budget ran out with the bus still active: the
    /// interface is in the same still-claimed condition a new request would
    /// be refused with, not in a fault state.
    pub fn wait_until_idle(&self, attempts: u32) -> Result<(), RequestError> {
        if self.engine.is_idle() {
            return Ok(());
        }
        for _ in 0..attempts {
            if self.engine.is_idle() {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(RequestError::Busy)
    }

    /// Copies the received payload out (count and PEC bytes excluded).
    /// Call after observing idle. `Err` carries the size the buffer would
    /// need.
    pub fn read_received(&self, buf: &mut [u8]) -> Result<usize, usize> {
        self.engine.with_record(|t| t.rx.copy_to(buf))
    }

    pub fn reported_state(&self) -> ProtocolState {
        self.engine.reported_state()
    }

    /// Clears the reported code and re-arms an errored interface.
    pub fn acknowledge(&self) {
        self.engine.acknowledge()
    }

    pub fn status(&self) -> StickyStatus {
        self.engine.status()
    }

    pub fn clear_status(&self) {
        self.engine.clear_status()
    }

    fn claim(&self) -> Result<(), RequestError> {
        if self.engine.is_idle() {
            Ok(())
        } else {
            Err(RequestError::Busy)
        }
    }

    /// Populates the record; a capacity overflow is a DataSizeError and
    /// forces the error phase.
    fn load(
        &self,
        f: impl FnOnce(&mut crate::transaction::Transaction<TX, RX>) -> Result<(), ()>,
    ) -> Result<(), RequestError> {
        match self.engine.with_record(f) {
            Ok(()) => Ok(()),
            Err(()) => {
                self.engine.set_phase(Phase::Error);
                Err(RequestError::DataSize)
            }
        }
    }
}
