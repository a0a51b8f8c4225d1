//! Slave-side phase machine and its foreground handle.
//!
//! The transceiver reports four events (start, byte received, byte
//! requested, stop) plus the bus-stuck timeout; the machine tracks the
//! packet, validates the PEC at the packet boundary, and hands received
//! payloads and response queues back and forth with the application.

use core::cell::RefCell;

use atomic::{Atomic, Ordering};
use critical_section::Mutex;

use crate::phase::PhaseHolder;
use crate::transaction::{StickyStatus, Transaction};
use crate::transceiver::Transceiver;
use crate::{Phase, ProtocolState, RequestError, Role, MAX_PACKET_LEN, NOTHING_TO_REPORT};

#[cfg(feature = "dump")]
use crate::phase::PhaseDump;

/// Application-reported faults that invalidate the in-progress packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlaveFault {
    /// The first byte was not a recognized command code.
    Command,
    /// The packet shape is wrong for the command.
    Packet,
}

/// One bus interface in the slave role.
pub struct SlaveEngine<const TX: usize, const RX: usize> {
    record: Mutex<RefCell<Transaction<TX, RX>>>,
    phase: PhaseHolder,
    reported: Atomic<ProtocolState>,
}

impl<const TX: usize, const RX: usize> SlaveEngine<TX, RX> {
    pub const fn new(pec_enabled: bool) -> Self {
        Self {
            record: Mutex::new(RefCell::new(Transaction::new(Role::Slave, pec_enabled))),
            phase: PhaseHolder::new(),
            reported: Atomic::new(ProtocolState::Ok),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub fn reported_state(&self) -> ProtocolState {
        self.reported.load(Ordering::SeqCst)
    }

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

    fn with_record<R>(&self, f: impl FnOnce(&mut Transaction<TX, RX>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.record.borrow_ref_mut(cs)))
    }

    fn report(&self, state: ProtocolState) -> ProtocolState {
        self.reported.store(state, Ordering::SeqCst);
        state
    }

    /// Start condition with our address; bit 0 of `addr_with_dir` is the
    /// direction (set = master reads from us).
    pub fn process_start(&self, addr_with_dir: u8) -> ProtocolState {
        let read = addr_with_dir & 1 != 0;

        match (read, self.phase.get()) {
            (false, _) => {
                // Write-to-us: arm the receive phase.
                self.with_record(|t| {
                    t.reset_transfer();
                    t.peer = addr_with_dir;
                    t.fold(addr_with_dir);
                    t.rx.reset(RX.min(MAX_PACKET_LEN));
                });
                self.phase.set(Phase::Receiving);
                self.report(ProtocolState::Ok)
            }
            (true, Phase::Receiving) => {
                // Repeated start: the received packet is complete; validate
                // it and turn around into the response phase.
                let state = self.with_record(|t| {
                    let valid = !t.pec_enabled || (t.rx.pos() > 0 && t.pec.value() == 0);
                    if valid && t.pec_enabled && t.rx.pos() > 0 {
                        t.rx.drop_trailer();
                    }

                    t.peer = addr_with_dir;
                    t.pec.reset();
                    t.fold(addr_with_dir);
                    t.pec_sent = false;

                    if valid {
                        ProtocolState::CommandComplete
                    } else {
                        t.sticky.pec_error = true;
                        ProtocolState::PecError
                    }
                });
                self.phase.set(Phase::TransmittingResponse);
                self.report(state)
            }
            (true, Phase::Idle) => {
                // No command phase preceded this read: assume the
                // receive-byte shape and arm a one-byte response window.
                // The armed byte serves again on every such read until the
                // application replaces it.
                self.with_record(|t| {
                    t.peer = addr_with_dir;
                    t.pec.reset();
                    t.fold(addr_with_dir);
                    t.pec_sent = false;
                    t.tx.rewind();
                    t.tx.truncate(1);
                });
                self.phase.set(Phase::TransmittingResponse);
                self.report(ProtocolState::Ok)
            }
            (true, _) => {
                self.with_record(|t| t.sticky.packet_error = true);
                self.report(ProtocolState::SlaveError)
            }
        }
    }

    pub fn process_received_byte(&self, byte: u8) -> ProtocolState {
        if self.phase.get() != Phase::Receiving {
            self.with_record(|t| t.sticky.packet_error = true);
            return self.report(ProtocolState::SlaveError);
        }

        let state = self.with_record(|t| {
            let ceiling = t.rx.wire_len().min(MAX_PACKET_LEN);
            if t.rx.pos() >= ceiling {
                t.sticky.packet_overrun = true;
                return ProtocolState::DataSizeError;
            }

            t.fold(byte);
            let first = t.rx.pos() == 0;
            if first {
                t.command = byte;
            }
            if t.byte_pending {
                t.sticky.byte_overrun = true;
            }
            t.byte_pending = true;
            t.last_byte = byte;
            t.rx.push_wire(byte, true);

            if first {
                ProtocolState::FirstByte
            } else {
                ProtocolState::ByteReceived
            }
        });

        if state == ProtocolState::DataSizeError {
            self.phase.set(Phase::Error);
        }
        self.report(state)
    }

    /// The master is clocking a byte out of us.
    pub fn process_byte_requested(&self) -> u8 {
        if self.phase.get() != Phase::TransmittingResponse {
            self.with_record(|t| t.sticky.packet_error = true);
            self.report(ProtocolState::SlaveError);
            return NOTHING_TO_REPORT;
        }

        let (state, byte) = self.with_record(|t| {
            if let Some(byte) = t.tx.next() {
                t.fold(byte);
                (ProtocolState::Ok, byte)
            } else if t.tx.len() == 0 {
                // The application never armed a response.
                (ProtocolState::SlaveNotReady, NOTHING_TO_REPORT)
            } else if t.pec_enabled && !t.pec_sent {
                t.pec_sent = true;
                (ProtocolState::Ok, t.pec.value())
            } else {
                // Master clocking past the end of the response.
                (ProtocolState::Ok, NOTHING_TO_REPORT)
            }
        });

        self.report(state);
        byte
    }

    pub fn process_stop_completed(&self) -> ProtocolState {
        let state = match self.phase.get() {
            Phase::Receiving => self.with_record(|t| {
                if t.rx.pos() == 0 {
                    ProtocolState::QuickCommand
                } else if t.pec_enabled {
                    if t.pec.value() == 0 {
                        t.rx.drop_trailer();
                        ProtocolState::CommandComplete
                    } else {
                        t.sticky.pec_error = true;
                        ProtocolState::PecError
                    }
                } else {
                    ProtocolState::CommandComplete
                }
            }),
            Phase::Error => self.reported_state(),
            _ => ProtocolState::Ok,
        };

        // Ready for the next packet regardless of how this one ended.
        self.phase.set(Phase::Idle);
        self.report(state)
    }

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

/// Foreground handle for a slave interface.
pub struct SmbusSlave<'d, const TX: usize, const RX: usize> {
    engine: &'d SlaveEngine<TX, RX>,
}

impl<'d, const TX: usize, const RX: usize> SmbusSlave<'d, TX, RX> {
    pub fn new(engine: &'d SlaveEngine<TX, RX>) -> Self {
        Self { engine }
    }

    /// Copies the received packet out, command byte included and trailing
    /// PEC byte excluded. `Err` carries the size the buffer would need.
    pub fn read_received(&self, buf: &mut [u8]) -> Result<usize, usize> {
        self.engine.with_record(|t| t.rx.copy_to(buf))
    }

    /// Consumes the most recent received byte, clearing the overrun
    /// tracker. `None` when no byte is pending.
    pub fn take_received_byte(&self) -> Option<u8> {
        self.engine.with_record(|t| {
            if t.byte_pending {
                t.byte_pending = false;
                Some(t.last_byte)
            } else {
                None
            }
        })
    }

    /// Command byte of the in-progress (or just-completed) packet.
    pub fn command(&self) -> u8 {
        self.engine.with_record(|t| t.command)
    }

    /// Queues the response the master will clock out after the repeated
    /// start (or as the receive-byte response).
    pub fn write_response(&self, data: &[u8]) -> Result<(), RequestError> {
        self.engine.with_record(|t| {
            t.tx.clear();
            t.pec_sent = false;
            t.tx.extend(data).map_err(|_| RequestError::DataSize)
        })
    }

    /// Invalidates the in-progress packet: the application rejected the
    /// command or its shape.
    pub fn report_error(&self, fault: SlaveFault) {
        let state = self.engine.with_record(|t| match fault {
            SlaveFault::Command => {
                t.sticky.command_error = true;
                ProtocolState::CommandError
            }
            SlaveFault::Packet => {
                t.sticky.packet_error = true;
                ProtocolState::PacketError
            }
        });
        self.engine.phase.set(Phase::Error);
        self.engine.report(state);
    }

    pub fn reported_state(&self) -> ProtocolState {
        self.engine.reported_state()
    }

    pub fn acknowledge(&self) {
        self.engine.acknowledge()
    }

    pub fn status(&self) -> StickyStatus {
        self.engine.status()
    }

    pub fn clear_status(&self) {
        self.engine.clear_status()
    }
}
