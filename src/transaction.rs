//! The shared transaction record: one per bus interface, populated by the
//! foreground before a transfer starts and mutated per byte by the phase
//! machine that matches the interface role.

use crate::pec::Pec;
use crate::Role;

/// Outgoing bytes of the in-progress transaction.
///
/// The request builder serializes the whole write phase up front (command,
/// count byte for block shapes, payload); the phase machine then drains it
/// one byte per byte-requested event.
pub(crate) struct SendView<const N: usize> {
    buf: [u8; N],
    len: usize,
    pos: usize,
}

impl<const N: usize> SendView<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            pos: 0,
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.pos = 0;
    }

    pub fn push(&mut self, byte: u8) -> Result<(), ()> {
        if self.len == N {
            return Err(());
        }
        self.buf[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), ()> {
        for &byte in bytes {
            self.push(byte)?;
        }
        Ok(())
    }

    /// Caps the queued response at `len` bytes without touching the cursor.
    pub fn truncate(&mut self, len: usize) {
        if self.len > len {
            self.len = len;
        }
    }

    /// Rewinds the drain cursor so the queued bytes serve again.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    pub fn next(&mut self) -> Option<u8> {
        if self.pos == self.len {
            None
        } else {
            self.pos += 1;
            Some(self.buf[self.pos - 1])
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

/// Incoming bytes of the in-progress transaction.
///
/// `wire_len` counts every expected byte after the address (count byte and
/// PEC included); `stored` counts only payload bytes landed in the caller
/// window.
pub(crate) struct RecvView<const N: usize> {
    buf: [u8; N],
    wire_len: usize,
    pos: usize,
    stored: usize,
}

impl<const N: usize> RecvView<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            wire_len: 0,
            pos: 0,
            stored: 0,
        }
    }

    pub fn reset(&mut self, wire_len: usize) {
        self.wire_len = wire_len;
        self.pos = 0;
        self.stored = 0;
    }

    /// Renegotiates the expected wire length mid-transaction (block reads,
    /// once the count byte is known).
    pub fn set_wire_len(&mut self, wire_len: usize) {
        self.wire_len = wire_len;
    }

    pub fn wire_len(&self) -> usize {
        self.wire_len
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.wire_len.saturating_sub(self.pos)
    }

    /// Consumes one wire byte, landing it in the caller window when `store`
    /// is set and capacity allows.
    pub fn push_wire(&mut self, byte: u8, store: bool) {
        self.pos += 1;
        if store && self.stored < N {
            self.buf[self.stored] = byte;
            self.stored += 1;
        }
    }

    /// Drops the last stored byte from the caller window. Used by the slave
    /// to discount a trailing PEC byte from the reported payload.
    pub fn drop_trailer(&mut self) {
        self.stored = self.stored.saturating_sub(1);
    }

    /// Copies the stored payload out. `Err` carries the size the caller's
    /// buffer would need.
    pub fn copy_to(&self, buf: &mut [u8]) -> Result<usize, usize> {
        if buf.len() < self.stored {
            Err(self.stored)
        } else {
            buf[..self.stored].copy_from_slice(&self.buf[..self.stored]);
            Ok(self.stored)
        }
    }
}

/// Sticky status flags. Informational, not phase-determining; they persist
/// until the application clears them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StickyStatus {
    pub pec_error: bool,
    pub timeout: bool,
    pub packet_error: bool,
    pub packet_overrun: bool,
    pub byte_overrun: bool,
    pub command_error: bool,
}

impl StickyStatus {
    pub const fn new() -> Self {
        Self {
            pec_error: false,
            timeout: false,
            packet_error: false,
            packet_overrun: false,
            byte_overrun: false,
            command_error: false,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for StickyStatus {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) struct Transaction<const TX: usize, const RX: usize> {
    pub role: Role,
    /// 7-bit peer address shifted left, with the last-used direction bit.
    pub peer: u8,
    pub command: u8,
    pub tx: SendView<TX>,
    pub rx: RecvView<RX>,
    pub pec: Pec,
    pub pec_enabled: bool,
    /// A receive phase follows the write phase (read-after-write shapes).
    pub has_rx: bool,
    /// The receive phase is count-byte prefixed.
    pub rx_is_block: bool,
    /// A receive phase actually ran; checked at the terminating stop.
    pub did_rx: bool,
    pub pec_sent: bool,
    pub count_seen: bool,
    /// Most recent slave byte not yet consumed by the application.
    pub byte_pending: bool,
    pub last_byte: u8,
    pub sticky: StickyStatus,
}

impl<const TX: usize, const RX: usize> Transaction<TX, RX> {
    pub const fn new(role: Role, pec_enabled: bool) -> Self {
        Self {
            role,
            peer: 0,
            command: 0,
            tx: SendView::new(),
            rx: RecvView::new(),
            pec: Pec::new(),
            pec_enabled,
            has_rx: false,
            rx_is_block: false,
            did_rx: false,
            pec_sent: false,
            count_seen: false,
            byte_pending: false,
            last_byte: 0,
            sticky: StickyStatus::new(),
        }
    }

    /// Per-transaction reset. Sticky flags survive; they are cleared only
    /// by an explicit application call.
    pub fn reset_transfer(&mut self) {
        self.peer = 0;
        self.command = 0;
        self.tx.clear();
        self.rx.reset(0);
        self.pec.reset();
        self.has_rx = false;
        self.rx_is_block = false;
        self.did_rx = false;
        self.pec_sent = false;
        self.count_seen = false;
        self.byte_pending = false;
    }

    pub fn fold(&mut self, byte: u8) {
        if self.pec_enabled {
            self.pec.fold(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_view_drains_in_order() {
        let mut tx = SendView::<8>::new();
        tx.extend(&[0x10, 0x03, 1, 2, 3]).unwrap();
        let mut out = std::vec::Vec::new();
        while let Some(b) = tx.next() {
            out.push(b);
        }
        assert_eq!(out, [0x10, 0x03, 1, 2, 3]);
        assert_eq!(tx.next(), None);
    }

    #[test]
    fn send_view_rejects_past_capacity() {
        let mut tx = SendView::<2>::new();
        assert!(tx.extend(&[1, 2]).is_ok());
        assert!(tx.push(3).is_err());
    }

    #[test]
    fn recv_view_stores_only_marked_bytes() {
        let mut rx = RecvView::<4>::new();
        rx.reset(3);
        rx.push_wire(0x02, false); // count byte
        rx.push_wire(0xAA, true);
        rx.push_wire(0xBB, true);
        assert_eq!(rx.remaining(), 0);
        let mut buf = [0u8; 4];
        assert_eq!(rx.copy_to(&mut buf), Ok(2));
        assert_eq!(&buf[..2], &[0xAA, 0xBB]);
    }

    #[test]
    fn recv_view_copy_reports_needed_size() {
        let mut rx = RecvView::<4>::new();
        rx.reset(2);
        rx.push_wire(1, true);
        rx.push_wire(2, true);
        let mut small = [0u8; 1];
        assert_eq!(rx.copy_to(&mut small), Err(2));
    }

    #[test]
    fn sticky_flags_survive_transfer_reset() {
        let mut t = Transaction::<8, 8>::new(Role::Master, true);
        t.sticky.timeout = true;
        t.reset_transfer();
        assert!(t.sticky.timeout);
        t.sticky.clear();
        assert!(!t.sticky.timeout);
    }
}
