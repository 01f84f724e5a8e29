//! Receive-side unit framing.
//!
//! Neither transport aligns its deliveries with protocol units: a stream read
//! can end in the middle of a unit (or of a UTF-8 sequence), and a single
//! websocket message may carry several units or only part of one. Both paths
//! feed the same [`UnitBuffer`], which holds back the incomplete tail and
//! hands out every unit closed by a [`UNIT_TERMINATOR`].

use crate::packet::{Packet, UNIT_TERMINATOR};

/// Pending inbound bytes of one connection.
///
/// After every [`push`](UnitBuffer::push) the buffer holds at most one
/// incomplete unit.
#[derive(Debug, Default)]
pub struct UnitBuffer {
    pending: Vec<u8>,
}

impl UnitBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every unit it completes, decoded, in
    /// arrival order.
    ///
    /// Invalid UTF-8 inside a unit is replaced with U+FFFD; no unit is
    /// ever discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Packet> {
        let terminator = UNIT_TERMINATOR.as_bytes();

        // The held-back tail contains no terminator, but its last byte may be
        // the first half of one.
        let mut search_from = self.pending.len().saturating_sub(terminator.len() - 1);
        self.pending.extend_from_slice(chunk);

        let mut packets = Vec::new();
        let mut unit_start = 0;
        while let Some(offset) = find(&self.pending[search_from..], terminator) {
            let unit_end = search_from + offset;
            let unit = String::from_utf8_lossy(&self.pending[unit_start..unit_end]);
            packets.push(Packet::decode(&unit));
            unit_start = unit_end + terminator.len();
            search_from = unit_start;
        }
        self.pending.drain(..unit_start);

        packets
    }

    /// Drop any partially received unit.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Bytes received but not yet terminated.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Whether no partial unit is held.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
