//! Replay buffer for NACK retransmission
//!
//! Keeps recently received RTP packets keyed by sequence number so lost
//! packets can be resent from the SFU instead of round-tripping to the
//! source. 16-bit sequence wrap-around is handled by extending sequences
//! against the highest observed packet.

use super::RtpPacket;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Headroom below the first sequence so slightly older packets that arrive
/// out of order still map to a valid extended sequence.
const BASE_OFFSET: u64 = 1 << 16;

struct Entry {
    pkt: RtpPacket,
    stored_at: Instant,
}

/// Bounded store of raw RTP packets, retrievable by sequence number
pub struct ReplayBuffer {
    packets: BTreeMap<u64, Entry>,
    /// Extended sequence of the newest packet observed
    head: Option<u64>,
    max_age: Duration,
    max_packets: usize,
}

impl ReplayBuffer {
    /// Create a buffer holding packets for `max_age`, capped at `max_packets`
    pub fn new(max_age: Duration, max_packets: usize) -> Self {
        Self {
            packets: BTreeMap::new(),
            head: None,
            max_age,
            max_packets,
        }
    }

    /// Store one packet, advancing the head if it is the newest seen
    pub fn push(&mut self, pkt: RtpPacket) {
        let seq = pkt.header.sequence_number;

        let ext = match self.head {
            Some(head) => match Self::extend(head, seq) {
                Some(ext) => ext,
                None => return,
            },
            None => BASE_OFFSET + u64::from(seq),
        };

        if self.head.map_or(true, |head| ext > head) {
            self.head = Some(ext);
        }

        self.packets.insert(
            ext,
            Entry {
                pkt,
                stored_at: Instant::now(),
            },
        );

        self.evict();
    }

    /// Look up a packet by 16-bit sequence, relative to the current head
    ///
    /// Returns `None` for sequences that were never stored, have expired, or
    /// have rolled out of the window.
    pub fn get(&self, seq: u16) -> Option<RtpPacket> {
        let head = self.head?;
        let ext = Self::extend(head, seq)?;
        let entry = self.packets.get(&ext)?;

        if entry.stored_at.elapsed() > self.max_age {
            return None;
        }
        Some(entry.pkt.clone())
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Map a 16-bit sequence onto the extended sequence line anchored at
    /// `head`, using signed difference arithmetic for wrap-around.
    fn extend(head: u64, seq: u16) -> Option<u64> {
        let head_seq = (head & 0xFFFF) as u16;
        let diff = i64::from(seq.wrapping_sub(head_seq) as i16);
        let ext = head as i64 + diff;
        if ext < 0 {
            return None;
        }
        Some(ext as u64)
    }

    fn evict(&mut self) {
        while self.packets.len() > self.max_packets {
            self.packets.pop_first();
        }

        let expired: Vec<u64> = self
            .packets
            .iter()
            .take_while(|(_, e)| e.stored_at.elapsed() > self.max_age)
            .map(|(&k, _)| k)
            .collect();
        for key in expired {
            self.packets.remove(&key);
        }
    }
}
