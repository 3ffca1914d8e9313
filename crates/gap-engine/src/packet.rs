//! The packet type carried between pipeline stages.
//!
//! A packet is a fixed-capacity byte buffer plus a read cursor and a write
//! cursor. Producers fill bytes at `write_cursor` and advance it; consumers
//! drain bytes at `read_cursor` and advance it. `read_cursor <= write_cursor
//! <= capacity` always holds.

use gap_types::AudioFormat;

use crate::event::StreamId;

/// Flags carried alongside a packet's payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PacketFlags(u32);

impl PacketFlags {
    /// This packet carries (or follows) the last samples of its stream.
    pub const EOS: PacketFlags = PacketFlags(0b0000_0001);
    /// Codec-specific marker (e.g. a keyframe boundary); meaning is
    /// defined by the codec plugin that set it.
    pub const CODEC_SPECIFIC: PacketFlags = PacketFlags(0b0000_0010);

    pub const fn empty() -> Self {
        PacketFlags(0)
    }

    pub fn contains(self, other: PacketFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: PacketFlags) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for PacketFlags {
    type Output = PacketFlags;
    fn bitor(self, rhs: PacketFlags) -> PacketFlags {
        PacketFlags(self.0 | rhs.0)
    }
}

/// A unit of bytes (coded or PCM) moving through the pipeline, plus the
/// metadata needed to interpret and place it.
#[derive(Debug)]
pub struct Packet {
    buf: Vec<u8>,
    write_cursor: usize,
    read_cursor: usize,
    /// Format of the payload, if known yet (coded packets may not know it).
    pub format: Option<AudioFormat>,
    pub flags: PacketFlags,
    /// The stream this packet belongs to; a downstream actor drops a
    /// packet whose `stream_id` no longer matches its current one after a
    /// flush (`spec.md` §3 "Stream identity").
    pub stream_id: StreamId,
    /// Frame index into the logical stream this packet's first sample occupies.
    pub stream_position: u64,
    /// Total frame count of the logical stream, or `None` if unknown.
    pub stream_length: Option<u64>,
}

impl Packet {
    /// Allocate a packet with `capacity` bytes, all initially unused.
    pub fn with_capacity(capacity: usize) -> Self {
        Packet {
            buf: vec![0u8; capacity],
            write_cursor: 0,
            read_cursor: 0,
            format: None,
            flags: PacketFlags::empty(),
            stream_id: 0,
            stream_position: 0,
            stream_length: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    /// Bytes available to read between the read and write cursors.
    pub fn readable(&self) -> &[u8] {
        &self.buf[self.read_cursor..self.write_cursor]
    }

    /// Space available to write between the write cursor and capacity.
    pub fn writable_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.write_cursor..]
    }

    /// Append `data` at the write cursor. Panics if it would overflow
    /// capacity: callers are expected to size packets from `AudioFormat`
    /// before filling them.
    pub fn write(&mut self, data: &[u8]) {
        let end = self.write_cursor + data.len();
        assert!(end <= self.buf.len(), "packet write overflow");
        self.buf[self.write_cursor..end].copy_from_slice(data);
        self.write_cursor = end;
    }

    /// Advance the read cursor by `n` bytes (e.g. after a consumer copies
    /// them out). Panics if it would pass the write cursor.
    pub fn advance_read(&mut self, n: usize) {
        let pos = self.read_cursor + n;
        assert!(pos <= self.write_cursor, "packet read overflow");
        self.read_cursor = pos;
    }

    /// Number of PCM frames currently readable, given `frame_bytes`.
    pub fn num_frames(&self, frame_bytes: usize) -> usize {
        if frame_bytes == 0 {
            return 0;
        }
        self.readable().len() / frame_bytes
    }

    /// Reset a packet to its just-allocated state before it returns to the pool.
    pub fn clear(&mut self) {
        self.write_cursor = 0;
        self.read_cursor = 0;
        self.format = None;
        self.flags = PacketFlags::empty();
        self.stream_id = 0;
        self.stream_position = 0;
        self.stream_length = None;
    }

    pub fn is_eos(&self) -> bool {
        self.flags.contains(PacketFlags::EOS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut p = Packet::with_capacity(8);
        p.write(&[1, 2, 3, 4]);
        assert_eq!(p.readable(), &[1, 2, 3, 4]);
        p.advance_read(2);
        assert_eq!(p.readable(), &[3, 4]);
    }

    #[test]
    fn clear_resets_cursors_and_metadata() {
        let mut p = Packet::with_capacity(8);
        p.write(&[9, 9]);
        p.stream_position = 42;
        p.flags = PacketFlags::EOS;
        p.clear();
        assert_eq!(p.write_cursor(), 0);
        assert_eq!(p.read_cursor(), 0);
        assert_eq!(p.stream_position, 0);
        assert!(!p.is_eos());
    }

    #[test]
    #[should_panic(expected = "overflow")]
    fn write_past_capacity_panics() {
        let mut p = Packet::with_capacity(2);
        p.write(&[1, 2, 3]);
    }

    #[test]
    fn num_frames_divides_by_frame_bytes() {
        let mut p = Packet::with_capacity(16);
        p.write(&[0u8; 16]);
        assert_eq!(p.num_frames(4), 4);
    }
}
