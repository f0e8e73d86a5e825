//! The fixed 8-byte packet header (§3.1) and the preamble words that may
//! follow it.

use bitflags::bitflags;

pub const HEADER_BYTES: usize = 8;
pub const TIME_SPEC_BYTES: usize = 8;
pub const STREAM_SPEC_BYTES: usize = 8;

bitflags! {
	/// The 4-bit flags field. Any combination is legal on the wire; the
	/// transport only interprets the bits it names here.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
	pub struct HeaderFlags: u8 {
		const REQUEST_ACK       = 0x01;
		const TIME_PRESENT      = 0x02;
		const STREAM_ID_PRESENT = 0x04;
	}
}

impl HeaderFlags {
	/// Size in bytes of the optional preamble implied by these flags.
	pub fn preamble_bytes(self) -> usize {
		let mut n = 0;
		if self.contains(HeaderFlags::TIME_PRESENT) {
			n += TIME_SPEC_BYTES;
		}
		if self.contains(HeaderFlags::STREAM_ID_PRESENT) {
			n += STREAM_SPEC_BYTES;
		}
		n
	}
}

pub const ALL_SUBDEVICES: u8 = 0xFF;
pub const ALL_CHANNELS: u8 = 0xFF;

/// Packed header fields. `packet_type` and `command` are 6 bits each,
/// `flags` is 4 bits; together they occupy the first little-endian u16 on
/// the wire, `packet_type` in the low bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
	pub packet_type: u8,
	pub command: u8,
	pub flags: HeaderFlags,
	pub subdevice: u8,
	pub channel: u8,
	pub packet_size: u16,
	pub sequence_counter: u16,
}

impl PacketHeader {
	pub fn new(packet_type: u8, command: u8) -> Self {
		Self {
			packet_type,
			command,
			flags: HeaderFlags::empty(),
			subdevice: ALL_SUBDEVICES,
			channel: ALL_CHANNELS,
			packet_size: HEADER_BYTES as u16,
			sequence_counter: 0,
		}
	}

	pub fn preamble_bytes(&self) -> usize {
		self.flags.preamble_bytes()
	}

	pub fn to_bytes(self) -> [u8; HEADER_BYTES] {
		let type_command_flags: u16 = (self.packet_type as u16 & 0x3F)
			| ((self.command as u16 & 0x3F) << 6)
			| ((self.flags.bits() as u16 & 0x0F) << 12);
		let mut out = [0u8; HEADER_BYTES];
		out[0..2].copy_from_slice(&type_command_flags.to_le_bytes());
		out[2] = self.subdevice;
		out[3] = self.channel;
		out[4..6].copy_from_slice(&self.packet_size.to_le_bytes());
		out[6..8].copy_from_slice(&self.sequence_counter.to_le_bytes());
		out
	}

	pub fn from_bytes(buf: &[u8; HEADER_BYTES]) -> Self {
		let type_command_flags = u16::from_le_bytes([buf[0], buf[1]]);
		Self {
			packet_type: (type_command_flags & 0x3F) as u8,
			command: ((type_command_flags >> 6) & 0x3F) as u8,
			flags: HeaderFlags::from_bits_truncate(((type_command_flags >> 12) & 0x0F) as u8),
			subdevice: buf[2],
			channel: buf[3],
			packet_size: u16::from_le_bytes([buf[4], buf[5]]),
			sequence_counter: u16::from_le_bytes([buf[6], buf[7]]),
		}
	}
}

/// Optional time preamble: two unsigned 32-bit words, seconds then
/// nanoseconds. Carried but never interpreted by this core (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeSpec {
	pub seconds: u32,
	pub nanoseconds: u32,
}

impl TimeSpec {
	pub fn to_bytes(self) -> [u8; TIME_SPEC_BYTES] {
		let mut out = [0u8; TIME_SPEC_BYTES];
		out[0..4].copy_from_slice(&self.seconds.to_le_bytes());
		out[4..8].copy_from_slice(&self.nanoseconds.to_le_bytes());
		out
	}

	pub fn from_bytes(buf: &[u8; TIME_SPEC_BYTES]) -> Self {
		Self {
			seconds: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
			nanoseconds: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
		}
	}
}

/// Opaque 64-bit stream correlation tag.
pub type StreamSpec = u64;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn header_round_trips() {
		let hdr = PacketHeader {
			packet_type: 0x02,
			command: 0x17,
			flags: HeaderFlags::REQUEST_ACK | HeaderFlags::TIME_PRESENT,
			subdevice: 3,
			channel: 1,
			packet_size: 40,
			sequence_counter: 12345,
		};
		let bytes = hdr.to_bytes();
		assert_eq!(bytes.len(), HEADER_BYTES);
		let back = PacketHeader::from_bytes(&bytes);
		assert_eq!(hdr, back);
	}

	#[test]
	fn packet_type_command_flags_pack_into_first_word() {
		let hdr = PacketHeader::new(0x3F, 0x3F);
		let bytes = hdr.to_bytes();
		let word = u16::from_le_bytes([bytes[0], bytes[1]]);
		assert_eq!(word & 0x3F, 0x3F);
		assert_eq!((word >> 6) & 0x3F, 0x3F);
	}

	#[test]
	fn preamble_bytes_match_flags() {
		assert_eq!(HeaderFlags::empty().preamble_bytes(), 0);
		assert_eq!(HeaderFlags::TIME_PRESENT.preamble_bytes(), 8);
		assert_eq!(HeaderFlags::STREAM_ID_PRESENT.preamble_bytes(), 8);
		assert_eq!(
			(HeaderFlags::TIME_PRESENT | HeaderFlags::STREAM_ID_PRESENT).preamble_bytes(),
			16
		);
	}

	#[test]
	fn time_spec_round_trips() {
		let ts = TimeSpec { seconds: 0xDEAD_BEEF, nanoseconds: 123_456_789 };
		assert_eq!(TimeSpec::from_bytes(&ts.to_bytes()), ts);
	}
}
