//! Encoding and decoding of complete wire frames: header, optional
//! preamble, and payload (§4.2).
//!
//! Decoding never reinterprets a byte buffer as a host struct; every field
//! is read explicitly in little-endian order, so the wire format is
//! unaffected by host alignment or padding (see the design note in §9).

use crate::error::TransportError;
use crate::packet::header::{HeaderFlags, PacketHeader, StreamSpec, TimeSpec, HEADER_BYTES};
use crate::packet::payload::Payload;

/// A fully decoded frame: header, the preamble words implied by its flags,
/// and the raw payload bytes. The payload is left uninterpreted here;
/// callers that know which command produced it use the matching
/// `Payload::decode_*` function.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
	pub header: PacketHeader,
	pub time: Option<TimeSpec>,
	pub stream_id: Option<StreamSpec>,
	pub payload: Vec<u8>,
}

impl Frame {
	pub fn header_only(mut header: PacketHeader) -> Self {
		header.packet_size = HEADER_BYTES as u16;
		Frame { header, time: None, stream_id: None, payload: Vec::new() }
	}

	pub fn with_payload(mut header: PacketHeader, payload: &Payload) -> Self {
		let preamble = header.preamble_bytes();
		header.packet_size = (HEADER_BYTES + preamble + payload.encoded_len()) as u16;
		let mut bytes = Vec::with_capacity(payload.encoded_len());
		payload.encode_into(&mut bytes);
		Frame { header, time: None, stream_id: None, payload: bytes }
	}

	pub fn with_time(mut self, time: TimeSpec) -> Self {
		self.header.flags |= HeaderFlags::TIME_PRESENT;
		self.time = Some(time);
		self.header.packet_size = (HEADER_BYTES + self.header.preamble_bytes() + self.payload.len()) as u16;
		self
	}

	pub fn with_stream_id(mut self, stream_id: StreamSpec) -> Self {
		self.header.flags |= HeaderFlags::STREAM_ID_PRESENT;
		self.stream_id = Some(stream_id);
		self.header.packet_size = (HEADER_BYTES + self.header.preamble_bytes() + self.payload.len()) as u16;
		self
	}

	pub fn encode(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(self.header.packet_size as usize);
		out.extend_from_slice(&self.header.to_bytes());
		if let Some(t) = self.time {
			out.extend_from_slice(&t.to_bytes());
		}
		if let Some(s) = self.stream_id {
			out.extend_from_slice(&s.to_le_bytes());
		}
		out.extend_from_slice(&self.payload);
		out
	}

	/// Decode a frame received from the wire. `on_wire_len` is the number
	/// of bytes actually read from the socket or DMA buffer; it must equal
	/// the header's `packet_size` field (invariant I2), or this is
	/// rejected as a [`TransportError::SizeMismatch`].
	pub fn decode(buf: &[u8], on_wire_len: usize) -> Result<Self, TransportError> {
		if buf.len() < HEADER_BYTES {
			return Err(TransportError::SizeMismatch {
				declared: 0,
				actual: buf.len() as u16,
			});
		}
		let mut header_bytes = [0u8; HEADER_BYTES];
		header_bytes.copy_from_slice(&buf[0..HEADER_BYTES]);
		let header = PacketHeader::from_bytes(&header_bytes);

		if on_wire_len != header.packet_size as usize {
			return Err(TransportError::SizeMismatch {
				declared: header.packet_size,
				actual: on_wire_len as u16,
			});
		}

		let mut offset = HEADER_BYTES;
		let time = if header.flags.contains(HeaderFlags::TIME_PRESENT) {
			let end = offset + 8;
			let mut b = [0u8; 8];
			b.copy_from_slice(&buf[offset..end]);
			offset = end;
			Some(TimeSpec::from_bytes(&b))
		} else {
			None
		};
		let stream_id = if header.flags.contains(HeaderFlags::STREAM_ID_PRESENT) {
			let end = offset + 8;
			let v = u64::from_le_bytes(buf[offset..end].try_into().unwrap());
			offset = end;
			Some(v)
		} else {
			None
		};

		let payload = buf[offset..header.packet_size as usize].to_vec();
		Ok(Frame { header, time, stream_id, payload })
	}
}
