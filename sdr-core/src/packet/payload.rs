//! Fixed-layout payload variants (§3.3).

pub const MAX_NAME_LENGTH_BYTES: usize = 16;
pub const MAX_FRONTEND_FILTER_LENGTH: usize = 16;
pub const MAX_DATA_LENGTH_SAMPLES: usize = 2048;
pub const MAX_CMD_RSP_PAYLOAD_BYTES: usize = 4 * MAX_FRONTEND_FILTER_LENGTH + 8;
pub const MAX_DATA_PAYLOAD_BYTES: usize = 4 * MAX_DATA_LENGTH_SAMPLES;

/// A single complex sample as carried on the wire: signed 16-bit I/Q.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComplexI16 {
	pub i: i16,
	pub q: i16,
}

impl ComplexI16 {
	pub const BYTES: usize = 4;

	pub fn to_bytes(self) -> [u8; Self::BYTES] {
		let mut out = [0u8; Self::BYTES];
		out[0..2].copy_from_slice(&self.i.to_le_bytes());
		out[2..4].copy_from_slice(&self.q.to_le_bytes());
		out
	}

	pub fn from_bytes(buf: &[u8]) -> Self {
		Self {
			i: i16::from_le_bytes([buf[0], buf[1]]),
			q: i16::from_le_bytes([buf[2], buf[3]]),
		}
	}
}

/// The fixed payload shapes this core can encode and decode. A packet's
/// payload form is selected by its `packet_type` and `command`; the
/// transport layer that dispatches packets knows which form to expect
/// (this crate does not infer it automatically, mirroring the external
/// `get_*`/`set_*` surface that is out of scope here).
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
	Empty,
	OneU32(u32),
	TwoU32(u32, u32),
	FourU32([u32; 4]),
	SixU32([u32; 6]),
	EightU32([u32; 8]),
	OneF64(f64),
	TwoF64(f64, f64),
	FourF64([f64; 4]),
	OneU64(u64),
	Name([u8; MAX_NAME_LENGTH_BYTES]),
	FilterCoeffs {
		length: u32,
		coeffs: [ComplexI16; MAX_FRONTEND_FILTER_LENGTH],
	},
	/// Device command error payload: a single error code.
	ErrorCode(u32),
	/// Six-word TX buffer-fill ack payload (§4.4): fields 1-2 are reserved,
	/// fields 3-5 are `used_bytes`/`size_bytes`/`packet_oos_count`, field 6
	/// is unused by this core.
	TxAck {
		used_bytes: u32,
		size_bytes: u32,
		packet_oos_count: u32,
	},
	/// Up to [`MAX_DATA_LENGTH_SAMPLES`] complex samples.
	Samples(Vec<ComplexI16>),
}

impl Payload {
	pub fn encoded_len(&self) -> usize {
		match self {
			Payload::Empty => 0,
			Payload::OneU32(_) => 4,
			Payload::TwoU32(..) => 8,
			Payload::FourU32(_) => 16,
			Payload::SixU32(_) => 24,
			Payload::EightU32(_) => 32,
			Payload::OneF64(_) => 8,
			Payload::TwoF64(..) => 16,
			Payload::FourF64(_) => 32,
			Payload::OneU64(_) => 8,
			Payload::Name(_) => MAX_NAME_LENGTH_BYTES,
			Payload::FilterCoeffs { .. } => 8 + MAX_FRONTEND_FILTER_LENGTH * ComplexI16::BYTES,
			Payload::ErrorCode(_) => 4,
			Payload::TxAck { .. } => 24,
			Payload::Samples(samples) => samples.len() * ComplexI16::BYTES,
		}
	}

	pub fn encode_into(&self, out: &mut Vec<u8>) {
		match self {
			Payload::Empty => {}
			Payload::OneU32(v) => out.extend_from_slice(&v.to_le_bytes()),
			Payload::TwoU32(a, b) => {
				out.extend_from_slice(&a.to_le_bytes());
				out.extend_from_slice(&b.to_le_bytes());
			}
			Payload::FourU32(vs) => vs.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
			Payload::SixU32(vs) => vs.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
			Payload::EightU32(vs) => vs.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
			Payload::OneF64(v) => out.extend_from_slice(&v.to_le_bytes()),
			Payload::TwoF64(a, b) => {
				out.extend_from_slice(&a.to_le_bytes());
				out.extend_from_slice(&b.to_le_bytes());
			}
			Payload::FourF64(vs) => vs.iter().for_each(|v| out.extend_from_slice(&v.to_le_bytes())),
			Payload::OneU64(v) => out.extend_from_slice(&v.to_le_bytes()),
			Payload::Name(name) => out.extend_from_slice(name),
			Payload::FilterCoeffs { length, coeffs } => {
				out.extend_from_slice(&length.to_le_bytes());
				out.extend_from_slice(&0u32.to_le_bytes()); // reserved
				for c in coeffs {
					out.extend_from_slice(&c.to_bytes());
				}
			}
			Payload::ErrorCode(code) => out.extend_from_slice(&code.to_le_bytes()),
			Payload::TxAck { used_bytes, size_bytes, packet_oos_count } => {
				// Fields 1-2 of the wire ack are reserved; this core never
				// originates a TX ack, only decodes one received from the
				// device, but keeps encode_into symmetric with decode_tx_ack.
				out.extend_from_slice(&0u32.to_le_bytes());
				out.extend_from_slice(&0u32.to_le_bytes());
				out.extend_from_slice(&used_bytes.to_le_bytes());
				out.extend_from_slice(&size_bytes.to_le_bytes());
				out.extend_from_slice(&packet_oos_count.to_le_bytes());
				out.extend_from_slice(&0u32.to_le_bytes());
			}
			Payload::Samples(samples) => {
				for s in samples {
					out.extend_from_slice(&s.to_bytes());
				}
			}
		}
	}

	fn u32_at(buf: &[u8], word: usize) -> u32 {
		let o = word * 4;
		u32::from_le_bytes([buf[o], buf[o + 1], buf[o + 2], buf[o + 3]])
	}

	fn f64_at(buf: &[u8], word: usize) -> f64 {
		let o = word * 8;
		f64::from_le_bytes(buf[o..o + 8].try_into().unwrap())
	}

	pub fn decode_samples(buf: &[u8]) -> Self {
		let n = buf.len() / ComplexI16::BYTES;
		let mut samples = Vec::with_capacity(n);
		for i in 0..n {
			samples.push(ComplexI16::from_bytes(&buf[i * ComplexI16::BYTES..]));
		}
		Payload::Samples(samples)
	}

	pub fn decode_empty(_buf: &[u8]) -> Self {
		Payload::Empty
	}

	pub fn decode_one_u32(buf: &[u8]) -> Self {
		Payload::OneU32(Self::u32_at(buf, 0))
	}

	pub fn decode_two_u32(buf: &[u8]) -> Self {
		Payload::TwoU32(Self::u32_at(buf, 0), Self::u32_at(buf, 1))
	}

	pub fn decode_four_u32(buf: &[u8]) -> Self {
		Payload::FourU32([
			Self::u32_at(buf, 0),
			Self::u32_at(buf, 1),
			Self::u32_at(buf, 2),
			Self::u32_at(buf, 3),
		])
	}

	pub fn decode_six_u32(buf: &[u8]) -> Self {
		Payload::SixU32([
			Self::u32_at(buf, 0),
			Self::u32_at(buf, 1),
			Self::u32_at(buf, 2),
			Self::u32_at(buf, 3),
			Self::u32_at(buf, 4),
			Self::u32_at(buf, 5),
		])
	}

	pub fn decode_eight_u32(buf: &[u8]) -> Self {
		Payload::EightU32([
			Self::u32_at(buf, 0),
			Self::u32_at(buf, 1),
			Self::u32_at(buf, 2),
			Self::u32_at(buf, 3),
			Self::u32_at(buf, 4),
			Self::u32_at(buf, 5),
			Self::u32_at(buf, 6),
			Self::u32_at(buf, 7),
		])
	}

	pub fn decode_one_f64(buf: &[u8]) -> Self {
		Payload::OneF64(Self::f64_at(buf, 0))
	}

	pub fn decode_two_f64(buf: &[u8]) -> Self {
		Payload::TwoF64(Self::f64_at(buf, 0), Self::f64_at(buf, 1))
	}

	pub fn decode_four_f64(buf: &[u8]) -> Self {
		Payload::FourF64([
			Self::f64_at(buf, 0),
			Self::f64_at(buf, 1),
			Self::f64_at(buf, 2),
			Self::f64_at(buf, 3),
		])
	}

	pub fn decode_one_u64(buf: &[u8]) -> Self {
		Payload::OneU64(u64::from_le_bytes(buf[0..8].try_into().unwrap()))
	}

	pub fn decode_name(buf: &[u8]) -> Self {
		let mut name = [0u8; MAX_NAME_LENGTH_BYTES];
		name.copy_from_slice(&buf[0..MAX_NAME_LENGTH_BYTES]);
		Payload::Name(name)
	}

	pub fn decode_filter_coeffs(buf: &[u8]) -> Self {
		let length = Self::u32_at(buf, 0);
		let mut coeffs = [ComplexI16::default(); MAX_FRONTEND_FILTER_LENGTH];
		for (i, c) in coeffs.iter_mut().enumerate() {
			let o = 8 + i * ComplexI16::BYTES;
			*c = ComplexI16::from_bytes(&buf[o..]);
		}
		Payload::FilterCoeffs { length, coeffs }
	}

	pub fn decode_error_code(buf: &[u8]) -> Self {
		Payload::ErrorCode(Self::u32_at(buf, 0))
	}

	pub fn decode_tx_ack(buf: &[u8]) -> Self {
		Payload::TxAck {
			used_bytes: Self::u32_at(buf, 2),
			size_bytes: Self::u32_at(buf, 3),
			packet_oos_count: Self::u32_at(buf, 4),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_payload_encodes_to_nothing() {
		let mut out = Vec::new();
		Payload::Empty.encode_into(&mut out);
		assert!(out.is_empty());
	}

	#[test]
	fn six_u32_round_trips() {
		let p = Payload::SixU32([1, 2, 3, 4, 5, 6]);
		let mut buf = Vec::new();
		p.encode_into(&mut buf);
		assert_eq!(buf.len(), 24);
		assert_eq!(Payload::decode_six_u32(&buf), p);
	}

	#[test]
	fn filter_coeffs_round_trip() {
		let mut coeffs = [ComplexI16::default(); MAX_FRONTEND_FILTER_LENGTH];
		coeffs[0] = ComplexI16 { i: 100, q: -200 };
		let p = Payload::FilterCoeffs { length: 1, coeffs };
		let mut buf = Vec::new();
		p.encode_into(&mut buf);
		assert_eq!(buf.len(), p.encoded_len());
		assert_eq!(Payload::decode_filter_coeffs(&buf), p);
	}

	#[test]
	fn samples_round_trip() {
		let samples = vec![
			ComplexI16 { i: 1, q: -1 },
			ComplexI16 { i: i16::MAX, q: i16::MIN },
		];
		let p = Payload::Samples(samples.clone());
		let mut buf = Vec::new();
		p.encode_into(&mut buf);
		assert_eq!(buf.len(), samples.len() * ComplexI16::BYTES);
		assert_eq!(Payload::decode_samples(&buf), Payload::Samples(samples));
	}

	#[test]
	fn tx_ack_decodes_used_size_oos_fields() {
		let mut buf = Vec::new();
		for word in [0u32, 0, 400, 1000, 2, 0] {
			buf.extend_from_slice(&word.to_le_bytes());
		}
		let decoded = Payload::decode_tx_ack(&buf);
		assert_eq!(
			decoded,
			Payload::TxAck { used_bytes: 400, size_bytes: 1000, packet_oos_count: 2 }
		);
	}

	#[test]
	fn tx_ack_encode_and_decode_agree_on_field_offsets() {
		let p = Payload::TxAck { used_bytes: 400, size_bytes: 1000, packet_oos_count: 2 };
		let mut buf = Vec::new();
		p.encode_into(&mut buf);
		assert_eq!(buf.len(), 24);
		assert_eq!(Payload::decode_tx_ack(&buf), p);
	}
}
