//! The wire packet format: header, preamble, payload variants, and the
//! codec that turns them into and out of contiguous byte buffers (§3).

mod codec;
mod header;
mod payload;
mod types;

pub use codec::Frame;
pub use header::{
	HeaderFlags, PacketHeader, TimeSpec, StreamSpec, ALL_CHANNELS, ALL_SUBDEVICES, HEADER_BYTES,
};
pub use payload::{
	ComplexI16, Payload, MAX_CMD_RSP_PAYLOAD_BYTES, MAX_DATA_LENGTH_SAMPLES,
	MAX_DATA_PAYLOAD_BYTES, MAX_FRONTEND_FILTER_LENGTH, MAX_NAME_LENGTH_BYTES,
};
pub use types::{AsyncAffectedSystem, AsyncErrorType, DeviceCmd, PacketType};

/// Maximum size of a complete command/response packet on the wire:
/// header + largest preamble + largest cmd/rsp payload.
pub const MAX_CMD_RSP_PACKET_BYTES: usize = HEADER_BYTES + 16 + MAX_CMD_RSP_PAYLOAD_BYTES;

/// Maximum size of a complete data packet on the wire:
/// header + largest preamble + largest sample payload.
pub const MAX_DATA_PACKET_BYTES: usize = HEADER_BYTES + 16 + MAX_DATA_PAYLOAD_BYTES;
