//! Error taxonomy for the transport core.
//!
//! Two layers, both typed: [`TransportError`] for locally detected faults
//! (bad sizes, sequence gaps, queue timeouts, I/O failures) and
//! [`DeviceError`] for the code a device reports inside an `_ERR` packet.
//! Every fallible public entry point in this crate returns a [`CoreError`],
//! which wraps whichever layer actually failed.

use std::io;

use crate::packet::PacketType;

/// Top-level error type returned by the public API of this crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
	#[error(transparent)]
	Transport(#[from] TransportError),

	#[error("device reported an error: {0}")]
	Device(#[from] DeviceError),

	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Faults detected locally by the transport layer, never by the device.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
	#[error("packet size {actual} does not match header field {declared}")]
	SizeMismatch { declared: u16, actual: u16 },

	#[error("socket or DMA I/O error: {0}")]
	Io(#[from] io::Error),

	#[error("received sequence {actual}, expected {expected}")]
	SequenceMismatch { expected: u16, actual: u16 },

	#[error("timed out waiting to {0} the queue")]
	QueueTimeout(QueueOp),

	#[error("a command is already in flight on this transport")]
	CommandInFlight,

	#[error("interface MTU {actual} is below the required minimum {required}")]
	MtuTooSmall { required: u32, actual: u32 },

	#[error("response packet type {actual:?} does not answer request type {request:?}")]
	UnexpectedResponseType {
		request: PacketType,
		actual: PacketType,
	},

	#[error("response command {actual:#04x} does not match request command {request:#04x}")]
	UnexpectedResponseCommand { request: u8, actual: u8 },

	#[error("transport is not ready (state: {0})")]
	NotReady(&'static str),

	#[error("subdevice {subdevice} is out of range (num_rx_subdevs = {num_rx_subdevs})")]
	SubdeviceOutOfRange { subdevice: u8, num_rx_subdevs: u8 },

	#[error("fatal initialization failure: {0}")]
	InitFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOp {
	Push,
	Pop,
}

impl std::fmt::Display for QueueOp {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			QueueOp::Push => write!(f, "push to"),
			QueueOp::Pop => write!(f, "pop from"),
		}
	}
}

/// Error codes a device may return in the first payload word of an `_ERR` packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
	#[error("no error")]
	NoError,
	#[error("bad command")]
	BadCommand,
	#[error("device busy")]
	Busy,
	#[error("no such subdevice")]
	NoSuchSubdevice,
	#[error("no such channel")]
	NoSuchChannel,
	#[error("device-side timeout")]
	Timeout,
	#[error("bad header size")]
	BadHeaderSize,
	#[error("bad header flags")]
	BadHeaderFlags,
	#[error("bad parameter")]
	BadParameter,
	#[error("not supported")]
	NotSupported,
	#[error("bad packet size")]
	BadPacketSize,
	#[error("internal error")]
	InternalError,
	#[error("failed")]
	Failed,
	#[error("unrecognized device error code {0:#x}")]
	Unknown(u32),
}

impl From<u32> for DeviceError {
	fn from(code: u32) -> Self {
		match code {
			0x00 => DeviceError::NoError,
			0x01 => DeviceError::BadCommand,
			0x02 => DeviceError::Busy,
			0x03 => DeviceError::NoSuchSubdevice,
			0x04 => DeviceError::NoSuchChannel,
			0x05 => DeviceError::Timeout,
			0x06 => DeviceError::BadHeaderSize,
			0x07 => DeviceError::BadHeaderFlags,
			0x08 => DeviceError::BadParameter,
			0x09 => DeviceError::NotSupported,
			0x0A => DeviceError::BadPacketSize,
			0x0B => DeviceError::InternalError,
			0x0C => DeviceError::Failed,
			other => DeviceError::Unknown(other),
		}
	}
}

/// Faults in the string-keyed session configuration (§6.2 of the spec).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("missing required configuration key {0:?}")]
	MissingKey(&'static str),

	#[error("configuration key {key:?} has invalid value {value}")]
	InvalidValue { key: &'static str, value: u64 },

	#[error("throttle hysteresis violated: off ({off}) < on ({on}) < hard ({hard}) must hold")]
	BadHysteresis { off: u32, on: u32, hard: u32 },

	#[error("{0} must be non-zero")]
	ZeroCapacity(&'static str),

	#[error("command_transport and data_transport select different backend kinds ({command:?} vs {data:?}); independent command/data transport kinds are not supported")]
	MismatchedTransportKinds {
		command: crate::config::TransportKind,
		data: crate::config::TransportKind,
	},
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn device_error_round_trips_known_codes() {
		assert_eq!(DeviceError::from(0x00), DeviceError::NoError);
		assert_eq!(DeviceError::from(0x0C), DeviceError::Failed);
	}

	#[test]
	fn device_error_unknown_code_is_preserved() {
		match DeviceError::from(0x42) {
			DeviceError::Unknown(code) => assert_eq!(code, 0x42),
			other => panic!("expected Unknown, got {other:?}"),
		}
	}
}
