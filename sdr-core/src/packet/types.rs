//! Packet type codes (§3.2) and the command opcodes carried within them.

const RSP: u8 = 0x10;
const ERR: u8 = 0x20;
const ACK: u8 = 0x30;
const INDICATOR_MASK: u8 = 0x30;
const BASE_MASK: u8 = 0x0F;

/// The base packet type together with its response-class indicator bits.
///
/// `PacketType::base()` strips the indicator so callers can compare a
/// request and a response by the base type they share, per the
/// correlation rule in §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
	TxSignalData,
	TxSignalDataAck,
	RxSignalData,
	RxSignalDataAck,
	DeviceCmd,
	DeviceCmdRsp,
	DeviceCmdErr,
	TxRadioCmd,
	TxRadioCmdRsp,
	TxRadioCmdErr,
	RxRadioCmd,
	RxRadioCmdRsp,
	RxRadioCmdErr,
	AsyncMsg,
}

impl PacketType {
	pub const TX_SIGNAL_DATA: u8 = 0x00;
	pub const RX_SIGNAL_DATA: u8 = 0x01;
	pub const DEVICE_CMD: u8 = 0x02;
	pub const TX_RADIO_CMD: u8 = 0x03;
	pub const RX_RADIO_CMD: u8 = 0x04;
	pub const ASYNC_MSG: u8 = 0x05;

	pub fn from_wire(byte: u8) -> Option<Self> {
		let base = byte & BASE_MASK;
		let indicator = byte & INDICATOR_MASK;
		use PacketType::*;
		Some(match (base, indicator) {
			(Self::TX_SIGNAL_DATA, 0) => TxSignalData,
			(Self::TX_SIGNAL_DATA, ACK) => TxSignalDataAck,
			(Self::RX_SIGNAL_DATA, 0) => RxSignalData,
			(Self::RX_SIGNAL_DATA, ACK) => RxSignalDataAck,
			(Self::DEVICE_CMD, 0) => DeviceCmd,
			(Self::DEVICE_CMD, RSP) => DeviceCmdRsp,
			(Self::DEVICE_CMD, ERR) => DeviceCmdErr,
			(Self::TX_RADIO_CMD, 0) => TxRadioCmd,
			(Self::TX_RADIO_CMD, RSP) => TxRadioCmdRsp,
			(Self::TX_RADIO_CMD, ERR) => TxRadioCmdErr,
			(Self::RX_RADIO_CMD, 0) => RxRadioCmd,
			(Self::RX_RADIO_CMD, RSP) => RxRadioCmdRsp,
			(Self::RX_RADIO_CMD, ERR) => RxRadioCmdErr,
			(Self::ASYNC_MSG, 0) => AsyncMsg,
			_ => return None,
		})
	}

	pub fn to_wire(self) -> u8 {
		use PacketType::*;
		match self {
			TxSignalData => Self::TX_SIGNAL_DATA,
			TxSignalDataAck => Self::TX_SIGNAL_DATA | ACK,
			RxSignalData => Self::RX_SIGNAL_DATA,
			RxSignalDataAck => Self::RX_SIGNAL_DATA | ACK,
			DeviceCmd => Self::DEVICE_CMD,
			DeviceCmdRsp => Self::DEVICE_CMD | RSP,
			DeviceCmdErr => Self::DEVICE_CMD | ERR,
			TxRadioCmd => Self::TX_RADIO_CMD,
			TxRadioCmdRsp => Self::TX_RADIO_CMD | RSP,
			TxRadioCmdErr => Self::TX_RADIO_CMD | ERR,
			RxRadioCmd => Self::RX_RADIO_CMD,
			RxRadioCmdRsp => Self::RX_RADIO_CMD | RSP,
			RxRadioCmdErr => Self::RX_RADIO_CMD | ERR,
			AsyncMsg => Self::ASYNC_MSG,
		}
	}

	/// True if `self` is the `_RSP` or `_ERR` form of `request`.
	pub fn answers(self, request: PacketType) -> bool {
		let same_base = (self.to_wire() & BASE_MASK) == (request.to_wire() & BASE_MASK);
		let is_response = matches!(self.to_wire() & INDICATOR_MASK, RSP | ERR);
		same_base && is_response
	}

	pub fn is_error(self) -> bool {
		self.to_wire() & INDICATOR_MASK == ERR
	}
}

/// Device-command opcodes (only those this core exercises directly; the
/// rest of the `get_*`/`set_*` surface lives outside this crate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceCmd {
	Hello = 0x00,
	SetTimeNow = 0x01,
	SetTimeNextPps = 0x02,
	GetTime = 0x03,
	GetStatus = 0x04,
	ClearStatus = 0x05,
	GetBufferInfo = 0x06,
	GetBufferUse = 0x07,
	GetStreamState = 0x08,
	Stop = 0x09,
	GetNumSubdevs = 0x17,
	GetCapabilities = 0x1B,
	Reset = 0x3F,
}

/// The affected subsystem encoded in the top two bits of an async message's
/// command field (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncAffectedSystem {
	Unspecified,
	Tx,
	Rx,
	Fpga,
}

impl AsyncAffectedSystem {
	pub fn from_command(command: u8) -> Self {
		match command & 0x30 {
			0x10 => AsyncAffectedSystem::Tx,
			0x20 => AsyncAffectedSystem::Rx,
			0x30 => AsyncAffectedSystem::Fpga,
			_ => AsyncAffectedSystem::Unspecified,
		}
	}
}

/// The error/event type encoded in the low 4 bits of an async message's
/// command field (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncErrorType {
	NoError,
	DataUnderflow,
	DataOverflow,
	OverTemp,
	PowerError,
	FreqError,
	OutOfSequence,
	CmdError,
	PpsTimeout,
	VoltageError,
	CurrentError,
	Unknown(u8),
}

impl AsyncErrorType {
	pub fn from_command(command: u8) -> Self {
		match command & 0x0F {
			0x00 => AsyncErrorType::NoError,
			0x01 => AsyncErrorType::DataUnderflow,
			0x02 => AsyncErrorType::DataOverflow,
			0x03 => AsyncErrorType::OverTemp,
			0x04 => AsyncErrorType::PowerError,
			0x05 => AsyncErrorType::FreqError,
			0x06 => AsyncErrorType::OutOfSequence,
			0x07 => AsyncErrorType::CmdError,
			0x08 => AsyncErrorType::PpsTimeout,
			0x09 => AsyncErrorType::VoltageError,
			0x0A => AsyncErrorType::CurrentError,
			other => AsyncErrorType::Unknown(other),
		}
	}

	/// Out-of-sequence async messages can be benign on the first packet of
	/// a stream and are logged at warn rather than error level (§4.7).
	pub fn is_benign_at_warn_level(self) -> bool {
		matches!(self, AsyncErrorType::OutOfSequence)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn device_cmd_rsp_answers_device_cmd() {
		assert!(PacketType::DeviceCmdRsp.answers(PacketType::DeviceCmd));
		assert!(PacketType::DeviceCmdErr.answers(PacketType::DeviceCmd));
		assert!(!PacketType::RxRadioCmdRsp.answers(PacketType::DeviceCmd));
		assert!(!PacketType::DeviceCmd.answers(PacketType::DeviceCmd));
	}

	#[test]
	fn wire_round_trip_for_all_variants() {
		let variants = [
			PacketType::TxSignalData,
			PacketType::TxSignalDataAck,
			PacketType::RxSignalData,
			PacketType::RxSignalDataAck,
			PacketType::DeviceCmd,
			PacketType::DeviceCmdRsp,
			PacketType::DeviceCmdErr,
			PacketType::TxRadioCmd,
			PacketType::TxRadioCmdRsp,
			PacketType::TxRadioCmdErr,
			PacketType::RxRadioCmd,
			PacketType::RxRadioCmdRsp,
			PacketType::RxRadioCmdErr,
			PacketType::AsyncMsg,
		];
		for v in variants {
			assert_eq!(PacketType::from_wire(v.to_wire()), Some(v));
		}
	}

	#[test]
	fn async_affected_system_and_error_type_split_command_byte() {
		let command = 0x20 | 0x06; // RX, out-of-sequence
		assert_eq!(AsyncAffectedSystem::from_command(command), AsyncAffectedSystem::Rx);
		assert_eq!(AsyncErrorType::from_command(command), AsyncErrorType::OutOfSequence);
		assert!(AsyncErrorType::from_command(command).is_benign_at_warn_level());
	}
}
