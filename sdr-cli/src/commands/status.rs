use std::time::Duration;

use anyhow::Result;
use sdr_core::client::Session;
use sdr_core::config::SessionConfig;
use sdr_core::packet::{DeviceCmd, Frame, PacketHeader, PacketType, Payload};

pub fn run(config: SessionConfig) -> Result<()> {
	let session = Session::connect(config)?;
	let header = PacketHeader::new(PacketType::DeviceCmd.to_wire(), DeviceCmd::GetStatus as u8);
	let response = session.send_command(Frame::header_only(header), Duration::from_secs(1))?;
	let Payload::EightU32(counters) = Payload::decode_eight_u32(&response.payload) else {
		unreachable!("decode_eight_u32 always returns Payload::EightU32");
	};
	println!("status counters: {counters:?}");
	Ok(())
}
