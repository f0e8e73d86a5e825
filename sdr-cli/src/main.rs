//! Thin command-line probes exercising the transport core end to end.

mod commands;

use std::collections::HashMap;
use std::net::Ipv4Addr;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use sdr_core::config::SessionConfig;

#[derive(Parser)]
#[command(args_override_self = true)]
enum Cli {
	/// Perform the HELLO round trip and print the decoded capability words.
	Hello(ConnectArgs),
	/// Issue GET_STATUS and print the decoded counters.
	Status(ConnectArgs),
}

#[derive(clap::Args)]
struct ConnectArgs {
	#[arg(long)]
	local_addr: Ipv4Addr,

	#[arg(long)]
	device_addr: Ipv4Addr,

	#[arg(long, value_enum, default_value_t = TransportArg::Udp)]
	transport: TransportArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum TransportArg {
	Udp,
	Pcie,
}

impl ConnectArgs {
	fn build_config(&self) -> Result<SessionConfig> {
		let transport_value = match self.transport {
			TransportArg::Udp => 1,
			TransportArg::Pcie => 2,
		};
		let mut map = HashMap::new();
		map.insert("command_transport".to_string(), transport_value);
		map.insert("data_transport".to_string(), transport_value);
		map.insert("udp_transport:local_address".to_string(), u32::from(self.local_addr) as u64);
		map.insert("udp_transport:device_address".to_string(), u32::from(self.device_addr) as u64);
		Ok(SessionConfig::from_map(&map)?)
	}
}

fn main() -> Result<()> {
	sdr_core::logging::LoggingConfig::default()
		.install()
		.unwrap_or_else(|e| log::warn!("logger already installed: {e}"));

	match Cli::parse() {
		Cli::Hello(args) => commands::hello::run(args.build_config()?),
		Cli::Status(args) => commands::status::run(args.build_config()?),
	}
}
