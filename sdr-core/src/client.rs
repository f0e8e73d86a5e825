//! The user-facing façade: builds a transport session from a
//! [`SessionConfig`], issues commands, and streams samples.

use std::sync::Arc;
use std::time::Duration;

use crate::async_dispatch::AsyncDispatcher;
use crate::backend::{Backend, PcieBackend, UdpBackend, UdpRole};
use crate::config::{DataTransportConfig, SessionConfig, TransportKind};
use crate::error::CoreError;
use crate::packet::{ComplexI16, DeviceCmd, Frame, PacketHeader, PacketType, Payload};
use crate::stats::SessionStats;
use crate::transport::command::CommandTransport;
use crate::transport::data::DataTransport;

/// Bounds on the caller-configurable command timeout (§4.3: "default 1 s,
/// bounds 1 ms-3600 s").
pub const MIN_COMMAND_TIMEOUT: Duration = Duration::from_millis(1);
pub const MAX_COMMAND_TIMEOUT: Duration = Duration::from_secs(3600);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// A live connection to one device: a command transport (always
/// present), an optional data transport (started once the caller knows
/// `num_rx_subdevs`), and the background async dispatcher.
pub struct Session {
	config: SessionConfig,
	command: Arc<CommandTransport>,
	data: Option<DataTransport>,
	dispatcher: AsyncDispatcher,
	pub stats: Arc<SessionStats>,
}

impl Session {
	pub fn connect(config: SessionConfig) -> Result<Self, CoreError> {
		let stats = Arc::new(SessionStats::default());

		let command_backend = build_command_backend(&config)?;
		let command = Arc::new(CommandTransport::spawn(command_backend, stats.command.clone()));
		let dispatcher = AsyncDispatcher::spawn(command.clone());

		Ok(Self { config, command, data: None, dispatcher, stats })
	}

	/// Starts the data transport once `num_rx_subdevs` is known (normally
	/// from the response to [`Session::hello`] or a `GET_NUM_SUBDEVS`
	/// command).
	pub fn start_data_transport(&mut self, num_rx_subdevs: usize) -> Result<(), CoreError> {
		let backend = build_data_backend(&self.config)?;
		let (tx_queue_packets, rx_ring_packets, throttle, thread_priority, sender_affinity, receiver_affinity) = match &self.config.data {
			DataTransportConfig::Udp(udp) => (
				udp.tx_data_queue_packets,
				udp.rx_data_queue_packets,
				udp.throttle,
				udp.thread_priority,
				udp.sender_thread_affinity,
				udp.receiver_thread_affinity,
			),
			DataTransportConfig::Pcie(pcie) => (
				pcie.tx_data_queue_packets,
				pcie.rx_data_queue_packets,
				crate::config::ThrottleThresholds { off: 100, on: 100, hard: 101 },
				0,
				None,
				None,
			),
		};
		self.data = Some(DataTransport::spawn(
			backend,
			self.stats.tx.clone(),
			self.stats.rx.clone(),
			num_rx_subdevs,
			tx_queue_packets,
			rx_ring_packets,
			throttle,
			self.stats.throttle.clone(),
			thread_priority,
			sender_affinity,
			receiver_affinity,
		));
		Ok(())
	}

	pub fn data(&self) -> Option<&DataTransport> {
		self.data.as_ref()
	}

	/// Sends `request` and waits for its matching response, using the
	/// session's configured command timeout.
	pub fn send_command(&self, request: Frame, timeout: Duration) -> Result<Frame, CoreError> {
		let timeout = timeout.clamp(MIN_COMMAND_TIMEOUT, MAX_COMMAND_TIMEOUT);
		self.command.send_command(request, timeout).map_err(CoreError::from)
	}

	/// The end-to-end round trip of Scenario 1 in §8: a zero-payload
	/// `HELLO` command, expecting six `uint32` capability words back.
	pub fn hello(&self) -> Result<[u32; 6], CoreError> {
		let header = PacketHeader::new(PacketType::DeviceCmd.to_wire(), DeviceCmd::Hello as u8);
		let response = self.send_command(Frame::header_only(header), DEFAULT_COMMAND_TIMEOUT)?;
		match Payload::decode_six_u32(&response.payload) {
			Payload::SixU32(words) => Ok(words),
			_ => unreachable!("decode_six_u32 always returns Payload::SixU32"),
		}
	}

	pub fn put_tx_data(
		&self,
		subdevice: u8,
		channel: u8,
		samples: &[ComplexI16],
		max_samples_per_packet: usize,
		granularity: usize,
		timeout: Duration,
	) -> Result<usize, CoreError> {
		let data = self.data.as_ref().ok_or(crate::error::TransportError::NotReady("data transport not started"))?;
		data.put_tx_data(subdevice, channel, samples, max_samples_per_packet, granularity, timeout, &self.stats.tx)
			.map_err(CoreError::from)
	}

	pub fn get_rx_data(&self, subdevice: usize, out: &mut [ComplexI16], timeout: Duration) -> Result<usize, CoreError> {
		let data = self.data.as_ref().ok_or(crate::error::TransportError::NotReady("data transport not started"))?;
		data.get_rx_data(subdevice, out, timeout).map_err(CoreError::from)
	}

	/// Tears the session down in the order of §5: data sender/receiver,
	/// then command receiver/sender, then the async dispatcher.
	pub fn shutdown(&mut self) {
		if let Some(mut data) = self.data.take() {
			data.shutdown();
		}
		self.command.shutdown();
		self.dispatcher.shutdown();
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.shutdown();
	}
}

fn build_command_backend(config: &SessionConfig) -> Result<Arc<dyn Backend>, CoreError> {
	match config.command_transport {
		TransportKind::Udp => {
			let udp = udp_config_for_command(config)?;
			Ok(Arc::new(UdpBackend::new(UdpRole::Command, udp)?))
		}
		TransportKind::Pcie => {
			let pcie = pcie_config_for(config)?;
			Ok(Arc::new(PcieBackend::open(pcie)?))
		}
	}
}

fn build_data_backend(config: &SessionConfig) -> Result<Arc<dyn Backend>, CoreError> {
	match &config.data {
		DataTransportConfig::Udp(udp) => Ok(Arc::new(UdpBackend::new(UdpRole::Data, udp)?)),
		DataTransportConfig::Pcie(pcie) => Ok(Arc::new(PcieBackend::open(pcie)?)),
	}
}

fn udp_config_for_command(config: &SessionConfig) -> Result<&crate::config::UdpTransportConfig, CoreError> {
	match &config.data {
		DataTransportConfig::Udp(udp) => Ok(udp),
		// `SessionConfig::from_map` rejects `command_transport != data_transport`
		// up front, so `command_transport == Udp` guarantees `config.data` is
		// also `Udp`.
		DataTransportConfig::Pcie(_) => unreachable!("command_transport == Udp implies config.data == Udp"),
	}
}

fn pcie_config_for(config: &SessionConfig) -> Result<&crate::config::PcieTransportConfig, CoreError> {
	match &config.data {
		DataTransportConfig::Pcie(pcie) => Ok(pcie),
		// See `udp_config_for_command`: the same invariant holds in reverse.
		DataTransportConfig::Udp(_) => unreachable!("command_transport == Pcie implies config.data == Pcie"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn command_timeout_is_clamped_to_configured_bounds() {
		assert_eq!(Duration::from_millis(0).clamp(MIN_COMMAND_TIMEOUT, MAX_COMMAND_TIMEOUT), MIN_COMMAND_TIMEOUT);
		assert_eq!(Duration::from_secs(10_000).clamp(MIN_COMMAND_TIMEOUT, MAX_COMMAND_TIMEOUT), MAX_COMMAND_TIMEOUT);
	}
}
