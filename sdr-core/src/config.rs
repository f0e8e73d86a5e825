//! String-keyed session configuration (§4.10, §6.2).
//!
//! A session is built from a single `HashMap<String, u64>`, the same shape
//! the original radio API surface hands callers for every other
//! configuration knob. Unknown keys are accepted and stored for
//! diagnostics but otherwise ignored; recognized keys are parsed once,
//! validated, and turned into a typed [`SessionConfig`].

use std::collections::HashMap;
use std::io;
use std::net::Ipv4Addr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
	Udp,
	Pcie,
}

impl TransportKind {
	fn from_value(value: u64) -> Self {
		match value {
			2 => TransportKind::Pcie,
			_ => TransportKind::Udp,
		}
	}
}

#[derive(Debug, Clone, Copy)]
pub struct ThrottleThresholds {
	pub off: u32,
	pub on: u32,
	pub hard: u32,
}

impl ThrottleThresholds {
	pub const UDP_DEFAULT: Self = Self { off: 60, on: 80, hard: 90 };

	pub fn validate(self) -> Result<(), ConfigError> {
		if !(self.off < self.on && self.on < self.hard) {
			return Err(ConfigError::BadHysteresis { off: self.off, on: self.on, hard: self.hard });
		}
		Ok(())
	}
}

#[derive(Debug, Clone)]
pub struct UdpTransportConfig {
	pub local_address: Ipv4Addr,
	pub device_address: Ipv4Addr,
	pub tx_data_queue_packets: usize,
	pub rx_data_queue_packets: usize,
	pub mtu_bytes: u32,
	pub network_send_buffer_bytes: u32,
	pub network_receive_buffer_bytes: u32,
	pub thread_priority: i32,
	pub sender_thread_affinity: Option<usize>,
	pub receiver_thread_affinity: Option<usize>,
	pub throttle: ThrottleThresholds,
}

#[derive(Debug, Clone)]
pub struct PcieTransportConfig {
	pub device_path: String,
    pub tx_data_queue_packets: usize,
    pub rx_data_queue_packets: usize,
}

#[derive(Debug, Clone)]
pub enum DataTransportConfig {
	Udp(UdpTransportConfig),
	Pcie(PcieTransportConfig),
}

/// The fully validated, typed configuration a session is constructed
/// from.
#[derive(Debug, Clone)]
pub struct SessionConfig {
	pub command_transport: TransportKind,
	pub data: DataTransportConfig,
	pub command_timeout: std::time::Duration,
	raw: HashMap<String, u64>,
}

impl SessionConfig {
	/// Any unrecognized key, returned verbatim for diagnostics (§4.10).
	pub fn raw_value(&self, key: &str) -> Option<u64> {
		self.raw.get(key).copied()
	}

	pub fn from_map(map: &HashMap<String, u64>) -> Result<Self, ConfigError> {
		let command_transport = TransportKind::from_value(get_or(map, "command_transport", 1));
		let data_transport = TransportKind::from_value(get_or(map, "data_transport", 1));

		// §6.2 names `command_transport` and `data_transport` as separate
		// selector keys, but this crate builds only one backend config per
		// session (§4.10); a caller selecting two different kinds gets a
		// dedicated error here rather than a confusing failure deep inside
		// whichever of `build_command_backend`/`build_data_backend` runs
		// second.
		if command_transport != data_transport {
			return Err(ConfigError::MismatchedTransportKinds { command: command_transport, data: data_transport });
		}

		let data = match data_transport {
			TransportKind::Udp => DataTransportConfig::Udp(build_udp_config(map)?),
			TransportKind::Pcie => DataTransportConfig::Pcie(build_pcie_config(map)?),
		};

		Ok(SessionConfig {
			command_transport,
			data,
			command_timeout: std::time::Duration::from_secs(1),
			raw: map.clone(),
		})
	}
}

fn get_or(map: &HashMap<String, u64>, key: &str, default: u64) -> u64 {
	map.get(key).copied().unwrap_or(default)
}

fn get_required(map: &HashMap<String, u64>, key: &'static str) -> Result<u64, ConfigError> {
	map.get(key).copied().ok_or(ConfigError::MissingKey(key))
}

fn require_nonzero(value: u64, name: &'static str) -> Result<usize, ConfigError> {
	if value == 0 {
		return Err(ConfigError::ZeroCapacity(name));
	}
	Ok(value as usize)
}

fn build_udp_config(map: &HashMap<String, u64>) -> Result<UdpTransportConfig, ConfigError> {
	let local = get_required(map, "udp_transport:local_address")?;
	let device = get_required(map, "udp_transport:device_address")?;

	let throttle = ThrottleThresholds::UDP_DEFAULT;
	throttle.validate()?;

	let cfg = UdpTransportConfig {
		local_address: Ipv4Addr::from(local as u32),
		device_address: Ipv4Addr::from(device as u32),
		tx_data_queue_packets: require_nonzero(
			get_or(map, "udp_data_transport:tx_data_queue_packets", 511),
			"udp_data_transport:tx_data_queue_packets",
		)?,
		rx_data_queue_packets: require_nonzero(
			get_or(map, "udp_data_transport:rx_data_queue_packets", 262_143),
			"udp_data_transport:rx_data_queue_packets",
		)?,
		mtu_bytes: get_or(map, "udp_data_transport:mtu_bytes", 9000) as u32,
		network_send_buffer_bytes: get_or(map, "udp_data_transport:network_send_buffer_bytes", 262_144) as u32,
		network_receive_buffer_bytes: get_or(map, "udp_data_transport:network_receive_buffer_bytes", 8_388_608) as u32,
		thread_priority: get_or(map, "udp_data_transport:thread_priority", 1) as i32,
		sender_thread_affinity: map.get("udp_data_transport:sender_thread_affinity").map(|v| *v as usize),
		receiver_thread_affinity: map.get("udp_data_transport:receiver_thread_affinity").map(|v| *v as usize),
		throttle,
	};
	Ok(cfg)
}

fn build_pcie_config(map: &HashMap<String, u64>) -> Result<PcieTransportConfig, ConfigError> {
	Ok(PcieTransportConfig {
		device_path: map
			.get("pcie_data_transport:device_index")
			.map(|idx| format!("/dev/vxsdr{idx}"))
			.unwrap_or_else(|| "/dev/vxsdr0".to_string()),
		tx_data_queue_packets: require_nonzero(
			get_or(map, "pcie_data_transport:tx_data_queue_packets", 511),
			"pcie_data_transport:tx_data_queue_packets",
		)?,
		rx_data_queue_packets: require_nonzero(
			get_or(map, "pcie_data_transport:rx_data_queue_packets", 511),
			"pcie_data_transport:rx_data_queue_packets",
		)?,
	})
}

/// Applies a configured CPU affinity to the calling thread, per
/// `udp_data_transport:{sender,receiver}_thread_affinity` (§6.2). Failure
/// to pin is logged at warn level and is never fatal.
pub fn pin_current_thread(core_index: Option<usize>) {
	let Some(core_index) = core_index else { return };
	let Some(core_ids) = core_affinity::get_core_ids() else {
		log::warn!("could not enumerate CPU cores to apply thread affinity {core_index}");
		return;
	};
	match core_ids.get(core_index) {
		Some(id) => {
			if !core_affinity::set_for_current(*id) {
				log::warn!("failed to pin thread to core {core_index}");
			}
		}
		None => log::warn!("requested thread affinity {core_index} is out of range (have {} cores)", core_ids.len()),
	}
}

/// Applies `udp_data_transport:thread_priority` (§6.2) to the calling
/// thread as a POSIX real-time `SCHED_FIFO` priority. `priority <= 0`
/// leaves the thread on the default scheduler, matching the original's
/// convention that a non-positive value means "don't bother". Failure
/// (typically `CAP_SYS_NICE` not held) is logged at warn level and is
/// never fatal: a mis-scheduled I/O thread is a latency regression, not
/// a correctness one.
pub fn apply_thread_priority(priority: i32) {
	if priority <= 0 {
		return;
	}
	let param = libc::sched_param { sched_priority: priority };
	let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
	if rc != 0 {
		log::warn!("failed to set SCHED_FIFO priority {priority} on current thread: {}", io::Error::from_raw_os_error(rc));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_map() -> HashMap<String, u64> {
		let mut m = HashMap::new();
		m.insert("udp_transport:local_address".to_string(), u32::from(Ipv4Addr::new(192, 168, 1, 10)) as u64);
		m.insert("udp_transport:device_address".to_string(), u32::from(Ipv4Addr::new(192, 168, 1, 20)) as u64);
		m
	}

	#[test]
	fn missing_required_key_is_an_error() {
		let map = HashMap::new();
		let err = SessionConfig::from_map(&map).unwrap_err();
		assert!(matches!(err, ConfigError::MissingKey("udp_transport:local_address")));
	}

	#[test]
	fn defaults_fill_in_unspecified_keys() {
		let map = base_map();
		let cfg = SessionConfig::from_map(&map).unwrap();
		match cfg.data {
			DataTransportConfig::Udp(udp) => {
				assert_eq!(udp.tx_data_queue_packets, 511);
				assert_eq!(udp.rx_data_queue_packets, 262_143);
				assert_eq!(udp.mtu_bytes, 9000);
			}
			DataTransportConfig::Pcie(_) => panic!("expected UDP"),
		}
	}

	#[test]
	fn unknown_keys_are_preserved_but_inert() {
		let mut map = base_map();
		map.insert("some_future_key".to_string(), 42);
		let cfg = SessionConfig::from_map(&map).unwrap();
		assert_eq!(cfg.raw_value("some_future_key"), Some(42));
	}

	#[test]
	fn zero_capacity_ring_is_rejected() {
		let mut map = base_map();
		map.insert("udp_data_transport:tx_data_queue_packets".to_string(), 0);
		let err = SessionConfig::from_map(&map).unwrap_err();
		assert!(matches!(err, ConfigError::ZeroCapacity(_)));
	}

	#[test]
	fn pcie_transport_selected_by_value_two() {
		let mut map = base_map();
		map.insert("data_transport".to_string(), 2);
		map.insert("command_transport".to_string(), 2);
		let cfg = SessionConfig::from_map(&map).unwrap();
		assert!(matches!(cfg.data, DataTransportConfig::Pcie(_)));
	}

	#[test]
	fn mismatched_command_and_data_transport_kinds_is_rejected() {
		let mut map = base_map();
		map.insert("data_transport".to_string(), 2);
		let err = SessionConfig::from_map(&map).unwrap_err();
		assert!(matches!(err, ConfigError::MismatchedTransportKinds { command: TransportKind::Udp, data: TransportKind::Pcie }));
	}
}
