//! UDP transport backend (§4.5).
//!
//! Each role owns two sockets, not one: a sender bound to the host's send
//! port and a receiver bound to the host's receive port, both `connect`-ed
//! to the device's single port for that role so `send`/`recv` can be used
//! instead of `send_to`/`recv_from`. The host's send and receive ports
//! differ (command: 55123/1030, data: 55124/1031); the device answers on
//! the same port it listens on, so both sockets connect to one remote
//! port per role. Do-not-fragment and the path MTU check apply only to
//! the data role's sender socket, matching the one direction that
//! actually carries packets large enough for fragmentation to matter.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use crate::backend::Backend;
use crate::config::UdpTransportConfig;
use crate::error::TransportError;
use crate::packet::MAX_DATA_PACKET_BYTES;

#[derive(Debug, Clone, Copy)]
pub enum UdpRole {
	Command,
	Data,
}

impl UdpRole {
	/// Host-side port the sender socket binds to.
	fn local_send_port(self) -> u16 {
		match self {
			UdpRole::Command => 55123,
			UdpRole::Data => 55124,
		}
	}

	/// Host-side port the receiver socket binds to.
	fn local_receive_port(self) -> u16 {
		match self {
			UdpRole::Command => 1030,
			UdpRole::Data => 1031,
		}
	}

	/// The device's single port for this role; both the sender's and the
	/// receiver's `connect()` target it.
	fn device_port(self) -> u16 {
		match self {
			UdpRole::Command => 1030,
			UdpRole::Data => 1031,
		}
	}
}

/// Cadence at which a blocking `recv` call returns control to its
/// caller even with nothing received, so the owning thread can observe
/// a shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct UdpBackend {
	sender: UdpSocket,
	receiver: UdpSocket,
}

impl UdpBackend {
	pub fn new(role: UdpRole, cfg: &UdpTransportConfig) -> Result<Self, TransportError> {
		let local_send = SocketAddrV4::new(cfg.local_address, role.local_send_port());
		let local_receive = SocketAddrV4::new(cfg.local_address, role.local_receive_port());
		let remote = SocketAddrV4::new(cfg.device_address, role.device_port());

		let sender = UdpSocket::bind(local_send)?;
		let receiver = UdpSocket::bind(local_receive)?;

		if matches!(role, UdpRole::Data) {
			set_send_buffer(&sender, cfg.network_send_buffer_bytes)?;
			set_dont_fragment(&sender)?;
			set_reuseaddr(&receiver)?;
			set_recv_buffer(&receiver, cfg.network_receive_buffer_bytes)?;
		}

		sender.connect(remote)?;
		receiver.connect(remote)?;
		receiver.set_read_timeout(Some(POLL_INTERVAL))?;

		if matches!(role, UdpRole::Data) {
			check_mtu(&sender, cfg.mtu_bytes)?;
		}

		log::info!("udp backend ({role:?}) send {local_send} -> {remote}, receive {local_receive} <- {remote}");
		Ok(Self { sender, receiver })
	}
}

impl Backend for UdpBackend {
	fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
		// Some platforms report ENOBUFS instead of blocking when the send
		// buffer is momentarily full (§4.5); retry briefly rather than
		// treating it as fatal.
		let deadline = std::time::Instant::now() + Duration::from_secs(1);
		loop {
			match self.sender.send(frame) {
				Ok(_) => return Ok(()),
				Err(e) if e.raw_os_error() == Some(libc::ENOBUFS) && std::time::Instant::now() < deadline => {
					std::thread::sleep(Duration::from_micros(200));
				}
				Err(e) => return Err(TransportError::Io(e)),
			}
		}
	}

	fn recv(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
		self.receiver.recv(buf).map_err(TransportError::Io)
	}

	fn shutdown(&self) {
		// There is no portable way to unblock a connected UDP socket's
		// recv(); the bounded read timeout above is what actually lets
		// the receiver thread notice shutdown promptly.
	}
}

fn set_reuseaddr(socket: &UdpSocket) -> Result<(), TransportError> {
	setsockopt_bool(socket, libc::SOL_SOCKET, libc::SO_REUSEADDR, true)
}

fn set_send_buffer(socket: &UdpSocket, bytes: u32) -> Result<(), TransportError> {
	setsockopt_int(socket, libc::SOL_SOCKET, libc::SO_SNDBUF, bytes as i32)
}

fn set_recv_buffer(socket: &UdpSocket, bytes: u32) -> Result<(), TransportError> {
	setsockopt_int(socket, libc::SOL_SOCKET, libc::SO_RCVBUF, bytes as i32)
}

#[cfg(target_os = "linux")]
fn set_dont_fragment(socket: &UdpSocket) -> Result<(), TransportError> {
	setsockopt_int(socket, libc::IPPROTO_IP, libc::IP_MTU_DISCOVER, libc::IP_PMTUDISC_DO)
}

#[cfg(not(target_os = "linux"))]
fn set_dont_fragment(_socket: &UdpSocket) -> Result<(), TransportError> {
	Ok(())
}

#[cfg(target_os = "linux")]
fn check_mtu(socket: &UdpSocket, configured_mtu: u32) -> Result<(), TransportError> {
	let required = (MAX_DATA_PACKET_BYTES + 20) as u32;
	if configured_mtu < required {
		return Err(TransportError::MtuTooSmall { required, actual: configured_mtu });
	}
	let mut path_mtu: libc::c_int = 0;
	let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
	let rc = unsafe {
		libc::getsockopt(
			socket.as_raw_fd(),
			libc::IPPROTO_IP,
			libc::IP_MTU,
			&mut path_mtu as *mut _ as *mut libc::c_void,
			&mut len,
		)
	};
	// IP_MTU is only valid once the path is known; a fresh unconnected
	// or loopback socket may not report it yet, which is not fatal here.
	if rc == 0 && path_mtu > 0 && (path_mtu as u32) < required {
		return Err(TransportError::MtuTooSmall { required, actual: path_mtu as u32 });
	}
	Ok(())
}

#[cfg(not(target_os = "linux"))]
fn check_mtu(_socket: &UdpSocket, configured_mtu: u32) -> Result<(), TransportError> {
	let required = (MAX_DATA_PACKET_BYTES + 20) as u32;
	if configured_mtu < required {
		return Err(TransportError::MtuTooSmall { required, actual: configured_mtu });
	}
	Ok(())
}

fn setsockopt_bool(socket: &UdpSocket, level: libc::c_int, name: libc::c_int, value: bool) -> Result<(), TransportError> {
	setsockopt_int(socket, level, name, value as libc::c_int)
}

fn setsockopt_int(socket: &UdpSocket, level: libc::c_int, name: libc::c_int, value: libc::c_int) -> Result<(), TransportError> {
	let rc = unsafe {
		libc::setsockopt(
			socket.as_raw_fd(),
			level,
			name,
			&value as *const _ as *const libc::c_void,
			std::mem::size_of::<libc::c_int>() as libc::socklen_t,
		)
	};
	if rc != 0 {
		return Err(TransportError::Io(io::Error::last_os_error()));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn loopback_cfg(mtu: u32) -> UdpTransportConfig {
		UdpTransportConfig {
			local_address: Ipv4Addr::LOCALHOST,
			device_address: Ipv4Addr::LOCALHOST,
			tx_data_queue_packets: 511,
			rx_data_queue_packets: 1023,
			mtu_bytes: mtu,
			network_send_buffer_bytes: 262_144,
			network_receive_buffer_bytes: 1_048_576,
			thread_priority: 1,
			sender_thread_affinity: None,
			receiver_thread_affinity: None,
			throttle: crate::config::ThrottleThresholds::UDP_DEFAULT,
		}
	}

	#[test]
	fn mtu_below_requirement_is_rejected_before_binding_sockets() {
		let cfg = loopback_cfg(100);
		let err = UdpBackend::new(UdpRole::Data, &cfg).unwrap_err();
		assert!(matches!(err, TransportError::MtuTooSmall { .. }));
	}

	#[test]
	fn command_and_data_roles_use_distinct_ports() {
		assert_eq!(UdpRole::Command.local_send_port(), 55123);
		assert_eq!(UdpRole::Command.local_receive_port(), 1030);
		assert_eq!(UdpRole::Command.device_port(), 1030);
		assert_eq!(UdpRole::Data.local_send_port(), 55124);
		assert_eq!(UdpRole::Data.local_receive_port(), 1031);
		assert_eq!(UdpRole::Data.device_port(), 1031);
	}
}
