//! End-to-end scenarios against a real UDP loopback device stand-in,
//! rather than a mocked socket layer: the session under test binds
//! `127.0.0.1`, the hand-rolled "device" thread in this file binds
//! `127.0.0.2` (the whole `127.0.0.0/8` range loopbacks on Linux), mirroring
//! the two-socket, two-port contract the real backend uses - the device's
//! single socket is left unconnected so it can receive from the host's
//! sender port while explicitly addressing replies to the host's receive
//! port, the way a real device (pre-configured with the host's address)
//! does rather than relying on reply-to-source-address echo.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use sdr_core::client::Session;
use sdr_core::config::SessionConfig;
use sdr_core::error::{CoreError, TransportError};
use sdr_core::packet::{Frame, HeaderFlags, PacketHeader, PacketType};

const HOST_ADDR: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);
const DEVICE_ADDR: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 2);
const COMMAND_HOST_RECEIVE_PORT: u16 = 1030;
const COMMAND_DEVICE_PORT: u16 = 1030;

/// These tests all bind the fixed command ports the UDP backend uses, so
/// only one of them may be mid-flight at a time.
fn port_guard() -> &'static Mutex<()> {
	static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
	GUARD.get_or_init(|| Mutex::new(()))
}

fn session_config() -> SessionConfig {
	let mut map = HashMap::new();
	map.insert("udp_transport:local_address".to_string(), u32::from(HOST_ADDR) as u64);
	map.insert("udp_transport:device_address".to_string(), u32::from(DEVICE_ADDR) as u64);
	SessionConfig::from_map(&map).unwrap()
}

/// A stand-in device: binds the command port the host's sender and
/// receiver both connect to, and echoes back whatever the supplied
/// closure produces for each received request, assigning the sequence
/// counter the closure hands it.
struct DeviceEcho {
	stop: Arc<AtomicBool>,
	handle: Option<std::thread::JoinHandle<()>>,
}

impl DeviceEcho {
	fn spawn(mut reply_for: impl FnMut(PacketHeader, u16) -> Option<Frame> + Send + 'static) -> Self {
		let socket = UdpSocket::bind(SocketAddrV4::new(DEVICE_ADDR, COMMAND_DEVICE_PORT)).unwrap();
		socket.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
		let host_receive = SocketAddrV4::new(HOST_ADDR, COMMAND_HOST_RECEIVE_PORT);

		let stop = Arc::new(AtomicBool::new(false));
		let handle = {
			let stop = stop.clone();
			std::thread::spawn(move || {
				let mut buf = [0u8; 1024];
				let mut seq: u16 = 0;
				while !stop.load(Ordering::Acquire) {
					let n = match socket.recv_from(&mut buf) {
						Ok((n, _from)) => n,
						Err(_) => continue,
					};
					let frame = Frame::decode(&buf[..n], n).unwrap();
					if let Some(mut reply) = reply_for(frame.header, seq) {
						reply.header.sequence_counter = seq;
						let _ = socket.send_to(&reply.encode(), host_receive);
						seq = seq.wrapping_add(1);
					}
				}
			})
		};
		Self { stop, handle: Some(handle) }
	}
}

impl Drop for DeviceEcho {
	fn drop(&mut self) {
		self.stop.store(true, Ordering::Release);
		if let Some(h) = self.handle.take() {
			let _ = h.join();
		}
	}
}

fn device_response_header(request: PacketHeader) -> PacketHeader {
	let mut header = PacketHeader::new(request.packet_type | 0x10, request.command);
	header.flags = HeaderFlags::empty();
	header
}

#[test]
fn hello_round_trip_returns_capability_words() {
	let _guard = port_guard().lock().unwrap();
	let _device = DeviceEcho::spawn(|request, _seq| {
		let header = device_response_header(request);
		let payload = sdr_core::packet::Payload::SixU32([1, 2, 3, 4, 5, 6]);
		Some(Frame::with_payload(header, &payload))
	});

	let mut session = Session::connect(session_config()).unwrap();
	let words = session.hello().unwrap();
	assert_eq!(words, [1, 2, 3, 4, 5, 6]);
	session.shutdown();
}

#[test]
fn silent_device_times_out_without_a_lingering_in_flight_command() {
	let _guard = port_guard().lock().unwrap();
	// No device thread at all: nothing ever answers.
	let mut session = Session::connect(session_config()).unwrap();

	let header = PacketHeader::new(PacketType::DeviceCmd.to_wire(), 0x00);
	let start = std::time::Instant::now();
	let err = session.send_command(Frame::header_only(header), Duration::from_millis(200)).unwrap_err();
	let elapsed = start.elapsed();

	assert!(matches!(err, CoreError::Transport(TransportError::QueueTimeout(_))));
	assert!(elapsed >= Duration::from_millis(200));
	assert!(elapsed < Duration::from_millis(600));

	// The in-flight guard must have been released; a second command can
	// proceed without hitting CommandInFlight.
	let header2 = PacketHeader::new(PacketType::DeviceCmd.to_wire(), 0x00);
	let err2 = session.send_command(Frame::header_only(header2), Duration::from_millis(50)).unwrap_err();
	assert!(matches!(err2, CoreError::Transport(TransportError::QueueTimeout(_))));

	session.shutdown();
}

#[test]
fn out_of_sequence_response_is_counted_but_still_delivered() {
	let _guard = port_guard().lock().unwrap();
	// The device replies to the 3rd request with sequence 3 instead of 2,
	// skipping a value; the transport must flag it but still hand the
	// response back to the caller rather than drop it.
	let _device = DeviceEcho::spawn(|request, seq| {
		let header = device_response_header(request);
		let payload = sdr_core::packet::Payload::OneU32(seq as u32);
		let mut frame = Frame::with_payload(header, &payload);
		if seq == 2 {
			frame.header.sequence_counter = 3;
		}
		Some(frame)
	});

	let session = Session::connect(session_config()).unwrap();
	for _ in 0..3 {
		let header = PacketHeader::new(PacketType::DeviceCmd.to_wire(), 0x00);
		session.send_command(Frame::header_only(header), Duration::from_millis(500)).unwrap();
	}

	assert_eq!(session.stats.command.sequence_errors.get(), 1);
}
