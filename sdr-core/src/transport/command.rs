//! Command transport: single in-flight request/response plus an
//! out-of-band async message stream (§4.3).

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::backend::{is_timeout, Backend};
use crate::error::{QueueOp, TransportError};
use crate::packet::{Frame, PacketType, MAX_CMD_RSP_PACKET_BYTES};
use crate::spsc::SpscRing;
use crate::stats::CommandTransportStats;
use crate::transport::{DirectionState, DirectionStateCell};

const RESPONSE_QUEUE_CAPACITY: usize = 1;
const ASYNC_QUEUE_CAPACITY: usize = 1024;
const QUEUE_POLL: Duration = Duration::from_millis(1);
const SENDER_POP_TIMEOUT: Duration = Duration::from_millis(50);
const ASYNC_PUSH_TIMEOUT: Duration = Duration::from_millis(20);

pub struct CommandTransport {
	command_queue: Arc<SpscRing<Frame>>,
	response_queue: Arc<SpscRing<Frame>>,
	async_msg_queue: Arc<SpscRing<Frame>>,
	tx_state: Arc<DirectionStateCell>,
	rx_state: Arc<DirectionStateCell>,
	shutdown: Arc<AtomicBool>,
	sender_handle: Mutex<Option<JoinHandle<()>>>,
	receiver_handle: Mutex<Option<JoinHandle<()>>>,
	/// Held for the full duration of one `send_command` call, enforcing
	/// I3 (single in-flight command) independent of queue-drain timing.
	pub(crate) in_flight: Mutex<()>,
}

impl CommandTransport {
	pub fn spawn(backend: Arc<dyn Backend>, stats: Arc<CommandTransportStats>) -> Self {
		let command_queue = Arc::new(SpscRing::new(1));
		let response_queue = Arc::new(SpscRing::new(RESPONSE_QUEUE_CAPACITY));
		let async_msg_queue = Arc::new(SpscRing::new(ASYNC_QUEUE_CAPACITY));
		let tx_state = Arc::new(DirectionStateCell::new(DirectionState::Starting));
		let rx_state = Arc::new(DirectionStateCell::new(DirectionState::Starting));
		let shutdown = Arc::new(AtomicBool::new(false));

		let sender_handle = {
			let backend = backend.clone();
			let command_queue = command_queue.clone();
			let tx_state = tx_state.clone();
			let stats = stats.clone();
			let shutdown = shutdown.clone();
			std::thread::Builder::new()
				.name("sdr-cmd-tx".into())
				.spawn(move || sender_loop(backend, command_queue, tx_state, stats, shutdown))
				.expect("spawn command sender thread")
		};

		let receiver_handle = {
			let backend = backend.clone();
			let response_queue = response_queue.clone();
			let async_msg_queue = async_msg_queue.clone();
			let rx_state = rx_state.clone();
			let stats = stats.clone();
			let shutdown = shutdown.clone();
			std::thread::Builder::new()
				.name("sdr-cmd-rx".into())
				.spawn(move || receiver_loop(backend, response_queue, async_msg_queue, rx_state, stats, shutdown))
				.expect("spawn command receiver thread")
		};

		tx_state.set(DirectionState::Ready);
		rx_state.set(DirectionState::Ready);

		Self {
			command_queue,
			response_queue,
			async_msg_queue,
			tx_state,
			rx_state,
			shutdown,
			sender_handle: Mutex::new(Some(sender_handle)),
			receiver_handle: Mutex::new(Some(receiver_handle)),
			in_flight: Mutex::new(()),
		}
	}

	pub fn tx_state(&self) -> DirectionState {
		self.tx_state.get()
	}

	pub fn rx_state(&self) -> DirectionState {
		self.rx_state.get()
	}

	/// Enforces I3: fails fast with [`TransportError::CommandInFlight`]
	/// rather than blocking if a prior command has not yet been drained.
	pub fn post_command(&self, frame: Frame) -> Result<(), TransportError> {
		self.command_queue.push(frame).map_err(|_| TransportError::CommandInFlight)
	}

	/// Sends `request` and waits up to `timeout` for a correlated
	/// response, per the façade-side correlation rule in §4.3.
	pub fn send_command(&self, request: Frame, timeout: Duration) -> Result<Frame, TransportError> {
		let _guard = self.in_flight.try_lock().map_err(|_| TransportError::CommandInFlight)?;

		let request_type = PacketType::from_wire(request.header.packet_type)
			.ok_or(TransportError::NotReady("unrecognized request packet type"))?;
		let request_command = request.header.command;

		self.post_command(request)?;

		let response = self
			.response_queue
			.pop_or_timeout(timeout, QUEUE_POLL)
			.ok_or(TransportError::QueueTimeout(QueueOp::Pop))?;

		let response_type = PacketType::from_wire(response.header.packet_type)
			.ok_or(TransportError::NotReady("unrecognized response packet type"))?;

		if !response_type.answers(request_type) {
			return Err(TransportError::UnexpectedResponseType { request: request_type, actual: response_type });
		}
		if response.header.command != request_command {
			return Err(TransportError::UnexpectedResponseCommand {
				request: request_command,
				actual: response.header.command,
			});
		}
		Ok(response)
	}

	/// Drains up to `max` pending async messages without blocking past
	/// `timeout` waiting for the first one.
	pub fn poll_async_messages(&self, timeout: Duration) -> Option<Frame> {
		self.async_msg_queue.pop_or_timeout(timeout, QUEUE_POLL)
	}

	/// Stops both background threads and joins them. Safe to call through
	/// a shared `Arc<CommandTransport>` (e.g. from both the owning session
	/// and a dispatcher holding its own clone); the second caller simply
	/// finds both handles already taken.
	pub fn shutdown(&self) {
		self.shutdown.store(true, Ordering::Release);
		if let Some(h) = self.receiver_handle.lock().unwrap().take() {
			let _ = h.join();
		}
		if let Some(h) = self.sender_handle.lock().unwrap().take() {
			let _ = h.join();
		}
		self.tx_state.set(DirectionState::Shutdown);
		self.rx_state.set(DirectionState::Shutdown);
	}
}

impl Drop for CommandTransport {
	fn drop(&mut self) {
		if !self.shutdown.load(Ordering::Acquire) {
			self.shutdown();
		}
	}
}

fn sender_loop(
	backend: Arc<dyn Backend>,
	command_queue: Arc<SpscRing<Frame>>,
	tx_state: Arc<DirectionStateCell>,
	stats: Arc<CommandTransportStats>,
	shutdown: Arc<AtomicBool>,
) {
	let sent_count = AtomicU16::new(0);
	while !shutdown.load(Ordering::Acquire) {
		let Some(mut frame) = command_queue.pop_or_timeout(SENDER_POP_TIMEOUT, QUEUE_POLL) else {
			continue;
		};
		frame.header.sequence_counter = sent_count.fetch_add(1, Ordering::Relaxed);
		let bytes = frame.encode();
		match backend.send(&bytes) {
			Ok(()) => stats.commands_sent.increment(),
			Err(e) => {
				log::error!("command send failed: {e}");
				stats.send_errors.increment();
				tx_state.mark_error();
			}
		}
	}
}

fn receiver_loop(
	backend: Arc<dyn Backend>,
	response_queue: Arc<SpscRing<Frame>>,
	async_msg_queue: Arc<SpscRing<Frame>>,
	rx_state: Arc<DirectionStateCell>,
	stats: Arc<CommandTransportStats>,
	shutdown: Arc<AtomicBool>,
) {
	let mut expected_seq: Option<u16> = None;
	let mut buf = vec![0u8; MAX_CMD_RSP_PACKET_BYTES];
	while !shutdown.load(Ordering::Acquire) {
		let n = match backend.recv(&mut buf) {
			Ok(n) => n,
			Err(e) if is_timeout(&e) => continue,
			Err(e) => {
				log::error!("command receive failed: {e}");
				rx_state.mark_error();
				continue;
			}
		};

		let frame = match Frame::decode(&buf[..n], n) {
			Ok(f) => f,
			Err(e) => {
				log::warn!("dropping malformed command packet: {e}");
				rx_state.mark_error();
				continue;
			}
		};

		if let Some(expected) = expected_seq {
			if frame.header.sequence_counter != expected {
				stats.sequence_errors.increment();
				rx_state.mark_error();
			}
		}
		expected_seq = Some(frame.header.sequence_counter.wrapping_add(1));

		match PacketType::from_wire(frame.header.packet_type) {
			Some(PacketType::AsyncMsg) => {
				stats.async_messages_received.increment();
				if async_msg_queue.push_or_timeout(frame, ASYNC_PUSH_TIMEOUT, QUEUE_POLL).is_err() {
					log::error!("async message queue full, dropping message");
					rx_state.mark_error();
				}
			}
			Some(t) if t.answers(PacketType::DeviceCmd) || t.answers(PacketType::TxRadioCmd) || t.answers(PacketType::RxRadioCmd) => {
				stats.responses_received.increment();
				// Capacity-1 response queue backs the single-in-flight
				// invariant; a timed push here bounds how long a stale,
				// unclaimed response can block the receiver.
				if response_queue.push_or_timeout(frame, ASYNC_PUSH_TIMEOUT, QUEUE_POLL).is_err() {
					log::warn!("response queue full, dropping unclaimed response");
				}
			}
			_ => {
				log::warn!("dropping unexpected packet type {:#04x} on command transport", frame.header.packet_type);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::packet::PacketHeader;
	use std::sync::Mutex;

	struct LoopbackBackend {
		inbox: Mutex<std::collections::VecDeque<Vec<u8>>>,
	}

	impl LoopbackBackend {
		fn new() -> Self {
			Self { inbox: Mutex::new(std::collections::VecDeque::new()) }
		}
	}

	impl Backend for LoopbackBackend {
		fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
			// Echo back as a DEVICE_CMD_RSP with the same command byte.
			let mut reply = frame.to_vec();
			let word = u16::from_le_bytes([reply[0], reply[1]]);
			let packet_type = (word & 0x3F) as u8;
			let command = ((word >> 6) & 0x3F) as u8;
			let flags = (word >> 12) & 0x0F;
			let rsp_word = (packet_type as u16 | 0x10) | ((command as u16) << 6) | (flags << 12);
			reply[0..2].copy_from_slice(&rsp_word.to_le_bytes());
			self.inbox.lock().unwrap().push_back(reply);
			Ok(())
		}

		fn recv(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
			if let Some(msg) = self.inbox.lock().unwrap().pop_front() {
				buf[..msg.len()].copy_from_slice(&msg);
				return Ok(msg.len());
			}
			Err(TransportError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, "no data")))
		}

		fn shutdown(&self) {}
	}

	#[test]
	fn send_command_correlates_matching_response() {
		let backend: Arc<dyn Backend> = Arc::new(LoopbackBackend::new());
		let stats = Arc::new(CommandTransportStats::default());
		let mut transport = CommandTransport::spawn(backend, stats.clone());

		let header = PacketHeader::new(PacketType::DeviceCmd.to_wire(), 0x00);
		let request = Frame::header_only(header);
		let response = transport.send_command(request, Duration::from_millis(500)).unwrap();
		assert!(PacketType::from_wire(response.header.packet_type).unwrap().answers(PacketType::DeviceCmd));
		assert_eq!(response.header.command, 0x00);
		assert_eq!(stats.commands_sent.get(), 1);
		assert_eq!(stats.responses_received.get(), 1);

		transport.shutdown();
	}

	#[test]
	fn second_command_is_rejected_while_one_in_flight() {
		let backend: Arc<dyn Backend> = Arc::new(LoopbackBackend::new());
		let stats = Arc::new(CommandTransportStats::default());
		let mut transport = CommandTransport::spawn(backend, stats);

		// Hold the in-flight guard directly to deterministically simulate
		// a send_command call that is still awaiting its response.
		let _held = transport.in_flight.lock().unwrap();
		let header = PacketHeader::new(PacketType::DeviceCmd.to_wire(), 0x00);
		let err = transport.send_command(Frame::header_only(header), Duration::from_millis(50)).unwrap_err();
		assert!(matches!(err, TransportError::CommandInFlight));
		drop(_held);

		transport.shutdown();
	}
}
