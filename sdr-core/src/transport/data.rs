//! Data transport: TX/RX streaming with throttled sending and
//! per-subdevice receive buffering (§4.4).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::backend::{is_timeout, Backend};
use crate::config::{apply_thread_priority, pin_current_thread, ThrottleThresholds};
use crate::error::TransportError;
use crate::packet::{
	Frame, HeaderFlags, PacketHeader, PacketType, Payload, MAX_DATA_PACKET_BYTES,
};
use crate::spsc::SpscRing;
use crate::stats::{DataTransportStats, ThrottleStats};
use crate::transport::throttle::{ThrottleMachine, ThrottleState};
use crate::transport::{DirectionState, DirectionStateCell};

const QUEUE_POLL: Duration = Duration::from_millis(1);
const RX_RING_PUSH_TIMEOUT: Duration = Duration::from_millis(20);
const LEFTOVER_RING_CAPACITY: usize = 2048;
const SHUTDOWN_DRAIN_WAIT: Duration = Duration::from_millis(20);

struct SubdeviceRx {
	ring: SpscRing<Frame>,
	leftover: Mutex<VecDeque<crate::packet::ComplexI16>>,
}

impl SubdeviceRx {
	fn new(ring_capacity: usize) -> Self {
		Self {
			ring: SpscRing::new(ring_capacity),
			leftover: Mutex::new(VecDeque::with_capacity(LEFTOVER_RING_CAPACITY)),
		}
	}
}

pub struct DataTransport {
	tx_data_queue: Arc<SpscRing<Frame>>,
	rx_subdevices: Vec<Arc<SubdeviceRx>>,
	tx_state: Arc<DirectionStateCell>,
	rx_state: Arc<DirectionStateCell>,
	throttle: Arc<Mutex<ThrottleMachine>>,
	shutdown: Arc<AtomicBool>,
	sender_handle: Option<JoinHandle<()>>,
	receiver_handle: Option<JoinHandle<()>>,
}

impl DataTransport {
	pub fn spawn(
		backend: Arc<dyn Backend>,
		stats: Arc<DataTransportStats>,
		rx_stats: Arc<DataTransportStats>,
		num_rx_subdevs: usize,
		tx_queue_capacity: usize,
		rx_ring_capacity: usize,
		throttle_thresholds: ThrottleThresholds,
		throttle_stats: Arc<ThrottleStats>,
		thread_priority: i32,
		sender_thread_affinity: Option<usize>,
		receiver_thread_affinity: Option<usize>,
	) -> Self {
		let tx_data_queue = Arc::new(SpscRing::new(tx_queue_capacity));
		let rx_subdevices: Vec<_> = (0..num_rx_subdevs.max(1))
			.map(|_| Arc::new(SubdeviceRx::new(rx_ring_capacity)))
			.collect();
		let tx_state = Arc::new(DirectionStateCell::new(DirectionState::Starting));
		let rx_state = Arc::new(DirectionStateCell::new(DirectionState::Starting));
		let throttle = Arc::new(Mutex::new(ThrottleMachine::new(throttle_thresholds)));
		let shutdown = Arc::new(AtomicBool::new(false));

		let sender_handle = {
			let backend = backend.clone();
			let tx_data_queue = tx_data_queue.clone();
			let tx_state = tx_state.clone();
			let rx_state = rx_state.clone();
			let throttle = throttle.clone();
			let stats = stats.clone();
			let shutdown = shutdown.clone();
			std::thread::Builder::new()
				.name("sdr-data-tx".into())
				.spawn(move || {
					pin_current_thread(sender_thread_affinity);
					apply_thread_priority(thread_priority);
					sender_loop(backend, tx_data_queue, tx_state, rx_state, throttle, stats, shutdown)
				})
				.expect("spawn data sender thread")
		};

		let receiver_handle = {
			let backend = backend.clone();
			let rx_subdevices = rx_subdevices.clone();
			let rx_state = rx_state.clone();
			let throttle = throttle.clone();
			let throttle_stats = throttle_stats.clone();
			let shutdown = shutdown.clone();
			std::thread::Builder::new()
				.name("sdr-data-rx".into())
				.spawn(move || {
					pin_current_thread(receiver_thread_affinity);
					apply_thread_priority(thread_priority);
					receiver_loop(backend, rx_subdevices, rx_state, throttle, throttle_stats, rx_stats, shutdown)
				})
				.expect("spawn data receiver thread")
		};

		tx_state.set(DirectionState::Ready);
		rx_state.set(DirectionState::Ready);

		Self {
			tx_data_queue,
			rx_subdevices,
			tx_state,
			rx_state,
			throttle,
			shutdown,
			sender_handle: Some(sender_handle),
			receiver_handle: Some(receiver_handle),
		}
	}

	pub fn tx_state(&self) -> DirectionState {
		self.tx_state.get()
	}

	pub fn rx_state(&self) -> DirectionState {
		self.rx_state.get()
	}

	pub fn throttle_state(&self) -> ThrottleState {
		self.throttle.lock().unwrap().state()
	}

	/// Fragments `samples` into at most `max_samples_per_packet` (rounded
	/// down to `granularity`) per packet and enqueues each for send.
	/// Returns the count of samples actually placed; a full queue ends
	/// fragmentation early rather than blocking past `timeout`.
	pub fn put_tx_data(
		&self,
		subdevice: u8,
		channel: u8,
		samples: &[crate::packet::ComplexI16],
		max_samples_per_packet: usize,
		granularity: usize,
		timeout: Duration,
		stats: &DataTransportStats,
	) -> Result<usize, TransportError> {
		let chunk_size = (max_samples_per_packet / granularity.max(1)).max(1) * granularity.max(1);
		let mut placed = 0;
		let mut fragments = 0;
		for chunk in samples.chunks(chunk_size) {
			let mut header = PacketHeader::new(PacketType::TxSignalData.to_wire(), 0);
			header.subdevice = subdevice;
			header.channel = channel;
			let payload = Payload::Samples(chunk.to_vec());
			let frame = Frame::with_payload(header, &payload);
			if self.tx_data_queue.push_or_timeout(frame, timeout, QUEUE_POLL).is_err() {
				break;
			}
			placed += chunk.len();
			fragments += 1;
		}
		if fragments > 1 {
			stats.fragmented_packets.add(fragments as u64 - 1);
		}
		Ok(placed)
	}

	/// Drains the leftover ring first, then pops subdevice packets until
	/// `out` is filled, `timeout` elapses, or the transport errors.
	pub fn get_rx_data(
		&self,
		subdevice: usize,
		out: &mut [crate::packet::ComplexI16],
		timeout: Duration,
	) -> Result<usize, TransportError> {
		let sub = self
			.rx_subdevices
			.get(subdevice)
			.ok_or(TransportError::SubdeviceOutOfRange { subdevice: subdevice as u8, num_rx_subdevs: self.rx_subdevices.len() as u8 })?;

		let mut delivered = 0;
		{
			let mut leftover = sub.leftover.lock().unwrap();
			while delivered < out.len() {
				match leftover.pop_front() {
					Some(s) => {
						out[delivered] = s;
						delivered += 1;
					}
					None => break,
				}
			}
		}

		let deadline = std::time::Instant::now() + timeout;
		while delivered < out.len() {
			let remaining = deadline.saturating_duration_since(std::time::Instant::now());
			if remaining.is_zero() {
				break;
			}
			let Some(frame) = sub.ring.pop_or_timeout(remaining, QUEUE_POLL) else {
				break;
			};
			let Payload::Samples(samples) = Payload::decode_samples(&frame.payload) else {
				continue;
			};
			let need = out.len() - delivered;
			let take = need.min(samples.len());
			out[delivered..delivered + take].copy_from_slice(&samples[..take]);
			delivered += take;

			if samples.len() > take {
				let mut leftover = sub.leftover.lock().unwrap();
				for s in &samples[take..] {
					if leftover.len() >= LEFTOVER_RING_CAPACITY {
						log::warn!("leftover sample ring full for subdevice {subdevice}, dropping oldest");
						leftover.pop_front();
					}
					leftover.push_back(*s);
				}
			}
		}
		Ok(delivered)
	}

	pub fn shutdown(&mut self) {
		self.shutdown.store(true, Ordering::Release);
		if let Some(h) = self.sender_handle.take() {
			let _ = h.join();
		}
		if let Some(h) = self.receiver_handle.take() {
			let _ = h.join();
		}
		self.tx_state.set(DirectionState::Shutdown);
		self.rx_state.set(DirectionState::Shutdown);
	}
}

impl Drop for DataTransport {
	fn drop(&mut self) {
		if !self.shutdown.load(Ordering::Acquire) {
			self.shutdown();
		}
	}
}

fn request_ack_frame(sequence: u16) -> Frame {
	let mut header = PacketHeader::new(PacketType::TxSignalData.to_wire(), 0);
	header.flags |= HeaderFlags::REQUEST_ACK;
	header.sequence_counter = sequence;
	Frame::header_only(header)
}

fn sender_loop(
	backend: Arc<dyn Backend>,
	tx_data_queue: Arc<SpscRing<Frame>>,
	tx_state: Arc<DirectionStateCell>,
	rx_state: Arc<DirectionStateCell>,
	throttle: Arc<Mutex<ThrottleMachine>>,
	stats: Arc<DataTransportStats>,
	shutdown: Arc<AtomicBool>,
) {
	let sent_count = AtomicU16::new(0);
	while !shutdown.load(Ordering::Acquire) {
		let state = throttle.lock().unwrap().state();

		if state.is_hard() {
			let seq = sent_count.fetch_add(1, Ordering::Relaxed);
			send_one(&backend, request_ack_frame(seq), &tx_state, &stats);
			std::thread::sleep(state.inter_packet_sleep().max(Duration::from_micros(50)));
			continue;
		}

		let mut burst: Vec<Option<Frame>> = (0..ThrottleState::BURST_PACKETS).map(|_| None).collect();
		let n = tx_data_queue.pop_bulk(&mut burst);
		if n == 0 {
			std::thread::sleep(QUEUE_POLL);
			continue;
		}

		let ack_interval = state.ack_interval();
		for (i, slot) in burst.into_iter().take(n).enumerate() {
			let Some(mut frame) = slot else { continue };
			frame.header.sequence_counter = sent_count.fetch_add(1, Ordering::Relaxed);
			if (i + 1) % ack_interval == 0 {
				frame.header.flags |= HeaderFlags::REQUEST_ACK;
			}
			send_one(&backend, frame, &tx_state, &stats);
			let sleep = state.inter_packet_sleep();
			if !sleep.is_zero() {
				std::thread::sleep(sleep);
			}
		}
	}

	if rx_state.get() != DirectionState::Shutdown {
		let seq = sent_count.fetch_add(1, Ordering::Relaxed);
		send_one(&backend, request_ack_frame(seq), &tx_state, &stats);
		std::thread::sleep(SHUTDOWN_DRAIN_WAIT);
	}
}

fn send_one(backend: &Arc<dyn Backend>, frame: Frame, tx_state: &DirectionStateCell, stats: &DataTransportStats) {
	let samples = frame.payload.len() / crate::packet::ComplexI16::BYTES;
	let bytes = frame.encode();
	match backend.send(&bytes) {
		Ok(()) => {
			stats.packets.increment();
			stats.bytes.add(bytes.len() as u64);
			stats.samples.add(samples as u64);
		}
		Err(e) => {
			log::error!("data send failed: {e}");
			stats.send_errors.increment();
			tx_state.mark_error();
		}
	}
}

fn receiver_loop(
	backend: Arc<dyn Backend>,
	rx_subdevices: Vec<Arc<SubdeviceRx>>,
	rx_state: Arc<DirectionStateCell>,
	throttle: Arc<Mutex<ThrottleMachine>>,
	throttle_stats: Arc<ThrottleStats>,
	stats: Arc<DataTransportStats>,
	shutdown: Arc<AtomicBool>,
) {
	let mut expected_seq: Option<u16> = None;
	let mut buf = vec![0u8; MAX_DATA_PACKET_BYTES];
	while !shutdown.load(Ordering::Acquire) {
		let n = match backend.recv(&mut buf) {
			Ok(n) => n,
			Err(e) if is_timeout(&e) => continue,
			Err(e) => {
				log::error!("data receive failed: {e}");
				rx_state.mark_error();
				continue;
			}
		};

		let frame = match Frame::decode(&buf[..n], n) {
			Ok(f) => f,
			Err(e) => {
				log::warn!("dropping malformed data packet: {e}");
				rx_state.mark_error();
				continue;
			}
		};

		if let Some(expected) = expected_seq {
			if frame.header.sequence_counter != expected {
				rx_state.mark_error();
			}
		}
		expected_seq = Some(frame.header.sequence_counter.wrapping_add(1));

		match PacketType::from_wire(frame.header.packet_type) {
			Some(PacketType::RxSignalData) => {
				let subdevice = frame.header.subdevice as usize;
				let Some(sub) = rx_subdevices.get(subdevice) else {
					log::warn!("dropping RX data for out-of-range subdevice {subdevice}");
					stats.dropped_packets.increment();
					continue;
				};
				let samples = (frame.payload.len() / crate::packet::ComplexI16::BYTES) as u64;
				if sub.ring.push_or_timeout(frame, RX_RING_PUSH_TIMEOUT, QUEUE_POLL).is_err() {
					log::warn!("RX ring full for subdevice {subdevice}, dropping packet");
					stats.dropped_packets.increment();
				} else {
					stats.packets.increment();
					stats.samples.add(samples);
				}
			}
			Some(PacketType::TxSignalDataAck) => {
				if let Payload::TxAck { used_bytes, size_bytes, .. } = Payload::decode_tx_ack(&frame.payload) {
					let fill_percent = if size_bytes == 0 {
						0
					} else {
						((used_bytes as u64 * 100) / size_bytes as u64).clamp(0, 100) as u32
					};
					throttle.lock().unwrap().update(fill_percent, &throttle_stats);
				}
			}
			_ => {
				log::warn!("dropping unexpected packet type {:#04x} on data transport", frame.header.packet_type);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::packet::ComplexI16;

	fn make_samples(n: usize) -> Vec<ComplexI16> {
		(0..n).map(|i| ComplexI16 { i: i as i16, q: -(i as i16) }).collect()
	}

	#[test]
	fn fragmentation_splits_into_expected_packet_sizes() {
		let chunk_size = 2048usize;
		let samples = make_samples(5000);
		let chunks: Vec<_> = samples.chunks(chunk_size).map(|c| c.len()).collect();
		assert_eq!(chunks, vec![2048, 2048, 904]);
	}

	struct NullBackend;
	impl Backend for NullBackend {
		fn send(&self, _frame: &[u8]) -> Result<(), TransportError> {
			Ok(())
		}
		fn recv(&self, _buf: &mut [u8]) -> Result<usize, TransportError> {
			std::thread::sleep(Duration::from_millis(5));
			Err(TransportError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, "idle")))
		}
		fn shutdown(&self) {}
	}

	#[test]
	fn put_tx_data_reports_count_placed_and_fragment_count() {
		let backend: Arc<dyn Backend> = Arc::new(NullBackend);
		let tx_stats = Arc::new(DataTransportStats::default());
		let rx_stats = Arc::new(DataTransportStats::default());
		let mut transport = DataTransport::spawn(
			backend,
			tx_stats.clone(),
			rx_stats,
			4,
			1024,
			1024,
			ThrottleThresholds::UDP_DEFAULT,
			Arc::new(crate::stats::ThrottleStats::default()),
			0,
			None,
			None,
		);

		let samples = make_samples(5000);
		let placed = transport
			.put_tx_data(0, 0, &samples, 2048, 1, Duration::from_millis(200), &tx_stats)
			.unwrap();
		assert_eq!(placed, 5000);
		assert_eq!(tx_stats.fragmented_packets.get(), 2);

		transport.shutdown();
	}

	#[test]
	fn get_rx_data_out_of_range_subdevice_is_rejected() {
		let backend: Arc<dyn Backend> = Arc::new(NullBackend);
		let tx_stats = Arc::new(DataTransportStats::default());
		let rx_stats = Arc::new(DataTransportStats::default());
		let mut transport = DataTransport::spawn(
			backend,
			tx_stats,
			rx_stats,
			2,
			64,
			64,
			ThrottleThresholds::UDP_DEFAULT,
			Arc::new(crate::stats::ThrottleStats::default()),
			0,
			None,
			None,
		);

		let mut out = [ComplexI16::default(); 4];
		let err = transport.get_rx_data(7, &mut out, Duration::from_millis(10)).unwrap_err();
		assert!(matches!(err, TransportError::SubdeviceOutOfRange { .. }));

		transport.shutdown();
	}
}
