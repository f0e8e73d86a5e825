//! Background dispatcher for the command transport's `ASYNC_MSG` stream
//! (§4.7).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::packet::{AsyncAffectedSystem, AsyncErrorType, Frame};
use crate::transport::command::CommandTransport;

/// Cadence at which the dispatcher polls the command transport's async
/// message queue (§4.7: "~1 ms").
const POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct AsyncDispatcher {
	shutdown: Arc<AtomicBool>,
	handle: Option<JoinHandle<()>>,
}

impl AsyncDispatcher {
	pub fn spawn(command: Arc<CommandTransport>) -> Self {
		let shutdown = Arc::new(AtomicBool::new(false));
		let handle = {
			let shutdown = shutdown.clone();
			std::thread::Builder::new()
				.name("sdr-async-dispatch".into())
				.spawn(move || dispatch_loop(command, shutdown))
				.expect("spawn async dispatcher thread")
		};
		Self { shutdown, handle: Some(handle) }
	}

	pub fn shutdown(&mut self) {
		self.shutdown.store(true, Ordering::Release);
		if let Some(h) = self.handle.take() {
			let _ = h.join();
		}
	}
}

impl Drop for AsyncDispatcher {
	fn drop(&mut self) {
		if !self.shutdown.load(Ordering::Acquire) {
			self.shutdown();
		}
	}
}

fn dispatch_loop(command: Arc<CommandTransport>, shutdown: Arc<AtomicBool>) {
	while !shutdown.load(Ordering::Acquire) {
		let Some(frame) = command.poll_async_messages(POLL_INTERVAL) else {
			continue;
		};
		classify_and_log(&frame);
	}
}

fn classify_and_log(frame: &Frame) {
	let command = frame.header.command;
	let system = AsyncAffectedSystem::from_command(command);
	let error = AsyncErrorType::from_command(command);

	if error.is_benign_at_warn_level() {
		log::warn!("async message: system={system:?} error={error:?} (benign)");
	} else {
		log::error!("async message: system={system:?} error={error:?}");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backend::Backend;
	use crate::error::TransportError;
	use crate::packet::{PacketHeader, PacketType};
	use crate::stats::CommandTransportStats;

	struct SilentBackend;
	impl Backend for SilentBackend {
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
	fn classify_and_log_does_not_panic_on_every_error_type() {
		for command in 0x00..=0x3F {
			let header = PacketHeader::new(PacketType::AsyncMsg.to_wire(), command);
			let frame = Frame::header_only(header);
			classify_and_log(&frame);
		}
	}

	#[test]
	fn dispatcher_starts_and_stops_cleanly() {
		let backend: std::sync::Arc<dyn Backend> = std::sync::Arc::new(SilentBackend);
		let stats = std::sync::Arc::new(CommandTransportStats::default());
		let command = std::sync::Arc::new(CommandTransport::spawn(backend, stats));
		let mut dispatcher = AsyncDispatcher::spawn(command.clone());
		std::thread::sleep(Duration::from_millis(10));
		dispatcher.shutdown();
		drop(command);
	}
}
