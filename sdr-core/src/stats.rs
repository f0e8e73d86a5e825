//! Shared diagnostic counters (§5).
//!
//! Each counter is updated only by the single thread that owns the
//! resource it describes (the sender task bumps TX counters, the
//! receiver task bumps RX counters) and read from any other thread for
//! diagnostics. Readers must tolerate a stale snapshot: there is no
//! cross-counter synchronization, so two fields read in sequence may
//! describe slightly different instants.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
	pub fn get(&self) -> u64 {
		self.0.load(Ordering::Relaxed)
	}

	pub fn add(&self, n: u64) {
		self.0.fetch_add(n, Ordering::Relaxed);
	}

	pub fn increment(&self) {
		self.add(1);
	}
}

/// Counters for one direction (TX or RX) of the data transport.
#[derive(Debug, Default)]
pub struct DataTransportStats {
	pub packets: Counter,
	pub samples: Counter,
	pub bytes: Counter,
	pub dropped_packets: Counter,
	pub fragmented_packets: Counter,
	pub send_errors: Counter,
}

/// Counters for the command transport.
#[derive(Debug, Default)]
pub struct CommandTransportStats {
	pub commands_sent: Counter,
	pub responses_received: Counter,
	pub async_messages_received: Counter,
	pub sequence_errors: Counter,
	pub timeouts: Counter,
	pub send_errors: Counter,
}

/// Throttle-state transition counters, read by diagnostics code to
/// confirm hysteresis is behaving as configured (§4.4).
#[derive(Debug, Default)]
pub struct ThrottleStats {
	pub transitions_to_normal: Counter,
	pub transitions_to_hard: Counter,
	pub transitions_to_none: Counter,
}

/// The full set of counters for one session. Each field is independently
/// `Arc`-shared so the same allocation handed to a transport's background
/// threads at `spawn` time is the one readers see here, rather than a
/// disconnected copy.
#[derive(Debug, Default)]
pub struct SessionStats {
	pub tx: Arc<DataTransportStats>,
	pub rx: Arc<DataTransportStats>,
	pub command: Arc<CommandTransportStats>,
	pub throttle: Arc<ThrottleStats>,
}
