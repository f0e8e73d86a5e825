//! Three-state TX throttling (§4.4).
//!
//! The device periodically reports how full its TX buffer is via a
//! `TX_SIGNAL_DATA_ACK` payload; the receiver task folds that percentage
//! into [`ThrottleState`] and the sender task consults the current state
//! every burst to decide how aggressively to push data.

use crate::config::ThrottleThresholds;
use crate::stats::ThrottleStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleState {
	None,
	Normal,
	Hard,
}

impl ThrottleState {
	/// Packets to pop per burst, regardless of state (§4.4: "bursts of up
	/// to 256").
	pub const BURST_PACKETS: usize = 256;

	/// How many packets to send per `REQUEST_ACK`, and the idle sleep
	/// between packets within a burst.
	pub fn ack_interval(self) -> usize {
		match self {
			ThrottleState::None => 256,
			ThrottleState::Normal => 128,
			ThrottleState::Hard => 1,
		}
	}

	pub fn inter_packet_sleep(self) -> std::time::Duration {
		match self {
			ThrottleState::None => std::time::Duration::ZERO,
			ThrottleState::Normal => std::time::Duration::from_micros(50),
			ThrottleState::Hard => std::time::Duration::from_micros(50),
		}
	}

	/// In `HARD_THROTTLE` the sender emits exactly one header-only
	/// `REQUEST_ACK` packet per iteration instead of draining a burst.
	pub fn is_hard(self) -> bool {
		matches!(self, ThrottleState::Hard)
	}
}

/// The throttle state machine, driven by successive `fill_percent`
/// samples (§4.4's transition diagram). Hysteresis is guaranteed by
/// construction: [`ThrottleThresholds::validate`] rejects configurations
/// where `off < on < hard` does not hold, and every transition below
/// only ever compares `fill` against one threshold per edge.
pub struct ThrottleMachine {
	state: ThrottleState,
	thresholds: ThrottleThresholds,
}

impl ThrottleMachine {
	pub fn new(thresholds: ThrottleThresholds) -> Self {
		Self { state: ThrottleState::None, thresholds }
	}

	pub fn state(&self) -> ThrottleState {
		self.state
	}

	/// Folds in one new `fill_percent` reading and returns the
	/// (possibly unchanged) resulting state, bumping `stats` on every
	/// real transition.
	pub fn update(&mut self, fill_percent: u32, stats: &ThrottleStats) -> ThrottleState {
		let ThrottleThresholds { off, on, hard } = self.thresholds;
		let next = match self.state {
			ThrottleState::None => {
				if fill_percent >= hard {
					ThrottleState::Hard
				} else if fill_percent >= on {
					ThrottleState::Normal
				} else {
					ThrottleState::None
				}
			}
			ThrottleState::Normal => {
				if fill_percent >= hard {
					ThrottleState::Hard
				} else if fill_percent < off {
					ThrottleState::None
				} else {
					ThrottleState::Normal
				}
			}
			ThrottleState::Hard => {
				if fill_percent < off {
					ThrottleState::None
				} else if fill_percent < hard {
					ThrottleState::Normal
				} else {
					ThrottleState::Hard
				}
			}
		};

		if next != self.state {
			match next {
				ThrottleState::None => stats.transitions_to_none.increment(),
				ThrottleState::Normal => stats.transitions_to_normal.increment(),
				ThrottleState::Hard => stats.transitions_to_hard.increment(),
			}
			log::debug!("throttle transition {:?} -> {:?} at fill {fill_percent}%", self.state, next);
			self.state = next;
		}
		self.state
	}
}
