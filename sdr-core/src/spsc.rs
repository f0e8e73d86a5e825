//! A bounded, allocation-free single-producer/single-consumer ring buffer
//! (§4.1). One producer thread and one consumer thread may operate on a
//! given ring concurrently; any other usage is undefined behavior.
//!
//! The head and tail indices live in separate cache lines
//! ([`crossbeam_utils::CachePadded`]) so the producer publishing a push
//! does not invalidate the consumer's cache line on every operation, the
//! same padding trick the kernel message ring buffer uses for its single
//! writer index.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_utils::{Backoff, CachePadded};

/// A bounded SPSC ring holding up to `capacity` elements of `T`.
pub struct SpscRing<T> {
	buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
	slots: usize,
	head: CachePadded<AtomicUsize>, // next index the consumer will read
	tail: CachePadded<AtomicUsize>, // next index the producer will write
}

// SAFETY: the ring is only ever mutated through disjoint, single-owner
// access from at most one producer and one consumer, enforced by the
// API (push/pop never overlap in the slot they touch).
unsafe impl<T: Send> Sync for SpscRing<T> {}
unsafe impl<T: Send> Send for SpscRing<T> {}

impl<T> SpscRing<T> {
	/// Creates a ring that can hold `capacity` elements. `capacity` must be
	/// non-zero; one extra internal slot is reserved to distinguish full
	/// from empty without a separate counter.
	pub fn new(capacity: usize) -> Self {
		assert!(capacity > 0, "SpscRing capacity must be non-zero");
		let slots = capacity + 1;
		let mut v = Vec::with_capacity(slots);
		for _ in 0..slots {
			v.push(UnsafeCell::new(MaybeUninit::uninit()));
		}
		Self {
			buf: v.into_boxed_slice(),
			slots,
			head: CachePadded::new(AtomicUsize::new(0)),
			tail: CachePadded::new(AtomicUsize::new(0)),
		}
	}

	pub fn capacity(&self) -> usize {
		self.slots - 1
	}

	fn next(&self, idx: usize) -> usize {
		if idx + 1 == self.slots {
			0
		} else {
			idx + 1
		}
	}

	/// Attempts to push one element. Returns the element back on failure
	/// (ring full). Wait-free.
	pub fn push(&self, value: T) -> Result<(), T> {
		let tail = self.tail.load(Ordering::Relaxed);
		let next_tail = self.next(tail);
		if next_tail == self.head.load(Ordering::Acquire) {
			return Err(value); // full
		}
		// SAFETY: only the producer writes to `tail`'s slot, and the
		// consumer cannot be reading it (it's past `head`).
		unsafe {
			(*self.buf[tail].get()).write(value);
		}
		self.tail.store(next_tail, Ordering::Release);
		Ok(())
	}

	/// Attempts to pop one element. Returns `None` on failure (ring
	/// empty). Wait-free.
	pub fn pop(&self) -> Option<T> {
		let head = self.head.load(Ordering::Relaxed);
		if head == self.tail.load(Ordering::Acquire) {
			return None; // empty
		}
		// SAFETY: only the consumer reads from `head`'s slot, and the
		// producer cannot be writing it again until we advance `head`.
		let value = unsafe { (*self.buf[head].get()).assume_init_read() };
		self.head.store(self.next(head), Ordering::Release);
		Some(value)
	}

	/// Drains up to `out.len()` elements in one call, returning the count
	/// popped.
	pub fn pop_bulk(&self, out: &mut [Option<T>]) -> usize {
		let mut n = 0;
		for slot in out.iter_mut() {
			match self.pop() {
				Some(v) => {
					*slot = Some(v);
					n += 1;
				}
				None => break,
			}
		}
		n
	}

	pub fn len(&self) -> usize {
		let head = self.head.load(Ordering::Acquire);
		let tail = self.tail.load(Ordering::Acquire);
		if tail >= head {
			tail - head
		} else {
			self.slots - head + tail
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Busy-polls, sleeping `poll` between attempts, until the push
	/// succeeds or `timeout` elapses.
	pub fn push_or_timeout(&self, mut value: T, timeout: Duration, poll: Duration) -> Result<(), T> {
		let deadline = Instant::now() + timeout;
		let backoff = Backoff::new();
		loop {
			match self.push(value) {
				Ok(()) => return Ok(()),
				Err(v) => value = v,
			}
			if Instant::now() >= deadline {
				return Err(value);
			}
			if backoff.is_completed() {
				std::thread::sleep(poll);
			} else {
				backoff.snooze();
			}
		}
	}

	/// Busy-polls, sleeping `poll` between attempts, until a pop succeeds
	/// or `timeout` elapses.
	pub fn pop_or_timeout(&self, timeout: Duration, poll: Duration) -> Option<T> {
		let deadline = Instant::now() + timeout;
		let backoff = Backoff::new();
		loop {
			if let Some(v) = self.pop() {
				return Some(v);
			}
			if Instant::now() >= deadline {
				return None;
			}
			if backoff.is_completed() {
				std::thread::sleep(poll);
			} else {
				backoff.snooze();
			}
		}
	}

	/// Drops all queued elements. Only safe to call when no producer or
	/// consumer is concurrently operating on the ring.
	pub fn reset(&self) {
		while self.pop().is_some() {}
	}
}

impl<T> Drop for SpscRing<T> {
	fn drop(&mut self) {
		self.reset();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn push_pop_preserves_order() {
		let ring: SpscRing<u32> = SpscRing::new(4);
		for i in 0..4 {
			ring.push(i).unwrap();
		}
		assert!(ring.push(99).is_err());
		for i in 0..4 {
			assert_eq!(ring.pop(), Some(i));
		}
		assert_eq!(ring.pop(), None);
	}

	#[test]
	fn capacity_reports_usable_slots_not_internal_slots() {
		let ring: SpscRing<u8> = SpscRing::new(7);
		assert_eq!(ring.capacity(), 7);
		for _ in 0..7 {
			ring.push(0).unwrap();
		}
		assert!(ring.push(0).is_err());
	}

	#[test]
	fn pop_bulk_drains_up_to_requested_count() {
		let ring: SpscRing<u32> = SpscRing::new(8);
		for i in 0..5 {
			ring.push(i).unwrap();
		}
		let mut out: [Option<u32>; 3] = [None, None, None];
		let n = ring.pop_bulk(&mut out);
		assert_eq!(n, 3);
		assert_eq!(out, [Some(0), Some(1), Some(2)]);
		assert_eq!(ring.len(), 2);
	}

	#[test]
	fn push_or_timeout_fails_when_full_and_never_drained() {
		let ring: SpscRing<u32> = SpscRing::new(1);
		ring.push(1).unwrap();
		let start = Instant::now();
		let result = ring.push_or_timeout(2, Duration::from_millis(30), Duration::from_millis(5));
		assert_eq!(result, Err(2));
		assert!(start.elapsed() >= Duration::from_millis(30));
	}

	#[test]
	fn pop_or_timeout_succeeds_once_producer_catches_up() {
		let ring: std::sync::Arc<SpscRing<u32>> = std::sync::Arc::new(SpscRing::new(4));
		let producer = ring.clone();
		let handle = std::thread::spawn(move || {
			std::thread::sleep(Duration::from_millis(20));
			producer.push(7).unwrap();
		});
		let got = ring.pop_or_timeout(Duration::from_millis(500), Duration::from_millis(2));
		assert_eq!(got, Some(7));
		handle.join().unwrap();
	}

	#[test]
	fn concurrent_producer_and_consumer_preserve_fifo_order() {
		let ring: std::sync::Arc<SpscRing<u32>> = std::sync::Arc::new(SpscRing::new(16));
		let producer = ring.clone();
		let producer_thread = std::thread::spawn(move || {
			for i in 0..1000u32 {
				while producer.push(i).is_err() {
					std::thread::yield_now();
				}
			}
		});
		let mut received = Vec::with_capacity(1000);
		while received.len() < 1000 {
			if let Some(v) = ring.pop() {
				received.push(v);
			} else {
				std::thread::yield_now();
			}
		}
		producer_thread.join().unwrap();
		assert_eq!(received, (0..1000).collect::<Vec<_>>());
	}
}
