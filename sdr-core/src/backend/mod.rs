//! Raw transport backends (§4.5, §4.6).
//!
//! Both the command and data transports are generic over a [`Backend`]:
//! a pair of blocking send/receive operations on raw bytes. Framing,
//! sequencing, and dispatch all live one layer up in `transport`; a
//! backend only knows how to move bytes to and from the device.

mod pcie;
mod udp;

pub use pcie::PcieBackend;
pub use udp::{UdpBackend, UdpRole};

use crate::error::TransportError;

/// A raw duplex channel to the device. Implementations must make `recv`
/// return periodically (via an internal read timeout) so the owning
/// receiver thread can observe a shutdown flag between blocking calls.
pub trait Backend: Send + Sync {
	/// Sends one complete, already-encoded frame.
	fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

	/// Blocks for up to the backend's configured poll interval waiting
	/// for one frame, writing it into `buf` and returning its length.
	/// Returns [`TransportError::Io`] with `ErrorKind::WouldBlock` or
	/// `ErrorKind::TimedOut` on a harmless poll timeout; callers treat
	/// those as "nothing arrived yet, check shutdown and retry".
	fn recv(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

	/// Unblocks any in-progress or future `recv` call, used during
	/// shutdown so the receiver thread can observe the stop flag
	/// promptly instead of waiting out its poll interval.
	fn shutdown(&self);
}

pub(crate) fn is_timeout(err: &TransportError) -> bool {
	matches!(
		err,
		TransportError::Io(e)
			if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
	)
}
