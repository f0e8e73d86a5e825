//! PCIe DMA transport backend (§4.6).
//!
//! Wraps a character device exposing the ioctl/mmap contract below. The
//! ioctl request codes are a hardware/driver contract external to this
//! core; they live in their own isolated module ([`ioctl_numbers`]) so a
//! real deployment can drop in the vendor header's numbers without
//! touching any of the transport logic around them.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use crate::backend::Backend;
use crate::config::PcieTransportConfig;
use crate::error::TransportError;

/// Ioctl request codes for the DMA character device. These are
/// placeholders: a real deployment supplies the numbers generated from
/// the vendor driver header for its kernel module ABI.
mod ioctl_numbers {
	pub const RX_CLEAR_DATA: u64 = 0x4000;
	pub const RX_CLEAR_CTRL: u64 = 0x4001;
	pub const TX_RESET: u64 = 0x4002;
	pub const GET_DATA_MSG_BUFFER_SIZE: u64 = 0x4003;
	pub const TX_BUFFER_CNT: u64 = 0x4004;
	pub const RX_BUFFER_CNT: u64 = 0x4005;
	pub const GET_TX_DEV_DDR_SIZE: u64 = 0x4006;
	pub const GET_RX_DEV_DDR_SIZE: u64 = 0x4007;
	pub const MMAP_TX_SEL: u64 = 0x4008;
	pub const CHECKOUT_TX_BUFFER: u64 = 0x4009;
	pub const UPLOAD_TX_BUFFER_BLOCKING: u64 = 0x400A;
	pub const RELEASE_TX_BUFFER: u64 = 0x400B;
	pub const CHECKOUT_RX_BUFFER_BLOCKING: u64 = 0x400C;
	pub const RELEASE_RX_BUFFER: u64 = 0x400D;
	pub const TX_BLOCK_TIMEOUT: u64 = 0x400E;
	pub const RX_BLOCK_TIMEOUT: u64 = 0x400F;
	pub const TX_IOCTL_BLOCK_TIMEOUT: u64 = 0x4010;
	pub const RX_IOCTL_BLOCK_TIMEOUT: u64 = 0x4011;
}

fn ioctl(fd: i32, request: u64, arg: i64) -> io::Result<i64> {
	// SAFETY: `fd` is a valid, open character device owned by `self`, and
	// every request code above is a simple integer in/out ioctl with no
	// further pointer arguments.
	let rc = unsafe { libc::ioctl(fd, request as _, arg) };
	if rc < 0 {
		return Err(io::Error::last_os_error());
	}
	Ok(rc as i64)
}

struct DmaSlot {
	ptr: *mut u8,
	len: usize,
}

// SAFETY: each slot is exclusively owned by the checkout/release protocol
// enforced by `PcieBackend`; no two threads touch the same slot concurrently.
unsafe impl Send for DmaSlot {}
unsafe impl Sync for DmaSlot {}

pub struct PcieBackend {
	file: File,
	slot_bytes: usize,
	tx_dev_ddr_bytes: usize,
	rx_dev_ddr_bytes: usize,
	tx_slots: Vec<DmaSlot>,
	rx_slots: Vec<DmaSlot>,
}

impl PcieBackend {
	pub fn open(cfg: &PcieTransportConfig) -> Result<Self, TransportError> {
		let file = OpenOptions::new().read(true).write(true).open(&cfg.device_path)?;
		let fd = file.as_raw_fd();

		ioctl(fd, ioctl_numbers::RX_CLEAR_DATA, 0)?;
		ioctl(fd, ioctl_numbers::RX_CLEAR_CTRL, 0)?;
		ioctl(fd, ioctl_numbers::TX_RESET, 0)?;
		ioctl(fd, ioctl_numbers::TX_BLOCK_TIMEOUT, 1000)?;
		ioctl(fd, ioctl_numbers::RX_BLOCK_TIMEOUT, 1000)?;
		ioctl(fd, ioctl_numbers::TX_IOCTL_BLOCK_TIMEOUT, 1000)?;
		ioctl(fd, ioctl_numbers::RX_IOCTL_BLOCK_TIMEOUT, 1000)?;

		let slot_bytes = ioctl(fd, ioctl_numbers::GET_DATA_MSG_BUFFER_SIZE, 0)? as usize;
		let tx_count = ioctl(fd, ioctl_numbers::TX_BUFFER_CNT, 0)? as usize;
		let rx_count = ioctl(fd, ioctl_numbers::RX_BUFFER_CNT, 0)? as usize;
		let tx_dev_ddr_bytes = ioctl(fd, ioctl_numbers::GET_TX_DEV_DDR_SIZE, 0)? as usize;
		let rx_dev_ddr_bytes = ioctl(fd, ioctl_numbers::GET_RX_DEV_DDR_SIZE, 0)? as usize;

		ioctl(fd, ioctl_numbers::MMAP_TX_SEL, 1)?;
		let tx_slots = (0..tx_count).map(|i| mmap_slot(fd, i, slot_bytes)).collect::<Result<_, _>>()?;

		ioctl(fd, ioctl_numbers::MMAP_TX_SEL, 0)?;
		let rx_slots = (0..rx_count).map(|i| mmap_slot(fd, i, slot_bytes)).collect::<Result<_, _>>()?;

		log::info!(
			"pcie backend opened {} ({tx_count} tx / {rx_count} rx slots of {slot_bytes}B, dev DDR {tx_dev_ddr_bytes}B tx / {rx_dev_ddr_bytes}B rx)",
			cfg.device_path
		);
		Ok(Self { file, slot_bytes, tx_dev_ddr_bytes, rx_dev_ddr_bytes, tx_slots, rx_slots })
	}
}

fn mmap_slot(fd: i32, index: usize, len: usize) -> Result<DmaSlot, TransportError> {
	let ptr = unsafe {
		libc::mmap(
			std::ptr::null_mut(),
			len,
			libc::PROT_READ | libc::PROT_WRITE,
			libc::MAP_SHARED,
			fd,
			(index * len) as libc::off_t,
		)
	};
	if ptr == libc::MAP_FAILED {
		return Err(TransportError::Io(io::Error::last_os_error()));
	}
	Ok(DmaSlot { ptr: ptr as *mut u8, len })
}

impl Backend for PcieBackend {
	fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
		let fd = self.file.as_raw_fd();
		let idx = ioctl(fd, ioctl_numbers::CHECKOUT_TX_BUFFER, 0)? as usize;
		let slot = self.tx_slots.get(idx).ok_or_else(|| {
			TransportError::Io(io::Error::new(io::ErrorKind::InvalidData, "tx slot index out of range"))
		})?;
		let n = frame.len().min(slot.len);
		// SAFETY: slot `idx` was just exclusively checked out by the
		// ioctl above and is released unconditionally below.
		let copy_result = unsafe {
			std::ptr::copy_nonoverlapping(frame.as_ptr(), slot.ptr, n);
			ioctl(fd, ioctl_numbers::UPLOAD_TX_BUFFER_BLOCKING, n as i64)
		};
		let release_result = ioctl(fd, ioctl_numbers::RELEASE_TX_BUFFER, idx as i64);
		copy_result?;
		release_result?;
		Ok(())
	}

	fn recv(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
		let fd = self.file.as_raw_fd();
		let idx = ioctl(fd, ioctl_numbers::CHECKOUT_RX_BUFFER_BLOCKING, 0)? as usize;
		let slot = self.rx_slots.get(idx).ok_or_else(|| {
			TransportError::Io(io::Error::new(io::ErrorKind::InvalidData, "rx slot index out of range"))
		})?;
		// SAFETY: slot `idx` is exclusively ours until `RELEASE_RX_BUFFER`
		// below; the first 8 bytes of the region carry `packet_size`.
		let result = unsafe {
			let header_size = u16::from_le_bytes([*slot.ptr, *slot.ptr.add(1)]) as usize;
			let n = header_size.min(buf.len()).min(slot.len);
			std::ptr::copy_nonoverlapping(slot.ptr, buf.as_mut_ptr(), n);
			n
		};
		ioctl(fd, ioctl_numbers::RELEASE_RX_BUFFER, idx as i64)?;
		Ok(result)
	}

	fn shutdown(&self) {
		let fd = self.file.as_raw_fd();
		let _ = ioctl(fd, ioctl_numbers::TX_RESET, 0);
	}
}

impl Drop for PcieBackend {
	fn drop(&mut self) {
		let fd = self.file.as_raw_fd();
		for slot in self.tx_slots.iter().chain(self.rx_slots.iter()) {
			unsafe {
				libc::munmap(slot.ptr as *mut libc::c_void, slot.len);
			}
		}
		let _ = fd; // file itself closes via File's own Drop
	}
}

#[cfg(test)]
mod tests {
	use super::ioctl_numbers::*;

	#[test]
	fn ioctl_numbers_are_unique() {
		let codes = [
			RX_CLEAR_DATA,
			RX_CLEAR_CTRL,
			TX_RESET,
			GET_DATA_MSG_BUFFER_SIZE,
			TX_BUFFER_CNT,
			RX_BUFFER_CNT,
			GET_TX_DEV_DDR_SIZE,
			GET_RX_DEV_DDR_SIZE,
			MMAP_TX_SEL,
			CHECKOUT_TX_BUFFER,
			UPLOAD_TX_BUFFER_BLOCKING,
			RELEASE_TX_BUFFER,
			CHECKOUT_RX_BUFFER_BLOCKING,
			RELEASE_RX_BUFFER,
			TX_BLOCK_TIMEOUT,
			RX_BLOCK_TIMEOUT,
			TX_IOCTL_BLOCK_TIMEOUT,
			RX_IOCTL_BLOCK_TIMEOUT,
		];
		let mut sorted = codes.to_vec();
		sorted.sort_unstable();
		sorted.dedup();
		assert_eq!(sorted.len(), codes.len());
	}
}
