//! Thin wrapper over the `pcap` crate presenting the single surface the
//! scheduler needs: open a live device or capture file, install a filter,
//! drain packets through a callback, and read the underlying capture stats.

use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, SystemTime};

use pcap::{Active, Capture, Device, Offline};
use thiserror::Error;

/// Fatal, startup-time capture failures: interface lookup/open, activation,
/// or filter compile/install. Reported the same way as `ConfigError` —
/// printed to stderr, exit code 1 — never logged through the runtime
/// facade, since nothing is listening to it yet.
#[derive(Debug, Error)]
pub enum CaptureInitError {
	#[error("list capture devices: {0}")]
	ListDevices(pcap::Error),
	#[error("no such interface: {0}")]
	NoSuchInterface(String),
	#[error("look up default capture device: {0}")]
	LookupDevice(pcap::Error),
	#[error("no default capture device found")]
	NoDefaultDevice,
	#[error("open capture device: {0}")]
	OpenDevice(pcap::Error),
	#[error("activate capture: {0}")]
	Activate(pcap::Error),
	#[error("set capture non-blocking: {0}")]
	SetNonblock(pcap::Error),
	#[error("open capture file {0}: {1}")]
	OpenFile(String, pcap::Error),
	#[error("compile/install filter `{0}`: {1}")]
	Filter(String, pcap::Error),
}

pub struct Stats {
	pub received: u32,
	pub dropped: u32,
	pub ifdropped: u32,
}

pub enum CaptureHandle {
	Live(Capture<Active>),
	File(Capture<Offline>),
}

/// Callback signature every drained packet is handed to: capture timestamp,
/// on-wire length, and the (possibly snapped) bytes actually captured.
pub type PacketFn<'a> = dyn FnMut(SystemTime, u32, &[u8]) + 'a;

impl CaptureHandle {
	pub fn init_live(interface: Option<&str>, promisc: bool) -> Result<Self, CaptureInitError> {
		let device = match interface {
			Some(name) => Device::list()
				.map_err(CaptureInitError::ListDevices)?
				.into_iter()
				.find(|d| d.name == name)
				.ok_or_else(|| CaptureInitError::NoSuchInterface(name.to_string()))?,
			None => Device::lookup()
				.map_err(CaptureInitError::LookupDevice)?
				.ok_or(CaptureInitError::NoDefaultDevice)?,
		};

		let capture = Capture::from_device(device)
			.map_err(CaptureInitError::OpenDevice)?
			.promisc(promisc)
			.immediate_mode(true)
			.open()
			.map_err(CaptureInitError::Activate)?;

		// `setnonblock` consumes and re-wraps the handle.
		let capture = capture.setnonblock().map_err(CaptureInitError::SetNonblock)?;

		Ok(CaptureHandle::Live(capture))
	}

	pub fn init_file(path: &str) -> Result<Self, CaptureInitError> {
		let capture = Capture::from_file(path).map_err(|e| CaptureInitError::OpenFile(path.to_string(), e))?;
		Ok(CaptureHandle::File(capture))
	}

	pub fn set_filter(&mut self, expr: &str) -> Result<(), CaptureInitError> {
		match self {
			CaptureHandle::Live(c) => c.filter(expr, true),
			CaptureHandle::File(c) => c.filter(expr, true),
		}
		.map_err(|e| CaptureInitError::Filter(expr.to_string(), e))
	}

	/// Raw fd to poll in live mode. Capture files are drained eagerly via
	/// [`CaptureHandle::loop_all`] instead and have no meaningful fd to poll.
	pub fn as_raw_fd(&self) -> Option<RawFd> {
		match self {
			CaptureHandle::Live(c) => Some(c.as_raw_fd()),
			CaptureHandle::File(_) => None,
		}
	}

	/// Drain every packet currently available without blocking, handing each
	/// to `f`. In live mode this is called once per fd-readable wakeup; in
	/// file mode it is called once at startup to replay the whole file.
	pub fn loop_all(&mut self, f: &mut PacketFn) {
		loop {
			let packet = match self {
				CaptureHandle::Live(c) => c.next_packet(),
				CaptureHandle::File(c) => c.next_packet(),
			};

			match packet {
				Ok(packet) => {
					let ts = SystemTime::UNIX_EPOCH
						+ Duration::from_secs(packet.header.ts.tv_sec as u64)
						+ Duration::from_micros(packet.header.ts.tv_usec as u64);

					f(ts, packet.header.len, packet.data);
				}
				Err(pcap::Error::NoMorePackets) => break,
				Err(pcap::Error::TimeoutExpired) => break,
				Err(_) => break,
			}
		}
	}

	pub fn get_stats(&mut self) -> Option<Stats> {
		let stat = match self {
			CaptureHandle::Live(c) => c.stats().ok()?,
			CaptureHandle::File(c) => c.stats().ok()?,
		};

		Some(Stats { received: stat.received, dropped: stat.dropped, ifdropped: stat.if_dropped })
	}
}
