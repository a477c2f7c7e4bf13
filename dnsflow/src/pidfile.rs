//! Exclusive, non-blocking advisory locking on a pid file, so a second
//! instance pointed at the same `-P` path fails fast instead of racing the
//! first for the capture device.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;

pub struct PidFile {
	file: File,
}

impl PidFile {
	/// Opens (creating if needed) `path`, takes an exclusive non-blocking
	/// `flock`, and writes the current pid. The lock is released when the
	/// returned `PidFile` is dropped or the process exits.
	pub fn acquire(path: &str) -> Result<Self, String> {
		let file = OpenOptions::new()
			.create(true)
			.write(true)
			.truncate(false)
			.open(path)
			.map_err(|e| format!("open {path}: {e}"))?;

		let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
		if rc != 0 {
			return Err(format!("{path} is locked by another process"));
		}

		let mut file = file;
		file.set_len(0).map_err(|e| format!("truncate {path}: {e}"))?;
		write!(file, "{}", std::process::id()).map_err(|e| format!("write {path}: {e}"))?;

		Ok(PidFile { file })
	}
}

impl Drop for PidFile {
	fn drop(&mut self) {
		unsafe {
			libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
		}
	}
}
