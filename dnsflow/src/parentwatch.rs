//! Detects when the forking parent has died so an orphaned worker can shut
//! itself down instead of capturing forever with nobody left to reap it.
//!
//! On Linux this rides the kernel's `PR_SET_PDEATHSIG`: a dedicated signal
//! delivered the instant the parent exits, caught here via a handler that
//! only flips an atomic (the scheduler decides what to do with it, same
//! pattern as `SIGTERM`/`SIGCHLD`). Everywhere else there is no such
//! primitive, so `is_orphaned` falls back to comparing `getppid()` against
//! the PID observed at install time; the scheduler's own tick cadence
//! doubles as the 1-second polling interval.

use std::sync::atomic::{AtomicBool, Ordering};

static PARENT_DEAD: AtomicBool = AtomicBool::new(false);

extern "C" fn on_parent_death(_: libc::c_int) {
	PARENT_DEAD.store(true, Ordering::Relaxed);
}

pub struct ParentWatch {
	original_ppid: i32,
}

impl ParentWatch {
	/// Installs death-signal delivery (Linux) or records the parent pid for
	/// polling (elsewhere). Call once per process, right after `fork()`.
	#[cfg(target_os = "linux")]
	pub fn install() -> Self {
		let original_ppid = unsafe { libc::getppid() };

		unsafe {
			libc::signal(libc::SIGUSR1, on_parent_death as libc::sighandler_t);
			libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGUSR1);
		}

		// The parent may have already exited between fork() and prctl().
		if unsafe { libc::getppid() } != original_ppid {
			PARENT_DEAD.store(true, Ordering::Relaxed);
		}

		ParentWatch { original_ppid }
	}

	#[cfg(not(target_os = "linux"))]
	pub fn install() -> Self {
		ParentWatch { original_ppid: unsafe { libc::getppid() } }
	}

	#[cfg(target_os = "linux")]
	fn is_orphaned(&self) -> bool {
		PARENT_DEAD.load(Ordering::Relaxed)
	}

	#[cfg(not(target_os = "linux"))]
	fn is_orphaned(&self) -> bool {
		unsafe { libc::getppid() } != self.original_ppid
	}

	/// Runs `callback` once if the parent is gone. Meant to be polled from
	/// the scheduler's own loop tick alongside its other shutdown flags.
	pub fn on_orphan(&self, callback: impl FnOnce()) {
		if self.is_orphaned() {
			callback();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn not_orphaned_immediately_after_install() {
		let watch = ParentWatch::install();
		let mut fired = false;
		watch.on_orphan(|| fired = true);
		assert!(!fired, "the test process's real parent is still alive");
	}
}
