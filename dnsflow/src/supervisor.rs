//! Multi-process supervisor: forks `n` worker processes sharing no
//! state beyond the inherited capture filter expression. Each worker opens
//! its own capture handle and runs its own scheduler; only `(worker_index,
//! n_workers)` differs between them.

pub const MAX_WORKERS: u32 = 64;

pub enum ForkResult {
	/// This process is worker `index` of `n_workers`, with no children of
	/// its own to track.
	Child { index: u32 },
	/// This process is the parent (worker 1), with the PIDs of every forked
	/// child so it can signal them on shutdown.
	Parent { child_pids: Vec<i32> },
}

/// Forks `n - 1` additional worker processes. The parent keeps index 1 and
/// returns the PIDs of every child it spawned; each child returns its own
/// 1-based index with an empty child table.
pub fn fork_workers(n: u32) -> Result<ForkResult, String> {
	if n == 0 || n > MAX_WORKERS {
		return Err(format!("worker count {n} out of range (1..={MAX_WORKERS})"));
	}

	if n == 1 {
		return Ok(ForkResult::Parent { child_pids: Vec::new() });
	}

	let mut child_pids = Vec::new();

	for index in 2..=n {
		let pid = unsafe { libc::fork() };

		match pid {
			-1 => return Err(format!("fork() for worker {index} failed: {}", std::io::Error::last_os_error())),
			0 => return Ok(ForkResult::Child { index }),
			child_pid => child_pids.push(child_pid as i32),
		}
	}

	Ok(ForkResult::Parent { child_pids })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn single_worker_is_a_parent_with_no_children() {
		match fork_workers(1).unwrap() {
			ForkResult::Parent { child_pids } => assert!(child_pids.is_empty()),
			ForkResult::Child { .. } => panic!("n=1 must not fork"),
		}
	}

	#[test]
	fn rejects_zero_and_over_max() {
		assert!(fork_workers(0).is_err());
		assert!(fork_workers(MAX_WORKERS + 1).is_err());
	}
}
