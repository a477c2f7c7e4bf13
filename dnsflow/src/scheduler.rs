//! Single-threaded cooperative event loop. Drains the capture
//! (poll-driven in live mode, drained once up front in file mode), and fires
//! jittered push/stats timers. Modeled on the runtime crate's own `exec`
//! loop (an `EXIT` flag flipped by a signal handler, looped until shutdown),
//! but polls the capture fd directly rather than going through the generic
//! socket `Io<T>` abstraction: a pcap handle is drained with `pcap_dispatch`,
//! not `recv`. Forked workers also poll a [`ParentWatch`] each tick so an
//! orphaned worker exits instead of capturing forever with nobody left to
//! reap it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use capture::flow::CaptureStats;
use rand::Rng;

use crate::capturewrap::CaptureHandle;
use crate::config::Config;
use crate::parentwatch::ParentWatch;
use crate::worker::Worker;

const PUSH_INTERVAL: Duration = Duration::from_secs(1);
const PUSH_JITTER: Duration = Duration::from_secs(1);
const STATS_INTERVAL: Duration = Duration::from_secs(10);
const STATS_JITTER: Duration = Duration::from_secs(2);
/// Print a human-readable stats line once every sixth tick (roughly once a minute).
const STATS_LOG_EVERY: u32 = 6;

static EXIT: AtomicBool = AtomicBool::new(false);
static CHILD_EXITED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigterm(_: libc::c_int) {
	EXIT.store(true, Ordering::Relaxed);
}

extern "C" fn on_sigchld(_: libc::c_int) {
	CHILD_EXITED.store(true, Ordering::Relaxed);
}

fn jittered(base: Duration, jitter: Duration) -> Duration {
	let extra_ms = rand::thread_rng().gen_range(0..=jitter.as_millis() as u64);
	base + Duration::from_millis(extra_ms)
}

/// SIGINT goes through `ctrlc` (matching the runtime crate's own exec loop);
/// SIGTERM and SIGCHLD are installed directly since `ctrlc` only covers
/// Ctrl+C.
fn install_signal_handlers() -> Result<(), String> {
	ctrlc::set_handler(|| EXIT.store(true, Ordering::Relaxed)).map_err(|e| format!("failed to install SIGINT handler: {e}"))?;

	unsafe {
		if libc::signal(libc::SIGTERM, on_sigterm as libc::sighandler_t) == libc::SIG_ERR {
			return Err("failed to install SIGTERM handler".into());
		}
		if libc::signal(libc::SIGCHLD, on_sigchld as libc::sighandler_t) == libc::SIG_ERR {
			return Err("failed to install SIGCHLD handler".into());
		}
	}

	Ok(())
}

/// Runs one worker to completion. Returns once a clean-exit signal (or file
/// drain completion, in file mode) has been handled.
pub fn run(cfg: &Config, mut worker: Worker, child_pids: &[i32], is_forked_child: bool) -> Result<(), String> {
	install_signal_handlers()?;

	let is_file_mode = matches!(cfg.source, crate::config::Source::File { .. });

	if is_file_mode {
		run_file_mode(&mut worker);
		clean_exit(&mut worker, child_pids);
		return Ok(());
	}

	// Only a forked worker has a supervising parent worth watching; worker 1
	// (or a standalone, unforked run) is its own top of the tree.
	let parent_watch = is_forked_child.then(ParentWatch::install);

	let mut next_push = Instant::now() + jittered(PUSH_INTERVAL, PUSH_JITTER);
	let mut next_stats = Instant::now() + jittered(STATS_INTERVAL, STATS_JITTER);
	let mut stats_ticks: u32 = 0;

	loop {
		if EXIT.load(Ordering::Relaxed) {
			break;
		}

		if CHILD_EXITED.load(Ordering::Relaxed) {
			reap_children();
			break;
		}

		if let Some(watch) = &parent_watch {
			let mut orphaned = false;
			watch.on_orphan(|| orphaned = true);
			if orphaned {
				log::warn!("parent process gone, shutting down");
				break;
			}
		}

		let now = Instant::now();
		let timeout = next_push.min(next_stats).saturating_duration_since(now);

		poll_capture_fd(&worker, timeout);
		drain_live(&mut worker);

		let now = Instant::now();

		if now >= next_push {
			let due = worker.batch.last_send().map_or(true, |t| now.duration_since(t) >= PUSH_INTERVAL);
			if due {
				if let Some(datagram) = worker.batch.flush() {
					worker.emitter.emit(&datagram);
				}
			}
			next_push = now + jittered(PUSH_INTERVAL, PUSH_JITTER);
		}

		if now >= next_stats {
			if let Some(stats) = worker.emit_stats() {
				stats_ticks = stats_ticks.wrapping_add(1);
				if stats_ticks % STATS_LOG_EVERY == 0 {
					log_stats_line(stats);
				}
			}
			next_stats = now + jittered(STATS_INTERVAL, STATS_JITTER);
		}
	}

	clean_exit(&mut worker, child_pids);
	Ok(())
}

fn poll_capture_fd(worker: &Worker, timeout: Duration) {
	let Some(fd) = worker.capture.as_raw_fd() else { return };

	let mut pollfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };
	let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

	unsafe {
		libc::poll(&mut pollfd as *mut libc::pollfd, 1, timeout_ms);
	}
}

fn drain_live(worker: &mut Worker) {
	if !matches!(worker.capture, CaptureHandle::Live(_)) {
		return;
	}

	let mut packets: Vec<Vec<u8>> = Vec::new();
	worker.capture.loop_all(&mut |_ts, _ip_length, ip_bytes| {
		packets.push(ip_bytes.to_vec());
	});

	for bytes in packets {
		worker.on_packet(&bytes);
	}
}

fn run_file_mode(worker: &mut Worker) {
	let mut packets: Vec<Vec<u8>> = Vec::new();
	worker.capture.loop_all(&mut |_ts, _ip_length, ip_bytes| {
		packets.push(ip_bytes.to_vec());
	});

	for bytes in packets {
		worker.on_packet(&bytes);
	}

	worker.flush();
}

fn reap_children() {
	loop {
		let mut status: libc::c_int = 0;
		let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
		if pid <= 0 {
			break;
		}
		log::info!("child {pid} exited, shutting down");
	}
}

fn log_stats_line(stats: CaptureStats) {
	log::info!(
		"stats: captured={} received={} dropped={} ifdropped={} sample_rate={}",
		stats.captured,
		stats.received,
		stats.dropped,
		stats.ifdropped,
		stats.sample_rate
	);
}

/// Signal children, emit and log final stats (the single "emit final
/// stats" step for this shutdown, whichever mode got us here), then
/// terminate; the capture-file writer closes on its own when `worker`
/// goes out of scope.
fn clean_exit(worker: &mut Worker, child_pids: &[i32]) {
	for &pid in child_pids {
		unsafe {
			libc::kill(pid, libc::SIGTERM);
		}
	}

	if let Some(stats) = worker.emit_stats() {
		log_stats_line(stats);
	}

	log::info!("clean exit");
}
