mod capturewrap;
mod cli;
mod config;
mod emitter;
mod parentwatch;
mod pidfile;
mod scheduler;
mod supervisor;
mod worker;

use clap::Parser;
use config::{Config, ConfigError, Source};
use emitter::Emitter;
use thiserror::Error;
use worker::Worker;

/// The two fatal-at-startup error families named in the error taxonomy,
/// plus a catch-all for scheduler-loop setup failures. `Config` and
/// `CaptureInit` are printed straight to stderr and exit 1, matching each
/// other's presentation rather than going through the logger.
#[derive(Debug, Error)]
enum RunError {
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error(transparent)]
	CaptureInit(#[from] capturewrap::CaptureInitError),
	#[error("{0}")]
	Other(String),
}

fn install_logger(verbose: u8) {
	static LOGGER: runtime::logger::Logger = runtime::logger::Logger;

	let level = match verbose {
		0 => log::LevelFilter::Info,
		1 => log::LevelFilter::Debug,
		_ => log::LevelFilter::Trace,
	};

	log::set_logger(&LOGGER).expect("logger installed once");
	log::set_max_level(level);
}

fn run(cfg: Config, child_pids: Vec<i32>, is_forked_child: bool) -> Result<(), RunError> {
	// Only worker 1 holds the pid file: forked workers would otherwise race
	// each other for the same lock.
	if cfg.shard.worker_index == 1 {
		if let Some(pid_file) = &cfg.pid_file {
			let lock = pidfile::PidFile::acquire(pid_file).map_err(|_| ConfigError::PidFileContention(pid_file.clone()))?;
			// Held for the lifetime of the process; the lock is released on drop (exit).
			std::mem::forget(lock);
		}
	}

	let filter_expr = cfg.filter_expr();
	log::info!("using filter: {filter_expr}");

	let mut capture = match &cfg.source {
		Source::Live { interface, promisc } => capturewrap::CaptureHandle::init_live(interface.as_deref(), *promisc)?,
		Source::File { path } => capturewrap::CaptureHandle::init_file(path)?,
	};

	capture.set_filter(&filter_expr)?;

	let file_writer = match &cfg.write_file {
		Some(path) => Some(capture::pcapfile::Writer::create(path).map_err(|_| RunError::Other("unable to create output capture file".to_string()))?),
		None => None,
	};

	let emitter = Emitter::new(cfg.udp_dests.clone(), file_writer);
	let worker = Worker::new(capture, emitter, cfg.encap, cfg.sample_rate);

	scheduler::run(&cfg, worker, &child_pids, is_forked_child).map_err(RunError::Other)
}

fn main() {
	let args = cli::Args::parse();
	install_logger(args.verbose);

	let mut cfg = match Config::from_args(args) {
		Ok(cfg) => cfg,
		Err(e) => {
			eprintln!("dnsflow: {e}");
			std::process::exit(1);
		}
	};

	if cfg.dry_run {
		println!("{}", cfg.filter_expr());
		return;
	}

	// Fork before opening the capture, so each worker independently
	// opens its own handle and filters on its own (worker_index, n_workers).
	let (child_pids, is_forked_child) = match cfg.auto_fork {
		Some(n) => match supervisor::fork_workers(n) {
			Ok(supervisor::ForkResult::Parent { child_pids }) => (child_pids, false),
			Ok(supervisor::ForkResult::Child { index }) => {
				cfg.shard.worker_index = index;
				(Vec::new(), true)
			}
			Err(e) => {
				eprintln!("dnsflow: {e}");
				std::process::exit(1);
			}
		},
		None => (Vec::new(), false),
	};

	match run(cfg, child_pids, is_forked_child) {
		Ok(()) => {}
		Err(e @ (RunError::Config(_) | RunError::CaptureInit(_))) => {
			eprintln!("dnsflow: {e}");
			std::process::exit(1);
		}
		Err(RunError::Other(e)) => {
			log::error!("{e}");
			std::process::exit(1);
		}
	}
}
