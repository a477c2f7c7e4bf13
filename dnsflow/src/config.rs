use core::net::Ipv4Addr;
use std::str::FromStr;

use capture::EncapConfig;
use thiserror::Error;

use crate::cli::Args;
use crate::supervisor::MAX_WORKERS;

pub const MAX_UDP_DESTS: usize = 10;
pub const FLOW_DEST_PORT: u16 = 5300;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid shard spec `{0}`, expected `i/n`")]
	InvalidShard(String),
	#[error("-M (auto-fork) conflicts with -w (file output): different workers cannot share a capture file writer")]
	AutoForkConflictsWithFileOutput,
	#[error("auto-fork worker count {0} exceeds the maximum of {MAX_WORKERS}")]
	TooManyWorkers(u32),
	#[error("invalid UDP destination `{0}`: {1}")]
	InvalidDestination(String, std::net::AddrParseError),
	#[error("at most {MAX_UDP_DESTS} UDP destinations are supported, got {0}")]
	TooManyDestinations(usize),
	#[error("pid file `{0}` is already locked by another instance")]
	PidFileContention(String),
	#[error("no output configured: pass at least one of -u or -w")]
	MissingOutput,
	#[error("-i/--interface and -r/--read-file are mutually exclusive")]
	ConflictingSource,
	#[error("neither -i/--interface nor -r/--read-file was given")]
	MissingSource,
}

/// Which encapsulated/bare capture source the worker reads from.
pub enum Source {
	Live { interface: Option<String>, promisc: bool },
	File { path: String },
}

/// This worker's position within the shard.
#[derive(Clone, Copy)]
pub struct Shard {
	pub worker_index: u32,
	pub n_workers: u32,
}

/// Fully validated, resolved configuration for one worker process.
pub struct Config {
	pub source: Source,
	pub filter_override: Option<String>,
	pub shard: Shard,
	pub auto_fork: Option<u32>,
	pub pid_file: Option<String>,
	pub sample_rate: u32,
	pub udp_dests: Vec<Ipv4Addr>,
	pub encap: EncapConfig,
	pub mdns: bool,
	pub write_file: Option<String>,
	pub dry_run: bool,
	pub verbose: u8,
}

fn parse_shard(spec: &str) -> Result<Shard, ConfigError> {
	let (i, n) = spec.split_once('/').ok_or_else(|| ConfigError::InvalidShard(spec.to_string()))?;

	let worker_index: u32 = i.parse().map_err(|_| ConfigError::InvalidShard(spec.to_string()))?;
	let n_workers: u32 = n.parse().map_err(|_| ConfigError::InvalidShard(spec.to_string()))?;

	if worker_index == 0 || worker_index > n_workers {
		return Err(ConfigError::InvalidShard(spec.to_string()));
	}

	Ok(Shard { worker_index, n_workers })
}

impl Config {
	pub fn from_args(args: Args) -> Result<Self, ConfigError> {
		if args.interface.is_some() && args.read_file.is_some() {
			return Err(ConfigError::ConflictingSource);
		}

		if args.auto_fork.is_some() && args.write_file.is_some() {
			return Err(ConfigError::AutoForkConflictsWithFileOutput);
		}

		if let Some(n) = args.auto_fork {
			if n > MAX_WORKERS {
				return Err(ConfigError::TooManyWorkers(n));
			}
		}

		let shard = match (&args.shard, &args.auto_fork) {
			(Some(spec), _) => parse_shard(spec)?,
			(None, Some(n)) => Shard { worker_index: 1, n_workers: *n },
			(None, None) => Shard { worker_index: 1, n_workers: 1 },
		};

		if args.udp_dest.len() > MAX_UDP_DESTS {
			return Err(ConfigError::TooManyDestinations(args.udp_dest.len()));
		}

		let udp_dests = args
			.udp_dest
			.iter()
			.map(|s| Ipv4Addr::from_str(s).map_err(|e| ConfigError::InvalidDestination(s.clone(), e)))
			.collect::<Result<Vec<_>, _>>()?;

		if udp_dests.is_empty() && args.write_file.is_none() && !args.dry_run {
			return Err(ConfigError::MissingOutput);
		}

		let source = match (args.interface, args.read_file) {
			(Some(interface), None) => Source::Live { interface: Some(interface), promisc: !args.no_promisc },
			(None, Some(path)) => Source::File { path },
			(None, None) if args.dry_run => Source::Live { interface: None, promisc: !args.no_promisc },
			(None, None) => return Err(ConfigError::MissingSource),
			(Some(_), Some(_)) => unreachable!("checked above"),
		};

		Ok(Config {
			source,
			filter_override: args.filter,
			shard,
			auto_fork: args.auto_fork,
			pid_file: args.pid_file,
			sample_rate: args.sample_rate.unwrap_or(1),
			udp_dests,
			encap: EncapConfig { pcap_record_port: args.pcap_record_port, jmirror_port: args.jmirror_port },
			mdns: args.mdns,
			write_file: args.write_file,
			dry_run: args.dry_run,
			verbose: args.verbose,
		})
	}

	/// The encap offset implied by whichever encap port is configured.
	pub fn encap_offset(&self) -> usize {
		if self.encap.pcap_record_port.is_some() {
			capture::encap::PCAP_RECORD_ENCAP_LEN
		} else if self.encap.jmirror_port.is_some() {
			capture::encap::JMIRROR_ENCAP_LEN
		} else {
			0
		}
	}

	pub fn filter_expr(&self) -> String {
		self.filter_override.clone().unwrap_or_else(|| {
			capture::filter::generate(self.encap_offset(), self.shard.worker_index, self.shard.n_workers, self.mdns)
		})
	}
}
