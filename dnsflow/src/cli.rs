use clap::Parser;

/// Observe DNS traffic and emit aggregated flow summaries of successful
/// recursive A-record responses.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Args {
	/// Capture interface to listen on.
	#[arg(short = 'i', long = "interface")]
	pub interface: Option<String>,

	/// Read packets from a capture file instead of a live interface.
	#[arg(short = 'r', long = "read-file")]
	pub read_file: Option<String>,

	/// Override the auto-generated capture filter expression.
	#[arg(short = 'f', long = "filter")]
	pub filter: Option<String>,

	/// Manual shard assignment as `i/n` (this worker is index i of n).
	#[arg(short = 'm', long = "shard")]
	pub shard: Option<String>,

	/// Auto-fork into n worker processes.
	#[arg(short = 'M', long = "auto-fork")]
	pub auto_fork: Option<u32>,

	/// Disable promiscuous mode on the capture interface.
	#[arg(short = 'p', long = "no-promisc")]
	pub no_promisc: bool,

	/// Write the process id to this file, holding an exclusive lock.
	#[arg(short = 'P', long = "pid-file")]
	pub pid_file: Option<String>,

	/// Capture sample rate (1 in N packets).
	#[arg(short = 's', long = "sample-rate")]
	pub sample_rate: Option<u32>,

	/// UDP destination to emit flow datagrams to (repeatable, max 10).
	#[arg(short = 'u', long = "udp-dest")]
	pub udp_dest: Vec<String>,

	/// Destination port identifying pcap-record-encapsulated traffic.
	#[arg(short = 'X', long = "pcap-record-port")]
	pub pcap_record_port: Option<u16>,

	/// Destination port identifying JMirror-encapsulated traffic.
	#[arg(short = 'J', long = "jmirror-port")]
	pub jmirror_port: Option<u16>,

	/// Also match mDNS (port 5353) in the generated filter.
	#[arg(short = 'Y', long = "mdns")]
	pub mdns: bool,

	/// Write flow datagrams to a capture file instead of (or in addition to) UDP.
	#[arg(short = 'w', long = "write-file")]
	pub write_file: Option<String>,

	/// Print the generated filter expression for the given shard/encap and exit.
	#[arg(short = 'n', long = "dry-run")]
	pub dry_run: bool,

	/// Increase log verbosity (repeatable).
	#[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
	pub verbose: u8,
}
