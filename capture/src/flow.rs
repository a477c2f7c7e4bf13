//! The flow-packet builder: aggregates per-client record sets into a
//! single fixed buffer and flushes it on size/count thresholds. Also the
//! wire layout shared with the stats packet.

use core::mem::size_of;
use core::net::Ipv4Addr;
use core::time::Duration;
use std::time::Instant;

use log::error;
use utils::bytes::{self, Cast};
use utils::endian::{u16be, u32be};

use crate::dns::ExtractedRecord;

pub const MAX_DATAGRAM: usize = 65_535;
pub const FLUSH_SIZE: usize = 1_200;
pub const MAX_SETS: u8 = 255;
pub const PUSH_INTERVAL: Duration = Duration::from_secs(1);

const FLAG_STATS: u16 = 0x0001;

#[derive(Cast)]
#[repr(C)]
struct FlowHeader {
	version: u8,
	sets_count: u8,
	flags: u16be,
	sequence: u32be,
}

#[derive(Cast)]
#[repr(C)]
struct FlowSetHeader {
	client_ip: Ipv4Addr,
	names_count: u8,
	ips_count: u8,
	names_len: u16be,
}

#[derive(Cast)]
#[repr(C)]
struct StatsCounters {
	captured: u32be,
	received: u32be,
	dropped: u32be,
	ifdropped: u32be,
	sample_rate: u32be,
}

/// Capture counters as read from the capture collaborator, ready to be
/// serialized by [`build_stats_datagram`].
#[derive(Clone, Copy, Default)]
pub struct CaptureStats {
	pub captured: u32,
	pub received: u32,
	pub dropped: u32,
	pub ifdropped: u32,
	pub sample_rate: u32,
}

fn round_up_4(n: usize) -> usize {
	(n + 3) & !3
}

/// The worker's reused flow-datagram buffer. Sequence numbers
/// are shared with stats datagrams built from [`build_stats_datagram`]; the
/// caller must feed this batch's [`FlowBatch::next_sequence`] into both.
pub struct FlowBatch {
	buf: Box<[u8; MAX_DATAGRAM]>,
	len: usize,
	sets_count: u8,
	sequence: u32,
	last_send: Option<Instant>,
}

impl FlowBatch {
	pub fn new() -> Self {
		Self {
			buf: Box::new([0; MAX_DATAGRAM]),
			len: 0,
			sets_count: 0,
			sequence: 1,
			last_send: None,
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	pub fn last_send(&self) -> Option<Instant> {
		self.last_send
	}

	/// The sequence number that will be stamped on the next flushed datagram.
	pub fn next_sequence(&self) -> u32 {
		self.sequence
	}

	/// Consume the next sequence number, for a stats datagram interleaved
	/// between data flushes.
	pub fn take_sequence(&mut self) -> u32 {
		let seq = self.sequence;
		self.sequence = self.sequence.wrapping_add(1);
		seq
	}

	fn ensure_header(&mut self) {
		if self.len == 0 {
			let header: &mut FlowHeader = bytes::cast_mut(&mut self.buf[..size_of::<FlowHeader>()]);
			header.version = 2;
			header.sets_count = 0;
			header.flags = 0u16.into();
			header.sequence = 0u32.into();
			self.len = size_of::<FlowHeader>();
		}
	}

	/// Append a per-client record set. Returns the serialized datagram if
	/// this append crossed the size or count flush threshold.
	pub fn append(&mut self, client_ip: Ipv4Addr, record: &ExtractedRecord) -> Option<Vec<u8>> {
		self.ensure_header();

		let names: Vec<&[u8]> = record.names.iter().take(255).map(Vec::as_slice).collect();
		let ips: Vec<Ipv4Addr> = record.ips.iter().take(255).copied().collect();

		let raw_names_len: usize = names.iter().map(|n| n.len()).sum();
		let names_len = round_up_4(raw_names_len);
		let needed = size_of::<FlowSetHeader>() + names_len + ips.len() * size_of::<Ipv4Addr>();

		if self.len + needed > MAX_DATAGRAM {
			error!("flow batch overflow appending set for {client_ip}, discarding batch");
			self.len = 0;
			self.sets_count = 0;
			return None;
		}

		let set_hdr_start = self.len;
		let names_start = set_hdr_start + size_of::<FlowSetHeader>();

		{
			let mut pos = names_start;

			for name in &names {
				self.buf[pos..pos + name.len()].copy_from_slice(name);
				pos += name.len();
			}

			self.buf[pos..names_start + names_len].fill(0);
		}

		let ips_start = names_start + names_len;

		for (i, ip) in ips.iter().enumerate() {
			self.buf[ips_start + i * 4..ips_start + i * 4 + 4].copy_from_slice(&ip.octets());
		}

		let set_hdr: &mut FlowSetHeader = bytes::cast_mut(&mut self.buf[set_hdr_start..names_start]);
		set_hdr.client_ip = client_ip;
		set_hdr.names_count = names.len() as u8;
		set_hdr.ips_count = ips.len() as u8;
		set_hdr.names_len = (names_len as u16).into();

		self.len = ips_start + ips.len() * 4;
		self.sets_count += 1;

		let header: &mut FlowHeader = bytes::cast_mut(&mut self.buf[..size_of::<FlowHeader>()]);
		header.sets_count = self.sets_count;

		if self.len >= FLUSH_SIZE || self.sets_count == MAX_SETS {
			return self.flush();
		}

		None
	}

	/// Stamp the sequence number and hand the buffer off, resetting the
	/// batch. A no-op (returns `None`) when the batch is empty.
	pub fn flush(&mut self) -> Option<Vec<u8>> {
		if self.len == 0 {
			return None;
		}

		let sequence = self.take_sequence();

		let header: &mut FlowHeader = bytes::cast_mut(&mut self.buf[..size_of::<FlowHeader>()]);
		header.sequence = sequence.into();

		let out = self.buf[..self.len].to_vec();
		self.len = 0;
		self.sets_count = 0;
		self.last_send = Some(Instant::now());

		Some(out)
	}
}

impl Default for FlowBatch {
	fn default() -> Self {
		Self::new()
	}
}

/// Build a standalone stats datagram: a [`FlowHeader`] with
/// `sets_count = 1` and `flags = 0x0001`, followed by the five counters.
pub fn build_stats_datagram(sequence: u32, stats: CaptureStats) -> Vec<u8> {
	let mut buf = vec![0u8; size_of::<FlowHeader>() + size_of::<StatsCounters>()];

	let header: &mut FlowHeader = bytes::cast_mut(&mut buf[..size_of::<FlowHeader>()]);
	header.version = 2;
	header.sets_count = 1;
	header.flags = FLAG_STATS.into();
	header.sequence = sequence.into();

	let counters: &mut StatsCounters = bytes::cast_mut(&mut buf[size_of::<FlowHeader>()..]);
	counters.captured = stats.captured.into();
	counters.received = stats.received.into();
	counters.dropped = stats.dropped.into();
	counters.ifdropped = stats.ifdropped.into();
	counters.sample_rate = stats.sample_rate.into();

	buf
}
