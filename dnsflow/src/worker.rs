//! Per-worker state (one per process): the capture handle, the flow batch,
//! the emitter, and the counters needed to answer a stats tick. Constructed
//! once at startup and threaded through the scheduler's callbacks, rather
//! than reached for through process-level globals.

use core::net::Ipv4Addr;

use capture::flow::{CaptureStats, FlowBatch};
use capture::EncapConfig;

use crate::capturewrap::CaptureHandle;
use crate::emitter::Emitter;

pub struct Worker {
	pub capture: CaptureHandle,
	pub batch: FlowBatch,
	pub emitter: Emitter,
	pub encap: EncapConfig,
	pub sample_rate: u32,
	sample_counter: u32,
	captured: u32,
}

impl Worker {
	pub fn new(capture: CaptureHandle, emitter: Emitter, encap: EncapConfig, sample_rate: u32) -> Self {
		Worker {
			capture,
			batch: FlowBatch::new(),
			emitter,
			encap,
			sample_rate: sample_rate.max(1),
			sample_counter: 0,
			captured: 0,
		}
	}

	/// 1-in-`sample_rate` admission: every matching packet increments the
	/// counter, but only the first of each window is handed to the pipeline.
	fn admit_sample(&mut self) -> bool {
		let admit = self.sample_counter % self.sample_rate == 0;
		self.sample_counter = self.sample_counter.wrapping_add(1);
		admit
	}

	/// Run one captured, filter-matched frame through the pipeline, subject
	/// to sampling admission.
	pub fn on_packet(&mut self, ip_bytes: &[u8]) {
		if !self.admit_sample() {
			return;
		}

		self.captured = self.captured.wrapping_add(1);

		if let Some((client_ip, record)) = capture::process(ip_bytes, self.encap) {
			self.append(client_ip, &record);
		}
	}

	fn append(&mut self, client_ip: Ipv4Addr, record: &capture::dns::ExtractedRecord) {
		if let Some(datagram) = self.batch.append(client_ip, record) {
			self.emitter.emit(&datagram);
		}
	}

	/// Force a flush regardless of threshold, used by file-mode drain.
	pub fn flush(&mut self) {
		if let Some(datagram) = self.batch.flush() {
			self.emitter.emit(&datagram);
		}
	}

	/// Build and emit one stats datagram, sharing the batch's sequence
	/// counter. Returns the counters used, for the human-readable log line.
	pub fn emit_stats(&mut self) -> Option<CaptureStats> {
		let pcap_stats = self.capture.get_stats()?;

		let stats = CaptureStats {
			captured: self.captured,
			received: pcap_stats.received,
			dropped: pcap_stats.dropped,
			ifdropped: pcap_stats.ifdropped,
			sample_rate: self.sample_rate,
		};

		let sequence = self.batch.take_sequence();
		let datagram = capture::flow::build_stats_datagram(sequence, stats);
		self.emitter.emit(&datagram);

		Some(stats)
	}
}
