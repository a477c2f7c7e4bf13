//! Capture-file output: a libpcap file using the `DLT_NULL` link type,
//! with each flow datagram preceded by a 4-byte loopback header set to
//! `PF_UNSPEC` (0). See <https://wiki.wireshark.org/Development/LibpcapFileFormat>.

use std::fs::File;
use std::io::Write;
use std::mem::size_of;
use std::time::SystemTime;

use log::warn;
use utils::bytes::{self, Cast};
use utils::error::*;

const SNAPLEN: u32 = u32::MAX;
const DLT_NULL: u32 = 0;
const PF_UNSPEC: u32 = 0;

#[derive(Cast)]
#[repr(C)]
struct Header {
	magic_number: u32,
	version_major: u16,
	version_minor: u16,
	thiszone: i32,
	sigfigs: u32,
	snaplen: u32,
	network: u32,
}

#[derive(Cast)]
#[repr(C)]
struct PacketHeader {
	ts_sec: u32,
	ts_usec: u32,
	incl_len: u32,
	orig_len: u32,
}

/// Writes flow datagrams as synthetic capture records.
pub struct Writer {
	file: File,
}

impl Writer {
	pub fn create(path: &str) -> Result<Self> {
		let mut file = File::create(path).map_err(|_| warn!("Unable to create capture-file output"))?;

		let header = Header {
			magic_number: 0xa1b2c3d4,
			version_major: 2,
			version_minor: 4,
			thiszone: 0,
			sigfigs: 0,
			snaplen: SNAPLEN,
			network: DLT_NULL,
		};

		file.write_all(bytes::as_slice(&header))
			.map_err(|_| warn!("Could not write capture-file header"))?;

		Ok(Self { file })
	}

	/// Write a flow datagram, prefixed with the 4-byte loopback header.
	pub fn write(&mut self, datagram: &[u8]) -> Result {
		let timestamp = SystemTime::now()
			.duration_since(SystemTime::UNIX_EPOCH)
			.map_err(|_| warn!("System clock is before the UNIX epoch"))?;

		let len: u32 = (datagram.len() + size_of::<u32>())
			.try_into()
			.map_err(|_| warn!("Flow datagram too large for capture file"))?;

		let packet_header = PacketHeader {
			ts_sec: timestamp.as_secs().try_into().map_err(|_| warn!("Timestamp seconds overflow"))?,
			ts_usec: timestamp.subsec_micros(),
			incl_len: len,
			orig_len: len,
		};

		let loopback = PF_UNSPEC.to_ne_bytes();

		for buf in [bytes::as_slice(&packet_header), &loopback, datagram] {
			self.file
				.write_all(buf)
				.map_err(|err| warn!("Unable to write record to capture file: {err}"))?;
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn writes_header_and_one_record() {
		let path = std::env::temp_dir().join(format!("dnsflow-test-{}.pcap", std::process::id()));
		let mut w = Writer::create(path.to_str().unwrap()).unwrap();
		w.write(&[1, 2, 3, 4]).unwrap();

		let bytes = std::fs::read(&path).unwrap();
		std::fs::remove_file(&path).unwrap();

		assert_eq!(bytes.len(), size_of::<Header>() + size_of::<PacketHeader>() + 4 + 4);
		let network = u32::from_ne_bytes(bytes[20..24].try_into().unwrap());
		assert_eq!(network, DLT_NULL);
	}
}
