//! Strips a single level of encapsulation (a pcap-record+ethernet wrapper, or
//! a JMirror wrapper) from a UDP payload that has already passed [`crate::header::validate`].

/// `sizeof(pcap_record_header) + sizeof(ethernet_header)`.
pub const PCAP_RECORD_ENCAP_LEN: usize = 20;
/// Two 32-bit fields: intercept_id, session_id.
pub const JMIRROR_ENCAP_LEN: usize = 8;

/// Which configured encapsulation (if any) a packet's outer UDP destination
/// port identifies it as carrying.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Encap {
	PcapRecord,
	JMirror,
}

/// Decide which wrapper (if any) applies to `dst_port`, given the configured
/// encap ports. At most one ever matches: `pcap_record_port` is checked first.
pub fn classify(dst_port: u16, pcap_record_port: Option<u16>, jmirror_port: Option<u16>) -> Option<Encap> {
	if Some(dst_port) == pcap_record_port {
		Some(Encap::PcapRecord)
	} else if Some(dst_port) == jmirror_port {
		Some(Encap::JMirror)
	} else {
		None
	}
}

/// Strip the fixed-size preamble for `encap`, returning the residual bytes
/// to revalidate as an inner IPv4/UDP packet. `None` if the payload is too
/// short to contain the preamble.
pub fn peel(encap: Encap, payload: &[u8]) -> Option<&[u8]> {
	let len = match encap {
		Encap::PcapRecord => PCAP_RECORD_ENCAP_LEN,
		Encap::JMirror => JMIRROR_ENCAP_LEN,
	};

	payload.get(len..)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classifies_by_port() {
		assert_eq!(classify(30030, Some(9990), Some(30030)), Some(Encap::JMirror));
		assert_eq!(classify(9990, Some(9990), Some(30030)), Some(Encap::PcapRecord));
		assert_eq!(classify(53, Some(9990), Some(30030)), None);
	}

	#[test]
	fn peels_jmirror_preamble() {
		let mut payload = vec![0xAAu8; JMIRROR_ENCAP_LEN];
		payload.extend_from_slice(b"inner");
		assert_eq!(peel(Encap::JMirror, &payload), Some(&b"inner"[..]));
	}

	#[test]
	fn rejects_short_residual() {
		let payload = vec![0u8; JMIRROR_ENCAP_LEN - 1];
		assert!(peel(Encap::JMirror, &payload).is_none());
	}
}
