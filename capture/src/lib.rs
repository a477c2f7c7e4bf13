//! The response-processing pipeline: header validation, encapsulation
//! peeling, DNS gating/extraction, flow-packet building, the capture-file
//! writer, and the packet-filter generator. Orchestration (capture device,
//! event loop, process fan-out) lives in the `dnsflow` binary; this crate is
//! the pure, unit-testable wire-format and parsing core.

pub mod dns;
pub mod encap;
pub mod filter;
pub mod flow;
pub mod header;
pub mod pcapfile;

use core::net::Ipv4Addr;

use dns::ExtractedRecord;

/// The two configurable encapsulation ports; at most one level is ever
/// stripped, `pcap_record_port` taking priority when both are configured.
#[derive(Clone, Copy, Default)]
pub struct EncapConfig {
	pub pcap_record_port: Option<u16>,
	pub jmirror_port: Option<u16>,
}

/// Run a captured `(client_ip, record)` through header validation,
/// optionally encap peel + revalidation, DNS gating, and record
/// extraction. Returns `None` on any silent drop.
pub fn process(ip_bytes: &[u8], encap: EncapConfig) -> Option<(Ipv4Addr, ExtractedRecord)> {
	let outer = header::validate(ip_bytes)?;

	let (client_ip, dns_payload) = match encap::classify(outer.udp_dst_port, encap.pcap_record_port, encap.jmirror_port) {
		None => (outer.ip_dst, outer.payload),
		Some(kind) => {
			let residual = encap::peel(kind, outer.payload)?;
			let inner = header::validate(residual)?;
			(inner.ip_dst, inner.payload)
		}
	};

	let message = dns::parse(dns_payload)?;

	if !dns::gate(&message) {
		return None;
	}

	let record = dns::extract(&message)?;

	Some((client_ip, record))
}

#[cfg(test)]
mod tests {
	use std::net::Ipv4Addr as StdIpv4Addr;

	use hickory_proto::op::{Header as DnsHeader, Message, MessageType, Query, ResponseCode};
	use hickory_proto::rr::rdata::A;
	use hickory_proto::rr::{Name, RData, Record, RecordType};
	use hickory_proto::serialize::binary::BinEncodable;

	use super::*;

	fn dns_response_bytes() -> Vec<u8> {
		let mut header = DnsHeader::new();
		header.set_message_type(MessageType::Response);
		header.set_recursion_desired(true);
		header.set_recursion_available(true);
		header.set_response_code(ResponseCode::NoError);
		header.set_query_count(1);
		header.set_answer_count(1);

		let mut msg = Message::new();
		msg.set_header(header);
		msg.add_query(Query::query(Name::from_ascii("example.com.").unwrap(), RecordType::A));
		msg.add_answer(Record::from_rdata(
			Name::from_ascii("example.com.").unwrap(),
			300,
			RData::A(A(StdIpv4Addr::new(198, 51, 100, 5))),
		));

		msg.to_bytes().unwrap()
	}

	/// Build a minimal IPv4/UDP packet with the client `192.0.2.10` as the IP
	/// destination (the resolver's answer travels back to the client) and
	/// `dst_port` as the UDP destination port.
	fn ipv4_udp_packet(dst_port: u16, payload: &[u8]) -> Vec<u8> {
		let total_len = 20 + 8 + payload.len();
		let mut buf = vec![0u8; total_len];

		buf[0] = (4 << 4) | 5;
		buf[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
		buf[9] = 17; // UDP
		buf[12..16].copy_from_slice(&StdIpv4Addr::new(10, 0, 0, 1).octets()); // src
		buf[16..20].copy_from_slice(&StdIpv4Addr::new(192, 0, 2, 10).octets()); // dst: the client

		buf[20..22].copy_from_slice(&53u16.to_be_bytes());
		buf[22..24].copy_from_slice(&dst_port.to_be_bytes());
		buf[24..26].copy_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
		buf[28..].copy_from_slice(payload);

		buf
	}

	#[test]
	fn pipeline_accepts_bare_dns_response() {
		let packet = ipv4_udp_packet(53, &dns_response_bytes());
		let (client_ip, record) = process(&packet, EncapConfig::default()).expect("pipeline accepts");
		assert_eq!(client_ip, StdIpv4Addr::new(192, 0, 2, 10));
		assert_eq!(record.ips, vec![StdIpv4Addr::new(198, 51, 100, 5)]);
	}

	#[test]
	fn s5_rejects_nxdomain() {
		let mut msg_header = DnsHeader::new();
		msg_header.set_message_type(MessageType::Response);
		msg_header.set_recursion_desired(true);
		msg_header.set_recursion_available(true);
		msg_header.set_response_code(ResponseCode::NXDomain);
		msg_header.set_query_count(1);

		let mut msg = Message::new();
		msg.set_header(msg_header);
		msg.add_query(Query::query(Name::from_ascii("example.com.").unwrap(), RecordType::A));

		let packet = ipv4_udp_packet(53, &msg.to_bytes().unwrap());
		assert!(process(&packet, EncapConfig::default()).is_none());
	}

	#[test]
	fn s6_jmirror_encap_is_stripped() {
		let inner = ipv4_udp_packet(53, &dns_response_bytes());
		let mut outer_payload = vec![0u8; encap::JMIRROR_ENCAP_LEN];
		outer_payload.extend_from_slice(&inner);

		let packet = ipv4_udp_packet(30030, &outer_payload);
		let encap = EncapConfig { pcap_record_port: None, jmirror_port: Some(30030) };

		let (client_ip, _) = process(&packet, encap).expect("jmirror packet accepted");
		assert_eq!(client_ip, StdIpv4Addr::new(192, 0, 2, 10));
	}
}
