//! The DNS gate (accept only successful recursive A responses) and the
//! extractor that materializes the question/CNAME chain and A rdata.

use core::net::Ipv4Addr;

use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use hickory_proto::serialize::binary::BinDecodable;
use log::warn;

/// A question owner name followed by its CNAME chain and the resolved
/// A records, copied out of the decode so it outlives it.
pub struct ExtractedRecord {
	pub names: Vec<Vec<u8>>,
	pub ips: Vec<Ipv4Addr>,
}

/// Decode a UDP payload as a DNS message, logging and discarding malformed
/// payloads at warn level (`DNSDecodeWarn`).
pub fn parse(payload: &[u8]) -> Option<Message> {
	Message::from_bytes(payload).map_err(|err| warn!("Malformed DNS payload: {err}")).ok()
}

/// Accept only a successful recursive response to a single A question.
pub fn gate(message: &Message) -> bool {
	let header = message.header();

	header.message_type() == MessageType::Response
		&& header.recursion_desired()
		&& header.recursion_available()
		&& header.response_code() == ResponseCode::NoError
		&& header.query_count() == 1
		&& message.queries().first().is_some_and(|q| q.query_type() == RecordType::A)
}

/// Re-encode a decoded name in canonical (uncompressed) wire format:
/// length-prefixed labels terminated by a zero-length root label.
fn encode_name_wire(name: &Name) -> Option<Vec<u8>> {
	let mut buf = Vec::new();

	for label in name.iter() {
		if label.len() > 63 {
			return None;
		}

		buf.push(label.len() as u8);
		buf.extend_from_slice(label);
	}

	buf.push(0);

	(buf.len() <= 255).then_some(buf)
}

/// Build an [`ExtractedRecord`] from an accepted decode. Returns `None` if
/// the question name is overlong or no A record was found in the answers.
pub fn extract(message: &Message) -> Option<ExtractedRecord> {
	let question = message.queries().first()?;
	let owner = encode_name_wire(question.name())?;

	let mut names = vec![owner];
	let mut ips = Vec::new();

	for answer in message.answers() {
		match answer.data() {
			Some(RData::CNAME(target)) => {
				if names.len() >= 255 {
					continue;
				}

				names.push(encode_name_wire(target)?);
			}
			Some(RData::A(addr)) => {
				if ips.len() >= 255 {
					continue;
				}

				ips.push(addr.0);
			}
			_ => {}
		}
	}

	if ips.is_empty() {
		return None;
	}

	Some(ExtractedRecord { names, ips })
}

#[cfg(test)]
mod tests {
	use hickory_proto::op::{Header, Query};
	use hickory_proto::rr::rdata::{A, CNAME};
	use hickory_proto::rr::{Record, RecordType};
	use hickory_proto::serialize::binary::BinEncodable;

	use super::*;

	fn response(rcode: ResponseCode, name: &str, answers: Vec<Record>) -> Message {
		let mut header = Header::new();
		header.set_message_type(MessageType::Response);
		header.set_recursion_desired(true);
		header.set_recursion_available(true);
		header.set_response_code(rcode);
		header.set_query_count(1);
		header.set_answer_count(answers.len() as u16);

		let mut msg = Message::new();
		msg.set_header(header);
		msg.add_query(Query::query(Name::from_ascii(name).unwrap(), RecordType::A));

		for a in answers {
			msg.add_answer(a);
		}

		msg
	}

	fn a_record(name: &str, addr: Ipv4Addr) -> Record {
		Record::from_rdata(Name::from_ascii(name).unwrap(), 300, RData::A(A(addr)))
	}

	fn cname_record(name: &str, target: &str) -> Record {
		Record::from_rdata(Name::from_ascii(name).unwrap(), 300, RData::CNAME(CNAME(Name::from_ascii(target).unwrap())))
	}

	#[test]
	fn gate_accepts_minimal_response() {
		let msg = response(ResponseCode::NoError, "example.com.", vec![a_record("example.com.", Ipv4Addr::new(198, 51, 100, 5))]);
		assert!(gate(&msg));
	}

	#[test]
	fn gate_rejects_nxdomain() {
		let msg = response(ResponseCode::NXDomain, "example.com.", vec![]);
		assert!(!gate(&msg));
	}

	#[test]
	fn extract_minimal_record_matches_s1() {
		let msg = response(ResponseCode::NoError, "example.com.", vec![a_record("example.com.", Ipv4Addr::new(198, 51, 100, 5))]);
		let record = extract(&msg).unwrap();
		assert_eq!(record.names, vec![b"\x07example\x03com\x00".to_vec()]);
		assert_eq!(record.ips, vec![Ipv4Addr::new(198, 51, 100, 5)]);
	}

	#[test]
	fn extract_cname_chain_matches_s4() {
		let msg = response(
			ResponseCode::NoError,
			"a.",
			vec![cname_record("a.", "b."), cname_record("b.", "c."), a_record("c.", Ipv4Addr::new(203, 0, 113, 7))],
		);

		let record = extract(&msg).unwrap();
		assert_eq!(record.names.len(), 3);
		assert_eq!(record.names[0], encode_name_wire(&Name::from_ascii("a.").unwrap()).unwrap());
		assert_eq!(record.names[1], encode_name_wire(&Name::from_ascii("b.").unwrap()).unwrap());
		assert_eq!(record.names[2], encode_name_wire(&Name::from_ascii("c.").unwrap()).unwrap());
		assert_eq!(record.ips, vec![Ipv4Addr::new(203, 0, 113, 7)]);
	}

	#[test]
	fn extract_rejects_no_a_records() {
		let msg = response(ResponseCode::NoError, "a.", vec![cname_record("a.", "b.")]);
		assert!(extract(&msg).is_none());
	}

	#[test]
	fn round_trips_through_wire_bytes() {
		let msg = response(ResponseCode::NoError, "example.com.", vec![a_record("example.com.", Ipv4Addr::new(198, 51, 100, 5))]);
		let bytes = msg.to_bytes().unwrap();
		let parsed = parse(&bytes).unwrap();
		assert!(gate(&parsed));
		assert_eq!(extract(&parsed).unwrap().ips, vec![Ipv4Addr::new(198, 51, 100, 5)]);
	}
}
