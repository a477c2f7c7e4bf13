use core::mem::size_of;
use core::net::Ipv4Addr;

use bilge::prelude::*;
use utils::bytes::{self, Cast};
use utils::endian::u16be;

const UDP_PROTO: u8 = 17;

#[bitsize(8)]
#[derive(FromBits, Cast)]
#[repr(C)]
struct VerIhl {
	ihl: u4,
	version: u4,
}

#[derive(Cast)]
#[repr(C)]
struct Ipv4Header {
	ver_ihl: VerIhl,
	tos: u8,
	total_len: u16be,
	id: u16,
	frag: u16,
	ttl: u8,
	proto: u8,
	checksum: [u8; 2],
	src: Ipv4Addr,
	dst: Ipv4Addr,
}

#[derive(Cast)]
#[repr(C)]
struct UdpHeader {
	src_port: u16be,
	dst_port: u16be,
	length: u16be,
	checksum: [u8; 2],
}

/// The outcome of bounds-checking an IPv4/UDP datagram.
pub struct Validated<'a> {
	pub ip_src: Ipv4Addr,
	pub ip_dst: Ipv4Addr,
	pub udp_src_port: u16,
	pub udp_dst_port: u16,
	pub payload: &'a [u8],
}

/// Bounds-check an IPv4 header followed directly by a UDP header, per the
/// ordered checks: minimum length, version, IHL within the packet, declared
/// total length within the packet, total length covers the IHL, protocol is
/// UDP, room for a UDP header, and the UDP length fits the remaining packet.
/// Fails silently (returns `None`) on the first violated check.
pub fn validate(bytes: &[u8]) -> Option<Validated> {
	let pkt_len = bytes.len();

	if pkt_len < size_of::<Ipv4Header>() {
		return None;
	}

	let ip: &Ipv4Header = bytes::cast(&bytes[..size_of::<Ipv4Header>()]);

	if ip.ver_ihl.version().value() != 4 {
		return None;
	}

	let ihl = ip.ver_ihl.ihl().value() as usize * 4;

	if pkt_len < ihl {
		return None;
	}

	let total_len = ip.total_len.get() as usize;

	if pkt_len < total_len {
		return None;
	}

	if total_len < ihl {
		return None;
	}

	if ip.proto != UDP_PROTO {
		return None;
	}

	if pkt_len < ihl + size_of::<UdpHeader>() {
		return None;
	}

	let udp: &UdpHeader = bytes::cast(&bytes[ihl..ihl + size_of::<UdpHeader>()]);
	let udp_length = udp.length.get() as usize;

	if pkt_len < ihl + udp_length {
		return None;
	}

	let payload_offset = ihl + size_of::<UdpHeader>();
	let payload_end = ihl + udp_length;

	Some(Validated {
		ip_src: ip.src,
		ip_dst: ip.dst,
		udp_src_port: udp.src_port.get(),
		udp_dst_port: udp.dst_port.get(),
		payload: &bytes[payload_offset..payload_end],
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn packet(ihl: u8, total_len: u16, proto: u8, udp_len: u16, extra: usize) -> Vec<u8> {
		let mut buf = vec![0u8; ihl as usize * 4 + size_of::<UdpHeader>() + extra];
		buf[0] = (4 << 4) | ihl;
		buf[2..4].copy_from_slice(&total_len.to_be_bytes());
		buf[9] = proto;
		let udp_off = ihl as usize * 4;
		buf[udp_off + 4..udp_off + 6].copy_from_slice(&udp_len.to_be_bytes());
		buf
	}

	#[test]
	fn rejects_short_packet() {
		assert!(validate(&[0u8; 10]).is_none());
	}

	#[test]
	fn rejects_non_ipv4() {
		let mut buf = packet(5, 28, UDP_PROTO, 8, 0);
		buf[0] = (6 << 4) | 5;
		assert!(validate(&buf).is_none());
	}

	#[test]
	fn rejects_ihl_exceeding_packet() {
		let buf = packet(5, 28, UDP_PROTO, 8, 0)[..15].to_vec();
		assert!(validate(&buf).is_none());
	}

	#[test]
	fn rejects_total_len_exceeding_packet() {
		let buf = packet(5, 1000, UDP_PROTO, 8, 0);
		assert!(validate(&buf).is_none());
	}

	#[test]
	fn rejects_total_len_below_ihl() {
		let buf = packet(5, 10, UDP_PROTO, 8, 0);
		assert!(validate(&buf).is_none());
	}

	#[test]
	fn rejects_non_udp() {
		let buf = packet(5, 28, 6, 8, 0);
		assert!(validate(&buf).is_none());
	}

	#[test]
	fn rejects_udp_length_exceeding_packet() {
		let buf = packet(5, 28, UDP_PROTO, 100, 0);
		assert!(validate(&buf).is_none());
	}

	#[test]
	fn accepts_minimal_packet() {
		let buf = packet(5, 32, UDP_PROTO, 12, 4);
		let v = validate(&buf).expect("valid packet");
		assert_eq!(v.payload.len(), 4);
	}
}
