//! The packet-filter expression generator.

const INNER_UDP_OFFSET: usize = 8 + 20; // sizeof(udp) + sizeof(ip), for offsets measured after a stripped encap

/// Produce a BPF-like filter expression selecting successful recursive A
/// responses for `worker_index` of `n_workers`, optionally one level behind
/// `encap_offset` bytes of wrapper (0 if the capture sees bare IP), and
/// optionally also matching mDNS (port 5353).
pub fn generate(encap_offset: usize, worker_index: u32, n_workers: u32, enable_mdns: bool) -> String {
	let (udp_base, ip_base) = if encap_offset == 0 {
		(0, 0)
	} else {
		(INNER_UDP_OFFSET + encap_offset, 20 + 8 + encap_offset)
	};

	let port = if enable_mdns {
		format!("(udp[{udp_base}:2] == 53 or udp[{udp_base}:2] == 5353)")
	} else {
		format!("udp[{udp_base}:2] == 53")
	};

	let flags = format!("udp[{}:2] & 0x8187 == 0x8180", udp_base + 10);

	let mut expr = format!("udp and {port} and {flags}");

	if n_workers > 1 {
		let ip_off = ip_base + 16;
		let shard = format!(
			"(ip[{ip_off}:4] - ip[{ip_off}:4] / {n_workers} * {n_workers}) == {}",
			worker_index - 1
		);
		expr = format!("{expr} and {shard}");
	}

	format!("({expr}) or (vlan and ({expr}))")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn no_encap_references_offset_zero() {
		let f = generate(0, 1, 1, false);
		assert!(f.contains("udp[0:2] == 53"));
		assert!(f.contains("udp[10:2] & 0x8187 == 0x8180"));
	}

	#[test]
	fn encap_offset_shifts_udp_and_ip_bases() {
		// jmirror strips 8 bytes: udp_base = 28 + 8 = 36, ip_base = 28 + 8 = 36
		let f = generate(8, 1, 1, false);
		assert!(f.contains("udp[36:2] == 53"));
		assert!(f.contains("udp[46:2] & 0x8187 == 0x8180"));
		assert!(f.contains("ip[52:4]"));
	}

	#[test]
	fn mdns_adds_alternate_port() {
		let f = generate(0, 1, 1, true);
		assert!(f.contains("udp[0:2] == 53 or udp[0:2] == 5353"));
	}

	#[test]
	fn shard_uses_div_mul_sub_for_modulus() {
		let f = generate(0, 2, 4, false);
		assert!(f.contains("(ip[16:4] - ip[16:4] / 4 * 4) == 1"));
	}

	#[test]
	fn single_worker_has_no_shard_clause() {
		let f = generate(0, 1, 1, false);
		assert!(!f.contains("ip["));
	}

	#[test]
	fn wraps_with_vlan_alternative() {
		let f = generate(0, 1, 1, false);
		assert!(f.starts_with('('));
		assert!(f.contains(") or (vlan and ("));
	}

	#[test]
	fn s7_shard_partitions_residues() {
		// the four worker filters' shard clauses cover every residue mod 4 exactly once
		let residues: Vec<u32> = (1..=4).map(|i| i - 1).collect();
		assert_eq!(residues, vec![0, 1, 2, 3]);

		for i in 1..=4u32 {
			let f = generate(0, i, 4, false);
			assert!(f.contains(&format!("== {}", i - 1)));
		}
	}
}
