//! Topological ranking of candidate addresses. Candidates sharing more
//! leading bits with one of our interfaces sort earlier, so a WINS or
//! DNS answer from a far-away subnet does not end up as the first
//! connection attempt.

use std::cmp::Ordering;
use std::net::IpAddr;

use crate::net::endpoint::Endpoint;
use crate::net::interfaces::Interfaces;

/// Number of leading bits the two byte strings have in common.
pub fn matching_len_bits(a: &[u8], b: &[u8]) -> u32 {
    let mut bits = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        let diff = x ^ y;
        if diff == 0 {
            bits += 8;
            continue;
        }
        bits += diff.leading_zeros();
        break;
    }
    bits
}

fn addr_bytes(addr: &IpAddr) -> Vec<u8> {
    match addr {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Proximity score: the best prefix match against any same-family
/// interface, with a flat bonus for addresses that are local to this
/// machine.
fn addr_score(ifaces: &dyn Interfaces, addr: &IpAddr) -> u32 {
    let bytes = addr_bytes(addr);
    let mut max_bits = 0;

    for iface_addr in ifaces.addrs() {
        if iface_addr.is_ipv4() != addr.is_ipv4() {
            continue;
        }
        let bits = matching_len_bits(&bytes, &addr_bytes(&iface_addr));
        max_bits = max_bits.max(bits);
    }

    if ifaces.is_local(addr) {
        max_bits += if addr.is_ipv4() { 32 } else { 128 };
    }
    max_bits
}

/// Compare two addresses by reachability. IPv4 sorts before IPv6; within
/// a family the address closer to one of our interfaces sorts first.
pub fn addr_compare(ifaces: &dyn Interfaces, a: &IpAddr, b: &IpAddr) -> Ordering {
    if a.is_ipv4() != b.is_ipv4() {
        return if b.is_ipv4() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    addr_score(ifaces, b).cmp(&addr_score(ifaces, a))
}

/// Endpoint comparison: address proximity first, then port ascending.
pub fn endpoint_compare(ifaces: &dyn Interfaces, a: &Endpoint, b: &Endpoint) -> Ordering {
    addr_compare(ifaces, &a.addr, &b.addr).then(a.port.cmp(&b.port))
}

/// Sort a plain address list by proximity.
pub fn sort_addrs(ifaces: &dyn Interfaces, addrs: &mut [IpAddr]) {
    if addrs.len() <= 1 {
        return;
    }
    addrs.sort_by(|a, b| addr_compare(ifaces, a, b));
}

/// Sort an endpoint list by proximity, ports breaking ties.
pub fn sort_endpoints(ifaces: &dyn Interfaces, endpoints: &mut [Endpoint]) {
    if endpoints.len() <= 1 {
        return;
    }
    endpoints.sort_by(|a, b| endpoint_compare(ifaces, a, b));
}
