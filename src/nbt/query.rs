//! Name service queries: single-destination name and node-status
//! queries with their response validators, and the staggered
//! multi-destination fan-out used by the broadcast resolver.

use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::error::ResolveError;
use crate::nbt::name::NbtName;
use crate::nbt::packet::{
    generate_trn_id, rcode_text, NbtPacket, PacketType, NM_FLAGS_AA, NM_FLAGS_B, NM_FLAGS_RA,
    NM_FLAGS_RD, NM_FLAGS_RS, NM_FLAGS_TC, QTYPE_NBSTAT,
};
use crate::nbt::relay::RelayReaderFactory;
use crate::nbt::transport::nb_trans;
use crate::net::interfaces::Interfaces;
use crate::net::rank::sort_addrs;

/// Deadline for a node status exchange.
const NODE_STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Addresses extracted from positive name query responses, plus the
/// response header flags folded over every accepted packet.
#[derive(Debug, Clone)]
pub struct NameQueryResult {
    pub addrs: Vec<IpAddr>,
    pub flags: u8,
}

/// One entry of a node status name table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatusEntry {
    pub name: String,
    pub name_type: u8,
    pub flags: u8,
}

impl NodeStatusEntry {
    /// Group bit of the entry flags.
    pub fn is_group(&self) -> bool {
        self.flags & 0x80 != 0
    }
}

/// Parsed node status response.
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub entries: Vec<NodeStatusEntry>,
    pub mac_addr: [u8; 6],
}

/// NetBIOS name service client: the socket source address, the optional
/// daemon relay, and the interface table used to rank results.
pub struct NbtClient {
    interfaces: Arc<dyn Interfaces>,
    relay: Option<Arc<dyn RelayReaderFactory>>,
    source_addr: Ipv4Addr,
    port: u16,
    disabled: bool,
}

struct NameQueryState {
    bcast: bool,
    star_query: bool,
    addrs: Vec<IpAddr>,
    flags: u8,
    validate_error: Option<ResolveError>,
}

impl NameQueryState {
    fn new(bcast: bool, star_query: bool) -> Self {
        Self {
            bcast,
            star_query,
            addrs: Vec::new(),
            flags: 0,
            validate_error: None,
        }
    }

    /// Validator for name query responses. Returning true completes the
    /// transport exchange; for broadcast queries we keep collecting
    /// until a unique name shows up (never for the `*` wildcard).
    fn validate(&mut self, p: &NbtPacket) -> bool {
        let h = &p.header;

        if h.opcode == 0 && !self.bcast && h.rcode != 0 {
            // A negative response from a WINS server is a valid packet
            // carrying a definitive answer.
            log::info!(
                "negative name query response, rcode 0x{:02x}: {}",
                h.rcode,
                rcode_text(h.rcode)
            );
            self.validate_error = Some(ResolveError::NotFound);
            return true;
        }

        if h.opcode != 0 || h.nm_flags.bcast || h.rcode != 0 || h.ancount == 0 {
            // Could be a redirect; discard it.
            return false;
        }
        let Some(answer) = p.answers.first() else {
            return false;
        };

        let mut got_unique_name = false;

        for record in answer.rdata.chunks_exact(6) {
            let flags = u16::from_be_bytes([record[0], record[1]]);
            got_unique_name |= flags & 0x8000 == 0;

            let ip = Ipv4Addr::new(record[2], record[3], record[4], record[5]);
            if ip.is_unspecified() {
                continue;
            }
            let addr = IpAddr::V4(ip);
            if self.addrs.contains(&addr) {
                continue;
            }
            log::debug!("got a positive name query response: {}", ip);
            self.addrs.push(addr);
        }

        if h.response {
            self.flags |= NM_FLAGS_RS;
        }
        if h.nm_flags.authoritative {
            self.flags |= NM_FLAGS_AA;
        }
        if h.nm_flags.trunc {
            self.flags |= NM_FLAGS_TC;
        }
        if h.nm_flags.recursion_desired {
            self.flags |= NM_FLAGS_RD;
        }
        if h.nm_flags.recursion_available {
            self.flags |= NM_FLAGS_RA;
        }
        if h.nm_flags.bcast {
            self.flags |= NM_FLAGS_B;
        }

        if self.bcast {
            // Collect every reply within the window. A unique name ends
            // the collection early unless this is the wildcard query
            // for all names in the broadcast area.
            return got_unique_name && !self.star_query;
        }
        true
    }
}

impl NbtClient {
    pub fn new(
        interfaces: Arc<dyn Interfaces>,
        relay: Option<Arc<dyn RelayReaderFactory>>,
        source_addr: Ipv4Addr,
        port: u16,
        disabled: bool,
    ) -> Self {
        Self {
            interfaces,
            relay,
            source_addr,
            port,
            disabled,
        }
    }

    fn relay_factory(&self) -> Option<&dyn RelayReaderFactory> {
        self.relay.as_deref()
    }

    /// Single-destination NetBIOS name query. Unicast mode returns the
    /// first well-formed response; broadcast mode collects responses
    /// until `timeout`, which then counts as success with whatever
    /// arrived.
    pub async fn name_query(
        &self,
        name: &str,
        name_type: u8,
        bcast: bool,
        recurse: bool,
        dst: IpAddr,
        timeout: Duration,
    ) -> Result<NameQueryResult, ResolveError> {
        if self.disabled {
            log::debug!("name_query({}#{:02x}): netbios is disabled", name, name_type);
            return Err(ResolveError::Disabled);
        }
        let IpAddr::V4(dst) = dst else {
            return Err(ResolveError::InvalidAddress);
        };
        let dst = SocketAddrV4::new(dst, self.port);

        let trn_id = generate_trn_id();
        let nbt_name = NbtName::new(name, name_type);
        let request = NbtPacket::name_query_request(trn_id, &nbt_name, bcast, recurse);
        let buf = request.build().ok_or(ResolveError::Internal)?;

        let mut state = NameQueryState::new(bcast, bcast && name == "*");
        let mut validator = |p: &NbtPacket| state.validate(p);

        let outcome = tokio::time::timeout(
            timeout,
            nb_trans(
                self.relay_factory(),
                self.source_addr,
                dst,
                &buf,
                PacketType::NameService,
                trn_id,
                &mut validator,
            ),
        )
        .await;

        match outcome {
            Ok(Ok(_packet)) => {
                if let Some(err) = state.validate_error.take() {
                    return Err(err);
                }
            }
            Ok(Err(err)) => return Err(err),
            Err(_) if bcast => {
                // Broadcast queries collect replies until the deadline;
                // running out of time is how they normally end.
            }
            Err(_) => return Err(ResolveError::Timeout),
        }

        if state.addrs.is_empty() {
            return Err(ResolveError::NotFound);
        }
        sort_addrs(&*self.interfaces, &mut state.addrs);
        Ok(NameQueryResult {
            addrs: state.addrs,
            flags: state.flags,
        })
    }

    /// NBT node status query: the table of names registered on a host.
    pub async fn node_status_query(
        &self,
        name: &NbtName,
        dst: IpAddr,
    ) -> Result<NodeStatus, ResolveError> {
        if self.disabled {
            log::debug!("node_status_query({}): netbios is disabled", name);
            return Err(ResolveError::Disabled);
        }
        let IpAddr::V4(dst) = dst else {
            // Can't do node status over IPv6.
            return Err(ResolveError::InvalidAddress);
        };
        let dst = SocketAddrV4::new(dst, self.port);

        let trn_id = generate_trn_id();
        let request = NbtPacket::node_status_request(trn_id, name);
        let buf = request.build().ok_or(ResolveError::Internal)?;

        let mut validator = |p: &NbtPacket| {
            let h = &p.header;
            h.opcode == 0
                && !h.nm_flags.bcast
                && h.rcode == 0
                && h.ancount > 0
                && p.answers.first().map(|a| a.rr_type) == Some(QTYPE_NBSTAT)
        };

        let packet = tokio::time::timeout(
            NODE_STATUS_TIMEOUT,
            nb_trans(
                self.relay_factory(),
                self.source_addr,
                dst,
                &buf,
                PacketType::NameService,
                trn_id,
                &mut validator,
            ),
        )
        .await
        .map_err(|_| ResolveError::Timeout)??;

        let answer = packet.answers.first().ok_or(ResolveError::Internal)?;
        parse_node_status(&answer.rdata).ok_or(ResolveError::NotFound)
    }

    /// Send the same name query to `dests` with `wait` between starts
    /// and `per_query` as each destination's deadline. The first success
    /// wins and cancels the rest; when every query has failed the last
    /// error is surfaced. Returns the index of the destination that
    /// answered.
    pub async fn name_queries(
        &self,
        name: &str,
        name_type: u8,
        bcast: bool,
        recurse: bool,
        dests: &[IpAddr],
        wait: Duration,
        per_query: Duration,
    ) -> Result<(NameQueryResult, usize), ResolveError> {
        if dests.is_empty() {
            return Err(ResolveError::NotFound);
        }

        let mut pending = FuturesUnordered::new();
        for (i, dst) in dests.iter().enumerate() {
            let dst = *dst;
            pending.push(async move {
                tokio::time::sleep(wait * i as u32).await;
                let result = self
                    .name_query(name, name_type, bcast, recurse, dst, per_query)
                    .await;
                (i, result)
            });
        }

        let mut last_error = ResolveError::NotFound;
        while let Some((i, result)) = pending.next().await {
            match result {
                Ok(res) => return Ok((res, i)),
                Err(err) => last_error = err,
            }
        }
        Err(last_error)
    }
}

/// Parse node status RDATA: a count octet, `count` fixed 18-byte
/// entries, then the responder's MAC address.
pub fn parse_node_status(rdata: &[u8]) -> Option<NodeStatus> {
    let count = *rdata.first()? as usize;
    let mut entries = Vec::with_capacity(count);
    let mut offset = 1;

    for _ in 0..count {
        let record = rdata.get(offset..offset + 18)?;
        let name = String::from_utf8_lossy(&record[..15])
            .trim_end_matches([' ', '\0'])
            .to_string();
        let entry = NodeStatusEntry {
            name,
            name_type: record[15],
            flags: record[16],
        };
        log::trace!(
            "{}#{:02x}: flags = 0x{:02x}",
            entry.name,
            entry.name_type,
            entry.flags
        );
        entries.push(entry);
        offset += 18;
    }

    let mut mac_addr = [0u8; 6];
    if let Some(mac) = rdata.get(offset..offset + 6) {
        mac_addr.copy_from_slice(mac);
    }

    Some(NodeStatus { entries, mac_addr })
}
