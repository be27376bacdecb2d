//! The `wins` backend. Servers inside one replication tag are tried in
//! sequence with a short deadline each; a server that lets its deadline
//! expire is marked dead and skipped for a while. Tags run against each
//! other concurrently and the first tag to answer wins.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};

use crate::config::WinsTag;
use crate::error::ResolveError;
use crate::nbt::query::{NameQueryResult, NbtClient};

/// Per-server deadline inside one tag.
const WINS_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a dead mark sticks before the server is tried again.
const WINS_SRV_DEATH_INTERVAL: Duration = Duration::from_secs(600);

/// Liveness table for WINS servers, keyed by server and source address
/// so multi-homed setups track each path separately.
#[derive(Default)]
pub struct WinsLiveness {
    dead_until: Mutex<HashMap<(Ipv4Addr, Ipv4Addr), Instant>>,
}

impl WinsLiveness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `server` failed to answer a query sent from `src`.
    pub fn mark_dead(&self, server: Ipv4Addr, src: Ipv4Addr) {
        log::info!("WINS server {} appears to be down", server);
        self.dead_until
            .lock()
            .expect("wins liveness lock poisoned")
            .insert((server, src), Instant::now() + WINS_SRV_DEATH_INTERVAL);
    }

    pub fn is_dead(&self, server: Ipv4Addr, src: Ipv4Addr) -> bool {
        let mut dead = self
            .dead_until
            .lock()
            .expect("wins liveness lock poisoned");
        match dead.get(&(server, src)) {
            Some(until) if *until > Instant::now() => true,
            Some(_) => {
                dead.remove(&(server, src));
                false
            }
            None => false,
        }
    }
}

/// Query one tag's servers in sequence. Timeouts mark the server dead
/// and move on; a negative answer or transport error fails the tag
/// immediately; exhausting the list is `NotFound`.
pub async fn query_wins_list(
    client: &NbtClient,
    liveness: &WinsLiveness,
    src_ip: Ipv4Addr,
    name: &str,
    name_type: u8,
    servers: &[Ipv4Addr],
) -> Result<NameQueryResult, ResolveError> {
    if servers.is_empty() {
        return Err(ResolveError::NotFound);
    }

    for &server in servers {
        match client
            .name_query(
                name,
                name_type,
                false,
                true,
                IpAddr::V4(server),
                WINS_QUERY_TIMEOUT,
            )
            .await
        {
            Ok(result) => return Ok(result),
            Err(err) if err.is_timeout() => {
                liveness.mark_dead(server, src_ip);
            }
            Err(err) => return Err(err),
        }
    }
    Err(ResolveError::NotFound)
}

/// Resolve through the configured WINS servers, one sequential chain
/// per tag, all tags in flight at once.
pub async fn resolve_wins(
    client: &NbtClient,
    liveness: &WinsLiveness,
    tags: &[WinsTag],
    src_ip: Ipv4Addr,
    skip_own_ip: bool,
    is_own_ip: impl Fn(Ipv4Addr) -> bool,
    name: &str,
    name_type: u8,
) -> Result<NameQueryResult, ResolveError> {
    if tags.is_empty() {
        log::info!("resolve_wins: WINS resolution selected and no WINS servers listed");
        return Err(ResolveError::InvalidParameter);
    }

    let mut chains = FuturesUnordered::new();
    for tag in tags {
        let alive: Vec<Ipv4Addr> = tag
            .servers
            .iter()
            .copied()
            .filter(|&server| {
                if skip_own_ip && is_own_ip(server) {
                    // Querying ourselves would loop forever.
                    return false;
                }
                if liveness.is_dead(server, src_ip) {
                    // Skip any that have been unresponsive lately.
                    return false;
                }
                log::info!(
                    "resolve_wins: using WINS server {} and tag '{}'",
                    server,
                    tag.tag
                );
                true
            })
            .collect();

        if alive.is_empty() {
            continue;
        }
        chains.push(async move {
            query_wins_list(client, liveness, src_ip, name, name_type, &alive).await
        });
    }

    if chains.is_empty() {
        return Err(ResolveError::NotFound);
    }

    let mut last_error = ResolveError::NotFound;
    while let Some(result) = chains.next().await {
        match result {
            Ok(result) => return Ok(result),
            Err(err) => last_error = err,
        }
    }
    Err(last_error)
}
