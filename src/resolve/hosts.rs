//! The `host` backend: system resolver lookup through getaddrinfo.
//! Only sensible for workstation and server name types; NetBIOS group
//! names have no hosts-file or DNS representation.

use std::net::IpAddr;

use dns_lookup::{getaddrinfo, AddrInfoHints, SockType};

use crate::error::ResolveError;
use crate::net::endpoint::is_zero_addr;

/// Resolve `name` through the system resolver. The call blocks in the
/// C library, so it runs on the blocking thread pool.
pub async fn resolve_hosts(name: &str, name_type: u16) -> Result<Vec<IpAddr>, ResolveError> {
    if name_type != 0x20 && name_type != 0x00 {
        log::debug!(
            "resolve_hosts: not appropriate for name type <0x{:x}>",
            name_type
        );
        return Err(ResolveError::InvalidParameter);
    }

    log::info!(
        "resolve_hosts: attempting host lookup for name {}<0x{:x}>",
        name,
        name_type
    );

    let owned = name.to_string();
    let addrs = tokio::task::spawn_blocking(move || {
        let hints = AddrInfoHints {
            socktype: SockType::Stream.into(),
            ..AddrInfoHints::default()
        };
        match getaddrinfo(Some(&owned), None, Some(hints)) {
            Ok(results) => results
                .filter_map(|r| r.ok())
                .map(|info| info.sockaddr.ip())
                .collect::<Vec<_>>(),
            Err(err) => {
                log::info!("resolve_hosts: getaddrinfo failed for {}: {:?}", owned, err);
                Vec::new()
            }
        }
    })
    .await
    .map_err(|_| ResolveError::Internal)?;

    let addrs: Vec<IpAddr> = addrs.into_iter().filter(|ip| !is_zero_addr(ip)).collect();
    if addrs.is_empty() {
        return Err(ResolveError::Unsuccessful);
    }
    Ok(addrs)
}
