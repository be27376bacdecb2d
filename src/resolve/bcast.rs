//! The `bcast` backend: one simultaneous broadcast name query per local
//! interface, collecting replies inside a short fixed window.

use std::net::IpAddr;
use std::time::Duration;

use crate::error::ResolveError;
use crate::nbt::query::NbtClient;
use crate::net::interfaces::Interfaces;

/// Collection window per broadcast burst.
const BCAST_QUERY_TIMEOUT: Duration = Duration::from_millis(250);

/// Broadcast the query on every IPv4 interface at once and return
/// whatever answered inside the window.
pub async fn name_resolve_bcast(
    client: &NbtClient,
    interfaces: &dyn Interfaces,
    netbios_disabled: bool,
    name: &str,
    name_type: u8,
) -> Result<Vec<IpAddr>, ResolveError> {
    if netbios_disabled {
        log::debug!(
            "name_resolve_bcast({}#{:02x}): netbios is disabled",
            name,
            name_type
        );
        return Err(ResolveError::InvalidParameter);
    }

    log::info!(
        "name_resolve_bcast: attempting broadcast lookup for name {}<0x{:x}>",
        name,
        name_type
    );

    let bcast_addrs: Vec<IpAddr> = interfaces
        .broadcast_addrs()
        .into_iter()
        .filter(IpAddr::is_ipv4)
        .collect();

    let (result, _) = client
        .name_queries(
            name,
            name_type,
            true,
            true,
            &bcast_addrs,
            Duration::ZERO,
            BCAST_QUERY_TIMEOUT,
        )
        .await?;
    Ok(result.addrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::interfaces::StaticInterfaces;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn test_client() -> NbtClient {
        let ifaces: Arc<dyn Interfaces> = Arc::new(StaticInterfaces {
            addrs: vec!["127.0.0.1".parse().unwrap()],
            bcasts: vec![],
        });
        NbtClient::new(ifaces, None, Ipv4Addr::LOCALHOST, 137, false)
    }

    #[tokio::test]
    async fn test_disabled_netbios_is_invalid_parameter() {
        let client = test_client();
        let ifaces = StaticInterfaces {
            addrs: vec![],
            bcasts: vec!["192.168.1.255".parse().unwrap()],
        };
        let err = name_resolve_bcast(&client, &ifaces, true, "name", 0x20)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidParameter));
    }

    #[tokio::test]
    async fn test_no_interfaces_is_not_found() {
        let client = test_client();
        let ifaces = StaticInterfaces {
            addrs: vec![],
            bcasts: vec![],
        };
        let err = name_resolve_bcast(&client, &ifaces, false, "name", 0x20)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound));
    }
}
