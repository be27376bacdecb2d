//! Reverse lookups through node status: given an address, find the
//! name a host has registered for a given service type. Checked against
//! the status cache and the lmhosts file before going on the wire.

use std::net::IpAddr;

use crate::error::ResolveError;
use crate::nbt::name::NbtName;
use crate::nbt::query::NodeStatus;
use crate::resolve::lmhosts;
use crate::resolver::Resolver;

impl Resolver {
    /// Node status query against `addr`: the table of names the host
    /// has registered, plus its MAC address.
    pub async fn node_status_query(
        &self,
        name: &NbtName,
        addr: IpAddr,
    ) -> Result<NodeStatus, ResolveError> {
        self.nbt_client().node_status_query(name, addr).await
    }

    /// Find the first name of `desired_type` registered at `addr`,
    /// querying with `(q_name, q_type)`. Used to learn a server's name
    /// when only its address is known.
    pub async fn name_status_find(
        &self,
        q_name: &str,
        q_type: u8,
        desired_type: u8,
        addr: IpAddr,
    ) -> Result<String, ResolveError> {
        if self.config.disable_netbios {
            log::debug!(
                "name_status_find({}#{:02x}): netbios is disabled",
                q_name,
                q_type
            );
            return Err(ResolveError::Disabled);
        }

        log::trace!(
            "name_status_find: looking up {}#{:02x} at {}",
            q_name,
            q_type,
            addr
        );

        if let Some(name) = self
            .namecache
            .status_fetch(q_name, q_type, desired_type, &addr)
        {
            return Ok(name);
        }

        if !addr.is_ipv4() {
            // Can't do node status over IPv6.
            return Err(ResolveError::InvalidAddress);
        }

        if let Some(path) = &self.config.lmhosts_path
            && let Some(name) = lmhosts::lookup_name_by_addr(path, &addr, desired_type)
        {
            log::debug!("name_status_find: found name {} in lmhosts", name);
            self.namecache
                .status_store(q_name, q_type, desired_type, &addr, &name);
            return Ok(name);
        }

        let status = self
            .node_status_query(&NbtName::new(q_name, q_type), addr)
            .await?;

        let found = status
            .entries
            .iter()
            .find(|entry| entry.name_type == desired_type && !entry.is_group())
            .map(|entry| entry.name.clone())
            .ok_or(ResolveError::NotFound)?;

        // 0x1c names map to a list of hosts, not the single host we just
        // asked; remembering one answer for them would be wrong.
        if q_type != 0x1c {
            self.namecache
                .status_store(q_name, q_type, desired_type, &addr, &found);
        }

        log::trace!(
            "name_status_find: name {} found at {}",
            found,
            addr
        );
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::net::interfaces::{Interfaces, StaticInterfaces};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn test_resolver(config: Config) -> Resolver {
        let ifaces: Arc<dyn Interfaces> = Arc::new(StaticInterfaces {
            addrs: vec!["127.0.0.1".parse().unwrap()],
            bcasts: vec![],
        });
        Resolver::new(config).with_interfaces(ifaces)
    }

    #[tokio::test]
    async fn test_disabled_netbios() {
        let config = Config {
            disable_netbios: true,
            ..Config::default()
        };
        let resolver = test_resolver(config);
        let err = resolver
            .name_status_find("*", 0x00, 0x20, "10.0.0.1".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Disabled));
    }

    #[tokio::test]
    async fn test_cache_answers_without_network() {
        let resolver = test_resolver(Config::default());
        let addr: IpAddr = "10.0.0.1".parse().unwrap();
        resolver
            .namecache
            .status_store("*", 0x00, 0x20, &addr, "FILESRV");

        let name = resolver
            .name_status_find("*", 0x00, 0x20, addr)
            .await
            .unwrap();
        assert_eq!(name, "FILESRV");
    }

    #[tokio::test]
    async fn test_ipv6_target_is_rejected() {
        let resolver = test_resolver(Config::default());
        let err = resolver
            .name_status_find("*", 0x00, 0x20, "2001:db8::1".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidAddress));
    }

    #[tokio::test]
    async fn test_lmhosts_answers_and_caches() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "10.0.0.2 PDCBOX#1b").unwrap();

        let config = Config {
            lmhosts_path: Some(file.path().to_path_buf()),
            ..Config::default()
        };
        let resolver = test_resolver(config);
        let addr: IpAddr = "10.0.0.2".parse().unwrap();

        let name = resolver
            .name_status_find("*", 0x00, 0x1b, addr)
            .await
            .unwrap();
        assert_eq!(name, "PDCBOX");

        // Cached now; a second call succeeds even with the file gone.
        drop(file);
        let name = resolver
            .name_status_find("*", 0x00, 0x1b, addr)
            .await
            .unwrap();
        assert_eq!(name, "PDCBOX");
    }
}
