//! The `ads`/`kdc` backend: DNS SRV discovery of domain controllers and
//! KDCs, plus the parallel A/AAAA resolution of SRV targets that came
//! back without embedded addresses.

use std::net::IpAddr;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;

use crate::error::ResolveError;
use crate::nbt::KDC_NAME_TYPE;
use crate::net::endpoint::is_zero_addr;

/// One SRV answer: the target host, the advertised port, and any
/// addresses the server already included in the additional section.
#[derive(Debug, Clone)]
pub struct SrvRecord {
    pub hostname: Option<String>,
    pub port: u16,
    pub addrs: Vec<IpAddr>,
}

/// DNS operations the resolver depends on. Implementations are expected
/// to return SRV answers already ordered by priority and weight.
pub trait DnsClient: Send + Sync {
    /// SRV lookup for the primary domain controller of `domain`.
    fn query_pdc<'a>(&'a self, domain: &'a str)
        -> BoxFuture<'a, Result<Vec<SrvRecord>, ResolveError>>;

    /// SRV lookup for the domain controllers of `domain`, optionally
    /// restricted to an AD site.
    fn query_dcs<'a>(
        &'a self,
        domain: &'a str,
        sitename: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<SrvRecord>, ResolveError>>;

    /// SRV lookup for the Kerberos KDCs of `realm`.
    fn query_kdcs<'a>(
        &'a self,
        realm: &'a str,
        sitename: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Vec<SrvRecord>, ResolveError>>;

    fn lookup_a<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<IpAddr>, ResolveError>>;

    fn lookup_aaaa<'a>(&'a self, name: &'a str)
        -> BoxFuture<'a, Result<Vec<IpAddr>, ResolveError>>;
}

/// Resolve a list of hostnames with parallel A and AAAA lookups under
/// one wall-clock deadline. Results come back in query-issue order;
/// individual failures contribute nothing, and running out of time
/// returns whatever has arrived so far.
pub async fn dns_lookup_list(
    dns: &dyn DnsClient,
    names: &[String],
    timeout: Duration,
) -> Result<Vec<IpAddr>, ResolveError> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let mut slots: Vec<Vec<IpAddr>> = vec![Vec::new(); names.len() * 2];
    let mut pending: FuturesUnordered<BoxFuture<'_, (usize, Result<Vec<IpAddr>, ResolveError>)>> =
        FuturesUnordered::new();

    for (i, name) in names.iter().enumerate() {
        let name = name.as_str();
        log::info!("async DNS lookup A record for {}", name);
        pending.push(async move { (2 * i, dns.lookup_a(name).await) }.boxed());
        log::info!("async DNS lookup AAAA record for {}", name);
        pending.push(async move { (2 * i + 1, dns.lookup_aaaa(name).await) }.boxed());
    }

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                log::info!("async DNS lookup timed out, returning partial results (not an error)");
                break;
            }
            next = pending.next() => match next {
                None => break,
                Some((slot, Ok(addrs))) => slots[slot] = addrs,
                Some((_, Err(err))) => {
                    log::info!("async DNS lookup returned {}", err);
                }
            }
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

/// SRV-based resolution for PDC, DC, and KDC name types. Addresses
/// embedded in the SRV reply come first, then the addresses resolved
/// from bare SRV target names, in query-issue order.
pub async fn resolve_ads(
    dns: &dyn DnsClient,
    name: &str,
    name_type: u16,
    sitename: Option<&str>,
    dns_timeout: Duration,
) -> Result<Vec<IpAddr>, ResolveError> {
    let mut records = match name_type {
        0x1b => {
            log::info!("resolve_ads: attempting to resolve PDC for {} using DNS", name);
            dns.query_pdc(name).await?
        }
        0x1c => {
            log::info!("resolve_ads: attempting to resolve DCs for {} using DNS", name);
            dns.query_dcs(name, sitename).await?
        }
        KDC_NAME_TYPE => {
            log::info!("resolve_ads: attempting to resolve KDCs for {} using DNS", name);
            dns.query_kdcs(name, sitename).await?
        }
        _ => return Err(ResolveError::InvalidParameter),
    };

    if records.is_empty() {
        return Ok(Vec::new());
    }

    // Split the SRV answers: records carrying addresses contribute them
    // directly, records carrying only a target name get queued for
    // A/AAAA resolution.
    let mut srv_addrs = Vec::new();
    let mut lookup_names = Vec::new();

    for record in &mut records {
        if !record.addrs.is_empty() {
            for addr in &record.addrs {
                if is_zero_addr(addr) {
                    continue;
                }
                log::debug!("SRV lookup {} got IP {}", name, addr);
                srv_addrs.push(*addr);
            }
            // Already handled; keep it out of the name lookup below.
            record.hostname = None;
        } else if let Some(hostname) = record.hostname.take() {
            lookup_names.push(hostname);
        }
    }

    let dns_addrs = dns_lookup_list(dns, &lookup_names, dns_timeout).await?;
    srv_addrs.extend(dns_addrs);
    Ok(srv_addrs)
}

#[cfg(test)]
pub mod testing {
    //! Scriptable DNS double shared by the backend and pipeline tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockDnsClient {
        pub srv_records: Mutex<Vec<SrvRecord>>,
        pub a_records: Mutex<std::collections::HashMap<String, Vec<IpAddr>>>,
        pub srv_queries: AtomicUsize,
        pub lookups: AtomicUsize,
        /// When set, address lookups hang until cancelled.
        pub stall_lookups: bool,
    }

    impl MockDnsClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn srv_query_count(&self) -> usize {
            self.srv_queries.load(Ordering::SeqCst)
        }

        fn srv(&self) -> Result<Vec<SrvRecord>, ResolveError> {
            self.srv_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.srv_records.lock().unwrap().clone())
        }

        fn addr_lookup(&self, name: &str, v4: bool) -> Result<Vec<IpAddr>, ResolveError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let addrs = self
                .a_records
                .lock()
                .unwrap()
                .get(name)
                .cloned()
                .unwrap_or_default();
            Ok(addrs
                .into_iter()
                .filter(|addr| addr.is_ipv4() == v4)
                .collect())
        }
    }

    impl DnsClient for MockDnsClient {
        fn query_pdc<'a>(
            &'a self,
            _domain: &'a str,
        ) -> BoxFuture<'a, Result<Vec<SrvRecord>, ResolveError>> {
            async move { self.srv() }.boxed()
        }

        fn query_dcs<'a>(
            &'a self,
            _domain: &'a str,
            _sitename: Option<&'a str>,
        ) -> BoxFuture<'a, Result<Vec<SrvRecord>, ResolveError>> {
            async move { self.srv() }.boxed()
        }

        fn query_kdcs<'a>(
            &'a self,
            _realm: &'a str,
            _sitename: Option<&'a str>,
        ) -> BoxFuture<'a, Result<Vec<SrvRecord>, ResolveError>> {
            async move { self.srv() }.boxed()
        }

        fn lookup_a<'a>(
            &'a self,
            name: &'a str,
        ) -> BoxFuture<'a, Result<Vec<IpAddr>, ResolveError>> {
            async move {
                if self.stall_lookups {
                    futures::future::pending::<()>().await;
                }
                self.addr_lookup(name, true)
            }
            .boxed()
        }

        fn lookup_aaaa<'a>(
            &'a self,
            name: &'a str,
        ) -> BoxFuture<'a, Result<Vec<IpAddr>, ResolveError>> {
            async move {
                if self.stall_lookups {
                    futures::future::pending::<()>().await;
                }
                self.addr_lookup(name, false)
            }
            .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockDnsClient;
    use super::*;

    fn srv(hostname: Option<&str>, port: u16, addrs: &[&str]) -> SrvRecord {
        SrvRecord {
            hostname: hostname.map(str::to_string),
            port,
            addrs: addrs.iter().map(|a| a.parse().unwrap()).collect(),
        }
    }

    #[tokio::test]
    async fn test_embedded_and_looked_up_addresses_merge_in_order() {
        let dns = MockDnsClient::new();
        *dns.srv_records.lock().unwrap() = vec![
            srv(Some("dc1.example.com"), 389, &["192.0.2.1"]),
            srv(Some("dc2.example.com"), 389, &[]),
        ];
        dns.a_records.lock().unwrap().insert(
            "dc2.example.com".to_string(),
            vec!["192.0.2.2".parse().unwrap()],
        );

        let addrs = resolve_ads(&dns, "example.com", 0x1c, None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(
            addrs,
            vec![
                "192.0.2.1".parse::<IpAddr>().unwrap(),
                "192.0.2.2".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_addresses_are_dropped() {
        let dns = MockDnsClient::new();
        *dns.srv_records.lock().unwrap() = vec![srv(
            Some("dc1.example.com"),
            389,
            &["0.0.0.0", "192.0.2.1"],
        )];

        let addrs = resolve_ads(&dns, "example.com", 0x1c, None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(addrs, vec!["192.0.2.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_wrong_name_type_is_invalid() {
        let dns = MockDnsClient::new();
        let err = resolve_ads(&dns, "example.com", 0x20, None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::InvalidParameter));
    }

    #[tokio::test]
    async fn test_empty_srv_answer_is_empty_success() {
        let dns = MockDnsClient::new();
        let addrs = resolve_ads(&dns, "example.com", 0x1b, None, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(addrs.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_timeout_returns_partial_results() {
        let mut dns = MockDnsClient::new();
        dns.stall_lookups = true;
        *dns.srv_records.lock().unwrap() = vec![
            srv(Some("dc1.example.com"), 389, &["192.0.2.1"]),
            srv(Some("dc2.example.com"), 389, &[]),
        ];

        // The stalled A/AAAA lookups never finish; the deadline fires
        // and the embedded SRV address is still returned as success.
        let addrs = resolve_ads(&dns, "example.com", 0x1c, None, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(addrs, vec!["192.0.2.1".parse::<IpAddr>().unwrap()]);
    }

    #[tokio::test]
    async fn test_dns_lookup_list_preserves_issue_order() {
        let dns = MockDnsClient::new();
        {
            let mut a = dns.a_records.lock().unwrap();
            a.insert("b.example.com".to_string(), vec!["10.0.0.2".parse().unwrap()]);
            a.insert("a.example.com".to_string(), vec!["10.0.0.1".parse().unwrap()]);
        }

        let addrs = dns_lookup_list(
            &dns,
            &["a.example.com".to_string(), "b.example.com".to_string()],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(
            addrs,
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "10.0.0.2".parse::<IpAddr>().unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn test_dns_lookup_list_empty_names() {
        let dns = MockDnsClient::new();
        let addrs = dns_lookup_list(&dns, &[], Duration::from_secs(1)).await.unwrap();
        assert!(addrs.is_empty());
    }
}
