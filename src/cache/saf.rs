//! Server affinity records. Affinity is the concept of preferring the
//! last domain controller with whom you had a successful conversation;
//! join-time affinity is kept separately with a longer lifetime and
//! takes precedence on fetch.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::GenCache;
use crate::error::ResolveError;

/// Server affinity store, including the AD site name hint.
pub struct SafCache {
    cache: Arc<GenCache>,
    ttl: Duration,
    join_ttl: Duration,
}

fn saf_key(domain: &str) -> String {
    format!("SAF/DOMAIN/{}", domain.to_uppercase())
}

fn saf_join_key(domain: &str) -> String {
    format!("SAFJOIN/DOMAIN/{}", domain.to_uppercase())
}

fn sitename_key(realm: &str) -> String {
    format!("AD_SITENAME/DOMAIN/{}", realm.to_uppercase())
}

impl SafCache {
    pub fn new(cache: Arc<GenCache>, ttl: Duration, join_ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            join_ttl,
        }
    }

    /// Remember `servername` as the preferred server for `domain`.
    pub fn store(&self, domain: &str, servername: &str) -> Result<(), ResolveError> {
        if domain.is_empty() || servername.is_empty() {
            log::warn!("refusing to store empty domain or servername");
            return Err(ResolveError::InvalidParameter);
        }
        log::trace!(
            "saf store: domain [{}], server [{}], ttl {}s",
            domain,
            servername,
            self.ttl.as_secs()
        );
        self.cache.set(&saf_key(domain), servername, self.ttl);
        Ok(())
    }

    /// Like [`store`](Self::store), but recorded at domain join time and
    /// kept for longer.
    pub fn join_store(&self, domain: &str, servername: &str) -> Result<(), ResolveError> {
        if domain.is_empty() || servername.is_empty() {
            log::warn!("refusing to store empty domain or servername");
            return Err(ResolveError::InvalidParameter);
        }
        log::trace!(
            "saf join store: domain [{}], server [{}], ttl {}s",
            domain,
            servername,
            self.join_ttl.as_secs()
        );
        self.cache.set(&saf_join_key(domain), servername, self.join_ttl);
        Ok(())
    }

    /// Forget any affinity for `domain`, both regular and join-time.
    pub fn delete(&self, domain: &str) -> Result<(), ResolveError> {
        if domain.is_empty() {
            log::warn!("refusing to delete affinity for an empty domain");
            return Err(ResolveError::InvalidParameter);
        }
        if self.cache.delete(&saf_join_key(domain)) {
            log::trace!("saf delete[join]: domain [{}]", domain);
        }
        if self.cache.delete(&saf_key(domain)) {
            log::trace!("saf delete: domain [{}]", domain);
        }
        Ok(())
    }

    /// Preferred server for `domain`. The join-time record wins when both
    /// are present.
    pub fn fetch(&self, domain: &str) -> Option<String> {
        if domain.is_empty() {
            log::warn!("empty domain name in affinity fetch");
            return None;
        }
        if let Some(server) = self.cache.get(&saf_join_key(domain)) {
            log::debug!("saf fetch[join]: returning [{}] for [{}]", server, domain);
            return Some(server);
        }
        match self.cache.get(&saf_key(domain)) {
            Some(server) => {
                log::debug!("saf fetch: returning [{}] for [{}]", server, domain);
                Some(server)
            }
            None => {
                log::debug!("saf fetch: no server for [{}]", domain);
                None
            }
        }
    }

    /// Site name hint recorded by a previous CLDAP/DNS conversation.
    pub fn sitename_fetch(&self, realm: &str) -> Option<String> {
        if realm.is_empty() {
            return None;
        }
        self.cache.get(&sitename_key(realm))
    }

    /// Remember the AD site this machine appears to be in.
    pub fn sitename_store(&self, realm: &str, sitename: &str) -> Result<(), ResolveError> {
        if realm.is_empty() {
            return Err(ResolveError::InvalidParameter);
        }
        if sitename.is_empty() {
            self.cache.delete(&sitename_key(realm));
            return Ok(());
        }
        self.cache.set(&sitename_key(realm), sitename, self.ttl);
        Ok(())
    }
}
