//! Error type shared by every resolution backend and the pipeline driver.

use thiserror::Error;

/// Failure classification for name resolution operations.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The caller passed a forbidden combination (empty strings, a "NULL"
    /// resolve order, a non-IPv4 source for WINS, ...).
    #[error("invalid parameter")]
    InvalidParameter,

    /// The destination address has the wrong family for the requested
    /// operation (NetBIOS transport is IPv4 only).
    #[error("invalid address")]
    InvalidAddress,

    /// A deadline fired before a response arrived.
    #[error("timed out")]
    Timeout,

    /// A server answered negatively, or a backend produced zero endpoints.
    #[error("name not found")]
    NotFound,

    /// The lookup ran to completion without yielding any usable address.
    #[error("lookup unsuccessful")]
    Unsuccessful,

    /// Domain controller list assembly produced no candidates even after
    /// the automatic lookup.
    #[error("no logon servers")]
    NoLogonServers,

    /// NetBIOS is globally disabled and a NetBIOS-only path was requested.
    #[error("netbios is disabled")]
    Disabled,

    /// Bookkeeping inconsistency that should be impossible.
    #[error("internal error")]
    Internal,

    /// Transport-level failure from the underlying socket or task.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResolveError {
    /// True when the error is the expiry of a deadline rather than a
    /// definitive failure. WINS failover treats only this case as
    /// "server is dead, try the next one".
    pub fn is_timeout(&self) -> bool {
        matches!(self, ResolveError::Timeout)
    }
}
