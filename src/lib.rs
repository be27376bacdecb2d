//! Name resolution for a Windows-compatible file sharing client.
//!
//! Translates a symbolic server identifier (NetBIOS name, DNS hostname,
//! or textual IP literal) plus a NetBIOS name type into an ordered list
//! of reachable endpoints, using a configurable chain of backends:
//! static lmhosts entries, WINS servers, the system resolver, subnet
//! broadcasts, and DNS SRV discovery of domain controllers and KDCs.
//!
//! The [`Resolver`] handle owns the positive name cache, the server
//! affinity records, and the WINS liveness table; DNS SRV lookups and
//! the local name-daemon relay plug in behind traits.
//!
//! ```no_run
//! use netbios_resolver::{Config, Resolver};
//!
//! # async fn example() -> Result<(), netbios_resolver::ResolveError> {
//! let resolver = Resolver::new(Config::default());
//! let endpoint = resolver.resolve_name("FILESRV", 0x20, true).await?;
//! println!("talking to {}", endpoint);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod dc;
pub mod error;
pub mod nbt;
pub mod net;
pub mod resolve;
mod resolver;

pub use config::{Config, SecurityMode, WinsTag};
pub use dc::{DcLookupType, NegativeConnCache, NoNegativeCache};
pub use error::ResolveError;
pub use nbt::query::{NodeStatus, NodeStatusEntry};
pub use nbt::NbtName;
pub use net::endpoint::Endpoint;
pub use net::interfaces::{Interfaces, SystemInterfaces};
pub use resolve::ads::{DnsClient, SrvRecord};
pub use resolver::Resolver;
