//! Caching layer. A generic TTL key/value store plus the name cache and
//! server affinity records built on top of it.

pub mod gencache;
pub mod namecache;
pub mod saf;

pub use gencache::GenCache;
pub use namecache::NameCache;
pub use saf::SafCache;
