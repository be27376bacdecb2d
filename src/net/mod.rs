//! Network address model: endpoints, local interface enumeration, and
//! topological ranking of candidate addresses.

pub mod endpoint;
pub mod interfaces;
pub mod rank;

pub use endpoint::Endpoint;
pub use interfaces::{Interfaces, SystemInterfaces};
