//! NetBIOS name service protocol: name encoding, the packet codec, the
//! request/response transport with its daemon relay race, and the query
//! operations built on top of them.

pub mod name;
pub mod packet;
pub mod query;
pub mod relay;
pub mod transport;

pub use name::NbtName;
pub use packet::{NbtPacket, PacketType};
pub use query::{NameQueryResult, NbtClient, NodeStatus, NodeStatusEntry};

/// UDP port of the NetBIOS name service.
pub const NBT_PORT: u16 = 137;

/// NetBIOS name service datagrams must fit this send buffer.
pub const MAX_DGRAM_SIZE: usize = 1024;

/// Workstation service.
pub const NAME_TYPE_WORKSTATION: u8 = 0x00;
/// Primary domain controller.
pub const NAME_TYPE_PDC: u8 = 0x1b;
/// Domain controller group name.
pub const NAME_TYPE_DC: u8 = 0x1c;
/// Local master browser.
pub const NAME_TYPE_MASTER_BROWSER: u8 = 0x1d;
/// File server service.
pub const NAME_TYPE_SERVER: u8 = 0x20;

/// Synthetic name type selecting the Kerberos SRV lookup path. Never
/// appears on the wire; it exists so KDC results are cached apart from
/// domain controller results.
pub const KDC_NAME_TYPE: u16 = 0xDCDC;
