//! Subscription seam for a cooperating local name service daemon. When
//! such a daemon owns the NetBIOS port it relays matching packets to
//! clients; the transport races this relay against its own socket so a
//! response is caught either way.

use std::io;

use futures::future::BoxFuture;

use crate::nbt::packet::{NbtPacket, PacketType};

/// One live relay subscription. `read` resolves with the next packet the
/// daemon relays for the subscribed type and transaction id.
pub trait RelayReader: Send {
    fn read(&mut self) -> BoxFuture<'_, io::Result<NbtPacket>>;
}

/// Connects to the local daemon. Subscription failure is expected when
/// no daemon is running and is treated as "race the socket alone".
pub trait RelayReaderFactory: Send + Sync {
    fn subscribe(
        &self,
        packet_type: PacketType,
        trn_id: u16,
    ) -> BoxFuture<'_, io::Result<Box<dyn RelayReader>>>;
}
