//! Name service transport. `sock_packet_read` races the daemon relay
//! against the UDP socket for the first acceptable packet; `nb_trans`
//! wraps one request/response exchange with a one second retransmit.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::ResolveError;
use crate::nbt::packet::{NbtPacket, PacketType};
use crate::nbt::relay::{RelayReader, RelayReaderFactory};
use crate::nbt::MAX_DGRAM_SIZE;

const RETRANSMIT_INTERVAL: Duration = Duration::from_secs(1);

/// Decides whether a delivered packet completes the exchange. Rejected
/// packets are dropped and the read is re-armed; the callback may
/// accumulate state across calls (broadcast queries collect every
/// response this way).
pub type Validator<'a> = &'a mut (dyn FnMut(&NbtPacket) -> bool + Send);

/// Open a broadcast-capable UDP socket bound to `src` on an ephemeral
/// port.
fn open_nbt_socket(src: Ipv4Addr) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::new(IpAddr::V4(src), 0).into())?;
    UdpSocket::from_std(socket.into())
}

/// Wait for the first packet that is IPv4, parses, matches `trn_id`
/// (when given), and passes the validator. Packets may arrive on the
/// socket or through the relay; whichever sub-wait fails keeps the
/// other one running, and only when both are gone does the read fail,
/// preferring the socket's error.
pub async fn sock_packet_read(
    sock: &UdpSocket,
    mut relay: Option<Box<dyn RelayReader>>,
    trn_id: Option<u16>,
    validator: Validator<'_>,
) -> Result<NbtPacket, ResolveError> {
    let mut buf = vec![0u8; MAX_DGRAM_SIZE];
    let mut sock_alive = true;
    let mut sock_err: Option<ResolveError> = None;

    loop {
        if !sock_alive && relay.is_none() {
            return Err(sock_err.take().unwrap_or(ResolveError::Internal));
        }

        tokio::select! {
            received = sock.recv_from(&mut buf), if sock_alive => {
                let (len, from) = match received {
                    Ok(pair) => pair,
                    Err(err) => {
                        sock_err = Some(err.into());
                        sock_alive = false;
                        continue;
                    }
                };
                let SocketAddr::V4(from) = from else {
                    // The wire protocol is IPv4 only.
                    continue;
                };
                let Some(packet) = NbtPacket::parse(&buf[..len], from) else {
                    log::trace!("parse_packet failed");
                    continue;
                };
                if let Some(expected) = trn_id
                    && packet.header.trn_id != expected
                {
                    log::trace!(
                        "expected transaction id {}, got {}",
                        expected,
                        packet.header.trn_id
                    );
                    continue;
                }
                if !validator(&packet) {
                    log::trace!("validator failed");
                    continue;
                }
                return Ok(packet);
            }
            relayed = async { relay.as_mut().unwrap().read().await }, if relay.is_some() => {
                match relayed {
                    Ok(packet) => {
                        if !validator(&packet) {
                            log::trace!("validator failed");
                            continue;
                        }
                        return Ok(packet);
                    }
                    Err(_) => {
                        relay = None;
                    }
                }
            }
        }
    }
}

/// One NBT request/response transaction: open a socket bound to
/// `my_addr`, subscribe to the daemon relay for `trn_id`, send the
/// request, and retransmit every second until an acceptable response
/// arrives. The caller bounds the whole exchange with a deadline.
pub async fn nb_trans(
    relay_factory: Option<&dyn RelayReaderFactory>,
    my_addr: Ipv4Addr,
    dst_addr: SocketAddrV4,
    buf: &[u8],
    packet_type: PacketType,
    trn_id: u16,
    validator: Validator<'_>,
) -> Result<NbtPacket, ResolveError> {
    let sock = open_nbt_socket(my_addr)?;

    let relay = match relay_factory {
        Some(factory) => match factory.subscribe(packet_type, trn_id).await {
            Ok(reader) => Some(reader),
            Err(_) => {
                log::trace!("name service daemon not around");
                None
            }
        },
        None => None,
    };

    let send_loop = async {
        loop {
            if let Err(err) = sock.send_to(buf, SocketAddr::V4(dst_addr)).await {
                log::trace!("sendto failed: {}", err);
                return ResolveError::from(err);
            }
            tokio::time::sleep(RETRANSMIT_INTERVAL).await;
        }
    };

    tokio::select! {
        packet = sock_packet_read(&sock, relay, Some(trn_id), validator) => packet,
        err = send_loop => Err(err),
    }
}
