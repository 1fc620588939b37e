use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use lsnp_core::wire::BUFFER_SIZE;

use crate::error::TransportError;

/// An inbound frame: its raw text body and the socket address it arrived
/// from.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub raw: String,
    pub from: SocketAddr,
}

/// Bind a UDP socket with `SO_REUSEADDR` (and `SO_REUSEPORT` on Unix) set
/// before the port is claimed, then hand it to `tokio`.
fn bind_reusable_udp(port: u16) -> Result<UdpSocket, TransportError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| TransportError::Bind { port, source: e })?;
    socket
        .set_reuse_address(true)
        .map_err(|e| TransportError::Bind { port, source: e })?;
    #[cfg(not(target_os = "windows"))]
    socket
        .set_reuse_port(true)
        .map_err(|e| TransportError::Bind { port, source: e })?;
    let addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into();
    socket
        .bind(&addr.into())
        .map_err(|e| TransportError::Bind { port, source: e })?;
    socket
        .set_nonblocking(true)
        .map_err(|e| TransportError::Bind { port, source: e })?;
    socket
        .set_broadcast(true)
        .map_err(|e| TransportError::Bind { port, source: e })?;

    let std_sock: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_sock).map_err(|e| TransportError::Bind { port, source: e })
}

fn join_multicast(socket: &UdpSocket, group: Ipv4Addr) -> Result<(), TransportError> {
    socket
        .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
        .map_err(TransportError::Multicast)?;
    socket
        .set_multicast_loop_v4(true)
        .map_err(TransportError::Multicast)?;
    socket
        .set_multicast_ttl_v4(1)
        .map_err(TransportError::Multicast)?;
    Ok(())
}

/// Naive /24 broadcast address derived from an IPv4 address; falls back to
/// the limited broadcast address if the input doesn't parse as four octets.
pub fn compute_broadcast(ip: Ipv4Addr) -> Ipv4Addr {
    let o = ip.octets();
    Ipv4Addr::new(o[0], o[1], o[2], 255)
}

/// Best-effort local IPv4 address discovery: open a UDP socket "connected"
/// to an unreachable external address and read back the OS-chosen source
/// address, falling back to loopback.
pub fn local_ip() -> Ipv4Addr {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| {
            s.connect("10.255.255.255:1")?;
            s.local_addr()
        })
        .ok()
        .and_then(|addr| match addr.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            _ => None,
        })
        .unwrap_or(Ipv4Addr::LOCALHOST)
}

/// Two-socket UDP transport: one bound to this process's unique unicast
/// port, one bound to the fixed discovery port (shared with the unicast
/// socket when the two ports coincide). Simulated loss applies only to
/// `game`/`file`-scoped unicast sends, including resends.
pub struct Transport {
    uni_port: u16,
    uni_sock: UdpSocket,
    disc_sock: Option<UdpSocket>,
    loss_prob: f64,
    discovery_port: u16,
    multicast_group: Ipv4Addr,
}

impl Transport {
    /// Bind both sockets. `discovery_port`/`multicast_group` come from
    /// `lsnp_config::Config` rather than the `wire` module's defaults, so a
    /// peer can be pointed at a non-default discovery rendezvous.
    pub async fn bind(
        unicast_port: u16,
        loss_prob: f64,
        discovery_port: u16,
        multicast_group: Ipv4Addr,
    ) -> Result<Self, TransportError> {
        let loss_prob = loss_prob.clamp(0.0, 1.0);
        let uni_sock = bind_reusable_udp(unicast_port)?;
        let unicast_port = uni_sock
            .local_addr()
            .map_err(|e| TransportError::Bind {
                port: unicast_port,
                source: e,
            })?
            .port();

        let disc_sock = if unicast_port == discovery_port {
            None
        } else {
            Some(bind_reusable_udp(discovery_port)?)
        };

        let mcast_target = disc_sock.as_ref().unwrap_or(&uni_sock);
        if let Err(e) = join_multicast(mcast_target, multicast_group) {
            warn!(error = %e, "multicast join failed");
        }

        Ok(Transport {
            uni_port: unicast_port,
            uni_sock,
            disc_sock,
            loss_prob,
            discovery_port,
            multicast_group,
        })
    }

    pub fn listen_port(&self) -> u16 {
        self.uni_port
    }

    fn should_drop(&self, drop_for: &str) -> bool {
        matches!(drop_for, "game" | "file") && rand::random::<f64>() < self.loss_prob
    }

    pub async fn send_unicast(&self, ip: Ipv4Addr, port: u16, data: &str, drop_for: &str) {
        if self.should_drop(drop_for) {
            debug!(%ip, port, drop_for, "simulated drop (unicast)");
            return;
        }
        let dest = SocketAddr::from(SocketAddrV4::new(ip, port));
        if let Err(e) = self.uni_sock.send_to(data.as_bytes(), dest).await {
            error!(%dest, error = %e, "unicast send failed");
        }
    }

    pub async fn send_broadcast(&self, bcast_ip: Ipv4Addr, data: &str) {
        let dest = SocketAddr::from(SocketAddrV4::new(bcast_ip, self.discovery_port));
        if let Err(e) = self.uni_sock.send_to(data.as_bytes(), dest).await {
            error!(%dest, error = %e, "broadcast send failed");
        }
    }

    pub async fn send_multicast(&self, data: &str) {
        let dest = SocketAddr::from(SocketAddrV4::new(self.multicast_group, self.discovery_port));
        if let Err(e) = self.uni_sock.send_to(data.as_bytes(), dest).await {
            error!(%dest, error = %e, "multicast send failed");
        }
    }

    /// Spawn one receive-loop task per distinct open socket, forwarding
    /// every inbound datagram over `tx`. Returns the spawned task handles so
    /// callers can await/abort them on shutdown.
    pub fn spawn_recv_loops(self: std::sync::Arc<Self>, tx: mpsc::Sender<Inbound>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        let this = self.clone();
        let uni_tx = tx.clone();
        handles.push(tokio::spawn(async move {
            recv_loop(&this.uni_sock, uni_tx).await;
        }));

        if self.disc_sock.is_some() {
            let this = self.clone();
            handles.push(tokio::spawn(async move {
                recv_loop(this.disc_sock.as_ref().unwrap(), tx).await;
            }));
        }

        handles
    }
}

async fn recv_loop(sock: &UdpSocket, tx: mpsc::Sender<Inbound>) {
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        match sock.recv_from(&mut buf).await {
            Ok((n, from)) => {
                let raw = String::from_utf8_lossy(&buf[..n]).to_string();
                if tx.send(Inbound { raw, from }).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                error!(error = %e, "udp recv error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_broadcast_substitutes_last_octet() {
        let ip: Ipv4Addr = "192.168.1.42".parse().unwrap();
        assert_eq!(compute_broadcast(ip), Ipv4Addr::new(192, 168, 1, 255));
    }

    #[tokio::test]
    async fn two_transports_can_exchange_unicast_on_loopback() {
        let group: Ipv4Addr = lsnp_core::wire::MULTICAST_GROUP.parse().unwrap();
        let a = Transport::bind(0, 0.0, lsnp_core::wire::DISCOVERY_PORT, group).await.unwrap();
        let b = Transport::bind(0, 0.0, lsnp_core::wire::DISCOVERY_PORT, group).await.unwrap();
        let b_port = b.listen_port();

        let (tx, mut rx) = mpsc::channel(8);
        let b = std::sync::Arc::new(b);
        let _handles = b.clone().spawn_recv_loops(tx);

        a.send_unicast(Ipv4Addr::LOCALHOST, b_port, "TYPE: PING\n\n", "").await;

        let inbound = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .expect("no datagram received in time")
            .expect("channel closed");
        assert!(inbound.raw.contains("TYPE: PING"));
    }
}
