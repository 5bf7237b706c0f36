//! UDP transport (spec §4.5): a single broadcast-enabled socket with three
//! operations. Chunking, retry, and every other policy decision lives above
//! this layer — `Transport` only moves bytes.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::warn;

use lsnp_types::MAX_DATAGRAM_SIZE;

/// Default subnet mask assumed when computing the directed broadcast
/// address from this host's local IPv4 address. Most LAN deployments this
/// peer targets are flat `/24`s; callers on a differently-sized subnet can
/// override it via [`Transport::bind_with_netmask`].
const DEFAULT_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

pub struct Transport {
    socket: UdpSocket,
    broadcast_addr: SocketAddr,
    local_ip: Ipv4Addr,
    port: u16,
}

impl Transport {
    /// Bind to `0.0.0.0:port` with `SO_BROADCAST` enabled, assuming a
    /// `/24` local subnet.
    pub async fn bind(port: u16) -> std::io::Result<Self> {
        Self::bind_with_netmask(port, DEFAULT_NETMASK).await
    }

    pub async fn bind_with_netmask(port: u16, netmask: Ipv4Addr) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        socket.set_broadcast(true)?;

        let local_ip = local_ip_address::local_ip()
            .ok()
            .and_then(|ip| match ip {
                std::net::IpAddr::V4(v4) => Some(v4),
                std::net::IpAddr::V6(_) => None,
            })
            .unwrap_or(Ipv4Addr::LOCALHOST);
        let broadcast_ip = directed_broadcast(local_ip, netmask);
        let broadcast_addr = SocketAddr::new(broadcast_ip.into(), port);

        Ok(Self { socket, broadcast_addr, local_ip, port })
    }

    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Fire-and-forget unicast send.
    pub async fn send_unicast(&self, addr: SocketAddr, bytes: &[u8]) -> std::io::Result<()> {
        if bytes.len() > MAX_DATAGRAM_SIZE {
            warn!(len = bytes.len(), "refusing to send oversized datagram");
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "datagram exceeds MAX_DATAGRAM_SIZE",
            ));
        }
        self.socket.send_to(bytes, addr).await?;
        Ok(())
    }

    /// Send to the subnet's directed broadcast address.
    pub async fn send_broadcast(&self, bytes: &[u8]) -> std::io::Result<()> {
        self.send_unicast(self.broadcast_addr, bytes).await
    }

    /// Block until a datagram arrives. Short reads and malformed datagrams
    /// are the caller's concern (the codec rejects them); this layer never
    /// tears the socket down on a single bad packet.
    pub async fn recv(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}

fn directed_broadcast(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    let ip_bits = u32::from(ip);
    let mask_bits = u32::from(netmask);
    Ipv4Addr::from(ip_bits | !mask_bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directed_broadcast_slash_24() {
        let ip: Ipv4Addr = "192.168.1.42".parse().unwrap();
        let mask: Ipv4Addr = "255.255.255.0".parse().unwrap();
        assert_eq!(directed_broadcast(ip, mask), "192.168.1.255".parse().unwrap());
    }

    #[test]
    fn directed_broadcast_slash_16() {
        let ip: Ipv4Addr = "10.20.30.40".parse().unwrap();
        let mask: Ipv4Addr = "255.255.0.0".parse().unwrap();
        assert_eq!(directed_broadcast(ip, mask), "10.20.255.255".parse().unwrap());
    }

    #[tokio::test]
    async fn bind_and_send_loopback() {
        let t1 = Transport::bind(0).await.unwrap();
        let t2 = Transport::bind(0).await.unwrap();
        let t2_addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), t2.socket.local_addr().unwrap().port());
        t1.send_unicast(t2_addr, b"hello").await.unwrap();
        let mut buf = [0u8; 16];
        let (n, _src) = t2.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[tokio::test]
    async fn oversized_datagram_rejected() {
        let t = Transport::bind(0).await.unwrap();
        let big = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), t.port());
        assert!(t.send_unicast(addr, &big).await.is_err());
    }
}
