//! Multicast announcement of the controller's address.
//!
//! The controller periodically sends `SERVER_IP:<ip>:<port>` to a multicast
//! group; agents listen on that group to learn where to register.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket as StdUdpSocket};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

use super::task::TaskHandle;

/// Prefix of every beacon datagram
pub const BEACON_PREFIX: &str = "SERVER_IP";

/// Default multicast group and port for beacons
pub const DEFAULT_MULTICAST_GROUP: SocketAddrV4 =
    SocketAddrV4::new(Ipv4Addr::new(224, 1, 1, 1), 6000);

/// Encode a controller address as a beacon message.
pub fn format_beacon(addr: SocketAddr) -> String {
    format!("{}:{}:{}", BEACON_PREFIX, addr.ip(), addr.port())
}

/// Decode a beacon message. Anything malformed yields `None`.
pub fn parse_beacon(message: &str) -> Option<SocketAddr> {
    let rest = message.trim().strip_prefix(BEACON_PREFIX)?.strip_prefix(':')?;
    let (ip, port) = rest.split_once(':')?;
    let ip: Ipv4Addr = ip.parse().ok()?;
    let port: u16 = port.parse().ok()?;
    Some(SocketAddr::new(IpAddr::V4(ip), port))
}

/// Best guess at this machine's LAN address.
///
/// Connecting a UDP socket sends nothing; it only asks the OS which local
/// address routes towards the multicast group.
pub fn local_ip(group: SocketAddrV4) -> IpAddr {
    let routed = StdUdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| socket.connect(group).map(|_| socket))
        .and_then(|socket| socket.local_addr());

    match routed {
        Ok(addr) if !addr.ip().is_unspecified() => addr.ip(),
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            warn!("Could not determine LAN address, using loopback: {}", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Start sending beacons for `advertised` to `group` every `interval`.
pub async fn start_beacon(
    advertised: SocketAddr,
    group: SocketAddrV4,
    interval: Duration,
) -> io::Result<TaskHandle> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_multicast_ttl_v4(1)?;
    let message = format_beacon(advertised);
    debug!("Broadcasting '{}' to {}", message, group);

    Ok(TaskHandle::spawn("beacon", move |mut shutdown_rx| async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match socket.send_to(message.as_bytes(), group).await {
                        Ok(_) => trace!("Sent beacon to {}", group),
                        Err(e) => warn!("Failed to send beacon: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    }))
}

/// Receives beacons on the multicast group.
pub struct BeaconListener {
    socket: UdpSocket,
}

impl BeaconListener {
    /// Join `group` on all interfaces.
    pub async fn bind(group: SocketAddrV4) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, group.port())).await?;
        socket.join_multicast_v4(*group.ip(), Ipv4Addr::UNSPECIFIED)?;
        debug!("Listening for beacons on {}", group);
        Ok(Self { socket })
    }

    /// Wrap an already bound socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self { socket }
    }

    /// Wait for the next well-formed beacon and return the address it names.
    pub async fn next_server(&self) -> io::Result<SocketAddr> {
        let mut buf = [0u8; 1024];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            let message = String::from_utf8_lossy(&buf[..len]);
            match parse_beacon(&message) {
                Some(addr) => {
                    trace!("Beacon from {} names {}", from, addr);
                    return Ok(addr);
                }
                None => debug!("Ignoring datagram from {}: {:?}", from, message),
            }
        }
    }
}
