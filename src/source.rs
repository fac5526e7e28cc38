//! Datagram source (external collaborator, §9): wherever packets come
//! from, the ingest loop only needs "give me the next datagram". Real
//! deployments plug in DPDK rx queues, shared-memory captures, or a test
//! harness; this crate ships a plain UDP socket as its one concrete
//! default, parallel to how the teacher treats its capture source
//! (`protocols::packet`) as pluggable per-protocol parsing over an
//! opaque `Mbuf`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nix::sys::socket::{setsockopt, sockopt};

use crate::config::UdpSourceConfig;
use crate::error::RecvError;

/// Capability set `{recv, shutdown}`. A single instance is owned by one
/// [`crate::stream::Stream`]'s ingest loop; `recv` is called in a tight
/// loop from that one thread, so the trait itself does not need to be
/// `Sync`.
pub trait DatagramSource: Send {
    /// Blocks until a datagram is available, copies it into `buf`, and
    /// returns its length. Returns [`RecvError::Stopped`] once `shutdown`
    /// has been called (and no more datagrams remain on the wire to drain).
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, RecvError>;

    /// Requests that a current or future blocked `recv` return promptly
    /// with [`RecvError::Stopped`].
    fn shutdown(&self);
}

/// A bound UDP socket, optionally joined to a multicast group. Polls its
/// own `stopped` flag on a short read timeout rather than relying on a
/// self-pipe, since `std::net::UdpSocket` offers no portable way to wake a
/// blocked `recv_from` from another thread.
pub struct UdpDatagramSource {
    socket: UdpSocket,
    stopped: std::sync::Arc<AtomicBool>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(200);

impl UdpDatagramSource {
    pub fn bind(config: &UdpSourceConfig) -> Result<Self, RecvError> {
        let socket = UdpSocket::bind(&config.bind_addr)
            .map_err(|e| RecvError::SourceFatal(e.into()))?;
        socket
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(|e| RecvError::SourceFatal(e.into()))?;

        setsockopt(&socket, sockopt::RcvBuf, &config.socket_buffer_size)
            .map_err(|e| RecvError::SourceFatal(e.into()))?;

        if let Some(group) = &config.multicast_group {
            let group: Ipv4Addr = group
                .parse()
                .map_err(|_| RecvError::SourceFatal(anyhow::anyhow!("invalid multicast group {group}")))?;
            let bind_addr: SocketAddr = config
                .bind_addr
                .parse()
                .map_err(|_| RecvError::SourceFatal(anyhow::anyhow!("invalid bind_addr {}", config.bind_addr)))?;
            let interface = match bind_addr.ip() {
                IpAddr::V4(addr) => addr,
                IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
            };
            socket
                .join_multicast_v4(&group, &interface)
                .map_err(|e| RecvError::SourceFatal(e.into()))?;
        }

        Ok(UdpDatagramSource {
            socket,
            stopped: std::sync::Arc::new(AtomicBool::new(false)),
        })
    }
}

impl DatagramSource for UdpDatagramSource {
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, RecvError> {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return Err(RecvError::Stopped);
            }
            match self.socket.recv(buf) {
                Ok(n) => return Ok(n),
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => return Err(RecvError::SourceFatal(e.into())),
            }
        }
    }

    fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_to_loopback_and_receives_a_datagram() {
        let config = UdpSourceConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            socket_buffer_size: 65536,
            multicast_group: None,
        };
        let mut source = UdpDatagramSource::bind(&config).unwrap();
        let local_addr = source.socket.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(b"spead", local_addr).unwrap();

        let mut buf = [0u8; 16];
        let n = source.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"spead");
    }

    #[test]
    fn shutdown_unblocks_recv() {
        let config = UdpSourceConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            socket_buffer_size: 65536,
            multicast_group: None,
        };
        let mut source = UdpDatagramSource::bind(&config).unwrap();
        source.shutdown();
        let mut buf = [0u8; 16];
        assert!(matches!(source.recv(&mut buf), Err(RecvError::Stopped)));
    }
}
