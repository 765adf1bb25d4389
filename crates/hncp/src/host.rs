//! UDP host: runs one engine on real IPv6 sockets.
//!
//! A single socket bound to the HNCP port joins the multicast group on every
//! configured interface. Received datagrams are attributed to a link by the
//! scope id of their link-local source address. The destination address is
//! not available from the socket and is reported as unspecified.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use hncp_sync::{Datagram, Io, SyncEngine, SyncError, HNCP_MULTICAST};

use crate::config::HncpConfig;
use crate::dump::{dump, Snapshot};
use crate::error::Result;

/// Largest datagram read from the socket.
const RECV_BUFFER: usize = 65_536;

/// Two-way mapping between engine link ids and OS interface indexes.
#[derive(Debug, Clone, Default)]
pub struct LinkMap {
    by_link: BTreeMap<u32, u32>,
    by_ifindex: BTreeMap<u32, u32>,
}

impl LinkMap {
    pub fn insert(&mut self, link: u32, ifindex: u32) {
        self.by_link.insert(link, ifindex);
        self.by_ifindex.insert(ifindex, link);
    }

    pub fn ifindex(&self, link: u32) -> Option<u32> {
        self.by_link.get(&link).copied()
    }

    pub fn link(&self, ifindex: u32) -> Option<u32> {
        self.by_ifindex.get(&ifindex).copied()
    }

    /// Turn a received packet into a datagram, if it came in on one of our
    /// links.
    pub fn datagram(&self, from: SocketAddr, payload: &[u8]) -> Option<Datagram> {
        let SocketAddr::V6(from) = from else {
            return None;
        };
        let link = self.link(from.scope_id())?;
        Some(Datagram {
            link,
            src: *from.ip(),
            dst: Ipv6Addr::UNSPECIFIED,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

/// The [`Io`] handed to the engine for one poll.
struct HostIo<'a> {
    socket: &'a UdpSocket,
    port: u16,
    epoch: Instant,
    links: &'a LinkMap,
    inbox: &'a mut VecDeque<Datagram>,
    wakeup: &'a mut Option<i64>,
}

impl Io for HostIo<'_> {
    fn now(&self) -> i64 {
        i64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    fn schedule(&mut self, delay_ms: i64) {
        let now = self.now();
        *self.wakeup = Some(now.saturating_add(delay_ms.max(0)));
    }

    fn send(&mut self, link: u32, dst: Ipv6Addr, payload: &[u8]) -> hncp_sync::Result<()> {
        let ifindex = self
            .links
            .ifindex(link)
            .ok_or_else(|| SyncError::UnknownLink(link.to_string()))?;
        let to = SocketAddrV6::new(dst, self.port, 0, ifindex);
        self.socket
            .try_send_to(payload, SocketAddr::V6(to))
            .map(|_| ())
            .map_err(|e| SyncError::Send {
                link,
                reason: e.to_string(),
            })
    }

    fn recv(&mut self) -> Option<Datagram> {
        self.inbox.pop_front()
    }
}

/// An engine bound to a UDP socket.
pub struct UdpHost {
    engine: SyncEngine,
    socket: UdpSocket,
    port: u16,
    epoch: Instant,
    links: LinkMap,
    inbox: VecDeque<Datagram>,
    wakeup: Option<i64>,
}

impl UdpHost {
    /// Bind the socket, join the multicast group on every link and enable
    /// the links on a fresh engine.
    pub async fn bind(config: HncpConfig) -> anyhow::Result<Self> {
        config.validate().context("invalid host configuration")?;

        let std_socket = std::net::UdpSocket::bind((Ipv6Addr::UNSPECIFIED, config.port))
            .with_context(|| format!("binding UDP port {}", config.port))?;
        std_socket
            .set_nonblocking(true)
            .context("setting socket non-blocking")?;
        std_socket
            .set_multicast_loop_v6(false)
            .context("disabling multicast loopback")?;
        for link in &config.links {
            std_socket
                .join_multicast_v6(&HNCP_MULTICAST, link.ifindex)
                .with_context(|| format!("joining {HNCP_MULTICAST} on {}", link.name))?;
        }
        let socket = UdpSocket::from_std(std_socket).context("registering socket with tokio")?;

        let epoch = Instant::now();
        let node_id = config.resolve_node_id();
        let mut engine = SyncEngine::new(node_id, config.sync.clone(), 0);
        let mut links = LinkMap::default();
        for link in &config.links {
            let id = engine
                .enable_link(&link.name, link.address, 0)
                .with_context(|| format!("enabling link {}", link.name))?;
            links.insert(id, link.ifindex);
        }
        tracing::info!(node = %node_id, port = config.port, links = links.by_link.len(), "host started");

        Ok(Self {
            engine,
            socket,
            port: config.port,
            epoch,
            links,
            inbox: VecDeque::new(),
            wakeup: Some(0),
        })
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Mutable access to the engine. Timers are rescheduled on the next loop
    /// iteration.
    pub fn engine_mut(&mut self) -> &mut SyncEngine {
        self.wakeup = Some(self.now());
        &mut self.engine
    }

    /// Milliseconds since the host started.
    pub fn now(&self) -> i64 {
        i64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    pub fn snapshot(&self) -> Snapshot {
        dump(&self.engine, self.now())
    }

    fn poll_engine(&mut self) {
        let mut io = HostIo {
            socket: &self.socket,
            port: self.port,
            epoch: self.epoch,
            links: &self.links,
            inbox: &mut self.inbox,
            wakeup: &mut self.wakeup,
        };
        self.engine.poll(&mut io);
    }

    fn sleep_duration(&self) -> Duration {
        let now = self.now();
        let at = self.wakeup.unwrap_or(now + 1_000);
        Duration::from_millis(u64::try_from(at - now).unwrap_or(0))
    }

    /// Run until `shutdown` completes.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        let mut buf = vec![0u8; RECV_BUFFER];

        loop {
            self.poll_engine();
            let sleep = tokio::time::sleep(self.sleep_duration());

            tokio::select! {
                _ = &mut shutdown => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => match self.links.datagram(from, &buf[..len]) {
                        Some(datagram) => self.inbox.push_back(datagram),
                        None => tracing::debug!(%from, "datagram from outside configured links"),
                    },
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                    Err(e) => tracing::warn!(error = %e, "receive failed"),
                },
                _ = sleep => {}
            }
        }

        tracing::info!("host stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> LinkMap {
        let mut m = LinkMap::default();
        m.insert(1, 7);
        m.insert(2, 9);
        m
    }

    #[test]
    fn test_link_map_both_ways() {
        let m = map();
        assert_eq!(m.ifindex(1), Some(7));
        assert_eq!(m.link(9), Some(2));
        assert_eq!(m.link(3), None);
    }

    #[test]
    fn test_datagram_attributed_by_scope() {
        let m = map();
        let src: Ipv6Addr = "fe80::2".parse().unwrap();
        let from = SocketAddr::V6(SocketAddrV6::new(src, 8808, 0, 9));
        let d = m.datagram(from, b"abcd").unwrap();
        assert_eq!(d.link, 2);
        assert_eq!(d.src, src);
        assert_eq!(d.dst, Ipv6Addr::UNSPECIFIED);
        assert_eq!(&d.payload[..], b"abcd");
    }

    #[test]
    fn test_foreign_datagrams_ignored() {
        let m = map();
        let unscoped = SocketAddr::V6(SocketAddrV6::new("fe80::2".parse().unwrap(), 8808, 0, 4));
        assert!(m.datagram(unscoped, b"x").is_none());
        let v4: SocketAddr = "192.0.2.1:8808".parse().unwrap();
        assert!(m.datagram(v4, b"x").is_none());
    }

    #[tokio::test]
    async fn test_bind_rejects_config_without_links() {
        let err = UdpHost::bind(HncpConfig::default().with_port(0))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("invalid host configuration"));
        assert!(matches!(
            err.downcast_ref::<crate::HncpError>(),
            Some(crate::HncpError::NoLinks)
        ));
    }
}
