//! The I/O boundary the engine is written against.
//!
//! The engine never reads a clock, sleeps or touches a socket itself. A host
//! implements [`Io`] once for real sockets and once for simulation; the engine
//! behaves the same under both, relying only on `now()` being monotonic.

use std::net::Ipv6Addr;

use bytes::Bytes;

use crate::error::Result;

/// UDP port HNCP runs on.
pub const HNCP_PORT: u16 = 8808;

/// Link-local multicast group all HNCP routers join.
pub const HNCP_MULTICAST: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0x11);

/// A received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Interface id of the link it arrived on.
    pub link: u32,
    pub src: Ipv6Addr,
    /// Destination address, or unspecified if the host cannot tell.
    pub dst: Ipv6Addr,
    pub payload: Bytes,
}

impl Datagram {
    pub fn is_multicast(&self) -> bool {
        self.dst.is_multicast()
    }
}

/// Clock, timer and datagram services provided by the host.
pub trait Io {
    /// Current time in milliseconds. Must never go backwards.
    fn now(&self) -> i64;

    /// Ask to be run again after `delay_ms`. A later call replaces an
    /// earlier one.
    fn schedule(&mut self, delay_ms: i64);

    /// Send a datagram on a link, to a unicast neighbor or the multicast group.
    fn send(&mut self, link: u32, dst: Ipv6Addr, payload: &[u8]) -> Result<()>;

    /// The next received datagram, if any is waiting.
    fn recv(&mut self) -> Option<Datagram>;
}
