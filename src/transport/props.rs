//! Transport properties: address family, socket kind, and wire protocol number.
//!
//! Five named constructors cover the transports spec.md §3 lists. The
//! connection-oriented/connection-less split follows the mapping spec.md §9 pins
//! down explicitly (an intentional deviation from a naive "is it `SOCK_STREAM`"
//! check): only `Stream` and `DatagramCongestion` are connection-oriented; `Datagram`,
//! `SeqPacket`, and `Raw` are connection-less and therefore use the fixed
//! responder-pool fan-out model in `Listener` rather than `accept()`.

use std::fmt;

/// Linux protocol numbers not exposed by the `libc` crate on every target.
pub const IPPROTO_SCTP: i32 = 132;
pub const IPPROTO_DCCP: i32 = 33;
/// `SOCK_DCCP`, Linux-specific; not part of POSIX `SOCK_*` constants in `libc`.
pub const SOCK_DCCP: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrFamily {
    V4,
    V6,
    /// Dual-stack: resolves to whichever family the peer address or listening
    /// socket requires. Used for `listen()`, where a dual-stack IPv6 socket with
    /// `IPV6_V6ONLY` disabled accepts both families.
    Either,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Stream,
    Datagram,
    SeqPacket,
    DatagramCongestion,
    Raw,
}

impl SocketKind {
    /// Only `Stream` and `DatagramCongestion` are connection-oriented for the
    /// purposes of `Listener`'s accept-loop vs. fixed-pool fan-out decision. See
    /// spec.md §9, "Open question -- SOCK_DGRAM vs connection-less detection".
    pub fn is_connection_oriented(self) -> bool {
        matches!(self, SocketKind::Stream | SocketKind::DatagramCongestion)
    }

    pub(crate) fn raw_type(self) -> i32 {
        match self {
            SocketKind::Stream => libc::SOCK_STREAM,
            SocketKind::Datagram => libc::SOCK_DGRAM,
            SocketKind::SeqPacket => libc::SOCK_SEQPACKET,
            SocketKind::DatagramCongestion => SOCK_DCCP,
            SocketKind::Raw => libc::SOCK_RAW,
        }
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SocketKind::Stream => "stream",
            SocketKind::Datagram => "datagram",
            SocketKind::SeqPacket => "seqpacket",
            SocketKind::DatagramCongestion => "dccp",
            SocketKind::Raw => "raw",
        };
        write!(f, "{s}")
    }
}

/// Immutable per-connection transport properties: address family, socket type, and
/// wire protocol number. See spec.md §3.
#[derive(Debug, Clone, Copy)]
pub struct TransportProps {
    pub family: AddrFamily,
    pub kind: SocketKind,
    pub protocol: i32,
    /// Human-readable name for logging and the connection descriptor (spec.md §3).
    pub name: &'static str,
}

impl TransportProps {
    pub fn tcp() -> Self {
        Self {
            family: AddrFamily::Either,
            kind: SocketKind::Stream,
            protocol: 0,
            name: "tcp",
        }
    }

    pub fn udp() -> Self {
        Self {
            family: AddrFamily::Either,
            kind: SocketKind::Datagram,
            protocol: 0,
            name: "udp",
        }
    }

    pub fn sctp() -> Self {
        Self {
            family: AddrFamily::Either,
            kind: SocketKind::SeqPacket,
            protocol: IPPROTO_SCTP,
            name: "sctp",
        }
    }

    pub fn dccp() -> Self {
        Self {
            family: AddrFamily::Either,
            kind: SocketKind::DatagramCongestion,
            protocol: IPPROTO_DCCP,
            name: "dccp",
        }
    }

    pub fn raw(proto: i32) -> Self {
        Self {
            family: AddrFamily::Either,
            kind: SocketKind::Raw,
            protocol: proto,
            name: "ip",
        }
    }

    pub fn with_family(mut self, family: AddrFamily) -> Self {
        self.family = family;
        self
    }
}
