//! Transport abstraction: one concrete type (`NetTransport`) parameterized by
//! `TransportProps`, covering every protocol spec.md §3 names.

mod net;
mod props;

pub use net::{NetTransport, TransportState};
pub use props::{AddrFamily, SocketKind, TransportProps};
