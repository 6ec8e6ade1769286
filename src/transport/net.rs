//! # Network Transport
//!
//! `NetTransport` is the single concrete transport type for every protocol this
//! crate speaks. TCP, UDP, SCTP, DCCP, and raw IP differ only in their
//! `TransportProps` (address family, socket kind, protocol number), never in the
//! Rust-level operations a worker performs on them -- so there is one struct and one
//! set of inherent methods rather than a per-protocol trait object hierarchy.
//!
//! The underlying `socket2::Socket` is wrapped in an `Arc`. That single choice gives
//! us the "process-wide reference count, fd released exactly once when the last
//! holder drops" behavior spec.md calls for, for free: `clone_endpoint` is an `Arc`
//! bump, and the kernel fd closes when the last clone drops.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::sync::Arc;
use std::time::{Duration, Instant};

use socket2::Socket;

use crate::cancel::CancelHandle;
use crate::error::{TransportError, WorkerExit, WorkerResult};
use crate::transport::props::{AddrFamily, TransportProps};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Unbound,
    Bound,
    Connected,
    Listening,
    Closed,
}

pub struct NetTransport {
    socket: Arc<Socket>,
    pub props: TransportProps,
    state: TransportState,
    peer: Option<SocketAddr>,
    cancel: Option<CancelHandle>,
    timeout: Option<Duration>,
}

/// Resolves `host` and returns every candidate address consistent with `family`,
/// in resolution order, so `connect` can try each in turn and fall through to the
/// next on failure rather than committing to the first one resolved.
fn resolve_candidates(host: &str, port: u16, family: AddrFamily) -> io::Result<Vec<SocketAddr>> {
    let matching: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()?
        .filter(|addr| match family {
            AddrFamily::V4 => addr.is_ipv4(),
            AddrFamily::V6 => addr.is_ipv6(),
            AddrFamily::Either => true,
        })
        .collect();
    if matching.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotFound,
            "no addresses resolved for the requested address family",
        ));
    }
    Ok(matching)
}

fn raw_socket(domain: i32, props: TransportProps) -> io::Result<Socket> {
    let sock_type = props.kind.raw_type();
    let fd = unsafe { libc::socket(domain, sock_type, props.protocol) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { Socket::from_raw_fd(fd) })
}

fn sockaddr_storage_to_std(storage: &libc::sockaddr_storage) -> Option<SocketAddr> {
    match storage.ss_family as i32 {
        libc::AF_INET => {
            let addr: libc::sockaddr_in =
                unsafe { *(storage as *const _ as *const libc::sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr));
            Some(SocketAddr::new(IpAddr::V4(ip), u16::from_be(addr.sin_port)))
        }
        libc::AF_INET6 => {
            let addr: libc::sockaddr_in6 =
                unsafe { *(storage as *const _ as *const libc::sockaddr_in6) };
            let ip = Ipv6Addr::from(addr.sin6_addr.s6_addr);
            Some(SocketAddr::new(IpAddr::V6(ip), u16::from_be(addr.sin6_port)))
        }
        _ => None,
    }
}

impl NetTransport {
    /// Resolve `host` to every candidate address consistent with `props.family`,
    /// and try each in order: create a socket, optionally bind to the wildcard
    /// address with `local_port`, connect (stream/seqpacket/dccp) or bind-as-peer
    /// (datagram). Returns the first candidate that succeeds; if every candidate
    /// fails, fails with `NotConnected`, per spec.md §4.1.
    pub fn connect(
        props: TransportProps,
        host: &str,
        remote_port: u16,
        local_port: u16,
    ) -> WorkerResult<Self> {
        let candidates = resolve_candidates(host, remote_port, props.family).map_err(|source| {
            TransportError::AddressResolution {
                host: host.to_string(),
                source,
            }
        })?;

        for addr in &candidates {
            if let Ok(transport) = Self::connect_candidate(props, *addr, local_port) {
                return Ok(transport);
            }
        }

        Err(TransportError::NotConnected {
            host: host.to_string(),
            port: remote_port,
        }
        .into())
    }

    /// Attempts to connect to a single resolved candidate address.
    fn connect_candidate(props: TransportProps, addr: SocketAddr, local_port: u16) -> Result<Self, TransportError> {
        let domain = if addr.is_ipv6() { libc::AF_INET6 } else { libc::AF_INET };
        let socket = raw_socket(domain, props).map_err(TransportError::Io)?;

        if local_port != 0 {
            let local = match addr {
                SocketAddr::V4(_) => {
                    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), local_port)
                }
                SocketAddr::V6(_) => {
                    SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), local_port)
                }
            };
            socket.set_reuse_address(true).map_err(TransportError::Io)?;
            socket.bind(&local.into()).map_err(TransportError::Io)?;
        }

        if props.kind.is_connection_oriented() {
            socket.connect(&addr.into()).map_err(TransportError::Io)?;
        } else {
            // Connection-less sockets still "connect" at the BSD-socket level so
            // that send()/recv() without an explicit address work, and so ICMP
            // port-unreachable surfaces as an error on the next call.
            let _ = socket.connect(&addr.into());
        }

        if matches!(props.kind, crate::transport::props::SocketKind::Stream) {
            let _ = socket.set_tcp_nodelay(true);
        }
        socket.set_nonblocking(true).map_err(TransportError::Io)?;

        Ok(Self {
            socket: Arc::new(socket),
            props,
            state: TransportState::Connected,
            peer: Some(addr),
            cancel: None,
            timeout: None,
        })
    }

    /// Bind to `port` on every address (`0.0.0.0`/`::`) and, for connection-oriented
    /// kinds, start listening with the given backlog. Connection-less kinds are left
    /// `Bound`; the caller fans a fixed pool of responder threads out over clones of
    /// the same bound socket instead of `accept()`-ing.
    pub fn listen(props: TransportProps, port: u16, backlog: i32) -> WorkerResult<Self> {
        use crate::transport::props::AddrFamily;
        let (domain, unspecified) = match props.family {
            AddrFamily::V4 => (libc::AF_INET, IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            AddrFamily::V6 | AddrFamily::Either => {
                (libc::AF_INET6, IpAddr::V6(Ipv6Addr::UNSPECIFIED))
            }
        };
        let socket = raw_socket(domain, props).map_err(TransportError::Io)?;
        socket.set_reuse_address(true).map_err(TransportError::Io)?;
        if domain == libc::AF_INET6 && matches!(props.family, AddrFamily::Either) {
            let _ = socket.set_only_v6(false);
        }
        let bind_addr = SocketAddr::new(unspecified, port);
        socket.bind(&bind_addr.into()).map_err(TransportError::Io)?;

        let state = if props.kind.is_connection_oriented() {
            socket.listen(backlog).map_err(TransportError::Io)?;
            TransportState::Listening
        } else {
            TransportState::Bound
        };
        socket.set_nonblocking(true).map_err(TransportError::Io)?;

        Ok(Self {
            socket: Arc::new(socket),
            props,
            state,
            peer: None,
            cancel: None,
            timeout: None,
        })
    }

    /// Accept one connection. Only meaningful for connection-oriented kinds. Waits
    /// for a pending connection the same cancellable way `recv` waits for data, so
    /// the admission loop in `Listener` unwinds promptly on shutdown.
    pub fn accept(&self) -> WorkerResult<(Self, String, u16)> {
        loop {
            if !self.wait_readable(None)? {
                return Err(TransportError::Timeout.into());
            }
            match self.socket.accept() {
                Ok((sock, addr)) => {
                    let peer = addr.as_socket().ok_or_else(|| {
                        TransportError::InvalidConfig("accepted peer has no socket address".into())
                    })?;
                    if matches!(self.props.kind, crate::transport::props::SocketKind::Stream) {
                        let _ = sock.set_tcp_nodelay(true);
                    }
                    sock.set_nonblocking(true).map_err(TransportError::Io)?;
                    let host = peer.ip().to_string();
                    let port = peer.port();
                    return Ok((
                        Self {
                            socket: Arc::new(sock),
                            props: self.props,
                            state: TransportState::Connected,
                            peer: Some(peer),
                            cancel: self.cancel.clone(),
                            timeout: self.timeout,
                        },
                        host,
                        port,
                    ));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(TransportError::Io(e).into()),
            }
        }
    }

    pub fn set_cancel_handle(&mut self, cancel: CancelHandle) {
        self.cancel = Some(cancel);
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Whether this transport's registered cancel handle (if any) has fired.
    /// Used by callers that need to interrupt a wait this transport itself
    /// isn't blocked in, such as `Requestor`'s inter-request delay.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|c| c.is_cancelled()).unwrap_or(false)
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn local_port(&self) -> io::Result<u16> {
        let addr = self.socket.local_addr()?;
        Ok(addr.as_socket().map(|a| a.port()).unwrap_or(0))
    }

    /// Cheap handle clone sharing the same kernel socket, for the connection-less
    /// fixed-responder-pool fan-out model (spec.md §4.6).
    pub fn clone_endpoint(&self) -> Self {
        Self {
            socket: Arc::clone(&self.socket),
            props: self.props,
            state: self.state,
            peer: self.peer,
            cancel: self.cancel.clone(),
            timeout: self.timeout,
        }
    }

    fn raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    /// Block until the socket is readable, the cancel handle fires, or `timeout`
    /// elapses -- whichever comes first. Returns `Ok(true)` if the socket is
    /// readable, `Ok(false)` on timeout, `Err(WorkerExit::Cancelled)` if cancelled.
    fn wait_readable(&self, deadline: Option<Instant>) -> WorkerResult<bool> {
        let sock_fd = self.raw_fd();
        let cancel_fd = self.cancel.as_ref().map(|c| c.as_raw_fd());

        loop {
            if let Some(c) = &self.cancel {
                if c.is_cancelled() {
                    return Err(WorkerExit::Cancelled);
                }
            }

            let wait_ms: i32 = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Ok(false);
                    }
                    (d - now).as_millis().min(i32::MAX as u128) as i32
                }
                None => -1,
            };

            let mut fds = vec![libc::pollfd {
                fd: sock_fd,
                events: libc::POLLIN,
                revents: 0,
            }];
            if let Some(cfd) = cancel_fd {
                fds.push(libc::pollfd {
                    fd: cfd,
                    events: libc::POLLIN,
                    revents: 0,
                });
            }

            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, wait_ms) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(TransportError::Io(err).into());
            }
            if rc == 0 {
                return Ok(false);
            }
            if cancel_fd.is_some() && fds[1].revents != 0 {
                return Err(WorkerExit::Cancelled);
            }
            if fds[0].revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0 {
                return Ok(true);
            }
        }
    }

    /// Send `buf` in full. Connection-oriented kinds use plain `send()`;
    /// connection-less kinds send to `dest` if given, else to the connected peer.
    /// Uses raw `libc` calls on the socket's fd rather than `socket2`'s buffer
    /// wrappers, since those require `MaybeUninit`-typed slices we have no reason
    /// to carry through the rest of the crate.
    pub fn send(&self, buf: &[u8], dest: Option<SocketAddr>) -> WorkerResult<usize> {
        let fd = self.raw_fd();
        let n = match dest {
            Some(addr) => {
                let sock_addr: socket2::SockAddr = addr.into();
                unsafe {
                    libc::sendto(
                        fd,
                        buf.as_ptr() as *const libc::c_void,
                        buf.len(),
                        0,
                        sock_addr.as_ptr(),
                        sock_addr.len(),
                    )
                }
            }
            None => unsafe { libc::send(fd, buf.as_ptr() as *const libc::c_void, buf.len(), 0) },
        };
        if n < 0 {
            return Err(TransportError::Io(io::Error::last_os_error()).into());
        }
        Ok(n as usize)
    }

    /// Receive into `buf`. For connection-oriented/congestion-controlled kinds,
    /// loops (honoring cancellation and the configured timeout) until at least
    /// `at_least` bytes have accumulated, since TCP/DCCP streams may deliver a
    /// frame across several `recv()` calls. For datagram/seqpacket/raw kinds, a
    /// single call is one frame: one `recvfrom()`, full stop.
    pub fn recv(
        &self,
        buf: &mut [u8],
        at_least: usize,
        src: &mut Option<SocketAddr>,
    ) -> WorkerResult<usize> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let fd = self.raw_fd();

        if self.props.kind.is_connection_oriented() {
            let mut total = 0usize;
            while total < at_least {
                if !self.wait_readable(deadline)? {
                    return Err(TransportError::Timeout.into());
                }
                let n = unsafe {
                    libc::recv(
                        fd,
                        buf[total..].as_mut_ptr() as *mut libc::c_void,
                        buf.len() - total,
                        0,
                    )
                };
                if n == 0 {
                    return Err(TransportError::ConnectionReset.into());
                } else if n < 0 {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::WouldBlock {
                        continue;
                    }
                    return Err(TransportError::Io(err).into());
                } else {
                    total += n as usize;
                }
            }
            Ok(total)
        } else {
            loop {
                if !self.wait_readable(deadline)? {
                    return Err(TransportError::Timeout.into());
                }
                let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
                let mut addr_len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
                let n = unsafe {
                    libc::recvfrom(
                        fd,
                        buf.as_mut_ptr() as *mut libc::c_void,
                        buf.len(),
                        0,
                        &mut storage as *mut _ as *mut libc::sockaddr,
                        &mut addr_len,
                    )
                };
                if n < 0 {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::WouldBlock {
                        continue;
                    }
                    return Err(TransportError::Io(err).into());
                }
                *src = sockaddr_storage_to_std(&storage);
                return Ok(n as usize);
            }
        }
    }

    pub fn close(&mut self) {
        self.state = TransportState::Closed;
    }
}
