//! # Connection Worker
//!
//! One OS thread per connection, wrapping either a `Requestor` or a `Responder`.
//! Construction spawns the thread; `Drop` joins it. Grounded in
//! `original_source/src/responderthread.hpp` and `src/client.hpp`'s
//! spawn-on-construct/join-on-destruct lifecycle, expressed with a
//! `std::thread::JoinHandle` instead of a raw pointer to a detached `std::thread`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{TransportError, WorkerExit};
use crate::requestor::Requestor;
use crate::responder::Responder;
use crate::stats::{Counters, Snapshot, Statistics};

pub enum Role {
    Requestor(Requestor),
    Responder(Responder),
}

impl Role {
    fn run(&mut self) -> Result<(), WorkerExit> {
        match self {
            Role::Requestor(r) => r.run(),
            Role::Responder(r) => r.run(),
        }
    }
}

/// A single read of `(delta, summary, delta_duration, total_duration)` exactly as
/// described in spec.md §4.6, advancing the worker's last-summary marker.
pub struct StatsReport {
    pub delta: Counters,
    pub summary: Counters,
    pub delta_duration: Duration,
    pub total_duration: Duration,
}

pub struct ConnectionWorker {
    stats: Arc<Statistics>,
    last_snapshot: Mutex<Snapshot>,
    connected: Arc<AtomicBool>,
    description: String,
    client_id: u64,
    handle: Option<JoinHandle<()>>,
    started: Instant,
}

impl ConnectionWorker {
    /// Spawns the worker thread. `description` is the `"{local} -> {remote}"` label
    /// used in logs; `client_id` labels log lines when many connections run at once.
    /// `done`, if given, receives `client_id` exactly once, right before the thread
    /// exits -- the supervisor's multiplex wait listens on this instead of polling.
    pub fn spawn(mut role: Role, stats: Arc<Statistics>, description: String, client_id: u64, done: Option<crossbeam::channel::Sender<u64>>) -> Self {
        let connected = Arc::new(AtomicBool::new(true));
        let connected_for_thread = Arc::clone(&connected);
        let description_for_thread = description.clone();
        let stats_for_thread = Arc::clone(&stats);

        let handle = std::thread::Builder::new()
            .name(format!("babbler-conn-{client_id}"))
            .spawn(move || {
                let result = role.run();
                connected_for_thread.store(false, Ordering::SeqCst);
                match result {
                    Ok(()) => debug!(client_id, description = %description_for_thread, "connection finished"),
                    Err(WorkerExit::Cancelled) => {
                        debug!(client_id, description = %description_for_thread, "connection cancelled")
                    }
                    Err(WorkerExit::Transport(TransportError::Timeout)) => {
                        stats_for_thread.record_timeout();
                        warn!(client_id, description = %description_for_thread, "connection timed out")
                    }
                    Err(e) => {
                        stats_for_thread.record_error();
                        warn!(client_id, description = %description_for_thread, error = %e, "connection failed")
                    }
                }
                if let Some(done) = done {
                    let _ = done.send(client_id);
                }
            })
            .expect("failed to spawn connection worker thread");

        let last_snapshot = Mutex::new(stats.snapshot());
        Self {
            stats,
            last_snapshot,
            connected,
            description,
            client_id,
            handle: Some(handle),
            started: Instant::now(),
        }
    }

    pub fn requestor(role: Requestor, stats: Arc<Statistics>, description: String, client_id: u64) -> Self {
        Self::spawn(Role::Requestor(role), stats, description, client_id, None)
    }

    pub fn responder(role: Responder, stats: Arc<Statistics>, description: String, client_id: u64) -> Self {
        Self::spawn(Role::Responder(role), stats, description, client_id, None)
    }

    pub fn requestor_with_done(
        role: Requestor,
        stats: Arc<Statistics>,
        description: String,
        client_id: u64,
        done: crossbeam::channel::Sender<u64>,
    ) -> Self {
        Self::spawn(Role::Requestor(role), stats, description, client_id, Some(done))
    }

    pub fn responder_with_done(
        role: Responder,
        stats: Arc<Statistics>,
        description: String,
        client_id: u64,
        done: crossbeam::channel::Sender<u64>,
    ) -> Self {
        Self::spawn(Role::Responder(role), stats, description, client_id, Some(done))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn connection_description(&self) -> &str {
        &self.description
    }

    pub fn client_id(&self) -> u64 {
        self.client_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// `(delta, summary, delta_duration, total_duration)`: delta since the last
    /// call to `statistics()`, running totals, elapsed time covered by the delta,
    /// and elapsed time since the worker started.
    pub fn statistics(&self) -> StatsReport {
        let now = self.stats.snapshot();
        let mut last = self.last_snapshot.lock();
        let (delta, delta_duration) = now.delta(&last);
        *last = now;
        StatsReport {
            delta,
            summary: now.counters,
            delta_duration,
            total_duration: self.started.elapsed(),
        }
    }

    /// Blocks until the worker thread exits.
    pub fn join(mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for ConnectionWorker {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comsettings::{ComSettings, SizeRange};
    use crate::requestor::RequestorConfig;
    use crate::transport::{NetTransport, TransportProps};

    #[test]
    fn connection_failure_increments_the_errors_counter() {
        let port = 55501;
        let listening = NetTransport::listen(TransportProps::tcp(), port, 1).expect("bind listener");
        let server = std::thread::spawn(move || {
            // Accept then immediately drop the connection, so the client's
            // next read sees a reset rather than a clean close.
            let _ = listening.accept().expect("accept");
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        let transport = NetTransport::connect(TransportProps::tcp(), "127.0.0.1", port, 0).expect("connect");

        let stats = Arc::new(Statistics::new());
        let config = RequestorConfig {
            com_settings: ComSettings::new(SizeRange::new(64, 64, 0), SizeRange::new(64, 64, 0)),
            delay_us: 0,
            max_count: None,
            send_limit_octets: None,
            recv_limit_octets: None,
        };
        let requestor = Requestor::new(transport, 65536, config, Arc::clone(&stats));
        let worker = ConnectionWorker::requestor(requestor, Arc::clone(&stats), "test -> test".to_string(), 1);
        worker.join();
        let _ = server.join();

        let (counters, _elapsed) = stats.summary();
        assert_eq!(counters.errors, 1, "a failed connection must be counted, not silently dropped");
        assert_eq!(counters.timeouts, 0);
    }
}
