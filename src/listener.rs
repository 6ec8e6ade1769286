//! # Listener
//!
//! One listener owns one bound endpoint. For connection-oriented transports it
//! runs an accept loop gated by the connection admission semaphore, spawning one
//! `Responder` worker per accepted connection. For connection-less transports
//! there is nothing to accept: a fixed pool of Responder workers is started up
//! front, all sharing the bound socket via `Transport::clone_endpoint`. Grounded in
//! `original_source/src/serverstateful.cpp` (accept loop, thread reaping) and
//! `src/serverstateless.cpp` (fixed worker pool over a shared socket).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::cancel::CancelHandle;
use crate::error::WorkerExit;
use crate::responder::Responder;
use crate::stats::Statistics;
use crate::sync::Semaphore;
use crate::transport::NetTransport;
use crate::worker::ConnectionWorker;

const ADMISSION_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct Listener {
    bufsize: usize,
    admission: Arc<Semaphore>,
    cancel: CancelHandle,
    next_client_id: Arc<std::sync::atomic::AtomicU64>,
    done_tx: crossbeam::channel::Sender<u64>,
}

impl Listener {
    /// `admission` units are released as soon as a responder's thread actually
    /// finishes, via a dedicated background thread draining a done-channel --
    /// never by the accept loop itself, which would deadlock waiting on a permit
    /// that only its own next iteration could release (spec.md §4.7 step 3).
    pub fn new(bufsize: usize, admission: Arc<Semaphore>, cancel: CancelHandle, next_client_id: Arc<std::sync::atomic::AtomicU64>) -> Self {
        let (done_tx, done_rx) = crossbeam::channel::unbounded::<u64>();
        let release_admission = Arc::clone(&admission);
        std::thread::Builder::new()
            .name("babbler-admission-reaper".into())
            .spawn(move || {
                while done_rx.recv().is_ok() {
                    release_admission.release();
                }
            })
            .expect("failed to spawn admission reaper thread");

        Self {
            bufsize,
            admission,
            cancel,
            next_client_id,
            done_tx,
        }
    }

    fn next_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Accept loop for connection-oriented transports (tcp, sctp, dccp). Blocks the
    /// calling thread until cancellation; workers it spawns are appended to
    /// `workers` and reaped opportunistically.
    pub fn run_accept_loop(&self, mut listening: NetTransport, workers: &std::sync::Mutex<Vec<ConnectionWorker>>) {
        let proto = listening.props.name;
        listening.set_cancel_handle(self.cancel.clone());

        loop {
            if !self.admission.acquire_unless(ADMISSION_POLL_INTERVAL, || self.cancel.is_cancelled()) {
                return;
            }

            match listening.accept() {
                Ok((mut conn, host, port)) => {
                    conn.set_cancel_handle(self.cancel.clone());
                    let description = format!("{proto} -> {host}:{port}");
                    info!(description = %description, "accepted connection");
                    let stats = Arc::new(Statistics::new());
                    let responder = Responder::new(conn, self.bufsize, Arc::clone(&stats));
                    let worker = ConnectionWorker::responder_with_done(
                        responder,
                        stats,
                        description,
                        self.next_id(),
                        self.done_tx.clone(),
                    );
                    workers.lock().unwrap().push(worker);
                    // The admission unit is released by the background reaper thread
                    // once the worker's done message arrives, not here -- the
                    // connection is still occupying its slot while it runs.
                }
                Err(WorkerExit::Cancelled) => return,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    if self.cancel.is_cancelled() {
                        return;
                    }
                }
            }

            self.reap(workers);
        }
    }

    /// Starts a fixed pool of `max(4, num_cpus)` Responder workers sharing one
    /// bound connection-less socket, per spec.md §4.7.
    pub fn run_fixed_pool(&self, bound: NetTransport, workers: &std::sync::Mutex<Vec<ConnectionWorker>>) {
        let pool_size = num_cpus::get().max(4);
        let proto = bound.props.name;
        for _ in 0..pool_size {
            let mut conn = bound.clone_endpoint();
            conn.set_cancel_handle(self.cancel.clone());
            let description = format!("{proto} (shared)");
            let stats = Arc::new(Statistics::new());
            let responder = Responder::new(conn, self.bufsize, Arc::clone(&stats));
            let worker = ConnectionWorker::responder(responder, stats, description, self.next_id());
            workers.lock().unwrap().push(worker);
        }
    }

    /// Drops finished workers from `workers` so the list (used for status/summary
    /// reporting) doesn't grow without bound. Admission units are released
    /// independently, by the background thread spawned in `new`, so this can run
    /// on whatever cadence is convenient.
    fn reap(&self, workers: &std::sync::Mutex<Vec<ConnectionWorker>>) {
        let mut guard = workers.lock().unwrap();
        let before = guard.len();
        guard.retain(|w| !w.is_finished());
        let reaped = before - guard.len();
        if reaped > 0 {
            tracing::trace!(reaped, "reaped finished responders");
        }
    }
}
