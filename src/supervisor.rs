//! # Supervisor
//!
//! Top-level coordinator for one run, in either client or server mode. Grounded in
//! `original_source/src/client.hpp`'s `cClient`/`terminateAll()` pair and
//! `src/serverstateful.cpp`'s per-port listener spawn, generalized per spec.md
//! §4.8/§5: a single process-wide `CancelHandle`, an admission `Semaphore` shared by
//! every `Listener`, and one multiplexed wait loop instead of the original's
//! signalfd/timerfd-into-`poll()` bridge (spec.md §9's "prefer a language-native
//! selector" redesign flag).
//!
//! The multiplex itself is `crossbeam_channel::select!` over four receivers: an
//! OS-interrupt channel fed by `ctrlc`, a ticker fed by `crossbeam_channel::tick`,
//! a worker-done channel fed by every spawned worker thread, and (client mode only)
//! a stdin-line channel fed by a dedicated reader thread.

use std::io::BufRead;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam::channel::{self, Receiver};
use tracing::{info, warn};

use crate::cancel::CancelHandle;
use crate::cli::{Args, Descriptor};
use crate::comsettings::ComSettings;
use crate::error::ConfigError;
use crate::listener::Listener;
use crate::report;
use crate::requestor::{Requestor, RequestorConfig};
use crate::stats::Statistics;
use crate::sync::Semaphore;
use crate::transport::NetTransport;
use crate::worker::ConnectionWorker;

/// Every worker reports its client id on this channel exactly once, right before
/// its thread exits, so the supervisor's multiplex loop can decrement the running
/// count without polling.
type DoneSender = channel::Sender<u64>;

fn interrupt_channel() -> Receiver<()> {
    let (tx, rx) = channel::bounded(1);
    // ctrlc::set_handler can only be installed once per process; a second run in
    // the same process (as in an integration test harness) would panic on the
    // second call, so failures here are logged, not propagated -- the supervisor
    // still works, it just won't catch SIGINT on top of its own cancel sources.
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = tx.send(());
    }) {
        warn!(error = %e, "failed to install interrupt handler");
    }
    rx
}

/// Spawns a reader thread that forwards each stdin line to the returned channel.
/// Used only in client mode, where typing at the terminal is one more way to
/// trigger an early, graceful shutdown (mirrors the descriptor's "standard input"
/// multiplex source from spec.md §4.8).
fn stdin_channel() -> Receiver<()> {
    let (tx, rx) = channel::bounded(1);
    std::thread::Builder::new()
        .name("babbler-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).is_ok() {
                let _ = tx.send(());
            }
        })
        .expect("failed to spawn stdin reader thread");
    rx
}

struct RunningWorker {
    worker: ConnectionWorker,
}

/// Drives one run of the tool: either `N` client connections against one
/// descriptor, or one `Listener` per configured `(transport, port)` pair.
pub struct Supervisor {
    cancel: CancelHandle,
    status_interval: Duration,
    time_budget: Option<Duration>,
    next_client_id: Arc<AtomicU64>,
}

impl Supervisor {
    pub fn new(status_interval: Duration, time_budget: Option<Duration>) -> Self {
        Self {
            cancel: CancelHandle::new(),
            status_interval,
            time_budget,
            next_client_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Client mode: parse `descriptor`, open `connections` Requestor connections
    /// per resolved port (or a single connection if the descriptor names no port
    /// list), and drive the exchange until a termination source fires.
    pub fn run_client(
        &self,
        args: &Args,
        descriptor: &Descriptor,
        com_settings: ComSettings,
    ) -> Result<(), ConfigError> {
        let ports: Vec<u16> = if descriptor.ports.is_empty() {
            vec![0]
        } else {
            descriptor.ports.iter().flat_map(|r| r.iter()).collect()
        };

        let (done_tx, done_rx) = channel::unbounded::<u64>();
        let workers = Mutex::new(Vec::new());
        let mut running = 0usize;

        for port in &ports {
            for _ in 0..args.connections {
                match self.spawn_requestor(args, descriptor, *port, com_settings, done_tx.clone()) {
                    Ok(w) => {
                        running += 1;
                        workers.lock().unwrap().push(RunningWorker { worker: w });
                    }
                    Err(e) => warn!(error = %e, port, "failed to start connection"),
                }
            }
        }

        if running == 0 {
            return Err(ConfigError::InvalidDescriptor(
                descriptor.host.clone(),
                "no connections could be started".into(),
            ));
        }

        self.multiplex_wait(running, done_rx, stdin_channel(), &workers);
        self.print_final_summary(&workers, args.json);
        Ok(())
    }

    fn spawn_requestor(
        &self,
        args: &Args,
        descriptor: &Descriptor,
        port: u16,
        com_settings: ComSettings,
        done_tx: DoneSender,
    ) -> Result<ConnectionWorker, crate::error::WorkerExit> {
        let mut transport = NetTransport::connect(descriptor.transport, &descriptor.host, port, descriptor.local_port)?;
        transport.set_cancel_handle(self.cancel.clone());

        let client_id = self.next_id();
        let description = format!(
            "local -> {}:{}",
            descriptor.host,
            if port == 0 { transport.local_port().unwrap_or(0) } else { port }
        );

        let delay_us = (args.interval * 1_000_000.0).round() as u64;
        let config = RequestorConfig {
            com_settings,
            delay_us,
            max_count: args.count,
            send_limit_octets: None,
            recv_limit_octets: None,
        };
        let stats = Arc::new(Statistics::new());
        let requestor = Requestor::new(transport, args.buf_size, config, Arc::clone(&stats));
        let worker = ConnectionWorker::requestor_with_done(requestor, stats, description, client_id, done_tx);
        Ok(worker)
    }

    /// Server mode: one `Listener` per `(transport, port)` pair, sharing one
    /// admission semaphore across every accepted/fixed-pool responder.
    pub fn run_server(&self, args: &Args, transports: &[crate::transport::TransportProps], ports: &[u16], max_connections: usize) {
        let admission = Arc::new(Semaphore::new(max_connections));
        let workers: Arc<Mutex<Vec<ConnectionWorker>>> = Arc::new(Mutex::new(Vec::new()));
        let mut listener_threads = Vec::new();

        for &props in transports {
            for &port in ports {
                let listener = Listener::new(args.buf_size, Arc::clone(&admission), self.cancel.clone(), Arc::clone(&self.next_client_id));
                let workers = Arc::clone(&workers);
                let backlog = 128;
                match NetTransport::listen(props, port, backlog) {
                    Ok(bound) => {
                        info!(proto = props.name, port, "listening");
                        let handle = std::thread::Builder::new()
                            .name(format!("babbler-listen-{}-{}", props.name, port))
                            .spawn(move || {
                                if props.kind.is_connection_oriented() {
                                    listener.run_accept_loop(bound, &workers);
                                } else {
                                    listener.run_fixed_pool(bound, &workers);
                                }
                            })
                            .expect("failed to spawn listener thread");
                        listener_threads.push(handle);
                    }
                    Err(e) => warn!(proto = props.name, port, error = %e, "failed to bind listener"),
                }
            }
        }

        self.status_loop_until_cancelled(&workers);

        for handle in listener_threads {
            let _ = handle.join();
        }
    }

    /// Drives the client-mode multiplex loop over all four termination sources
    /// (spec.md §4.8): interrupt, periodic alarm tick, worker-done, and stdin.
    /// Runs until every spawned Requestor has reported done.
    fn multiplex_wait(&self, mut running: usize, done_rx: Receiver<u64>, stdin_rx: Receiver<()>, workers: &Mutex<Vec<RunningWorker>>) {
        let interrupt_rx = interrupt_channel();
        let mut time_remaining = self.time_budget;
        // The first tick fires after min(status_interval, time_remaining), not
        // always after a full status_interval, so a `--time` shorter than
        // `--status` still gets cancelled close to the requested budget rather
        // than running for up to one full status interval past it.
        let first_tick = self.status_interval.min(time_remaining.unwrap_or(self.status_interval));
        let mut ticker = channel::tick(first_tick);
        let mut tick_duration = first_tick;
        // Fires at most once (the reader thread exits after its first line or
        // EOF); swapped for a channel that never fires so the select loop
        // doesn't spin once `stdin_rx` disconnects.
        let mut stdin_rx = stdin_rx;

        while running > 0 {
            channel::select! {
                recv(interrupt_rx) -> _ => {
                    info!("interrupt received, cancelling");
                    self.cancel.cancel();
                }
                recv(ticker) -> _ => {
                    self.print_status_tick(workers);
                    if let Some(remaining) = time_remaining.as_mut() {
                        *remaining = remaining.saturating_sub(tick_duration);
                        if remaining.is_zero() {
                            info!("time budget exhausted, cancelling");
                            self.cancel.cancel();
                        }
                    }
                    if tick_duration != self.status_interval {
                        tick_duration = self.status_interval;
                        ticker = channel::tick(tick_duration);
                    }
                }
                recv(done_rx) -> _ => {
                    running = running.saturating_sub(1);
                }
                recv(stdin_rx) -> msg => {
                    if msg.is_ok() {
                        info!("stdin closed/line received, cancelling");
                        self.cancel.cancel();
                    }
                    stdin_rx = channel::never();
                }
            }
        }
    }

    fn print_status_tick(&self, workers: &Mutex<Vec<RunningWorker>>) {
        let guard = workers.lock().unwrap();
        for entry in guard.iter() {
            let report = entry.worker.statistics();
            println!(
                "{}",
                report::status_line(entry.worker.client_id(), entry.worker.connection_description(), &report)
            );
        }
    }

    fn print_final_summary(&self, workers: &Mutex<Vec<RunningWorker>>, json: bool) {
        let guard = workers.lock().unwrap();
        let mut total = crate::stats::Counters::default();
        for entry in guard.iter() {
            let report = entry.worker.statistics();
            total = total + report.summary;
        }
        if json {
            println!("{}", report::summary_json(&total));
        } else {
            println!("{}", report::summary_line(&total));
        }
    }

    fn status_loop_until_cancelled(&self, workers: &Arc<Mutex<Vec<ConnectionWorker>>>) {
        let interrupt_rx = interrupt_channel();
        let mut time_remaining = self.time_budget;
        // See multiplex_wait: the first tick must fire after min(status_interval,
        // time_remaining), not a full status_interval, so a short --time budget
        // is honored promptly.
        let first_tick = self.status_interval.min(time_remaining.unwrap_or(self.status_interval));
        let mut ticker = channel::tick(first_tick);
        let mut tick_duration = first_tick;

        loop {
            channel::select! {
                recv(interrupt_rx) -> _ => {
                    info!("interrupt received, shutting down");
                    self.cancel.cancel();
                    break;
                }
                recv(ticker) -> _ => {
                    let guard = workers.lock().unwrap();
                    for w in guard.iter() {
                        let report = w.statistics();
                        println!("{}", report::status_line(w.client_id(), w.connection_description(), &report));
                    }
                    drop(guard);
                    if let Some(remaining) = time_remaining.as_mut() {
                        *remaining = remaining.saturating_sub(tick_duration);
                        if remaining.is_zero() {
                            info!("time budget exhausted, shutting down");
                            self.cancel.cancel();
                            break;
                        }
                    }
                    if tick_duration != self.status_interval {
                        tick_duration = self.status_interval;
                        ticker = channel::tick(tick_duration);
                    }
                }
            }
        }
    }
}
