//! # Requestor
//!
//! Client-side half of one connection: send a request, optionally wait for its
//! response, sleep, rotate sizes, repeat. Grounded in
//! `original_source/src/protocol.hpp`'s `cRequestor::doJob`, generalized from its
//! single random-delta model to the three size modes `comsettings::SizeRange`
//! derives (fixed/random/sweep) per spec.md §4.4.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::comsettings::{ComSettings, MIN_FRAME_SIZE};
use crate::error::WorkerExit;
use crate::protocol::Codec;
use crate::stats::Statistics;
use crate::transport::NetTransport;

/// Byte budget tracked across the lifetime of one Requestor, independently for the
/// send and receive directions.
struct Budget {
    remaining: Option<i64>,
}

impl Budget {
    fn new(limit: Option<u64>) -> Self {
        Self {
            remaining: limit.map(|l| l as i64),
        }
    }

    /// Clamp `candidate` to the remaining budget. Returns `None` if the budget is
    /// already exhausted (the caller must stop). If clamping would shrink the frame
    /// below the protocol minimum, falls back to `prior` instead of the clamped
    /// value -- "borrowing" the previous iteration's size rather than emitting an
    /// undersized frame.
    fn clamp(&self, candidate: u32, prior: u32) -> Option<u32> {
        match self.remaining {
            None => Some(candidate),
            Some(r) if r <= 0 => None,
            Some(r) => {
                let capped = (candidate as i64).min(r) as u32;
                if capped < MIN_FRAME_SIZE {
                    Some(prior)
                } else {
                    Some(capped)
                }
            }
        }
    }

    fn spend(&mut self, n: u32) {
        if let Some(r) = self.remaining.as_mut() {
            *r -= n as i64;
        }
    }
}

pub struct RequestorConfig {
    pub com_settings: ComSettings,
    pub delay_us: u64,
    pub max_count: Option<u64>,
    pub send_limit_octets: Option<u64>,
    pub recv_limit_octets: Option<u64>,
}

pub struct Requestor {
    transport: NetTransport,
    codec: Codec,
    stats: Arc<Statistics>,
    config: RequestorConfig,
    rng: StdRng,
    seq: u64,
}

impl Requestor {
    pub fn new(transport: NetTransport, bufsize: usize, config: RequestorConfig, stats: Arc<Statistics>) -> Self {
        Self {
            transport,
            codec: Codec::new(bufsize),
            stats,
            config,
            rng: StdRng::from_entropy(),
            seq: 0,
        }
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Sleeps `total_us` microseconds in small slices, checking the transport's
    /// cancel handle between each one, so a long `--interval` doesn't make
    /// cancellation latency proportional to the interval (spec's cancellation
    /// scenario requires workers to unwind within about one timeout grace
    /// period regardless of `delay_us`). Returns `false` if cancelled early.
    fn sleep_cancellable(&self, total_us: u64) -> bool {
        const SLICE: std::time::Duration = std::time::Duration::from_millis(100);
        let mut remaining = std::time::Duration::from_micros(total_us);
        while remaining > std::time::Duration::ZERO {
            if self.transport.is_cancelled() {
                return false;
            }
            let slice = remaining.min(SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
        !self.transport.is_cancelled()
    }

    /// Drives the request/response loop until a termination condition fires. Never
    /// returns `Ok` early for `Cancelled`-style reasons; those come back as
    /// `Err(WorkerExit::Cancelled)` so the caller (`ConnectionWorker`) can skip
    /// logging it as a failure.
    pub fn run(&mut self) -> Result<(), WorkerExit> {
        let mut send_budget = Budget::new(self.config.send_limit_octets);
        let mut recv_budget = Budget::new(self.config.recv_limit_octets);

        let mut req_size = self.config.com_settings.request.initial();
        let mut resp_size = self.config.com_settings.response.initial();
        let mut completed = 0u64;

        loop {
            if let Some(max) = self.config.max_count {
                if completed >= max {
                    return Ok(());
                }
            }

            let curr_req = match send_budget.clamp(req_size, req_size) {
                Some(s) => s,
                None => return Err(WorkerExit::Cancelled),
            };
            let curr_resp = match recv_budget.clamp(resp_size, resp_size) {
                Some(s) => s,
                None => return Err(WorkerExit::Cancelled),
            };

            self.seq += 1;
            let t0 = std::time::Instant::now();

            let send_io = self.codec.send_request(&self.transport, self.seq, curr_req, curr_resp)?;
            self.stats.record_sent(1, send_io.octets as i64);
            send_budget.spend(curr_req);

            if curr_resp > 0 {
                let recv_io = self.codec.recv_response(&self.transport, self.seq)?;
                self.stats.record_received(1, recv_io.octets as i64);
                recv_budget.spend(curr_resp);
            }

            let elapsed = t0.elapsed();
            debug!(seq = self.seq, req_size = curr_req, resp_size = curr_resp, ?elapsed, "exchange complete");

            if self.config.delay_us > 0 && !self.sleep_cancellable(self.config.delay_us) {
                return Err(WorkerExit::Cancelled);
            }

            req_size = self.config.com_settings.request.next(req_size, &mut self.rng);
            resp_size = self.config.com_settings.response.next(resp_size, &mut self.rng);
            completed += 1;
        }
    }
}
