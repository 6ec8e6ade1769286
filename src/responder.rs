//! # Responder
//!
//! Server-side half of one connection: receive a request, answer it, repeat until
//! the peer closes, a protocol error occurs, or cancellation. Grounded in
//! `original_source/src/protocol.hpp`'s `cResponder::doJob`.

use std::sync::Arc;

use tracing::debug;

use crate::error::WorkerExit;
use crate::protocol::Codec;
use crate::stats::Statistics;
use crate::transport::NetTransport;

pub struct Responder {
    transport: NetTransport,
    codec: Codec,
    stats: Arc<Statistics>,
}

impl Responder {
    pub fn new(transport: NetTransport, bufsize: usize, stats: Arc<Statistics>) -> Self {
        Self {
            transport,
            codec: Codec::new(bufsize),
            stats,
        }
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Runs until the peer closes the connection, a protocol error occurs, or the
    /// process-wide cancel handle fires. A `resp_size` of zero means the peer
    /// expects no answer; the responder skips straight to the next request.
    pub fn run(&mut self) -> Result<(), WorkerExit> {
        loop {
            let (seq, resp_size, peer, recv_io) = self.codec.recv_request(&self.transport)?;
            self.stats.record_received(1, recv_io.octets as i64);

            if resp_size > 0 {
                let send_io = self.codec.send_response(&self.transport, seq, resp_size, peer)?;
                self.stats.record_sent(1, send_io.octets as i64);
            }

            debug!(seq, resp_size, "request answered");
        }
    }
}
