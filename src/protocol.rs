//! # Wire Protocol
//!
//! A 28-byte big-endian frame header followed by a pattern-verified payload. This
//! module owns framing, the checksum, and the payload generator/verifier; it knows
//! nothing about sockets or threads -- `Codec::send_request` and friends take any
//! `&NetTransport` and drive it with plain `send`/`recv` calls.
//!
//! Header layout (28 bytes):
//!
//! | field    | bytes | notes                                            |
//! |----------|-------|---------------------------------------------------|
//! | type     | 4     | `0xAAFFFFEE` request, `0xEEFFFFAA` response        |
//! | length   | 4     | total frame length, header + payload, min 28       |
//! | sequence | 8     | requestor-assigned counter, echoed by the responder|
//! | options  | 4     | request: desired response length; response: 0     |
//! | reserved | 4     | always zero on the wire, ignored on receipt        |
//! | checksum | 4     | wrapping byte-sum of bytes 0..24                   |
//!
//! The `reserved` field has no counterpart in spec.md's field table, but the
//! header's declared total size (28 bytes) and its checksum invariant (covers bytes
//! 0..24) are only consistent with each other if four bytes sit between `options`
//! and `checksum` that the table doesn't separately name. Treated here as a
//! zero-filled pad rather than silently shrinking the header to 24 bytes.

use std::net::SocketAddr;

use crate::error::ProtocolError;
use crate::transport::NetTransport;

pub const HEADER_LEN: usize = 28;
const TYPE_REQUEST: u32 = 0xAAFF_FFEE;
const TYPE_RESPONSE: u32 = 0xEEFF_FFAA;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub is_request: bool,
    pub length: u32,
    pub sequence: u64,
    pub options: u32,
}

impl FrameHeader {
    fn encode(self, buf: &mut [u8; HEADER_LEN]) {
        let ty = if self.is_request { TYPE_REQUEST } else { TYPE_RESPONSE };
        buf[0..4].copy_from_slice(&ty.to_be_bytes());
        buf[4..8].copy_from_slice(&self.length.to_be_bytes());
        buf[8..16].copy_from_slice(&self.sequence.to_be_bytes());
        buf[16..20].copy_from_slice(&self.options.to_be_bytes());
        buf[20..24].copy_from_slice(&0u32.to_be_bytes());
        let sum = checksum(&buf[0..24]);
        buf[24..28].copy_from_slice(&sum.to_be_bytes());
    }

    fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self, ProtocolError> {
        let sum = checksum(&buf[0..24]);
        let on_wire = u32::from_be_bytes(buf[24..28].try_into().unwrap());
        if sum != on_wire {
            return Err(ProtocolError::WrongChecksum);
        }
        let ty = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let is_request = match ty {
            TYPE_REQUEST => true,
            TYPE_RESPONSE => false,
            _ => return Err(ProtocolError::UnknownType),
        };
        let length = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        let sequence = u64::from_be_bytes(buf[8..16].try_into().unwrap());
        let options = u32::from_be_bytes(buf[16..20].try_into().unwrap());
        Ok(Self {
            is_request,
            length,
            sequence,
            options,
        })
    }
}

/// Wrapping unsigned 32-bit sum of every byte in `bytes`. Cheap corruption check,
/// not a cryptographic one -- the payload pattern is what actually catches bit
/// flips in the body of the frame.
fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

/// Advances `counter` by one step (wrapping `u8` arithmetic) and returns the new
/// value, either incrementing (requests) or decrementing (responses).
fn step(counter: u8, increment: bool) -> u8 {
    if increment {
        counter.wrapping_add(1)
    } else {
        counter.wrapping_sub(1)
    }
}

/// Drives one `NetTransport` with the babbler framing. Owns a reusable scratch
/// buffer sized to the connection's configured I/O chunk size; frames larger than
/// the buffer are sent and received in several kernel-visible chunks, each chunk
/// still contributing to the connection's octet counters individually while the
/// logical frame counts once.
///
/// `carry` holds bytes already pulled off the transport but not yet consumed by a
/// decoded frame. A stream transport's `recv` is free to return more than one
/// frame's worth of bytes in a single read; whatever lands beyond the frame
/// currently being decoded is retained here and consulted first on the next
/// `receive` call, rather than discarded (spec.md §4.2).
pub struct Codec {
    buf: Vec<u8>,
    carry: Vec<u8>,
}

/// Outcome of one send or receive: the logical frame count is always 1, the octet
/// count is the number of kernel-visible chunks it took to move it.
pub struct IoCount {
    pub chunks: u32,
    pub octets: u64,
}

impl Codec {
    pub fn new(bufsize: usize) -> Self {
        assert!(bufsize >= HEADER_LEN, "I/O buffer must fit at least one header");
        Self {
            buf: vec![0u8; bufsize],
            carry: Vec::new(),
        }
    }

    /// Requests are always sent to the transport's connected peer: `NetTransport`
    /// connects connection-less sockets at the BSD level too (see `transport/net.rs`),
    /// so a requestor never needs to name a destination explicitly.
    pub fn send_request(
        &mut self,
        transport: &NetTransport,
        seq: u64,
        req_size: u32,
        resp_size: u32,
    ) -> Result<IoCount, crate::error::WorkerExit> {
        let header = FrameHeader {
            is_request: true,
            length: req_size,
            sequence: seq,
            options: resp_size,
        };
        self.send(transport, header, true, None)
    }

    /// `dest` must be `Some` when `transport` is an unconnected connection-less
    /// endpoint shared by a fixed responder pool (spec.md §4.7): the responder has
    /// no peer of its own to fall back on, so it must name the requestor it just
    /// heard from explicitly. Connection-oriented responders pass `None`.
    pub fn send_response(
        &mut self,
        transport: &NetTransport,
        seq: u64,
        resp_size: u32,
        dest: Option<SocketAddr>,
    ) -> Result<IoCount, crate::error::WorkerExit> {
        let header = FrameHeader {
            is_request: false,
            length: resp_size,
            sequence: seq,
            options: 0,
        };
        self.send(transport, header, false, dest)
    }

    /// Mirrors the original chunked-fill send loop: the header is written once at
    /// the front of the buffer, then the remainder is filled with pattern bytes
    /// chunk by chunk, flushing to the transport whenever the buffer fills or the
    /// frame completes.
    fn send(
        &mut self,
        transport: &NetTransport,
        header: FrameHeader,
        increment: bool,
        dest: Option<SocketAddr>,
    ) -> Result<IoCount, crate::error::WorkerExit> {
        let total_len = header.length as usize;
        let mut header_bytes = [0u8; HEADER_LEN];
        header.encode(&mut header_bytes);
        self.buf[0..HEADER_LEN].copy_from_slice(&header_bytes);

        let mut counter = header.sequence as u8;
        let mut sent = HEADER_LEN;
        let mut cursor = HEADER_LEN;
        let mut chunks = 0u32;
        let mut octets = 0u64;

        while sent < total_len {
            while sent < total_len && cursor < self.buf.len() {
                counter = step(counter, increment);
                self.buf[cursor] = counter;
                cursor += 1;
                sent += 1;
            }
            let n = transport.send(&self.buf[0..cursor], dest)?;
            chunks += 1;
            octets += n as u64;
            cursor = 0;
        }

        Ok(IoCount { chunks, octets })
    }

    /// Returns the peer's address alongside the usual fields: `Some` when
    /// `transport` is an unconnected connection-less socket (the shared endpoint a
    /// fixed responder pool reads from) and the requestor must be replied to by
    /// address rather than via an already-connected peer; `None` otherwise.
    pub fn recv_request(
        &mut self,
        transport: &NetTransport,
    ) -> Result<(u64, u32, Option<SocketAddr>, IoCount), crate::error::WorkerExit> {
        let (header, peer, io) = self.receive(transport, true)?;
        Ok((header.sequence, header.options, peer, io))
    }

    pub fn recv_response(
        &mut self,
        transport: &NetTransport,
        expected_seq: u64,
    ) -> Result<IoCount, crate::error::WorkerExit> {
        let (header, _peer, io) = self.receive(transport, false)?;
        if header.sequence != expected_seq {
            return Err(ProtocolError::UnexpectedSequence.into());
        }
        Ok(io)
    }

    /// Reads from `transport` into `self.carry`, growing it until at least
    /// `at_least` bytes are available, without discarding whatever arrives beyond
    /// that (a stream read can return several frames' worth of bytes at once).
    fn fill_carry(
        &mut self,
        transport: &NetTransport,
        at_least: usize,
        src: &mut Option<SocketAddr>,
        chunks: &mut u32,
        octets: &mut u64,
    ) -> Result<(), crate::error::WorkerExit> {
        while self.carry.len() < at_least {
            // `at_least` can exceed the scratch buffer for a frame larger than
            // `self.buf`; clamp the request so a connection-oriented transport is
            // never asked to fill more bytes in one call than `self.buf` holds.
            let want = (at_least - self.carry.len()).min(self.buf.len());
            let n = transport.recv(&mut self.buf, want, src)?;
            self.carry.extend_from_slice(&self.buf[0..n]);
            *chunks += 1;
            *octets += n as u64;
        }
        Ok(())
    }

    /// Mirrors the original two-phase receive: first fill at least one header's
    /// worth of bytes, validate it, verify the payload, then keep receiving and
    /// verifying chunks until `length` bytes are accounted for. Anything read
    /// beyond this frame's `length` is left in `self.carry` for the next call
    /// instead of being dropped, so back-to-back frames on a stream transport
    /// (e.g. a run of `resp_size == 0` fire-and-forget requests) are not
    /// misinterpreted as payload corruption.
    fn receive(
        &mut self,
        transport: &NetTransport,
        expect_request: bool,
    ) -> Result<(FrameHeader, Option<SocketAddr>, IoCount), crate::error::WorkerExit> {
        let mut src = None;
        let mut chunks = 0u32;
        let mut octets = 0u64;

        self.fill_carry(transport, HEADER_LEN, &mut src, &mut chunks, &mut octets)?;

        let header_bytes: [u8; HEADER_LEN] = self.carry[0..HEADER_LEN].try_into().unwrap();
        let header = FrameHeader::decode(&header_bytes)?;
        if header.is_request != expect_request {
            return Err(ProtocolError::UnexpectedType.into());
        }
        let total = header.length as usize;
        if total < HEADER_LEN {
            return Err(ProtocolError::FrameTooShort.into());
        }

        self.fill_carry(transport, total, &mut src, &mut chunks, &mut octets)?;

        let mut expected = header.sequence as u8;
        verify_payload(&self.carry[HEADER_LEN..total], header.is_request, &mut expected)?;

        // Drop exactly this frame's bytes; anything carried past `total` stays
        // queued for the next `receive` call.
        self.carry.drain(0..total);

        Ok((header, src, IoCount { chunks, octets }))
    }
}

fn verify_payload(data: &[u8], increment: bool, expected: &mut u8) -> Result<(), ProtocolError> {
    for &b in data {
        *expected = step(*expected, increment);
        if b != *expected {
            return Err(ProtocolError::CorruptedPayload);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = FrameHeader {
            is_request: true,
            length: 512,
            sequence: 0xdead_beef_0000_1234,
            options: 256,
        };
        let mut buf = [0u8; HEADER_LEN];
        header.encode(&mut buf);
        let decoded = FrameHeader::decode(&buf).expect("valid header");
        assert_eq!(header, decoded);
    }

    #[test]
    fn checksum_covers_first_24_bytes_only() {
        let header = FrameHeader {
            is_request: false,
            length: 28,
            sequence: 7,
            options: 0,
        };
        let mut buf = [0u8; HEADER_LEN];
        header.encode(&mut buf);
        let sum = checksum(&buf[0..24]);
        let on_wire = u32::from_be_bytes(buf[24..28].try_into().unwrap());
        assert_eq!(sum, on_wire);
    }

    #[test]
    fn decode_rejects_flipped_checksum_byte() {
        let header = FrameHeader {
            is_request: true,
            length: 40,
            sequence: 1,
            options: 12,
        };
        let mut buf = [0u8; HEADER_LEN];
        header.encode(&mut buf);
        buf[0] ^= 0xff;
        assert_eq!(FrameHeader::decode(&buf), Err(ProtocolError::WrongChecksum));
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let header = FrameHeader {
            is_request: true,
            length: 28,
            sequence: 0,
            options: 0,
        };
        let mut buf = [0u8; HEADER_LEN];
        header.encode(&mut buf);
        buf[0..4].copy_from_slice(&0u32.to_be_bytes());
        let sum = checksum(&buf[0..24]);
        buf[24..28].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(FrameHeader::decode(&buf), Err(ProtocolError::UnknownType));
    }

    #[test]
    fn payload_pattern_increments_for_requests_and_decrements_for_responses() {
        let mut expected = 10u8;
        verify_payload(&[11, 12, 13], true, &mut expected).expect("matches increment pattern");
        assert_eq!(expected, 13);

        let mut expected = 10u8;
        verify_payload(&[9, 8, 7], false, &mut expected).expect("matches decrement pattern");
        assert_eq!(expected, 7);
    }

    #[test]
    fn payload_pattern_rejects_single_flipped_byte() {
        let mut expected = 0u8;
        let err = verify_payload(&[1, 2, 200], true, &mut expected).unwrap_err();
        assert_eq!(err, ProtocolError::CorruptedPayload);
    }

    /// Two response frames written in a single `send` must both decode
    /// correctly even though the client's first `recv` call pulls in the whole
    /// lot at once -- the second frame has to come out of `Codec::carry`
    /// rather than a fresh socket read.
    #[test]
    fn receive_retains_bytes_beyond_one_frame_for_the_next_call() {
        use crate::transport::{NetTransport, TransportProps};

        let port = 55301;
        let listening = NetTransport::listen(TransportProps::tcp(), port, 1).expect("bind listener");
        let server = std::thread::spawn(move || listening.accept().expect("accept").0);

        std::thread::sleep(std::time::Duration::from_millis(50));
        let client = NetTransport::connect(TransportProps::tcp(), "127.0.0.1", port, 0).expect("connect");
        let server_conn = server.join().expect("server thread");

        let mut wire = Vec::new();
        for (seq, payload_len) in [(1u64, 4u32), (2u64, 4u32)] {
            let header = FrameHeader {
                is_request: false,
                length: HEADER_LEN as u32 + payload_len,
                sequence: seq,
                options: 0,
            };
            let mut buf = [0u8; HEADER_LEN];
            header.encode(&mut buf);
            wire.extend_from_slice(&buf);
            let mut counter = seq as u8;
            for _ in 0..payload_len {
                counter = step(counter, false);
                wire.push(counter);
            }
        }
        server_conn.send(&wire, None).expect("write both frames at once");
        std::thread::sleep(std::time::Duration::from_millis(50));

        let mut codec = Codec::new(4096);
        let io1 = codec.recv_response(&client, 1).expect("first frame");
        assert_eq!(io1.octets, wire.len() as u64, "both frames should land in one kernel read");

        let io2 = codec.recv_response(&client, 2).expect("second frame decodes from carry-over");
        assert_eq!(io2.chunks, 0, "no further socket read needed once bytes are carried over");
    }
}
