//! Cancellation-latency scenario: a connection blocked waiting on its peer
//! exits promptly once the process-wide cancel handle fires, instead of
//! hanging until the peer eventually sends something.

use std::sync::Arc;
use std::time::{Duration, Instant};

use babbler::cancel::CancelHandle;
use babbler::comsettings::{ComSettings, SizeRange};
use babbler::requestor::{Requestor, RequestorConfig};
use babbler::stats::Statistics;
use babbler::transport::{NetTransport, TransportProps};
use babbler::worker::ConnectionWorker;

#[test]
fn cancelling_mid_interval_unblocks_the_worker_quickly() {
    let port = 55201;
    let listening = NetTransport::listen(TransportProps::tcp(), port, 16).expect("bind listener");
    let cancel = CancelHandle::new();
    let cancel_for_server = cancel.clone();
    let server = std::thread::spawn(move || {
        let mut listening = listening;
        listening.set_cancel_handle(cancel_for_server);
        // Accept once and then just sit idle -- this test only cares whether
        // the client side unblocks, not whether the server answers further.
        let _ = listening.accept();
    });

    std::thread::sleep(Duration::from_millis(50));

    let mut transport = NetTransport::connect(TransportProps::tcp(), "127.0.0.1", port, 0).expect("connect");
    transport.set_cancel_handle(cancel.clone());

    let stats = Arc::new(Statistics::new());
    let config = RequestorConfig {
        com_settings: ComSettings::new(SizeRange::new(100, 100, 0), SizeRange::new(100, 100, 0)),
        // Long enough that the test would hang if cancellation didn't cut the
        // sleep short.
        delay_us: 10_000_000,
        max_count: None,
        send_limit_octets: None,
        recv_limit_octets: None,
    };
    let requestor = Requestor::new(transport, 65536, config, Arc::clone(&stats));
    let worker = ConnectionWorker::requestor(requestor, stats, "127.0.0.1 -> test".to_string(), 1);

    std::thread::sleep(Duration::from_millis(100));
    let started = Instant::now();
    cancel.cancel();
    worker.join();
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "worker took too long to unwind after cancellation"
    );

    let _ = server.join();
}
