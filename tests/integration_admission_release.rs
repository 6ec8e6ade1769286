//! Admission-release scenario: once `max-connections` responders are in
//! flight, a finished connection must free its admission unit as soon as its
//! worker thread exits, not only once the accept loop happens to reap it
//! after its next successful `accept()`. With only a single admission unit,
//! a second connection must still be served promptly after the first one
//! finishes, rather than hanging forever waiting on a permit that nothing
//! not already holding one could release.

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use babbler::cancel::CancelHandle;
use babbler::comsettings::{ComSettings, SizeRange};
use babbler::listener::Listener;
use babbler::requestor::{Requestor, RequestorConfig};
use babbler::stats::Statistics;
use babbler::sync::Semaphore;
use babbler::transport::{NetTransport, TransportProps};
use babbler::worker::ConnectionWorker;

fn exchange_one(port: u16, timeout: Option<Duration>) -> Result<(), babbler::error::WorkerExit> {
    let mut transport = NetTransport::connect(TransportProps::tcp(), "127.0.0.1", port, 0).expect("connect");
    transport.set_timeout(timeout);
    let stats = Arc::new(Statistics::new());
    let config = RequestorConfig {
        com_settings: ComSettings::new(SizeRange::new(64, 64, 0), SizeRange::new(64, 64, 0)),
        delay_us: 0,
        max_count: Some(1),
        send_limit_octets: None,
        recv_limit_octets: None,
    };
    let mut requestor = Requestor::new(transport, 1024, config, Arc::clone(&stats));
    requestor.run()
}

#[test]
fn a_finished_connection_frees_its_admission_unit_for_the_next_one() {
    let port = 55401;
    let listening = NetTransport::listen(TransportProps::tcp(), port, 16).expect("bind listener");

    let admission = Arc::new(Semaphore::new(1));
    let cancel = CancelHandle::new();
    let next_client_id = Arc::new(AtomicU64::new(1));
    let listener = Listener::new(1024, admission, cancel.clone(), next_client_id);

    let workers: Arc<Mutex<Vec<ConnectionWorker>>> = Arc::new(Mutex::new(Vec::new()));
    let workers_for_thread = Arc::clone(&workers);
    let accept_thread = std::thread::spawn(move || {
        listener.run_accept_loop(listening, &workers_for_thread);
    });

    std::thread::sleep(Duration::from_millis(50));

    exchange_one(port, Some(Duration::from_secs(2))).expect("first exchange");

    // With only one admission unit, this second exchange can only succeed if
    // completing the first one actually released it -- which must happen on
    // worker completion, not be gated behind the accept loop's next iteration.
    let started = Instant::now();
    exchange_one(port, Some(Duration::from_secs(2)))
        .expect("second exchange should succeed once the first connection's admission unit is released");
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "second connection was not admitted promptly -- admission semaphore deadlocked"
    );

    cancel.cancel();
    let _ = accept_thread.join();
}
