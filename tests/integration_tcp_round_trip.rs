//! Loopback TCP scenarios, ported from the end-to-end cases the project's
//! requirements document lists: a single fixed-size exchange and a sweep
//! over a range of request/response sizes.

use std::sync::Arc;

use babbler::comsettings::{ComSettings, SizeRange};
use babbler::requestor::{Requestor, RequestorConfig};
use babbler::responder::Responder;
use babbler::stats::Statistics;
use babbler::transport::{NetTransport, TransportProps};

fn spawn_loopback_responder(port: u16) -> std::thread::JoinHandle<()> {
    let listening = NetTransport::listen(TransportProps::tcp(), port, 16).expect("bind listener");
    std::thread::spawn(move || {
        let (conn, _host, _port) = listening.accept().expect("accept connection");
        let stats = Arc::new(Statistics::new());
        let mut responder = Responder::new(conn, 65536, stats);
        let _ = responder.run();
    })
}

#[test]
fn single_exchange_reports_matching_counters() {
    let port = 55101;
    let server = spawn_loopback_responder(port);
    std::thread::sleep(std::time::Duration::from_millis(50));

    let transport = NetTransport::connect(TransportProps::tcp(), "127.0.0.1", port, 0).expect("connect");
    let stats = Arc::new(Statistics::new());
    let config = RequestorConfig {
        com_settings: ComSettings::new(SizeRange::new(100, 100, 0), SizeRange::new(100, 100, 0)),
        delay_us: 0,
        max_count: Some(1),
        send_limit_octets: None,
        recv_limit_octets: None,
    };
    let mut requestor = Requestor::new(transport, 65536, config, Arc::clone(&stats));
    requestor.run().expect("requestor run");

    let (counters, _elapsed) = stats.summary();
    assert_eq!(counters.sent_packets, 1);
    assert_eq!(counters.sent_octets, 100);
    assert_eq!(counters.received_packets, 1);
    assert_eq!(counters.received_octets, 100);

    drop(requestor);
    let _ = server.join();
}

#[test]
fn sweep_mode_visits_every_step_in_order() {
    let port = 55102;
    let server = spawn_loopback_responder(port);
    std::thread::sleep(std::time::Duration::from_millis(50));

    let transport = NetTransport::connect(TransportProps::tcp(), "127.0.0.1", port, 0).expect("connect");
    let stats = Arc::new(Statistics::new());
    let config = RequestorConfig {
        com_settings: ComSettings::new(SizeRange::new(100, 200, 50), SizeRange::new(100, 200, 50)),
        delay_us: 0,
        max_count: Some(3),
        send_limit_octets: None,
        recv_limit_octets: None,
    };
    let mut requestor = Requestor::new(transport, 65536, config, Arc::clone(&stats));
    requestor.run().expect("requestor run");

    let (counters, _elapsed) = stats.summary();
    // 100 + 150 + 200 sent and received, per the sweep sequence.
    assert_eq!(counters.sent_packets, 3);
    assert_eq!(counters.sent_octets, 450);
    assert_eq!(counters.received_packets, 3);
    assert_eq!(counters.received_octets, 450);

    drop(requestor);
    let _ = server.join();
}
