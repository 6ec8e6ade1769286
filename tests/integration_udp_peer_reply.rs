//! UDP exchange over the fixed responder-pool path: the server socket is
//! bound, not connected, so `Responder::run` only answers correctly if it
//! threads the request's peer address through to `send_response` instead of
//! relying on a connected destination.

use std::sync::Arc;

use babbler::comsettings::{ComSettings, SizeRange};
use babbler::requestor::{Requestor, RequestorConfig};
use babbler::responder::Responder;
use babbler::stats::Statistics;
use babbler::transport::{NetTransport, TransportProps};

#[test]
fn udp_responder_replies_to_the_requesting_peer() {
    let port = 55401;
    let server_transport = NetTransport::listen(TransportProps::udp(), port, 0).expect("bind udp socket");
    let server_stats = Arc::new(Statistics::new());
    let server = std::thread::spawn(move || {
        let mut responder = Responder::new(server_transport, 65536, server_stats);
        let _ = responder.run();
    });

    std::thread::sleep(std::time::Duration::from_millis(50));

    let transport = NetTransport::connect(TransportProps::udp(), "127.0.0.1", port, 0).expect("connect");
    let stats = Arc::new(Statistics::new());
    let config = RequestorConfig {
        com_settings: ComSettings::new(SizeRange::new(64, 64, 0), SizeRange::new(64, 64, 0)),
        delay_us: 0,
        max_count: Some(1),
        send_limit_octets: None,
        recv_limit_octets: None,
    };
    let mut requestor = Requestor::new(transport, 65536, config, Arc::clone(&stats));
    requestor.run().expect("requestor run");

    let (counters, _elapsed) = stats.summary();
    assert_eq!(counters.sent_packets, 1);
    assert_eq!(counters.received_packets, 1, "response must reach the requestor, not vanish to the wrong peer");
    assert_eq!(counters.received_octets, 64);

    drop(requestor);
    // The responder thread loops forever on its bound socket; the test process
    // exiting is what reclaims it, matching this crate's other fire-and-forget
    // server-thread tests.
    let _ = server;
}
