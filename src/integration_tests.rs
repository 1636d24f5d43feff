//! Black-box end-to-end tests driving two real `RatListener`/`RatStream`
//! instances over loopback, covering spec.md §8's literal scenarios.

use std::net::Ipv4Addr;
use std::thread;
use std::time::Duration;

use crate::config::RatConfig;
use crate::error::Error;
use crate::listener::RatListener;
use crate::socket::RatStream;
use crate::state::ConnState;
use crate::testutil::LossyRelay;

fn fast_config() -> RatConfig {
    RatConfig {
        reply_timeout: Duration::from_millis(200),
        bye_timeout: Duration::from_millis(50),
        retry_bound: 3,
        ..RatConfig::default()
    }
}

/// Scenario 1: a single-segment 33-byte message round-trips exactly.
#[test]
fn short_echo() {
    let listener = RatListener::listen_with_config(Ipv4Addr::LOCALHOST, 0, 5, fast_config())
        .expect("listen");
    let port = listener.local_addr().port();

    let server = thread::spawn(move || -> Vec<u8> {
        let mut stream = listener.accept().expect("accept");
        stream.recv(64 * 1024).expect("recv")
    });

    let mut client = RatStream::connect_with_config(Ipv4Addr::LOCALHOST, port, 0, fast_config())
        .expect("connect");
    let message = b"Make sure to drink your ovaltine.";
    assert_eq!(message.len(), 33);
    client.send(message).expect("send");

    let received = server.join().unwrap();
    assert_eq!(received, message);
}

/// Scenario 2: a 900-byte message splits into two segments (512 + 388)
/// and reassembles in order.
#[test]
fn multi_segment_reassembly() {
    let listener = RatListener::listen_with_config(Ipv4Addr::LOCALHOST, 0, 5, fast_config())
        .expect("listen");
    let port = listener.local_addr().port();

    let server = thread::spawn(move || -> Vec<u8> {
        let mut stream = listener.accept().expect("accept");
        stream.recv(2048).expect("recv")
    });

    let mut client = RatStream::connect_with_config(Ipv4Addr::LOCALHOST, port, 0, fast_config())
        .expect("connect");
    let payload: Vec<u8> = (0..900u32).map(|i| (i % 256) as u8).collect();
    client.send(&payload).expect("send");

    let received = server.join().unwrap();
    assert_eq!(received, payload);
}

/// Scenario 3: the middle segment of a three-segment send is dropped
/// once; the receiver's NACK causes exactly that segment to be
/// retransmitted, and the full original bytes arrive.
#[test]
fn loss_then_nack_recovers() {
    let mut config = fast_config();
    config.payload_mtu = 10;

    let listener =
        RatListener::listen_with_config(Ipv4Addr::LOCALHOST, 0, 5, config).expect("listen");
    let server_addr = listener.local_addr();

    // The handshake-chosen seq_num base is 1, so a 25-byte payload at a
    // 10-byte MTU yields segments seq=1 (10B), seq=2 (10B), seq=3 (5B);
    // drop the middle one.
    let relay = LossyRelay::spawn(server_addr, 2);

    let server = thread::spawn(move || -> Vec<u8> {
        let mut stream = listener.accept().expect("accept");
        stream.recv(2048).expect("recv")
    });

    let mut client = RatStream::connect_with_config(Ipv4Addr::LOCALHOST, relay.front_addr.port(), 0, config)
        .expect("connect");
    let payload: Vec<u8> = (0..25u8).collect();
    client.send(&payload).expect("send");

    let received = server.join().unwrap();
    assert_eq!(received, payload);
}

/// Scenario 4: a mid-stream SWIN(2) changes the window on both ends;
/// a subsequent larger send still reassembles correctly under the new,
/// smaller window.
#[test]
fn window_change_is_honored() {
    let mut config = fast_config();
    config.payload_mtu = 100;

    let listener =
        RatListener::listen_with_config(Ipv4Addr::LOCALHOST, 0, 5, config).expect("listen");
    let port = listener.local_addr().port();

    let server = thread::spawn(move || -> Vec<u8> {
        let mut stream = listener.accept().expect("accept");
        stream.recv(4096).expect("recv")
    });

    let mut client =
        RatStream::connect_with_config(Ipv4Addr::LOCALHOST, port, 0, config).expect("connect");
    client.set_window(2).expect("set_window");

    let payload: Vec<u8> = (0..900u32).map(|i| (i % 256) as u8).collect();
    client.send(&payload).expect("send");

    let received = server.join().unwrap();
    assert_eq!(received, payload);
}

/// Scenario 5: after a graceful close, both sides reach `Closed` and
/// further `send` on the closer fails with `InvalidState`.
#[test]
fn graceful_close_then_invalid_state() {
    let listener = RatListener::listen_with_config(Ipv4Addr::LOCALHOST, 0, 5, fast_config())
        .expect("listen");
    let port = listener.local_addr().port();

    let server = thread::spawn(move || -> RatStream {
        let mut stream = listener.accept().expect("accept");
        let got = stream.recv(64).expect("recv");
        assert_eq!(got, b"bye soon");
        stream
    });

    let mut client = RatStream::connect_with_config(Ipv4Addr::LOCALHOST, port, 0, fast_config())
        .expect("connect");
    client.send(b"bye soon").expect("send");

    let mut server = server.join().unwrap();

    client.close().expect("close");
    assert_eq!(client.state(), ConnState::Closed);
    assert!(matches!(client.send(b"too late"), Err(Error::InvalidState)));

    // Server notices the BYE on its next call and reaches Closed too.
    let trailing = server.recv(64).expect("recv after peer close");
    assert!(trailing.is_empty());
    assert_eq!(server.state(), ConnState::Closed);
}

/// Scenario 6: the peer never replies; the handshake exhausts its
/// retry bound and fails with `NoResponse`, leaving the socket
/// unopened. A silently-swallowing socket (rather than a genuinely
/// closed port) keeps the test deterministic — a closed loopback port
/// would instead surface as an immediate ICMP port-unreachable error.
#[test]
fn handshake_timeout_yields_no_response() {
    let black_hole = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let port = black_hole.local_addr().unwrap().port();
    thread::spawn(move || {
        let mut buf = [0u8; 64];
        loop {
            if black_hole.recv_from(&mut buf).is_err() {
                break;
            }
        }
    });

    let mut config = fast_config();
    config.retry_bound = 2;

    let result = RatStream::connect_with_config(Ipv4Addr::LOCALHOST, port, 0, config);
    assert!(matches!(result, Err(Error::NoResponse(_))));
}
