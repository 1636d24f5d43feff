//! Companion to `demos/server.rs`: connects, sends one message, reads
//! the echo back, and closes. Stands in for the out-of-scope
//! interactive client shell (spec.md §1).

use std::net::Ipv4Addr;

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let port: u16 = args.next().and_then(|s| s.parse().ok()).unwrap_or(1337);
    let message = args
        .next()
        .unwrap_or_else(|| "Make sure to drink your ovaltine.".to_string());

    let mut stream =
        rat::RatStream::connect(Ipv4Addr::LOCALHOST, port, 0).expect("failed to connect");
    println!(
        ">>> connected {} -> {}",
        stream.local_addr(),
        stream.remote_addr()
    );

    stream.send(message.as_bytes()).expect("send failed");

    let echo = stream.recv(64 * 1024).expect("recv failed");
    println!(">>> echoed back: {:?}", String::from_utf8_lossy(&echo));

    stream.close().expect("close failed");
}
