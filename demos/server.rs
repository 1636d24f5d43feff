//! A minimal echo server exercising `RatListener`/`RatStream` end to
//! end. Stands in for the out-of-scope server command dispatcher
//! (spec.md §1): it accepts one connection at a time, echoes whatever
//! it receives, and closes.

use std::net::Ipv4Addr;

fn main() {
    env_logger::init();

    let port: u16 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1337);

    let listener =
        rat::RatListener::listen(Ipv4Addr::LOCALHOST, port, 5).expect("failed to bind listener");
    println!(">>> listening on {}", listener.local_addr());

    loop {
        let mut stream = match listener.accept() {
            Ok(s) => s,
            Err(e) => {
                eprintln!(">>> accept failed: {e}");
                continue;
            }
        };
        println!(">>> accepted connection from {}", stream.remote_addr());

        match stream.recv(64 * 1024) {
            Ok(bytes) => {
                println!(
                    ">>> received {} byte(s): {:?}",
                    bytes.len(),
                    String::from_utf8_lossy(&bytes)
                );
                if let Err(e) = stream.send(&bytes) {
                    eprintln!(">>> echo failed: {e}");
                }
            }
            Err(e) => eprintln!(">>> recv failed: {e}"),
        }

        if let Err(e) = stream.close() {
            eprintln!(">>> close failed: {e}");
        }
    }
}
