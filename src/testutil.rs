//! Test-only loss-injecting UDP relay.
//!
//! Stands between a `RatStream` client and a `RatListener` server the
//! way the out-of-scope network emulator does for the real system
//! (spec.md §1), narrowed to exactly what the NACK-retransmission test
//! needs: drop one client->server segment, by `seq_num`, exactly once.
//! Production code is untouched; this is a pure test harness.

use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::wire::{Header, HEADER_LEN};

pub(crate) struct LossyRelay {
    pub front_addr: SocketAddrV4,
}

impl LossyRelay {
    /// Spawns forwarding threads in both directions between whoever
    /// connects to `front_addr` and `server_addr`, dropping the first
    /// forwarded segment whose `seq_num == drop_seq`.
    pub(crate) fn spawn(server_addr: SocketAddrV4, drop_seq: u16) -> Self {
        let front = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let back = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let front_addr = as_v4(front.local_addr().unwrap());

        let last_client: Arc<Mutex<Option<SocketAddrV4>>> = Arc::new(Mutex::new(None));
        let dropped = Arc::new(AtomicBool::new(false));

        {
            let front = front.clone();
            let back = back.clone();
            let last_client = last_client.clone();
            let dropped = dropped.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 65536];
                loop {
                    let (n, from) = match front.recv_from(&mut buf) {
                        Ok(v) => v,
                        Err(_) => break,
                    };
                    let Some(from) = as_v4_opt(from) else {
                        continue;
                    };
                    *last_client.lock().unwrap() = Some(from);

                    if n >= HEADER_LEN {
                        if let Ok(header) = Header::decode(&buf[..HEADER_LEN]) {
                            if header.seq_num == drop_seq
                                && dropped
                                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                                    .is_ok()
                            {
                                continue;
                            }
                        }
                    }

                    let _ = back.send_to(&buf[..n], server_addr);
                }
            });
        }

        {
            let front = front;
            let back = back;
            let last_client = last_client;
            thread::spawn(move || {
                let mut buf = [0u8; 65536];
                loop {
                    let (n, _) = match back.recv_from(&mut buf) {
                        Ok(v) => v,
                        Err(_) => break,
                    };
                    if let Some(client) = *last_client.lock().unwrap() {
                        let _ = front.send_to(&buf[..n], client);
                    }
                }
            });
        }

        LossyRelay { front_addr }
    }
}

fn as_v4(addr: SocketAddr) -> SocketAddrV4 {
    match addr {
        SocketAddr::V4(a) => a,
        SocketAddr::V6(_) => unreachable!("loopback relay sockets are always IPv4"),
    }
}

fn as_v4_opt(addr: SocketAddr) -> Option<SocketAddrV4> {
    match addr {
        SocketAddr::V4(a) => Some(a),
        SocketAddr::V6(_) => None,
    }
}
