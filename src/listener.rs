//! `RatListener`: the passive-open half of the socket façade.
//!
//! Mirrors the teacher's `TcpListener`/dispatch-thread split: one
//! thread owns the bound `UdpSocket` and demultiplexes every incoming
//! datagram either to an established connection's routing channel (by
//! `stream_id`) or, for a fresh HLO, into a brand-new handshake worker
//! thread. `accept()` just drains the channel of handshakes that
//! finished. This is the "message passing from the listener to worker
//! tasks rather than shared mutable lists" design note from spec.md §9.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, warn};

use crate::config::RatConfig;
use crate::error::Error;
use crate::handshake;
use crate::socket::RatStream;
use crate::wire::{Flags, Header, HEADER_LEN};

type RouteTable = Arc<Mutex<HashMap<u16, SyncSender<Vec<u8>>>>>;

/// A RAT socket in `SERVOPEN`, accepting inbound connections.
pub struct RatListener {
    local_addr: SocketAddrV4,
    accepted_rx: Mutex<Receiver<RatStream>>,
    _dispatch: thread::JoinHandle<()>,
}

impl RatListener {
    /// Binds `addr:port` and starts accepting. `backlog` bounds how many
    /// completed-but-unaccepted handshakes may queue up before the
    /// dispatch thread starts blocking on a full channel.
    pub fn listen(addr: Ipv4Addr, port: u16, backlog: u32) -> Result<Self, Error> {
        Self::listen_with_config(addr, port, backlog, RatConfig::default())
    }

    pub fn listen_with_config(
        addr: Ipv4Addr,
        port: u16,
        backlog: u32,
        config: RatConfig,
    ) -> Result<Self, Error> {
        let socket = Arc::new(UdpSocket::bind(SocketAddrV4::new(addr, port))?);
        let local_addr = match socket.local_addr()? {
            SocketAddr::V4(a) => a,
            SocketAddr::V6(_) => unreachable!("bound to an IPv4 address"),
        };

        let routes: RouteTable = Arc::new(Mutex::new(HashMap::new()));
        let (accepted_tx, accepted_rx) = mpsc::sync_channel(backlog.max(1) as usize);

        debug!("listening on {local_addr} (SERVOPEN, backlog={backlog})");

        let dispatch = {
            let socket = socket.clone();
            let routes = routes.clone();
            thread::spawn(move || dispatch_loop(socket, routes, accepted_tx, local_addr, config))
        };

        Ok(RatListener {
            local_addr,
            accepted_rx: Mutex::new(accepted_rx),
            _dispatch: dispatch,
        })
    }

    /// Blocks until a client completes the three-way open, returning its
    /// established `RatStream` (spec.md §5: "that call blocks indefinitely").
    pub fn accept(&self) -> Result<RatStream, Error> {
        let rx = self.accepted_rx.lock().unwrap();
        rx.recv().map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "listener dispatch thread has shut down",
            ))
        })
    }

    pub fn local_addr(&self) -> SocketAddrV4 {
        self.local_addr
    }
}

/// Runs forever: reads one datagram at a time from the listening
/// socket, routes it to an established connection's inbox, or spawns a
/// handshake worker for a fresh HLO. Never produces an `Err` back to a
/// caller — malformed or misdirected datagrams are dropped, per
/// spec.md §4.7 ("Mis-stream segment: silently discarded").
fn dispatch_loop(
    socket: Arc<UdpSocket>,
    routes: RouteTable,
    accepted_tx: SyncSender<RatStream>,
    local_addr: SocketAddrV4,
    config: RatConfig,
) {
    let mut buf = [0u8; 65536];
    loop {
        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(e) => {
                warn!("listener recv_from failed: {e}");
                continue;
            }
        };
        let from = match from {
            SocketAddr::V4(a) => a,
            SocketAddr::V6(_) => continue,
        };

        if n < HEADER_LEN {
            continue;
        }
        let bytes = buf[..n].to_vec();
        let header = match Header::decode(&bytes[..HEADER_LEN]) {
            Ok(h) => h,
            Err(_) => continue,
        };

        let mut guard = routes.lock().unwrap();
        if let Some(tx) = guard.get(&header.stream_id) {
            let _ = tx.try_send(bytes);
            continue;
        }

        if header.stream_id != 0 || !header.flags.contains(Flags::HLO) {
            // Neither a known stream nor a fresh open: not ours.
            continue;
        }

        let stream_id = handshake::choose_stream_id(|c| guard.contains_key(&c));
        let (inbox_tx, inbox_rx) = mpsc::sync_channel(config.default_window as usize * 4 + 4);
        guard.insert(stream_id, inbox_tx);
        drop(guard);

        debug!("HLO from {from}; spawning handshake worker for stream_id={stream_id}");

        let socket = socket.clone();
        let routes = routes.clone();
        let accepted_tx = accepted_tx.clone();
        thread::spawn(move || {
            match handshake::accept_from_hlo(socket, inbox_rx, from, local_addr, stream_id, config)
            {
                Ok(ctx) => {
                    if accepted_tx.try_send(RatStream::from_ctx(ctx)).is_err() {
                        warn!("accept backlog full; dropping completed handshake for stream_id={stream_id}");
                        routes.lock().unwrap().remove(&stream_id);
                    }
                }
                Err(e) => {
                    warn!("handshake for stream_id={stream_id} failed: {e}");
                    routes.lock().unwrap().remove(&stream_id);
                }
            }
        });
    }
}
