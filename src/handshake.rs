//! The three-way HLO/ACK open and the BYE/ACK tear-down, per spec.md §4.3.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use log::{debug, warn};
use rand::Rng;

use crate::config::RatConfig;
use crate::conn::{ConnCtx, RecvOutcome, Transport};
use crate::error::Error;
use crate::state::ConnState;
use crate::timers::Retry;
use crate::wire::{Flags, Header};

/// Picks a `stream_id` uniformly at random in `[1, 65535]`, per spec.md
/// §4.3 step 2. `taken` excludes ids already in use by other pending or
/// established connections on the same listener.
pub(crate) fn choose_stream_id(taken: impl Fn(u16) -> bool) -> u16 {
    let mut rng = rand::thread_rng();
    loop {
        let candidate = rng.gen_range(1..=u16::MAX);
        if !taken(candidate) {
            return candidate;
        }
    }
}

/// Active open: `RatStream::connect`'s handshake.
///
/// Binds a fresh `UdpSocket`, sends HLO, and waits for the responder's
/// HLO+ACK. On a reply timeout, rebinds the underlying datagram
/// endpoint and resends, per spec.md's explicit "On timeout the
/// initiator rebinds its underlying datagram endpoint, resends, and
/// decrements" — the original achieves the same by closing and
/// reopening its Python socket object on each retry.
pub fn connect(addr: Ipv4Addr, port: u16, local_port: u16, config: RatConfig) -> Result<ConnCtx, Error> {
    let remote = SocketAddrV4::new(addr, port);
    let mut retry = Retry::new(config.retry_bound);

    let hlo = Header {
        stream_id: 0,
        seq_num: 0,
        length: 0,
        flags: Flags::HLO,
        offset: 0,
    }
    .encode();

    loop {
        if !retry.attempt() {
            warn!("handshake with {remote} exhausted retries");
            return Err(Error::NoResponse(remote));
        }

        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, local_port))?;
        let local_addr = match socket.local_addr()? {
            std::net::SocketAddr::V4(a) => a,
            std::net::SocketAddr::V6(_) => unreachable!("bound to an IPv4 address"),
        };
        socket.connect(remote)?;
        socket.set_read_timeout(Some(config.reply_timeout))?;

        debug!("sending HLO to {remote} (HLOSENT)");
        socket.send(&hlo)?;

        let mut buf = [0u8; 64];
        let n = match socket.recv(&mut buf) {
            Ok(n) => n,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        // A malformed header is fatal to this call (spec.md §4.7); there is
        // no `ConnCtx` yet to fail, so the socket simply stays UNOPENED.
        let header = Header::decode(&buf[..n])?;

        if !header.flags.contains(Flags::HLO | Flags::ACK) {
            continue;
        }

        debug!("received HLO+ACK from {remote}, stream_id={}", header.stream_id);

        // Final leg: send the plain ACK and become ESTABLISHED.
        let ack = Header {
            stream_id: header.stream_id,
            seq_num: header.seq_num,
            length: 0,
            flags: Flags::ACK,
            offset: 0,
        }
        .encode();
        socket.send(&ack)?;

        return Ok(ConnCtx {
            state: ConnState::Established,
            stream_id: header.stream_id,
            seq_num: header.seq_num,
            window_size: config.default_window,
            obey_keepalives: true,
            local_addr,
            remote_addr: remote,
            config,
            transport: Transport::Owned(socket),
        });
    }
}

/// Passive open, responder side (`RatListener::accept`).
///
/// The listener's dispatch thread has already observed the initial HLO
/// and registered a routing channel under `stream_id` before calling
/// this; this function drives the remaining HLO+ACK / ACK exchange
/// described in spec.md §4.3 steps 2-4.
pub(crate) fn accept_from_hlo(
    socket: Arc<UdpSocket>,
    inbox: Receiver<Vec<u8>>,
    remote_addr: SocketAddrV4,
    local_addr: SocketAddrV4,
    stream_id: u16,
    config: RatConfig,
) -> Result<ConnCtx, Error> {
    let mut ctx = ConnCtx {
        state: ConnState::HloRecv,
        stream_id,
        seq_num: 1,
        window_size: config.default_window,
        obey_keepalives: true,
        local_addr,
        remote_addr,
        config,
        transport: Transport::Routed { socket, inbox },
    };

    let mut retry = Retry::new(ctx.config.retry_bound);
    loop {
        if !retry.attempt() {
            warn!("handshake with {remote_addr} exhausted retries (HLORECV)");
            return Err(Error::NoResponse(remote_addr));
        }

        debug!("sending HLO+ACK to {remote_addr}, stream_id={stream_id}");
        ctx.send_control(Flags::HLO | Flags::ACK)?;

        match ctx.recv_raw(Some(ctx.config.reply_timeout))? {
            RecvOutcome::TimedOut => continue,
            RecvOutcome::Segment(bytes) => {
                if bytes.len() < crate::wire::HEADER_LEN {
                    continue;
                }
                let header = match Header::decode(&bytes[..crate::wire::HEADER_LEN]) {
                    Ok(h) => h,
                    Err(e) => {
                        ctx.fail();
                        return Err(e);
                    }
                };
                if header.stream_id != stream_id || !header.flags.contains(Flags::ACK) {
                    continue;
                }

                debug!("received final ACK from {remote_addr}; connection established");
                ctx.state = ConnState::Established;
                return Ok(ctx);
            }
        }
    }
}

/// Active close (spec.md §4.3 "Tear-down"). Always leaves `ctx.state`
/// at `Closed`, whether or not the peer's BYE+ACK ever arrives, mirroring
/// `original_source/rat.py`'s `close()`, which treats a BYE-timeout as
/// an unremarkable, silent path to the same terminal state.
pub fn active_close(ctx: &mut ConnCtx) -> Result<(), Error> {
    ctx.state.require(&[ConnState::Established])?;

    let mut retry = Retry::new(ctx.config.retry_bound);
    ctx.state = ConnState::ByeSent;
    while retry.attempt() {
        if ctx.send_control(Flags::BYE).is_ok() {
            break;
        }
    }
    debug!("sent BYE to {} (BYESENT)", ctx.remote_addr);

    match ctx.recv_raw(Some(ctx.config.bye_timeout)) {
        Ok(RecvOutcome::Segment(bytes)) if bytes.len() >= crate::wire::HEADER_LEN => {
            if let Ok(header) = Header::decode(&bytes[..crate::wire::HEADER_LEN]) {
                if header.flags.contains(Flags::BYE | Flags::ACK) {
                    debug!("received BYE+ACK from {}", ctx.remote_addr);
                    let _ = ctx.send_control(Flags::ACK);
                }
            }
        }
        _ => {
            debug!("BYE timeout waiting on {}; closing anyway", ctx.remote_addr);
        }
    }

    ctx.state = ConnState::Closed;
    Ok(())
}

/// Passive close: called by the send/receive paths when they observe
/// an incoming BYE mid-stream (spec.md §4.3, "Passive closer").
pub(crate) fn passive_close(ctx: &mut ConnCtx) {
    ctx.state = ConnState::ByeRecv;
    debug!("received BYE from {}; replying BYE+ACK (BYERECV)", ctx.remote_addr);
    let _ = ctx.send_control(Flags::BYE | Flags::ACK);

    match ctx.recv_raw(Some(ctx.config.bye_timeout)) {
        Ok(RecvOutcome::Segment(bytes)) if bytes.len() >= crate::wire::HEADER_LEN => {
            if let Ok(header) = Header::decode(&bytes[..crate::wire::HEADER_LEN]) {
                if header.flags.contains(Flags::ACK) {
                    debug!("received final ACK from {}", ctx.remote_addr);
                }
            }
        }
        _ => {}
    }

    ctx.state = ConnState::Closed;
}
