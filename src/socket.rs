//! The public socket façade: `RatStream`, an established (or
//! handshaking) RAT connection. See `src/listener.rs` for the
//! corresponding `RatListener`.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::config::RatConfig;
use crate::conn::ConnCtx;
use crate::error::Error;
use crate::handshake;
use crate::send;
use crate::recv;

/// One established RAT connection, returned by `RatStream::connect` or
/// `RatListener::accept`.
pub struct RatStream {
    pub(crate) ctx: ConnCtx,
}

impl RatStream {
    /// Wraps an already-established context, used by `RatListener`'s
    /// dispatch thread once a handshake worker completes.
    pub(crate) fn from_ctx(ctx: ConnCtx) -> Self {
        RatStream { ctx }
    }

    /// Actively opens a connection to `addr:port`, per spec.md §4.3.
    /// `local_port` of `0` lets the OS choose an ephemeral port.
    pub fn connect(addr: Ipv4Addr, port: u16, local_port: u16) -> Result<Self, Error> {
        Self::connect_with_config(addr, port, local_port, RatConfig::default())
    }

    pub fn connect_with_config(
        addr: Ipv4Addr,
        port: u16,
        local_port: u16,
        config: RatConfig,
    ) -> Result<Self, Error> {
        let ctx = handshake::connect(addr, port, local_port, config)?;
        Ok(RatStream { ctx })
    }

    /// Sends `bytes`, returning once every segment is acknowledged or a
    /// tear-down is observed (spec.md §4.4).
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        send::send(&mut self.ctx, bytes)
    }

    /// Reads until a stream-terminating segment is observed (spec.md §4.5).
    pub fn recv(&mut self, max_bytes: usize) -> Result<Vec<u8>, Error> {
        recv::recv(&mut self.ctx, max_bytes)
    }

    /// Proposes a new window size to the peer (spec.md §4.6).
    pub fn set_window(&mut self, window_size: u16) -> Result<(), Error> {
        send::set_window(&mut self.ctx, window_size)
    }

    /// Initiates tear-down; terminal (spec.md §4.3).
    pub fn close(&mut self) -> Result<(), Error> {
        handshake::active_close(&mut self.ctx)
    }

    /// Directs the socket to follow or ignore keep-alive messages.
    ///
    /// The ALI flag is reserved on the wire but, per spec.md §9, never
    /// exercised by the original implementation; this flag is likewise
    /// inert here and only recorded for parity with the original API.
    pub fn allow_keepalives(&mut self, value: bool) {
        self.ctx.obey_keepalives = value;
    }

    pub fn local_addr(&self) -> SocketAddrV4 {
        self.ctx.local_addr
    }

    pub fn remote_addr(&self) -> SocketAddrV4 {
        self.ctx.remote_addr
    }

    pub fn state(&self) -> crate::state::ConnState {
        self.ctx.state
    }

    pub fn stream_id(&self) -> u16 {
        self.ctx.stream_id
    }
}
