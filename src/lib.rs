//! RAT: a connection-oriented, reliable, ordered byte-stream transport
//! layered on UDP.
//!
//! The public surface is `RatListener` (passive open) and `RatStream`
//! (an established, or handshaking, connection), offering
//! `listen`/`accept`/`connect`/`send`/`recv`/`close` comparable to a
//! TCP socket. See `wire` for the on-the-wire segment format and
//! `state` for the connection state machine the rest of the crate is
//! built around.

mod config;
mod conn;
mod error;
mod handshake;
mod listener;
mod recv;
mod send;
mod socket;
mod state;
mod timers;
mod wire;

pub use config::RatConfig;
pub use error::Error;
pub use listener::RatListener;
pub use socket::RatStream;
pub use state::ConnState;
pub use wire::{Flags, Header, HEADER_LEN};

#[cfg(test)]
mod testutil;
#[cfg(test)]
mod integration_tests;
