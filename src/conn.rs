//! Per-connection mutable context: the glue the wire codec, state
//! machine, handshake driver, and send/receive paths all operate on.
//!
//! This plays the role the teacher's `TCB` plays for a raw TCP
//! connection, narrowed to what RAT's stop-and-wait window protocol
//! needs: no retransmission queue of in-flight byte ranges, no
//! congestion window, just the handful of fields spec.md §3 names
//! ("Per-socket state").

use std::net::{SocketAddrV4, UdpSocket};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use crate::config::RatConfig;
use crate::error::Error;
use crate::state::ConnState;
use crate::wire::{Flags, Header, HEADER_LEN};

/// How a connection's datagrams reach the network.
///
/// A client created via `connect()` owns its `UdpSocket` outright. A
/// connection accepted on a listening socket shares the listener's
/// bound socket for sending, and receives its datagrams pre-routed
/// through a channel fed by the listener's dispatch thread (see
/// `src/listener.rs`) — the "or its own flow on a shared one keyed by
/// `stream_id`" alternative spec.md §5 allows.
pub(crate) enum Transport {
    Owned(UdpSocket),
    Routed {
        socket: Arc<UdpSocket>,
        inbox: Receiver<Vec<u8>>,
    },
}

/// The result of one raw-datagram read attempt.
pub(crate) enum RecvOutcome {
    Segment(Vec<u8>),
    TimedOut,
}

impl Transport {
    pub(crate) fn send(&self, buf: &[u8], to: SocketAddrV4) -> Result<(), Error> {
        let socket = match self {
            Transport::Owned(s) => s,
            Transport::Routed { socket, .. } => socket.as_ref(),
        };
        socket.send_to(buf, to)?;
        Ok(())
    }

    /// Reads one datagram, waiting at most `timeout` (or indefinitely
    /// if `None`). `RatListener`'s HLO wait blocks indefinitely on its
    /// own raw socket directly, before any `ConnCtx`/`Transport` exists
    /// for the connection, so in practice every call site here passes
    /// `Some`; the `None` branch is kept for API completeness.
    pub(crate) fn recv(&self, timeout: Option<Duration>) -> Result<RecvOutcome, Error> {
        match self {
            Transport::Owned(socket) => {
                socket.set_read_timeout(timeout)?;
                let mut buf = [0u8; 65536];
                match socket.recv_from(&mut buf) {
                    Ok((n, _)) => Ok(RecvOutcome::Segment(buf[..n].to_vec())),
                    Err(e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        Ok(RecvOutcome::TimedOut)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Transport::Routed { inbox, .. } => match timeout {
                Some(d) => match inbox.recv_timeout(d) {
                    Ok(bytes) => Ok(RecvOutcome::Segment(bytes)),
                    Err(RecvTimeoutError::Timeout) => Ok(RecvOutcome::TimedOut),
                    Err(RecvTimeoutError::Disconnected) => Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionAborted,
                        "listener dispatch thread has shut down",
                    ))),
                },
                None => inbox.recv().map(RecvOutcome::Segment).map_err(|_| {
                    Error::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionAborted,
                        "listener dispatch thread has shut down",
                    ))
                }),
            },
        }
    }
}

/// Per-connection state: spec.md §3 "Per-socket state" plus the
/// transport it rides on.
pub struct ConnCtx {
    pub state: ConnState,
    pub stream_id: u16,
    pub seq_num: u16,
    pub window_size: u16,
    pub obey_keepalives: bool,
    pub local_addr: SocketAddrV4,
    pub remote_addr: SocketAddrV4,
    pub config: RatConfig,
    pub(crate) transport: Transport,
}

impl ConnCtx {
    /// Sends a header-only control segment (HLO/ACK/BYE/etc, no payload).
    pub fn send_control(&self, flags: Flags) -> Result<(), Error> {
        self.send_segment(flags, 0, &[])
    }

    /// Sends one segment with the given flags, auxiliary `offset` count,
    /// and payload bytes (already including any auxiliary word payload).
    pub fn send_segment(&self, flags: Flags, offset: u8, payload: &[u8]) -> Result<(), Error> {
        if payload.len() > u16::MAX as usize {
            return Err(Error::NumberOutOfRange {
                value: payload.len() as u32,
                bits: 16,
            });
        }
        let header = Header {
            stream_id: self.stream_id,
            seq_num: self.seq_num,
            length: payload.len() as u16,
            flags,
            offset,
        };
        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(payload);
        self.transport.send(&buf, self.remote_addr)
    }

    /// Sends a segment carrying an explicit `seq_num` override, used by
    /// the send path when retransmitting a NACKed segment with a
    /// windows-elapsed-shifted sequence number (spec.md §4.4 point 4).
    pub fn send_segment_with_seq(
        &self,
        seq_num: u16,
        flags: Flags,
        offset: u8,
        payload: &[u8],
    ) -> Result<(), Error> {
        let header = Header {
            stream_id: self.stream_id,
            seq_num,
            length: payload.len() as u16,
            flags,
            offset,
        };
        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(payload);
        self.transport.send(&buf, self.remote_addr)
    }

    pub(crate) fn recv_raw(&self, timeout: Option<Duration>) -> Result<RecvOutcome, Error> {
        self.transport.recv(timeout)
    }

    /// Drops the connection to `Closed` on any unrecoverable error, per
    /// spec.md §7's recovery policy ("all other kinds propagate to the
    /// caller and move the socket toward CLOSED").
    pub fn fail(&mut self) {
        self.state = ConnState::Closed;
    }

    /// A segment belongs to this connection only if its `stream_id`
    /// matches (spec.md invariant 1 / "Integrity check").
    pub fn integrity_check(&self, header: &Header) -> bool {
        header.stream_id == self.stream_id
    }
}
