//! Segmentation and window emission, per spec.md §4.4.

use std::collections::HashSet;

use log::debug;

use crate::conn::{ConnCtx, RecvOutcome};
use crate::error::Error;
use crate::handshake;
use crate::state::ConnState;
use crate::timers::Retry;
use crate::wire::{decode_aux_words, Flags, Header, HEADER_LEN};

/// Splits `bytes` into consecutively numbered segments of at most
/// `ConnCtx::config.payload_mtu` bytes, assigns each the next
/// `seq_num`, and advances `ctx.seq_num` past them. The last segment
/// of the call is marked with the ACK flag as a stream delimiter (not
/// a protocol acknowledgement) — spec.md §4.4, "the last segment of a
/// send call carries the ACK flag to mark end-of-application-write".
fn segment<'a>(ctx: &mut ConnCtx, bytes: &'a [u8]) -> Vec<(u16, &'a [u8])> {
    let mtu = ctx.config.payload_mtu.max(1);
    let chunks: Vec<&[u8]> = if bytes.is_empty() {
        vec![&bytes[0..0]]
    } else {
        bytes.chunks(mtu).collect()
    };

    chunks
        .into_iter()
        .map(|chunk| {
            let seq = ctx.seq_num;
            ctx.seq_num = ctx.seq_num.wrapping_add(1);
            (seq, chunk)
        })
        .collect()
}

fn emit_window(
    ctx: &ConnCtx,
    window: &[(u16, &[u8])],
    last_seq: u16,
    windows_elapsed: u16,
) -> Result<(), Error> {
    for &(seq, chunk) in window {
        let flags = if seq == last_seq {
            Flags::ACK
        } else {
            Flags::empty()
        };
        let wire_seq = seq.wrapping_add(windows_elapsed);
        ctx.send_segment_with_seq(wire_seq, flags, 0, chunk)?;
    }
    Ok(())
}

/// Sends `bytes` to the peer, returning once every segment has been
/// acknowledged or a tear-down was observed mid-send.
pub fn send(ctx: &mut ConnCtx, bytes: &[u8]) -> Result<(), Error> {
    ctx.state.require(&[ConnState::Established])?;

    let segments = segment(ctx, bytes);
    let last_seq = segments.last().map(|&(seq, _)| seq).unwrap_or(0);
    let mut pending = segments;
    let mut windows_elapsed: u16 = 0;

    while !pending.is_empty() {
        let window_len = (ctx.window_size as usize).clamp(1, pending.len().max(1)).min(pending.len());
        let window: Vec<(u16, &[u8])> = pending[..window_len].to_vec();

        emit_window(ctx, &window, last_seq, windows_elapsed)?;
        debug!(
            "emitted window of {} segment(s) to {} (windows_elapsed={windows_elapsed})",
            window.len(),
            ctx.remote_addr
        );

        let mut retry = Retry::new(ctx.config.retry_bound);
        let advance = 'wait: loop {
            if !retry.attempt() {
                ctx.fail();
                return Err(Error::NoResponse(ctx.remote_addr));
            }

            match ctx.recv_raw(Some(ctx.config.reply_timeout))? {
                RecvOutcome::TimedOut => {
                    emit_window(ctx, &window, last_seq, windows_elapsed)?;
                    continue;
                }
                RecvOutcome::Segment(bytes) => {
                    if bytes.len() < HEADER_LEN {
                        continue;
                    }
                    let header = match Header::decode(&bytes[..HEADER_LEN]) {
                        Ok(h) => h,
                        Err(e) => {
                            ctx.fail();
                            return Err(e);
                        }
                    };
                    if !ctx.integrity_check(&header) {
                        // Mis-stream datagram: not ours, never NACKed (invariant 4).
                        continue;
                    }

                    if header.flags.contains(Flags::BYE) {
                        debug!("peer {} initiated tear-down mid-send", ctx.remote_addr);
                        handshake::passive_close(ctx);
                        return Ok(());
                    } else if header.flags.contains(Flags::NACK) {
                        let words = decode_aux_words(&bytes[HEADER_LEN..])?;
                        let nacked: HashSet<u16> = words.into_iter().collect();

                        for &(seq, chunk) in &window {
                            let wire_seq = seq.wrapping_add(windows_elapsed);
                            if nacked.contains(&wire_seq) {
                                let flags = if seq == last_seq {
                                    Flags::ACK
                                } else {
                                    Flags::empty()
                                };
                                ctx.send_segment_with_seq(wire_seq, flags, 0, chunk)?;
                            }
                        }
                        continue 'wait;
                    } else if header.flags.contains(Flags::SWIN) {
                        let words = decode_aux_words(&bytes[HEADER_LEN..])?;
                        if let Some(&new_window) = words.first() {
                            debug!("peer requested window size {new_window}");
                            ctx.window_size = new_window;
                        }
                        ctx.send_control(Flags::ACK)?;
                        break 'wait true;
                    } else if header.flags.contains(Flags::ACK) {
                        break 'wait true;
                    } else {
                        continue;
                    }
                }
            }
        };

        if advance {
            windows_elapsed = windows_elapsed.wrapping_add(1);
            pending.drain(..window_len);
        }
    }

    Ok(())
}

/// Proposes a new window size to the peer, per spec.md §4.6. Applies
/// locally only once the peer ACKs it.
pub fn set_window(ctx: &mut ConnCtx, new_size: u16) -> Result<(), Error> {
    ctx.state.require(&[ConnState::Established])?;

    let payload = crate::wire::encode_aux_words(&[new_size]);
    let mut retry = Retry::new(ctx.config.retry_bound);

    loop {
        if !retry.attempt() {
            ctx.fail();
            return Err(Error::NoResponse(ctx.remote_addr));
        }

        ctx.send_segment(Flags::SWIN, 1, &payload)?;
        debug!("sent SWIN({new_size}) to {}", ctx.remote_addr);
        ctx.seq_num = ctx.seq_num.wrapping_add(1);

        match ctx.recv_raw(Some(ctx.config.reply_timeout))? {
            RecvOutcome::TimedOut => continue,
            RecvOutcome::Segment(bytes) => {
                if bytes.len() < HEADER_LEN {
                    continue;
                }
                let header = match Header::decode(&bytes[..HEADER_LEN]) {
                    Ok(h) => h,
                    Err(e) => {
                        ctx.fail();
                        return Err(e);
                    }
                };
                if !ctx.integrity_check(&header) {
                    continue;
                }
                if header.flags.contains(Flags::ACK) {
                    ctx.window_size = new_size;
                    return Ok(());
                }
            }
        }
    }
}
