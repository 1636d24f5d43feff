//! Datagram ingestion, integrity filtering, reorder buffer, and
//! ACK/NACK emission, per spec.md §4.5.

use std::collections::{BTreeMap, HashSet};

use log::{debug, warn};

use crate::conn::{ConnCtx, RecvOutcome};
use crate::error::Error;
use crate::handshake;
use crate::state::ConnState;
use crate::timers::Retry;
use crate::wire::{decode_aux_words, encode_aux_words, Flags, Header, HEADER_LEN};

/// Reads from the peer until a stream-terminating segment (ACK-marked
/// last segment, or BYE) is observed, reassembling accepted payload
/// fragments in ascending sequence order.
pub fn recv(ctx: &mut ConnCtx, max_bytes: usize) -> Result<Vec<u8>, Error> {
    ctx.state
        .require(&[ConnState::Established, ConnState::ByeSent, ConnState::ByeRecv])?;

    let mut recv_queue: BTreeMap<u16, Vec<u8>> = BTreeMap::new();
    let mut nack_set: HashSet<u16> = HashSet::new();
    let mut out_of_order: HashSet<u16> = HashSet::new();
    let mut total_bytes: usize = 0;
    let mut more_to_send = true;
    let mut window_budget = ctx.window_size;
    // Bounds the read-timeout loop so a permanently silent peer still
    // terminates the call (the original's equivalent loop has no such
    // bound; see SPEC_FULL.md §4 for the rationale).
    let mut timeout_retry = Retry::new(ctx.config.retry_bound);

    while more_to_send {
        let datagram = match ctx.recv_raw(Some(ctx.config.reply_timeout))? {
            RecvOutcome::Segment(bytes) => {
                timeout_retry = Retry::new(ctx.config.retry_bound);
                bytes
            }
            RecvOutcome::TimedOut => {
                if !timeout_retry.attempt() {
                    ctx.fail();
                    return Err(Error::NoResponse(ctx.remote_addr));
                }
                nack_set.insert(ctx.seq_num);
                Vec::new()
            }
        };

        let mut rest = &datagram[..];
        while !rest.is_empty() {
            if rest.len() < HEADER_LEN {
                break;
            }
            let header = match Header::decode(&rest[..HEADER_LEN]) {
                Ok(h) => h,
                Err(e) => {
                    ctx.fail();
                    return Err(e);
                }
            };
            let payload_end = HEADER_LEN + header.length as usize;
            if rest.len() < payload_end {
                break;
            }
            let payload = &rest[HEADER_LEN..payload_end];

            if !ctx.integrity_check(&header) {
                // Not ours: never influences reassembly, never NACKed (invariant 4).
                rest = &rest[payload_end..];
                continue;
            }

            debug!("received segment #{} from {}", header.seq_num, ctx.remote_addr);

            if header.flags.contains(Flags::SWIN) {
                let words = decode_aux_words(payload)?;
                if let Some(&w) = words.first() {
                    debug!("applying peer-requested window size {w}");
                    ctx.window_size = w;
                }
                ctx.send_control(Flags::ACK)?;
                ctx.seq_num = ctx.seq_num.wrapping_add(1);
            } else if header.flags.contains(Flags::BYE) {
                debug!("received BYE from {} mid-recv", ctx.remote_addr);
                handshake::passive_close(ctx);
                return Ok(Vec::new());
            } else {
                if total_bytes + payload.len() > max_bytes {
                    warn!(
                        "segment #{} would overflow the {max_bytes}-byte receive buffer; NACKing",
                        header.seq_num
                    );
                    nack_set.insert(header.seq_num);
                } else {
                    accept_segment(ctx, &mut recv_queue, &mut out_of_order, header.seq_num, payload);
                    total_bytes += payload.len();
                }

                if header.flags.contains(Flags::ACK) {
                    more_to_send = false;
                }
            }

            window_budget = window_budget.saturating_sub(1);
            rest = &rest[payload_end..];
        }

        if !more_to_send || window_budget == 0 {
            let mut missing: Vec<u16> = nack_set.union(&out_of_order).copied().collect();
            missing.sort_unstable();

            if !missing.is_empty() {
                send_nack(ctx, &missing)?;
                nack_set.clear();
                more_to_send = true;
            } else {
                ctx.send_control(Flags::ACK)?;
                ctx.seq_num = ctx.seq_num.wrapping_add(1);
            }
            window_budget = ctx.window_size;
        }
    }

    let mut output = Vec::with_capacity(total_bytes);
    for (_, bytes) in recv_queue {
        output.extend(bytes);
    }
    Ok(output)
}

/// Sequence accounting for one accepted data segment, per spec.md §4.5
/// step 3: exact match advances `expected` by one; arriving ahead
/// records every skipped number as out-of-order; a number previously
/// recorded out-of-order is cleared once it finally arrives.
fn accept_segment(
    ctx: &mut ConnCtx,
    recv_queue: &mut BTreeMap<u16, Vec<u8>>,
    out_of_order: &mut HashSet<u16>,
    seq_num: u16,
    payload: &[u8],
) {
    if seq_num == ctx.seq_num {
        ctx.seq_num = ctx.seq_num.wrapping_add(1);
    } else if out_of_order.remove(&seq_num) {
        // A previously-missing segment has now arrived; expected pointer unchanged.
    } else {
        let mut s = ctx.seq_num;
        while s != seq_num {
            out_of_order.insert(s);
            s = s.wrapping_add(1);
        }
        ctx.seq_num = seq_num.wrapping_add(1);
    }
    recv_queue.insert(seq_num, payload.to_vec());
}

fn send_nack(ctx: &mut ConnCtx, missing: &[u16]) -> Result<(), Error> {
    debug!("sending NACK for {} segment(s)", missing.len());
    let payload = encode_aux_words(missing);
    let offset = missing.len().min(u8::MAX as usize) as u8;
    ctx.send_segment(Flags::NACK, offset, &payload)?;
    ctx.seq_num = ctx.seq_num.wrapping_add(1);
    Ok(())
}
