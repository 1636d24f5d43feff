//! Tunable defaults for a RAT connection.
//!
//! The original implementation hard-codes these as module-level
//! constants (`RAT_PAYLOAD_SIZE`, `RAT_DEFAULT_WINDOW`,
//! `RAT_REPLY_TIMEOUT`, `RAT_BYE_TIMEOUT`, `RAT_RETRY_TIMES`). Bundling
//! them here lets a caller override them per socket — most usefully,
//! tests that want short timeouts — without touching global state.

use std::time::Duration;

/// Default payload MTU in bytes (spec.md §6).
pub const DEFAULT_PAYLOAD_MTU: usize = 512;
/// Default send/receive window, in segments.
pub const DEFAULT_WINDOW: u16 = 5;
/// Default reply timeout for handshake and window-ACK waits.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(4);
/// Default bounded retry count for handshake and window emission.
pub const DEFAULT_RETRY_BOUND: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatConfig {
    pub payload_mtu: usize,
    pub default_window: u16,
    pub reply_timeout: Duration,
    pub bye_timeout: Duration,
    pub retry_bound: u32,
}

impl Default for RatConfig {
    fn default() -> Self {
        RatConfig {
            payload_mtu: DEFAULT_PAYLOAD_MTU,
            default_window: DEFAULT_WINDOW,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            bye_timeout: DEFAULT_REPLY_TIMEOUT / 4,
            retry_bound: DEFAULT_RETRY_BOUND,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bye_timeout_defaults_to_a_quarter_of_reply_timeout() {
        let cfg = RatConfig::default();
        assert_eq!(cfg.bye_timeout, cfg.reply_timeout / 4);
    }
}
