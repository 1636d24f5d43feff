//! The RAT connection state machine.
//!
//! Gates every public operation against a permitted-state set; a call
//! from a disallowed state fails with `Error::InvalidState` and leaves
//! the socket otherwise unchanged. See spec.md §4.2 for the full
//! transition table this enum implements.

use crate::error::Error;

/// One of the eight connection states a RAT socket can be in.
///
/// The enumeration is a closed set by construction: `state_check`
/// below is a compile-time-checked match rather than the original's
/// runtime string comparison against `State.SOCK_*` members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnState {
    Unopened,
    ServOpen,
    HloSent,
    HloRecv,
    Established,
    ByeSent,
    ByeRecv,
    Closed,
}

impl ConnState {
    /// Returns `Ok(())` if `self` is one of `allowed`, else `Error::InvalidState`.
    pub fn require(self, allowed: &[ConnState]) -> Result<(), Error> {
        if allowed.contains(&self) {
            Ok(())
        } else {
            Err(Error::InvalidState)
        }
    }

    /// Once `Closed`, a socket never transitions again (spec.md invariant
    /// / testable property "state monotonicity").
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_state_passes() {
        assert!(ConnState::Established
            .require(&[ConnState::Established, ConnState::ByeSent])
            .is_ok());
    }

    #[test]
    fn disallowed_state_is_invalid_state_error() {
        let err = ConnState::Unopened.require(&[ConnState::Established]);
        assert!(matches!(err, Err(Error::InvalidState)));
    }

    #[test]
    fn closed_is_terminal() {
        assert!(ConnState::Closed.is_terminal());
        assert!(!ConnState::Established.is_terminal());
    }
}
