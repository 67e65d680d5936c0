//! Pure call lifecycle rules.
//!
//! `Ringing → Connecting → Active → Ended`, with `Declined`/`Missed`
//! ordinarily reachable only from `Ringing`.  The backend watchdog may
//! write a terminal status at any moment (stale ringing rows become
//! missed, dead active rows become ended), so a terminal transition is
//! accepted from every non-terminal state; the caller tears down the same
//! way regardless.  Anything else out of order is ignored.

use huddle_types::CallStatus;

/// What a status notification means for the local side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The call entered a new status.  `needs_media` is set on the one
    /// transition (entry to `Active`) that triggers microphone acquisition
    /// and peer-connection setup.
    Entered {
        status: CallStatus,
        needs_media: bool,
    },
    /// Out-of-order or duplicate notification; nothing to do.
    Ignored,
}

#[derive(Clone, Debug)]
pub struct CallLifecycle {
    status: CallStatus,
    /// Only the initiator creates the offer once media is ready.
    is_initiator: bool,
}

impl CallLifecycle {
    pub fn new(is_initiator: bool) -> Self {
        Self {
            status: CallStatus::Ringing,
            is_initiator,
        }
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn is_initiator(&self) -> bool {
        self.is_initiator
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn rank(status: CallStatus) -> u8 {
        match status {
            CallStatus::Ringing => 0,
            CallStatus::Connecting => 1,
            CallStatus::Active => 2,
            CallStatus::Declined | CallStatus::Missed | CallStatus::Ended => 3,
        }
    }

    /// Folds in a status notification, from this client or the backend.
    pub fn apply(&mut self, next: CallStatus) -> Applied {
        if self.status.is_terminal() {
            return Applied::Ignored;
        }
        if next == self.status {
            return Applied::Ignored;
        }
        if !next.is_terminal() && Self::rank(next) <= Self::rank(self.status) {
            return Applied::Ignored;
        }

        let needs_media = next == CallStatus::Active;
        self.status = next;
        Applied::Entered {
            status: next,
            needs_media,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_progression() {
        let mut call = CallLifecycle::new(true);
        assert_eq!(
            call.apply(CallStatus::Connecting),
            Applied::Entered {
                status: CallStatus::Connecting,
                needs_media: false
            }
        );
        assert_eq!(
            call.apply(CallStatus::Active),
            Applied::Entered {
                status: CallStatus::Active,
                needs_media: true
            }
        );
        assert_eq!(
            call.apply(CallStatus::Ended),
            Applied::Entered {
                status: CallStatus::Ended,
                needs_media: false
            }
        );
    }

    #[test]
    fn ringing_may_jump_straight_to_active() {
        let mut call = CallLifecycle::new(false);
        assert_eq!(
            call.apply(CallStatus::Active),
            Applied::Entered {
                status: CallStatus::Active,
                needs_media: true
            }
        );
    }

    #[test]
    fn backward_and_duplicate_transitions_are_ignored() {
        let mut call = CallLifecycle::new(true);
        call.apply(CallStatus::Active);
        assert_eq!(call.apply(CallStatus::Connecting), Applied::Ignored);
        assert_eq!(call.apply(CallStatus::Active), Applied::Ignored);
    }

    #[test]
    fn watchdog_terminal_status_lands_in_any_state() {
        // Stale ringing reconciled to missed.
        let mut ringing = CallLifecycle::new(true);
        assert!(matches!(
            ringing.apply(CallStatus::Missed),
            Applied::Entered { status: CallStatus::Missed, .. }
        ));

        // Dead active call reconciled to ended.
        let mut active = CallLifecycle::new(true);
        active.apply(CallStatus::Active);
        assert!(matches!(
            active.apply(CallStatus::Ended),
            Applied::Entered { status: CallStatus::Ended, .. }
        ));
    }

    #[test]
    fn nothing_follows_a_terminal_status() {
        let mut call = CallLifecycle::new(true);
        call.apply(CallStatus::Declined);
        assert_eq!(call.apply(CallStatus::Active), Applied::Ignored);
        assert_eq!(call.apply(CallStatus::Ended), Applied::Ignored);
        assert!(call.is_terminal());
    }
}
