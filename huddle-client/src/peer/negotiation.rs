//! Per-link negotiation state, kept free of browser types so the ordering
//! and recovery rules are testable anywhere.
//!
//! The owner of a link feeds signaling and ICE-transport observations in
//! and performs whatever side effect the returned decision names.  All
//! sequencing rules live here: answers are rejected outside the awaiting
//! state, early ICE candidates are buffered and drained exactly once in
//! arrival order, and a failure episode gets one ICE restart before the
//! link is declared dead.

use crate::constants::ICE_RESTART_BUDGET;
use huddle_types::IceCandidatePayload;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkRole {
    Offerer,
    Answerer,
}

/// `New → HaveLocalOffer | HaveRemoteOffer → Connected →
/// {Disconnected → Connected | Failed} → Closed`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkPhase {
    New,
    HaveLocalOffer,
    HaveRemoteOffer,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// ICE transport observations, mirroring the browser's ice connection
/// states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IceObservation {
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// What the link owner must do in response to an observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recovery {
    None,
    /// Renegotiate with an ICE restart offer.
    RestartIce,
    /// Close the connection and report the link-level error upward.  The
    /// machine returns this at most once per link.
    Teardown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IceDisposition {
    /// Remote description is set; apply immediately.
    Apply,
    /// Remote description not set yet; candidate buffered.
    Buffered,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutOfOrder {
    op: &'static str,
    phase: LinkPhase,
}

impl fmt::Display for OutOfOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} not valid in phase {:?}", self.op, self.phase)
    }
}

impl std::error::Error for OutOfOrder {}

#[derive(Debug)]
pub struct Negotiation {
    role: LinkRole,
    phase: LinkPhase,
    remote_description_set: bool,
    awaiting_answer: bool,
    pending_ice: Vec<IceCandidatePayload>,
    restarts_left: u8,
    terminal_reported: bool,
}

impl Negotiation {
    pub fn offerer() -> Self {
        Self::new(LinkRole::Offerer)
    }

    pub fn answerer() -> Self {
        Self::new(LinkRole::Answerer)
    }

    fn new(role: LinkRole) -> Self {
        Self {
            role,
            phase: LinkPhase::New,
            remote_description_set: false,
            awaiting_answer: false,
            pending_ice: Vec::new(),
            restarts_left: ICE_RESTART_BUDGET,
            terminal_reported: false,
        }
    }

    pub fn role(&self) -> LinkRole {
        self.role
    }

    pub fn phase(&self) -> LinkPhase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == LinkPhase::Closed
    }

    pub fn pending_ice_len(&self) -> usize {
        self.pending_ice.len()
    }

    /// Record that the initial local offer was created and sent.
    pub fn local_offer_created(&mut self) -> Result<(), OutOfOrder> {
        if self.phase != LinkPhase::New {
            return Err(OutOfOrder {
                op: "local offer",
                phase: self.phase,
            });
        }
        self.phase = LinkPhase::HaveLocalOffer;
        self.awaiting_answer = true;
        Ok(())
    }

    /// Record that a restart offer was created after a failure.  The
    /// renegotiation replaces the remote description, so candidates
    /// arriving from now on buffer until the fresh answer lands.
    pub fn restart_offer_created(&mut self) -> Result<(), OutOfOrder> {
        match self.phase {
            LinkPhase::Connected | LinkPhase::Disconnected | LinkPhase::Failed => {
                self.awaiting_answer = true;
                self.remote_description_set = false;
                Ok(())
            }
            phase => Err(OutOfOrder {
                op: "restart offer",
                phase,
            }),
        }
    }

    /// A remote offer arrived.  Valid initially for the answerer, and at
    /// any established phase for a remote-initiated restart.  The caller
    /// applies the description and then calls
    /// [`remote_description_applied`](Self::remote_description_applied).
    pub fn remote_offer_received(&mut self) -> Result<(), OutOfOrder> {
        match self.phase {
            LinkPhase::New => {
                self.phase = LinkPhase::HaveRemoteOffer;
                Ok(())
            }
            LinkPhase::Connected | LinkPhase::Disconnected | LinkPhase::Failed => Ok(()),
            phase => Err(OutOfOrder {
                op: "remote offer",
                phase,
            }),
        }
    }

    /// A remote answer arrived.  Only valid while an answer is awaited;
    /// anything else is signaling noise and gets dropped by the caller.
    pub fn answer_received(&mut self) -> Result<(), OutOfOrder> {
        if !self.awaiting_answer {
            return Err(OutOfOrder {
                op: "answer",
                phase: self.phase,
            });
        }
        self.awaiting_answer = false;
        Ok(())
    }

    /// The remote description finished applying.  Candidates received from
    /// now on apply directly; everything buffered so far is handed back
    /// exactly once, in arrival order.  Kept separate from the receive
    /// calls because applying a description suspends, and candidates must
    /// keep buffering until the browser has actually accepted it.
    pub fn remote_description_applied(&mut self) -> Vec<IceCandidatePayload> {
        self.remote_description_set = true;
        std::mem::take(&mut self.pending_ice)
    }

    /// An ICE candidate arrived.  Buffered when it outran the SDP answer,
    /// which the broadcast topic's fan-out timing makes routine.
    pub fn ice_candidate_received(&mut self, candidate: IceCandidatePayload) -> IceDisposition {
        if self.remote_description_set {
            IceDisposition::Apply
        } else {
            self.pending_ice.push(candidate);
            IceDisposition::Buffered
        }
    }

    /// Fold in an ICE transport observation and decide on recovery.
    pub fn ice_state_changed(&mut self, observation: IceObservation) -> Recovery {
        if self.phase == LinkPhase::Closed {
            return Recovery::None;
        }
        match observation {
            IceObservation::Checking => Recovery::None,
            IceObservation::Connected => {
                self.phase = LinkPhase::Connected;
                // A recovered link earns a fresh restart budget.
                self.restarts_left = ICE_RESTART_BUDGET;
                Recovery::None
            }
            IceObservation::Disconnected => {
                self.phase = LinkPhase::Disconnected;
                Recovery::None
            }
            IceObservation::Failed => {
                self.phase = LinkPhase::Failed;
                self.consume_restart()
            }
            IceObservation::Closed => {
                self.phase = LinkPhase::Closed;
                Recovery::None
            }
        }
    }

    /// Called when a link has sat in `Disconnected` for the grace period
    /// without recovering.
    pub fn disconnected_grace_expired(&mut self) -> Recovery {
        if self.phase != LinkPhase::Disconnected {
            return Recovery::None;
        }
        self.consume_restart()
    }

    fn consume_restart(&mut self) -> Recovery {
        if self.terminal_reported {
            return Recovery::None;
        }
        if self.restarts_left > 0 {
            self.restarts_left -= 1;
            Recovery::RestartIce
        } else {
            self.terminal_reported = true;
            Recovery::Teardown
        }
    }

    pub fn close(&mut self) {
        self.phase = LinkPhase::Closed;
        self.pending_ice.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(n: u32) -> IceCandidatePayload {
        IceCandidatePayload {
            candidate: format!("candidate:{n}"),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }
    }

    fn established_offerer() -> Negotiation {
        let mut n = Negotiation::offerer();
        n.local_offer_created().unwrap();
        n.answer_received().unwrap();
        n.remote_description_applied();
        n.ice_state_changed(IceObservation::Connected);
        n
    }

    #[test]
    fn answer_rejected_unless_awaited() {
        let mut n = Negotiation::answerer();
        assert!(n.answer_received().is_err());

        let mut n = Negotiation::offerer();
        n.local_offer_created().unwrap();
        assert!(n.answer_received().is_ok());
        // A duplicate answer is noise.
        assert!(n.answer_received().is_err());
    }

    #[test]
    fn early_candidates_buffer_and_drain_in_order_once() {
        let mut n = Negotiation::offerer();
        n.local_offer_created().unwrap();

        assert_eq!(n.ice_candidate_received(candidate(1)), IceDisposition::Buffered);
        assert_eq!(n.ice_candidate_received(candidate(2)), IceDisposition::Buffered);
        n.answer_received().unwrap();
        // The description is still being applied: keep buffering.
        assert_eq!(n.ice_candidate_received(candidate(3)), IceDisposition::Buffered);
        assert_eq!(n.pending_ice_len(), 3);

        let drained = n.remote_description_applied();
        assert_eq!(
            drained.iter().map(|c| c.candidate.as_str()).collect::<Vec<_>>(),
            vec!["candidate:1", "candidate:2", "candidate:3"]
        );

        // Drained exactly once; later candidates apply directly.
        assert_eq!(n.pending_ice_len(), 0);
        assert_eq!(n.ice_candidate_received(candidate(4)), IceDisposition::Apply);
    }

    #[test]
    fn answerer_drains_buffer_after_remote_offer_applies() {
        let mut n = Negotiation::answerer();
        n.ice_candidate_received(candidate(1));
        n.remote_offer_received().unwrap();
        assert_eq!(n.phase(), LinkPhase::HaveRemoteOffer);
        let drained = n.remote_description_applied();
        assert_eq!(drained.len(), 1);
    }

    #[test]
    fn failure_gets_exactly_one_restart_then_teardown_once() {
        let mut n = established_offerer();

        assert_eq!(n.ice_state_changed(IceObservation::Failed), Recovery::RestartIce);
        n.restart_offer_created().unwrap();

        // Still failed after the restart: terminal, reported exactly once.
        assert_eq!(n.ice_state_changed(IceObservation::Failed), Recovery::Teardown);
        assert_eq!(n.ice_state_changed(IceObservation::Failed), Recovery::None);
    }

    #[test]
    fn recovery_resets_the_restart_budget() {
        let mut n = established_offerer();

        assert_eq!(n.ice_state_changed(IceObservation::Failed), Recovery::RestartIce);
        n.restart_offer_created().unwrap();
        n.answer_received().unwrap();
        n.remote_description_applied();
        n.ice_state_changed(IceObservation::Connected);

        // A later, separate failure episode gets its own restart.
        assert_eq!(n.ice_state_changed(IceObservation::Failed), Recovery::RestartIce);
    }

    #[test]
    fn sustained_disconnect_uses_the_restart_budget() {
        let mut n = established_offerer();
        n.ice_state_changed(IceObservation::Disconnected);
        assert_eq!(n.disconnected_grace_expired(), Recovery::RestartIce);
    }

    #[test]
    fn recovered_disconnect_ignores_the_stale_grace_timer() {
        let mut n = established_offerer();
        n.ice_state_changed(IceObservation::Disconnected);
        n.ice_state_changed(IceObservation::Connected);
        assert_eq!(n.disconnected_grace_expired(), Recovery::None);
    }

    #[test]
    fn restart_buffers_candidates_until_fresh_answer() {
        let mut n = established_offerer();

        n.ice_state_changed(IceObservation::Failed);
        n.restart_offer_created().unwrap();
        assert_eq!(n.ice_candidate_received(candidate(9)), IceDisposition::Buffered);
        n.answer_received().unwrap();
        let drained = n.remote_description_applied();
        assert_eq!(drained.len(), 1);
    }

    #[test]
    fn closed_links_ignore_observations() {
        let mut n = Negotiation::offerer();
        n.local_offer_created().unwrap();
        n.close();
        assert!(n.is_closed());
        assert_eq!(n.ice_state_changed(IceObservation::Failed), Recovery::None);
    }
}
