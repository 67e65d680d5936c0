//! Two-sided negotiation scenarios driven through the same pure pieces
//! the browser glue runs: tie-break, negotiation state machines and the
//! link registry.  The simulation stands in for the RTCPeerConnection and
//! the broadcast topic; everything else is the production logic.

use crate::peer::{
    IceDisposition, IceObservation, LinkHandle, Negotiation, PeerRegistry, Recovery, TieBreaker,
};
use huddle_types::{IceCandidatePayload, MediaPurpose, SignalEnvelope, SignalKind};
use serde_json::json;
use std::cell::RefCell;

struct SimLink {
    negotiation: RefCell<Negotiation>,
}

impl SimLink {
    fn offerer() -> Self {
        Self {
            negotiation: RefCell::new(Negotiation::offerer()),
        }
    }

    fn answerer() -> Self {
        Self {
            negotiation: RefCell::new(Negotiation::answerer()),
        }
    }
}

impl LinkHandle for SimLink {
    fn shutdown(&self) {
        self.negotiation.borrow_mut().close();
    }
}

/// One participant's view: a registry of links plus the tie-break rule,
/// wired the way the peer manager wires them.
struct SimSide {
    id: String,
    tie: TieBreaker,
    registry: PeerRegistry<SimLink>,
    offers_sent: u32,
    answers_sent: u32,
    applied_candidates: Vec<String>,
}

impl SimSide {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            tie: TieBreaker::identity_order(),
            registry: PeerRegistry::new(),
            offers_sent: 0,
            answers_sent: 0,
            applied_candidates: Vec::new(),
        }
    }

    /// The manager's `connect_to`: suppressed unless the tie-break picks
    /// this side as offerer.
    fn connect_to(&mut self, remote: &str) -> Option<SignalEnvelope> {
        if self.registry.contains(remote, MediaPurpose::Voice) {
            return None;
        }
        if !self.tie.is_offerer(&self.id, remote) {
            return None;
        }
        let link = self
            .registry
            .open_with(remote, MediaPurpose::Voice, SimLink::offerer);
        link.negotiation.borrow_mut().local_offer_created().unwrap();
        self.offers_sent += 1;
        Some(SignalEnvelope {
            kind: SignalKind::Offer,
            from: self.id.clone(),
            to: remote.to_string(),
            purpose: MediaPurpose::Voice,
            payload: json!({"sdp": format!("offer-from-{}", self.id)}),
        })
    }

    fn handle(&mut self, envelope: &SignalEnvelope) -> Option<SignalEnvelope> {
        assert!(envelope.is_for(&self.id));
        let remote = envelope.from.clone();
        match envelope.kind {
            SignalKind::Offer => {
                let link = self
                    .registry
                    .open_with(&remote, MediaPurpose::Voice, SimLink::answerer);
                link.negotiation.borrow_mut().remote_offer_received().ok()?;
                let drained = link.negotiation.borrow_mut().remote_description_applied();
                self.applied_candidates
                    .extend(drained.into_iter().map(|c| c.candidate));
                self.answers_sent += 1;
                Some(SignalEnvelope {
                    kind: SignalKind::Answer,
                    from: self.id.clone(),
                    to: remote,
                    purpose: MediaPurpose::Voice,
                    payload: json!({"sdp": format!("answer-from-{}", self.id)}),
                })
            }
            SignalKind::Answer => {
                let link = self.registry.get(&remote, MediaPurpose::Voice)?;
                link.negotiation.borrow_mut().answer_received().ok()?;
                let drained = link.negotiation.borrow_mut().remote_description_applied();
                self.applied_candidates
                    .extend(drained.into_iter().map(|c| c.candidate));
                None
            }
            SignalKind::IceCandidate => {
                let link = self.registry.get(&remote, MediaPurpose::Voice)?;
                let payload: IceCandidatePayload =
                    serde_json::from_value(envelope.payload.clone()).unwrap();
                let candidate = payload.candidate.clone();
                if link.negotiation.borrow_mut().ice_candidate_received(payload)
                    == IceDisposition::Apply
                {
                    self.applied_candidates.push(candidate);
                }
                None
            }
            SignalKind::ShareRequest => None,
        }
    }
}

fn ice(from: &str, to: &str, n: u32) -> SignalEnvelope {
    SignalEnvelope {
        kind: SignalKind::IceCandidate,
        from: from.to_string(),
        to: to.to_string(),
        purpose: MediaPurpose::Voice,
        payload: json!({"candidate": format!("candidate:{n}"), "sdp_mid": "0", "sdp_mline_index": 0}),
    }
}

#[test]
fn simultaneous_initiate_produces_exactly_one_offer() {
    let mut a = SimSide::new("a1");
    let mut b = SimSide::new("b2");

    // Both sides discover each other at the same instant.
    let offer_from_a = a.connect_to("b2");
    let offer_from_b = b.connect_to("a1");

    // "a1" sorts before "b2": only A offers.
    assert!(offer_from_a.is_some());
    assert!(offer_from_b.is_none());
    assert_eq!(a.offers_sent + b.offers_sent, 1);

    // B answers A's offer and the pair holds exactly one link each.
    let answer = b.handle(&offer_from_a.unwrap()).unwrap();
    assert_eq!(answer.kind, SignalKind::Answer);
    a.handle(&answer);
    assert_eq!(b.answers_sent, 1);
    assert_eq!(a.registry.len(), 1);
    assert_eq!(b.registry.len(), 1);
}

#[test]
fn candidates_outrunning_the_answer_apply_in_arrival_order() {
    let mut a = SimSide::new("a1");
    let mut b = SimSide::new("b2");

    let offer = a.connect_to("b2").unwrap();
    let answer = b.handle(&offer).unwrap();

    // B's candidates reach A before B's answer does: the broadcast topic
    // guarantees nothing across sends.
    a.handle(&ice("b2", "a1", 1));
    a.handle(&ice("b2", "a1", 2));
    a.handle(&ice("b2", "a1", 3));
    assert!(a.applied_candidates.is_empty());

    a.handle(&answer);
    assert_eq!(
        a.applied_candidates,
        vec!["candidate:1", "candidate:2", "candidate:3"]
    );

    // Candidates after the answer skip the buffer.
    a.handle(&ice("b2", "a1", 4));
    assert_eq!(a.applied_candidates.len(), 4);
}

#[test]
fn ice_failure_restarts_once_then_closes_with_one_report() {
    let mut a = SimSide::new("a1");
    let mut b = SimSide::new("b2");
    let offer = a.connect_to("b2").unwrap();
    let answer = b.handle(&offer).unwrap();
    a.handle(&answer);

    let link = a.registry.get("b2", MediaPurpose::Voice).unwrap();
    link.negotiation
        .borrow_mut()
        .ice_state_changed(IceObservation::Connected);

    // First failure: exactly one restart attempt.
    assert_eq!(
        link.negotiation
            .borrow_mut()
            .ice_state_changed(IceObservation::Failed),
        Recovery::RestartIce
    );
    link.negotiation.borrow_mut().restart_offer_created().unwrap();

    // Ten seconds later the link is still failed: terminal, one report.
    let mut teardowns = 0;
    for _ in 0..3 {
        if link
            .negotiation
            .borrow_mut()
            .ice_state_changed(IceObservation::Failed)
            == Recovery::Teardown
        {
            teardowns += 1;
        }
    }
    assert_eq!(teardowns, 1);

    // The registry close path leaves nothing behind.
    assert!(a.registry.close("b2", MediaPurpose::Voice));
    assert!(a.registry.is_empty());
}

#[test]
fn departed_peer_leaves_no_link_in_any_registry() {
    let mut a = SimSide::new("a1");
    let mut b = SimSide::new("b2");
    let mut c = SimSide::new("c3");

    // a1 offers to both; the others answer.
    for (side, id) in [(&mut b, "b2"), (&mut c, "c3")] {
        let offer = a.connect_to(id).unwrap();
        let answer = side.handle(&offer).unwrap();
        a.handle(&answer);
    }
    assert_eq!(a.registry.len(), 2);

    // b2 drops off presence.
    assert_eq!(a.registry.close_peer("b2"), 1);
    assert_eq!(a.registry.peers_with(MediaPurpose::Voice), vec!["c3"]);
}
