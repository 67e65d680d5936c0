//! Glare avoidance.
//!
//! When two participants discover each other at the same moment, both would
//! otherwise create an offer and the pair would end up with duplicate
//! links.  A tie-break comparator decides which side offers; the other side
//! waits to answer.  The rule is injected rather than inlined so call-type
//! specific policies (and tests) can swap it.

use std::rc::Rc;

/// Decides whether the local side creates the offer toward a remote.
#[derive(Clone)]
pub struct TieBreaker {
    decide: Rc<dyn Fn(&str, &str) -> bool>,
}

impl TieBreaker {
    /// Channel/room rule: the lexicographically smaller identity offers.
    /// Both sides evaluate the same comparison, so exactly one of them
    /// ever initiates.
    pub fn identity_order() -> Self {
        Self {
            decide: Rc::new(|local, remote| local < remote),
        }
    }

    /// 1:1 call rule: the call initiator offers.  Both sides read the
    /// initiator from the call record, so the decision is shared state,
    /// not a race.
    pub fn initiator(initiator_id: impl Into<String>) -> Self {
        let initiator_id = initiator_id.into();
        Self {
            decide: Rc::new(move |local, _remote| local == initiator_id),
        }
    }

    /// Any custom rule, mostly for tests.
    pub fn from_fn(decide: impl Fn(&str, &str) -> bool + 'static) -> Self {
        Self {
            decide: Rc::new(decide),
        }
    }

    pub fn is_offerer(&self, local: &str, remote: &str) -> bool {
        (self.decide)(local, remote)
    }
}

impl std::fmt::Debug for TieBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TieBreaker")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_order_picks_exactly_one_offerer() {
        let rule = TieBreaker::identity_order();
        assert!(rule.is_offerer("a1", "b2"));
        assert!(!rule.is_offerer("b2", "a1"));
        // A participant never offers to itself.
        assert!(!rule.is_offerer("a1", "a1"));
    }

    #[test]
    fn initiator_rule_is_agreed_on_both_sides() {
        let caller_side = TieBreaker::initiator("a1");
        let callee_side = TieBreaker::initiator("a1");
        assert!(caller_side.is_offerer("a1", "b2"));
        assert!(!callee_side.is_offerer("b2", "a1"));
    }
}
