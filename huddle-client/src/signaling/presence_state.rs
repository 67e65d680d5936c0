//! Aggregation of presence frames into a membership set.
//!
//! The server sends a full `presence_state` snapshot on join and
//! `presence_diff` deltas afterwards.  This module folds both into one map
//! and reports what actually changed, so consumers see a uniform
//! sync/join/leave stream regardless of which frame shape arrived.

use huddle_types::{PresenceDiff, PresenceMeta};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub enum PresenceEvent {
    /// Full membership snapshot replaced the local view.
    Sync(Vec<PresenceMeta>),
    Join(PresenceMeta),
    Leave(PresenceMeta),
}

#[derive(Default, Debug)]
pub struct PresenceSet {
    members: BTreeMap<String, PresenceMeta>,
}

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a full snapshot.  Emits one `Sync` plus a `Join`/`Leave`
    /// per membership difference against the previous view, so consumers
    /// that track per-peer resources (peer links, streams) see departures
    /// even when they were only implied by the snapshot.
    pub fn apply_state(&mut self, snapshot: Vec<PresenceMeta>) -> Vec<PresenceEvent> {
        let mut next = BTreeMap::new();
        for meta in snapshot {
            next.insert(meta.user_id.clone(), meta);
        }

        let mut events = vec![PresenceEvent::Sync(next.values().cloned().collect())];
        for (id, meta) in &self.members {
            if !next.contains_key(id) {
                events.push(PresenceEvent::Leave(meta.clone()));
            }
        }
        for (id, meta) in &next {
            if !self.members.contains_key(id) {
                events.push(PresenceEvent::Join(meta.clone()));
            }
        }

        self.members = next;
        events
    }

    /// Applies a delta.  A join for an id already present is an attribute
    /// update and emits `Join` with the refreshed set; a leave for an
    /// unknown id is dropped.
    pub fn apply_diff(&mut self, diff: PresenceDiff) -> Vec<PresenceEvent> {
        let mut events = Vec::new();
        for meta in diff.joins {
            self.members.insert(meta.user_id.clone(), meta.clone());
            events.push(PresenceEvent::Join(meta));
        }
        for id in diff.leaves {
            if let Some(meta) = self.members.remove(&id) {
                events.push(PresenceEvent::Leave(meta));
            }
        }
        events
    }

    pub fn get(&self, id: &str) -> Option<&PresenceMeta> {
        self.members.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains_key(id)
    }

    pub fn members(&self) -> impl Iterator<Item = &PresenceMeta> {
        self.members.values()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str) -> PresenceMeta {
        PresenceMeta::new(id, id.to_uppercase())
    }

    #[test]
    fn snapshot_emits_sync_then_joins() {
        let mut set = PresenceSet::new();
        let events = set.apply_state(vec![meta("a1"), meta("b2")]);
        assert!(matches!(&events[0], PresenceEvent::Sync(m) if m.len() == 2));
        let joins: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, PresenceEvent::Join(_)))
            .collect();
        assert_eq!(joins.len(), 2);
    }

    #[test]
    fn snapshot_implies_leaves() {
        let mut set = PresenceSet::new();
        set.apply_state(vec![meta("a1"), meta("b2")]);
        let events = set.apply_state(vec![meta("a1")]);
        assert!(events
            .iter()
            .any(|e| matches!(e, PresenceEvent::Leave(m) if m.user_id == "b2")));
        assert!(!set.contains("b2"));
    }

    #[test]
    fn diff_joins_and_leaves() {
        let mut set = PresenceSet::new();
        set.apply_state(vec![meta("a1")]);

        let events = set.apply_diff(PresenceDiff {
            joins: vec![meta("c3")],
            leaves: vec!["a1".to_string()],
        });
        assert_eq!(events.len(), 2);
        assert!(set.contains("c3"));
        assert!(!set.contains("a1"));
    }

    #[test]
    fn leave_for_unknown_id_is_dropped() {
        let mut set = PresenceSet::new();
        let events = set.apply_diff(PresenceDiff {
            joins: vec![],
            leaves: vec!["ghost".to_string()],
        });
        assert!(events.is_empty());
    }

    #[test]
    fn rejoin_updates_attributes() {
        let mut set = PresenceSet::new();
        set.apply_state(vec![meta("a1")]);

        let mut speaking = meta("a1");
        speaking.speaking = true;
        let events = set.apply_diff(PresenceDiff {
            joins: vec![speaking],
            leaves: vec![],
        });
        assert_eq!(events.len(), 1);
        assert!(set.get("a1").unwrap().speaking);
    }
}
