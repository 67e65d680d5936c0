//! The ephemeral participant roster for one channel or call.
//!
//! Entries exist only while the remote side is present; they are created on
//! presence join and removed on leave or connection loss.  Per-listener
//! volume and mute live here because they are local view state, not
//! something the remote publishes.

use huddle_types::PresenceMeta;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub speaking: bool,
    pub muted: bool,
    /// Playback volume this listener applies to the participant, 0.0..=1.0.
    pub volume: f32,
}

impl Participant {
    fn from_meta(meta: &PresenceMeta) -> Self {
        Self {
            id: meta.user_id.clone(),
            display_name: meta.display_name.clone(),
            avatar_url: meta.avatar_url.clone(),
            speaking: meta.speaking,
            muted: meta.muted,
            volume: 1.0,
        }
    }
}

/// Roster keyed by participant id; iteration order is stable for UI lists.
#[derive(Default, Debug)]
pub struct Roster {
    entries: BTreeMap<String, Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes an entry from a presence attribute set,
    /// preserving the local volume setting.  Returns true if the
    /// participant is new.
    pub fn upsert(&mut self, meta: &PresenceMeta) -> bool {
        match self.entries.get_mut(&meta.user_id) {
            Some(existing) => {
                existing.display_name = meta.display_name.clone();
                existing.avatar_url = meta.avatar_url.clone();
                existing.speaking = meta.speaking;
                existing.muted = meta.muted;
                false
            }
            None => {
                self.entries
                    .insert(meta.user_id.clone(), Participant::from_meta(meta));
                true
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Participant> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Participant> {
        self.entries.get(id)
    }

    pub fn set_volume(&mut self, id: &str, volume: f32) -> bool {
        if let Some(p) = self.entries.get_mut(id) {
            p.volume = volume.clamp(0.0, 1.0);
            true
        } else {
            false
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str) -> PresenceMeta {
        PresenceMeta::new(id, format!("name-{id}"))
    }

    #[test]
    fn upsert_reports_new_participants() {
        let mut roster = Roster::new();
        assert!(roster.upsert(&meta("b2")));
        assert!(!roster.upsert(&meta("b2")));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn upsert_preserves_local_volume() {
        let mut roster = Roster::new();
        roster.upsert(&meta("b2"));
        assert!(roster.set_volume("b2", 0.4));

        let mut updated = meta("b2");
        updated.speaking = true;
        roster.upsert(&updated);

        let p = roster.get("b2").unwrap();
        assert!(p.speaking);
        assert!((p.volume - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn volume_is_clamped() {
        let mut roster = Roster::new();
        roster.upsert(&meta("b2"));
        roster.set_volume("b2", 7.0);
        assert_eq!(roster.get("b2").unwrap().volume, 1.0);
        assert!(!roster.set_volume("missing", 0.5));
    }

    #[test]
    fn ids_are_sorted_for_stable_ui_order() {
        let mut roster = Roster::new();
        roster.upsert(&meta("c3"));
        roster.upsert(&meta("a1"));
        roster.upsert(&meta("b2"));
        let ids: Vec<_> = roster.ids().cloned().collect();
        assert_eq!(ids, vec!["a1", "b2", "c3"]);
    }
}
