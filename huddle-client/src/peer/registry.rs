//! Explicit ownership of peer links.
//!
//! One registry entry per (participant, purpose); the invariant that at
//! most one link of a given purpose exists toward a remote lives here, not
//! in closures scattered over presence handlers.  Everything that closes a
//! link goes through this type so nothing keeps a handle to a dead
//! connection.

use huddle_types::MediaPurpose;
use std::collections::HashMap;

/// Implemented by the concrete link type; the registry calls it exactly
/// once for every entry it discards.
pub trait LinkHandle {
    fn shutdown(&self);
}

pub struct PeerRegistry<L> {
    links: HashMap<(String, MediaPurpose), L>,
}

impl<L> Default for PeerRegistry<L> {
    fn default() -> Self {
        Self {
            links: HashMap::new(),
        }
    }
}

impl<L: LinkHandle> PeerRegistry<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, peer_id: &str, purpose: MediaPurpose) -> bool {
        self.links.contains_key(&(peer_id.to_string(), purpose))
    }

    pub fn get(&self, peer_id: &str, purpose: MediaPurpose) -> Option<&L> {
        self.links.get(&(peer_id.to_string(), purpose))
    }

    /// Returns the existing link or inserts the one `create` builds.
    /// Never replaces a live link; that is the duplicate-link guard.
    pub fn open_with(
        &mut self,
        peer_id: &str,
        purpose: MediaPurpose,
        create: impl FnOnce() -> L,
    ) -> &mut L {
        self.links
            .entry((peer_id.to_string(), purpose))
            .or_insert_with(create)
    }

    /// Closes and removes one link.  Returns true if it existed.
    pub fn close(&mut self, peer_id: &str, purpose: MediaPurpose) -> bool {
        if let Some(link) = self.links.remove(&(peer_id.to_string(), purpose)) {
            link.shutdown();
            true
        } else {
            false
        }
    }

    /// Closes every link toward a departed participant, all purposes.
    pub fn close_peer(&mut self, peer_id: &str) -> usize {
        let keys: Vec<_> = self
            .links
            .keys()
            .filter(|(id, _)| id == peer_id)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(link) = self.links.remove(key) {
                link.shutdown();
            }
        }
        keys.len()
    }

    pub fn close_all(&mut self) {
        for (_, link) in self.links.drain() {
            link.shutdown();
        }
    }

    pub fn peers_with(&self, purpose: MediaPurpose) -> Vec<String> {
        let mut ids: Vec<String> = self
            .links
            .keys()
            .filter(|(_, p)| *p == purpose)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(String, MediaPurpose), &L)> {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct FakeLink {
        shutdowns: Rc<Cell<u32>>,
    }

    impl FakeLink {
        fn new() -> (Self, Rc<Cell<u32>>) {
            let shutdowns = Rc::new(Cell::new(0));
            (
                Self {
                    shutdowns: shutdowns.clone(),
                },
                shutdowns,
            )
        }
    }

    impl LinkHandle for FakeLink {
        fn shutdown(&self) {
            self.shutdowns.set(self.shutdowns.get() + 1);
        }
    }

    #[test]
    fn open_with_never_replaces_a_live_link() {
        let mut registry = PeerRegistry::new();
        let (first, counter) = FakeLink::new();
        registry.open_with("b2", MediaPurpose::Voice, || first.clone());

        let mut created_again = false;
        registry.open_with("b2", MediaPurpose::Voice, || {
            created_again = true;
            FakeLink::new().0
        });
        assert!(!created_again);
        assert_eq!(registry.len(), 1);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn voice_and_screen_links_are_independent() {
        let mut registry = PeerRegistry::new();
        registry.open_with("b2", MediaPurpose::Voice, || FakeLink::new().0);
        registry.open_with("b2", MediaPurpose::Screen, || FakeLink::new().0);
        assert_eq!(registry.len(), 2);
        assert!(registry.close("b2", MediaPurpose::Screen));
        assert!(registry.contains("b2", MediaPurpose::Voice));
    }

    #[test]
    fn close_peer_shuts_down_every_purpose() {
        let mut registry = PeerRegistry::new();
        let (voice, voice_count) = FakeLink::new();
        let (screen, screen_count) = FakeLink::new();
        registry.open_with("b2", MediaPurpose::Voice, || voice);
        registry.open_with("b2", MediaPurpose::Screen, || screen);
        registry.open_with("c3", MediaPurpose::Voice, || FakeLink::new().0);

        assert_eq!(registry.close_peer("b2"), 2);
        assert_eq!(voice_count.get(), 1);
        assert_eq!(screen_count.get(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn close_all_empties_the_registry() {
        let mut registry = PeerRegistry::new();
        let (a, a_count) = FakeLink::new();
        let (b, b_count) = FakeLink::new();
        registry.open_with("a1", MediaPurpose::Voice, || a);
        registry.open_with("b2", MediaPurpose::Voice, || b);
        registry.close_all();
        assert!(registry.is_empty());
        assert_eq!((a_count.get(), b_count.get()), (1, 1));
    }

    #[test]
    fn peers_with_filters_by_purpose_and_sorts() {
        let mut registry = PeerRegistry::new();
        registry.open_with("c3", MediaPurpose::Screen, || FakeLink::new().0);
        registry.open_with("a1", MediaPurpose::Screen, || FakeLink::new().0);
        registry.open_with("b2", MediaPurpose::Voice, || FakeLink::new().0);
        assert_eq!(registry.peers_with(MediaPurpose::Screen), vec!["a1", "c3"]);
    }
}
