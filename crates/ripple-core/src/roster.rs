/// Peer roster: the live, ordered, de-duplicated list of reachable peers.
///
/// Shared between the transport event path and application commands, so
/// every operation runs under a single mutex. Insertion order is part of
/// the contract: the first non-self peer is the default recipient and the
/// display order follows joins.
use std::sync::{Mutex, MutexGuard};

use crate::error::RosterError;
use crate::types::{short_id, ColourState, DisplayColour, PeerId};

/// Result of processing a leave notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The peer was not in the roster.
    Absent,
    /// The peer was removed.
    Removed,
    /// The peer was removed and it was the selected recipient.
    RemovedSelected,
}

/// One line of the recipient list as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub id: PeerId,
    pub label: String,
    pub colour: DisplayColour,
    pub is_self: bool,
}

#[derive(Debug, Default)]
struct RosterState {
    members: Vec<PeerId>,
    self_id: Option<PeerId>,
    selected: Option<PeerId>,
}

impl RosterState {
    fn position(&self, id: &PeerId) -> Option<usize> {
        self.members.iter().position(|m| m == id)
    }

    fn non_self_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| Some(**m) != self.self_id)
            .count()
    }
}

#[derive(Debug, Default)]
pub struct Roster {
    state: Mutex<RosterState>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RosterState> {
        // Every mutation leaves the state consistent before it can panic.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the local identity.
    ///
    /// A previous, different self entry is removed first and the new one
    /// takes its place. Otherwise self goes to the front of the list unless
    /// it was already present. Returns the replaced identity, if any.
    pub fn register_self(&self, id: PeerId) -> Option<PeerId> {
        let mut st = self.lock();
        let previous = st.self_id.replace(id).filter(|old| *old != id);

        if let Some(old) = previous {
            if st.selected == Some(old) {
                st.selected = None;
            }
            match st.position(&old) {
                Some(pos) if st.position(&id).is_none() => st.members[pos] = id,
                Some(pos) => {
                    st.members.remove(pos);
                }
                None => {}
            }
        }
        if st.position(&id).is_none() {
            st.members.insert(0, id);
        }

        tracing::debug!(self_id = %id, replaced = ?previous, "roster: self registered");
        previous
    }

    /// Record a join. Returns `true` when this is the first non-self peer,
    /// which the application uses to pick a default recipient.
    pub fn on_peer_joined(&self, id: PeerId) -> bool {
        let mut st = self.lock();
        if st.position(&id).is_some() {
            return false;
        }
        st.members.push(id);
        let first = st.self_id != Some(id) && st.non_self_count() == 1;
        tracing::debug!(peer = %id, first, "roster: peer joined");
        first
    }

    /// Record a departure. Clears the selection if it pointed at `id`.
    pub fn on_peer_left(&self, id: PeerId) -> Departure {
        let mut st = self.lock();
        let Some(pos) = st.position(&id) else {
            return Departure::Absent;
        };
        st.members.remove(pos);
        if st.self_id == Some(id) {
            st.self_id = None;
        }
        tracing::debug!(peer = %id, "roster: peer left");
        if st.selected == Some(id) {
            st.selected = None;
            Departure::RemovedSelected
        } else {
            Departure::Removed
        }
    }

    /// Select the recipient for locally originated sends.
    pub fn select(&self, id: PeerId) -> Result<(), RosterError> {
        let mut st = self.lock();
        if st.position(&id).is_none() {
            return Err(RosterError::NotAMember(id));
        }
        st.selected = Some(id);
        Ok(())
    }

    pub fn current_selection(&self) -> Option<PeerId> {
        self.lock().selected
    }

    pub fn self_id(&self) -> Option<PeerId> {
        self.lock().self_id
    }

    /// Snapshot of all members in insertion order, self included.
    pub fn members(&self) -> Vec<PeerId> {
        self.lock().members.clone()
    }

    /// Snapshot of members other than self, in insertion order.
    pub fn peers(&self) -> Vec<PeerId> {
        let st = self.lock();
        st.members
            .iter()
            .copied()
            .filter(|m| Some(*m) != st.self_id)
            .collect()
    }

    /// Number of connected peers, self excluded.
    pub fn peer_count(&self) -> usize {
        self.lock().non_self_count()
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.lock().position(id).is_some()
    }

    /// Members with their display label. Self is highlighted in blue.
    pub fn entries(&self) -> Vec<RosterEntry> {
        let st = self.lock();
        st.members
            .iter()
            .map(|id| {
                let is_self = st.self_id == Some(*id);
                RosterEntry {
                    id: *id,
                    label: short_id(id),
                    colour: if is_self {
                        DisplayColour::Mesh(ColourState::Blue)
                    } else {
                        DisplayColour::TextLight
                    },
                    is_self,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PEER_ID_LEN;

    fn peer(seed: u8) -> PeerId {
        PeerId::from_bytes([seed; PEER_ID_LEN])
    }

    #[test]
    fn join_twice_keeps_one_entry() {
        let roster = Roster::new();
        assert!(roster.on_peer_joined(peer(1)));
        assert!(!roster.on_peer_joined(peer(1)));
        assert_eq!(roster.members(), vec![peer(1)]);
    }

    #[test]
    fn first_join_signal_ignores_self() {
        let roster = Roster::new();
        roster.register_self(peer(0));
        assert!(!roster.on_peer_joined(peer(0)));
        assert!(roster.on_peer_joined(peer(1)));
        assert!(!roster.on_peer_joined(peer(2)));
        assert_eq!(roster.members(), vec![peer(0), peer(1), peer(2)]);
    }

    #[test]
    fn first_join_fires_again_after_roster_empties() {
        let roster = Roster::new();
        roster.register_self(peer(0));
        assert!(roster.on_peer_joined(peer(1)));
        roster.on_peer_left(peer(1));
        assert!(roster.on_peer_joined(peer(2)));
    }

    #[test]
    fn self_goes_first_even_after_early_joins() {
        let roster = Roster::new();
        roster.on_peer_joined(peer(1));
        roster.on_peer_joined(peer(2));
        roster.register_self(peer(0));
        assert_eq!(roster.members(), vec![peer(0), peer(1), peer(2)]);
        assert_eq!(roster.peers(), vec![peer(1), peer(2)]);
        assert_eq!(roster.peer_count(), 2);
    }

    #[test]
    fn register_self_is_idempotent() {
        let roster = Roster::new();
        assert_eq!(roster.register_self(peer(0)), None);
        assert_eq!(roster.register_self(peer(0)), None);
        assert_eq!(roster.members(), vec![peer(0)]);
        assert_eq!(roster.self_id(), Some(peer(0)));
    }

    #[test]
    fn register_self_replaces_old_identity_in_place() {
        let roster = Roster::new();
        roster.register_self(peer(0));
        roster.on_peer_joined(peer(1));
        assert_eq!(roster.register_self(peer(9)), Some(peer(0)));
        assert_eq!(roster.members(), vec![peer(9), peer(1)]);
        assert_eq!(roster.self_id(), Some(peer(9)));
    }

    #[test]
    fn register_self_with_known_peer_drops_old_self() {
        let roster = Roster::new();
        roster.register_self(peer(0));
        roster.on_peer_joined(peer(1));
        roster.select(peer(0)).unwrap();
        roster.register_self(peer(1));
        assert_eq!(roster.members(), vec![peer(1)]);
        assert_eq!(roster.current_selection(), None);
    }

    #[test]
    fn leave_clears_selection() {
        let roster = Roster::new();
        roster.on_peer_joined(peer(1));
        roster.on_peer_joined(peer(2));
        roster.select(peer(1)).unwrap();

        assert_eq!(roster.on_peer_left(peer(1)), Departure::RemovedSelected);
        assert_eq!(roster.current_selection(), None);
        assert_eq!(roster.members(), vec![peer(2)]);
    }

    #[test]
    fn leave_of_other_peer_keeps_selection() {
        let roster = Roster::new();
        roster.on_peer_joined(peer(1));
        roster.on_peer_joined(peer(2));
        roster.select(peer(1)).unwrap();

        assert_eq!(roster.on_peer_left(peer(2)), Departure::Removed);
        assert_eq!(roster.current_selection(), Some(peer(1)));
    }

    #[test]
    fn leave_unknown_is_noop() {
        let roster = Roster::new();
        roster.on_peer_joined(peer(1));
        assert_eq!(roster.on_peer_left(peer(5)), Departure::Absent);
        assert_eq!(roster.members(), vec![peer(1)]);
    }

    #[test]
    fn self_leaving_clears_self_entry() {
        let roster = Roster::new();
        roster.register_self(peer(0));
        roster.on_peer_left(peer(0));
        assert_eq!(roster.self_id(), None);
        assert!(roster.members().is_empty());
    }

    #[test]
    fn select_non_member_fails_and_keeps_selection() {
        let roster = Roster::new();
        roster.on_peer_joined(peer(1));
        roster.select(peer(1)).unwrap();

        assert_eq!(roster.select(peer(7)), Err(RosterError::NotAMember(peer(7))));
        assert_eq!(roster.current_selection(), Some(peer(1)));
    }

    #[test]
    fn entries_highlight_self() {
        let roster = Roster::new();
        roster.register_self(peer(0));
        roster.on_peer_joined(peer(1));

        let entries = roster.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_self);
        assert_eq!(entries[0].colour, DisplayColour::Mesh(ColourState::Blue));
        assert_eq!(entries[1].colour, DisplayColour::TextLight);
        assert_eq!(entries[1].label, short_id(&peer(1)));
    }

    #[test]
    fn concurrent_joins_and_leaves_stay_deduplicated() {
        use std::sync::Arc;

        let roster = Arc::new(Roster::new());
        let handles: Vec<_> = (0..8u8)
            .map(|t| {
                let roster = Arc::clone(&roster);
                std::thread::spawn(move || {
                    for i in 0..50u8 {
                        roster.on_peer_joined(peer(i % 10));
                        if t % 2 == 0 {
                            roster.on_peer_left(peer((i + t) % 10));
                        }
                        let _ = roster.select(peer(i % 10));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let members = roster.members();
        let mut deduped = members.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(members.len(), deduped.len());
        if let Some(sel) = roster.current_selection() {
            assert!(members.contains(&sel));
        }
    }
}
