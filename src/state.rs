use std::collections::HashSet;

use crate::store::{IdSet, IdStore};

/// Dedup state threaded through every poll cycle.
///
/// `notified` holds ids already surfaced to the operator; `responded` holds ids
/// the bot has applied to (or found already applied to). Mutated in memory
/// during a cycle and flushed once at its end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupState {
    notified: HashSet<String>,
    responded: HashSet<String>,
}

impl DedupState {
    pub fn new(notified: HashSet<String>, responded: HashSet<String>) -> Self {
        Self {
            notified,
            responded,
        }
    }

    pub fn load(store: &IdStore) -> Self {
        Self::new(store.load(IdSet::Notified), store.load(IdSet::Responded))
    }

    /// Persist both sets.
    pub fn flush(&self, store: &IdStore) {
        store.save(&self.notified, IdSet::Notified);
        store.save(&self.responded, IdSet::Responded);
    }

    pub fn is_notified(&self, id: &str) -> bool {
        self.notified.contains(id)
    }

    pub fn is_responded(&self, id: &str) -> bool {
        self.responded.contains(id)
    }

    pub fn mark_notified(&mut self, id: &str) {
        self.notified.insert(id.to_string());
    }

    pub fn mark_responded(&mut self, id: &str) {
        self.responded.insert(id.to_string());
    }

    /// The portal already has a response on file: record it in both sets.
    pub fn mark_already_responded(&mut self, id: &str) {
        self.mark_notified(id);
        self.mark_responded(id);
    }

    pub fn notified(&self) -> &HashSet<String> {
        &self.notified
    }

    pub fn responded(&self) -> &HashSet<String> {
        &self.responded
    }
}
