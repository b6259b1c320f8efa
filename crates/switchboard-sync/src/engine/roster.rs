use super::Change;
use crate::models::ConversationSummary;
use std::collections::{HashMap, HashSet};
use switchboard_http::ConversationRecord;
use tracing::debug;

/// Canonical conversation roster keyed by id.
#[derive(Debug, Default)]
pub(crate) struct Roster {
    entries: HashMap<u64, ConversationSummary>,
    /// Ids referenced by a push since the last roster snapshot.
    pushed_since_snapshot: HashSet<u64>,
}

impl Roster {
    /// Replace the roster with a full listing.
    ///
    /// Ids missing from the listing are removed unless a push referenced
    /// them since the previous snapshot; those get one more snapshot to
    /// show up.
    pub fn apply_snapshot(&mut self, records: &[ConversationRecord]) -> Vec<Change> {
        let mut changes = Vec::new();
        let mut listed = HashSet::with_capacity(records.len());

        for record in records {
            listed.insert(record.id);
            let current = ConversationSummary::from_record(record);
            match self.entries.insert(record.id, current.clone()) {
                None => changes.push(Change::ConversationAdded(current)),
                Some(previous) if previous != current => {
                    changes.push(Change::ConversationUpdated { previous, current })
                }
                Some(_) => {}
            }
        }

        let mut missing: Vec<u64> = self
            .entries
            .keys()
            .filter(|id| !listed.contains(id))
            .copied()
            .collect();
        missing.sort_unstable();

        for id in missing {
            if self.pushed_since_snapshot.contains(&id) {
                debug!("[Engine] Keeping conversation {} absent from snapshot (recent push)", id);
                continue;
            }
            if let Some(removed) = self.entries.remove(&id) {
                changes.push(Change::ConversationRemoved(removed));
            }
        }

        self.pushed_since_snapshot.clear();
        changes
    }

    /// Patch or insert from a push event.
    pub fn apply_push(&mut self, record: &ConversationRecord) -> Option<Change> {
        self.note_push(record.id);
        match self.entries.get_mut(&record.id) {
            Some(entry) => {
                let previous = entry.clone();
                entry.patch(record);
                if *entry == previous {
                    return None;
                }
                Some(Change::ConversationUpdated {
                    previous,
                    current: entry.clone(),
                })
            }
            None => {
                let summary = ConversationSummary::from_record(record);
                self.entries.insert(record.id, summary.clone());
                Some(Change::ConversationAdded(summary))
            }
        }
    }

    pub fn note_push(&mut self, id: u64) {
        self.pushed_since_snapshot.insert(id);
    }

    /// Every entry, ordered by id.
    pub fn all(&self) -> Vec<ConversationSummary> {
        let mut all: Vec<_> = self.entries.values().cloned().collect();
        all.sort_by_key(|c| c.id);
        all
    }

    /// Non-closed entries, most recently updated first.
    pub fn active(&self) -> Vec<ConversationSummary> {
        let mut active: Vec<_> = self
            .entries
            .values()
            .filter(|c| c.is_active())
            .cloned()
            .collect();
        active.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        active
    }
}
