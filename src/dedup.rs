use std::collections::{HashSet, VecDeque};

/// How many identities the RSS feature remembers.
pub const DEFAULT_MAX_KEEP: usize = 500;

/// Bounded set of already-broadcast identities.
///
/// Eviction follows insertion order, not access order: once the cap is hit
/// the oldest inserted identity is dropped first.
#[derive(Debug, Clone)]
pub struct DedupLedger {
    order: VecDeque<String>,
    members: HashSet<String>,
    max_keep: usize,
}

impl DedupLedger {
    pub fn new(max_keep: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            max_keep: max_keep.max(1),
        }
    }

    /// Rebuild from a persisted list (oldest first), keeping only the newest
    /// `max_keep` entries.
    pub fn from_persisted<I, S>(persisted: I, max_keep: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ledger = Self::new(max_keep);
        for identity in persisted {
            ledger.insert(identity.into());
        }
        ledger.evict_to_cap();
        ledger
    }

    pub fn seen(&self, identity: &str) -> bool {
        self.members.contains(identity)
    }

    /// Record an identity. Returns `false` if it was already present.
    pub fn mark(&mut self, identity: impl Into<String>) -> bool {
        let inserted = self.insert(identity.into());
        self.evict_to_cap();
        inserted
    }

    fn insert(&mut self, identity: String) -> bool {
        if self.members.contains(&identity) {
            return false;
        }
        self.members.insert(identity.clone());
        self.order.push_back(identity);
        true
    }

    /// Drop the oldest entries until the ledger fits its cap.
    pub fn evict_to_cap(&mut self) -> usize {
        let mut evicted = 0;
        while self.order.len() > self.max_keep {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
                evicted += 1;
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn max_keep(&self) -> usize {
        self.max_keep
    }

    /// Entries oldest first, in the shape written back to the feature file.
    pub fn to_persisted(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }
}

impl Default for DedupLedger {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEEP)
    }
}
