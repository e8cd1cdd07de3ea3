//! Bounded memory of agreements this keeper has seen settled.
//!
//! Purely an optimization: a forgotten agreement is simply polled again,
//! and its engine answers "not ready" forever after finalization. The
//! cache keeps long-running keepers from re-checking every historical sale
//! on every round.

use std::collections::{HashSet, VecDeque};

use drivefi_types::AgreementId;

/// Insertion-ordered set with oldest-first eviction.
pub struct SettledCache {
    settled: HashSet<AgreementId>,
    /// Front = oldest.
    order: VecDeque<AgreementId>,
    max_size: usize,
}

impl SettledCache {
    /// # Panics
    /// Panics if `max_size` is zero.
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "SettledCache max_size must be > 0");
        Self {
            settled: HashSet::with_capacity(max_size),
            order: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Remember `id`. Returns `false` if it was already known.
    pub fn insert(&mut self, id: AgreementId) -> bool {
        if self.settled.contains(&id) {
            return false;
        }

        if self.settled.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.settled.remove(&oldest);
            }
        }

        self.settled.insert(id);
        self.order.push_back(id);
        true
    }

    pub fn contains(&self, id: &AgreementId) -> bool {
        self.settled.contains(id)
    }

    pub fn len(&self) -> usize {
        self.settled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> AgreementId {
        AgreementId::from_bytes([n; 16])
    }

    #[test]
    fn insert_once() {
        let mut cache = SettledCache::new(10);
        assert!(cache.insert(id(1)));
        assert!(!cache.insert(id(1)));
        assert!(cache.contains(&id(1)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_oldest() {
        let mut cache = SettledCache::new(3);
        for n in 1..=3 {
            cache.insert(id(n));
        }
        assert_eq!(cache.len(), 3);

        cache.insert(id(4));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&id(1)));
        assert!(cache.contains(&id(2)));
        assert!(cache.contains(&id(4)));

        // An evicted id can be remembered again.
        assert!(cache.insert(id(1)));
        assert!(!cache.contains(&id(2)));
    }

    #[test]
    #[should_panic(expected = "max_size must be > 0")]
    fn zero_capacity_panics() {
        let _ = SettledCache::new(0);
    }
}
