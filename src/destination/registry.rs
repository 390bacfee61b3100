//! Destination registry.
//!
//! # Responsibilities
//! - Hold exactly one committed snapshot of the destination set
//! - Hand out the current snapshot without blocking
//! - Replace the snapshot wholesale on commit
//!
//! # Design Decisions
//! - `ArcSwap` pointer: readers never lock and never see a half-written set
//! - No validation here; proposals are validated before they reach a commit

use arc_swap::ArcSwap;
use serde::Serialize;
use std::sync::Arc;

use crate::destination::Destination;
use crate::observability::metrics;

/// An immutable, fully-formed destination set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Commit counter, 0 for the empty set present before the first commit.
    pub generation: u64,
    pub destinations: Vec<Destination>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Destination> {
        self.destinations.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Destination> {
        self.destinations.iter().find(|d| d.name() == name)
    }
}

/// The shared pointer to the current snapshot.
#[derive(Debug, Default)]
pub struct DestinationRegistry {
    current: ArcSwap<Snapshot>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest committed snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Replace the current snapshot. Returns the generation assigned to it.
    pub fn commit(&self, destinations: Vec<Destination>) -> u64 {
        let count = destinations.len();
        let previous = self.current.rcu(|cur| Snapshot {
            generation: cur.generation + 1,
            destinations: destinations.clone(),
        });
        let generation = previous.generation + 1;

        metrics::set_destinations(count);
        tracing::debug!(generation, destinations = count, "Registry snapshot committed");
        generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn dest(name: &str, address: &str) -> Destination {
        Destination::new(name, address).unwrap()
    }

    #[test]
    fn starts_empty_and_replaces_wholesale() {
        let registry = DestinationRegistry::new();
        assert_eq!(registry.current().generation, 0);
        assert!(registry.current().is_empty());

        let g1 = registry.commit(vec![dest("a", "10.0.0.1:100"), dest("b", "10.0.0.2:100")]);
        let g2 = registry.commit(vec![dest("c", "10.0.0.3:100")]);
        assert_eq!((g1, g2), (1, 2));

        let current = registry.current();
        assert_eq!(current.generation, 2);
        assert_eq!(current.destinations, vec![dest("c", "10.0.0.3:100")]);
        assert!(current.get("a").is_none());
    }

    #[test]
    fn held_snapshot_survives_later_commit() {
        let registry = DestinationRegistry::new();
        registry.commit(vec![dest("a", "10.0.0.1:100")]);
        let held = registry.current();
        registry.commit(Vec::new());

        assert_eq!(held.len(), 1);
        assert!(registry.current().is_empty());
    }

    #[test]
    fn concurrent_commits_never_mix_snapshots() {
        let registry = Arc::new(DestinationRegistry::new());

        // Each writer commits sets whose entries all share the writer's tag.
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let set = (0..3)
                            .map(|j| dest(&format!("w{w}-{j}"), &format!("10.0.{w}.{i}:{}", 1000 + j)))
                            .collect();
                        registry.commit(set);
                    }
                })
            })
            .collect();

        let reader = {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..2000 {
                    let snap = registry.current();
                    if let Some(first) = snap.destinations.first() {
                        let tag = first.name().split('-').next().unwrap().to_string();
                        let third = first.address().rsplit_once('.').unwrap().0.to_string();
                        assert_eq!(snap.len(), 3);
                        for d in snap.iter() {
                            assert!(d.name().starts_with(&tag));
                            assert!(d.address().starts_with(&third));
                        }
                    }
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(registry.current().generation, 800);
    }
}
