use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::error::StoreError;
use super::types::Consistency;

/// Tracks which replicas of a keyspace are reachable and picks the replicas an
/// operation contacts for a given consistency level.
pub struct ReplicaSet {
    up: Vec<AtomicBool>,
    next_read: AtomicUsize,
}

impl ReplicaSet {
    pub fn new(replication_factor: usize) -> Self {
        Self {
            up: (0..replication_factor).map(|_| AtomicBool::new(true)).collect(),
            next_read: AtomicUsize::new(0),
        }
    }

    pub fn replication_factor(&self) -> usize {
        self.up.len()
    }

    pub fn set_available(&self, replica: usize, available: bool) -> Result<(), StoreError> {
        let flag = self.up.get(replica).ok_or_else(|| {
            StoreError::InvalidQuery(format!(
                "replica {} out of range (replication factor {})",
                replica,
                self.up.len()
            ))
        })?;
        flag.store(available, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_available(&self, replica: usize) -> bool {
        self.up
            .get(replica)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    pub fn available(&self) -> Vec<usize> {
        (0..self.up.len())
            .filter(|&replica| self.is_available(replica))
            .collect()
    }

    fn ensure(&self, consistency: Consistency) -> Result<(Vec<usize>, usize), StoreError> {
        let alive = self.available();
        let required = consistency.required_replicas(self.up.len());
        if alive.len() < required {
            return Err(StoreError::Unavailable {
                consistency,
                required,
                alive: alive.len(),
            });
        }
        Ok((alive, required))
    }

    /// Every available replica receives a write; the write fails up front if fewer than
    /// the level requires are up.
    pub fn write_targets(&self, consistency: Consistency) -> Result<Vec<usize>, StoreError> {
        self.ensure(consistency).map(|(alive, _)| alive)
    }

    /// Reads contact exactly as many replicas as the level requires, rotating the
    /// starting replica between calls.
    pub fn read_targets(&self, consistency: Consistency) -> Result<Vec<usize>, StoreError> {
        let (alive, required) = self.ensure(consistency)?;
        let start = self.next_read.fetch_add(1, Ordering::Relaxed) % alive.len();
        Ok(alive
            .iter()
            .cycle()
            .skip(start)
            .take(required)
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_read_targets_are_distinct() {
        let replicas = ReplicaSet::new(3);

        for _ in 0..6 {
            let mut targets = replicas.read_targets(Consistency::Quorum).unwrap();
            assert_eq!(targets.len(), 2);
            targets.dedup();
            assert_eq!(targets.len(), 2);
        }
    }

    #[test]
    fn test_write_targets_skip_down_replicas() {
        let replicas = ReplicaSet::new(3);
        replicas.set_available(1, false).unwrap();

        let targets = replicas.write_targets(Consistency::EachQuorum).unwrap();
        assert_eq!(targets, vec![0, 2]);

        replicas.set_available(2, false).unwrap();
        let err = replicas.write_targets(Consistency::EachQuorum).unwrap_err();
        assert_eq!(
            err,
            StoreError::Unavailable {
                consistency: Consistency::EachQuorum,
                required: 2,
                alive: 1,
            }
        );

        assert!(replicas.write_targets(Consistency::One).is_ok());
    }

    #[test]
    fn test_replica_out_of_range() {
        let replicas = ReplicaSet::new(1);
        assert!(replicas.set_available(3, false).is_err());
    }
}
