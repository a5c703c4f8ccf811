//! Bijective mapping between replicas and shareholders

use std::collections::BTreeMap;

use shroud_core::{ReplicaId, Shareholder};

use crate::error::{Result, VssError};

/// Replica ↔ shareholder map for the current membership
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareholderDirectory {
    by_replica: BTreeMap<ReplicaId, Shareholder>,
    by_shareholder: BTreeMap<Shareholder, ReplicaId>,
}

impl ShareholderDirectory {
    /// Directory giving every member its default shareholder (`id + 1`)
    pub fn from_members(members: &[ReplicaId]) -> Result<Self> {
        let mut directory = Self::default();
        for &replica in members {
            directory.add(replica, Shareholder::for_replica(replica)?)?;
        }
        Ok(directory)
    }

    /// Add a member; both sides must be unused
    pub fn add(&mut self, replica: ReplicaId, shareholder: Shareholder) -> Result<()> {
        if let Some(existing) = self.by_replica.get(&replica) {
            return Err(VssError::Configuration(format!(
                "replica {replica} already holds shareholder {existing}"
            )));
        }
        if let Some(existing) = self.by_shareholder.get(&shareholder) {
            return Err(VssError::Configuration(format!(
                "shareholder {shareholder} already assigned to replica {existing}"
            )));
        }
        self.by_replica.insert(replica, shareholder);
        self.by_shareholder.insert(shareholder, replica);
        Ok(())
    }

    pub fn shareholder(&self, replica: ReplicaId) -> Option<Shareholder> {
        self.by_replica.get(&replica).copied()
    }

    pub fn replica(&self, shareholder: Shareholder) -> Option<ReplicaId> {
        self.by_shareholder.get(&shareholder).copied()
    }

    /// Members in ascending replica order
    pub fn replicas(&self) -> Vec<ReplicaId> {
        self.by_replica.keys().copied().collect()
    }

    /// Shareholders in ascending order
    pub fn shareholders(&self) -> Vec<Shareholder> {
        self.by_shareholder.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_replica.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_replica.is_empty()
    }

    pub fn contains(&self, replica: ReplicaId) -> bool {
        self.by_replica.contains_key(&replica)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping() {
        let dir = ShareholderDirectory::from_members(&[0, 1, 2, 3]).unwrap();
        assert_eq!(dir.shareholder(2).unwrap().id(), 3);
        assert_eq!(dir.replica(Shareholder::new(1).unwrap()), Some(0));
        assert_eq!(dir.len(), 4);
        assert!(dir.shareholder(9).is_none());
    }

    #[test]
    fn test_bijection_enforced() {
        let mut dir = ShareholderDirectory::from_members(&[0, 1]).unwrap();
        assert!(dir.add(1, Shareholder::new(10).unwrap()).is_err());
        assert!(dir.add(5, Shareholder::new(2).unwrap()).is_err());
        dir.add(5, Shareholder::new(10).unwrap()).unwrap();
        assert_eq!(dir.replica(Shareholder::new(10).unwrap()), Some(5));
    }
}
