//! Process groups and the collective-communication service.
//!
//! The transport itself is an external collaborator: the runtime only
//! needs the small [CollectiveService] surface below. [LocalCollectives]
//! serves the single-process case; an MPI-backed service is available
//! behind the `mpi` cargo feature.

use num_complex::Complex64;

use crate::errors::Result;

#[cfg(feature = "mpi")]
pub mod mpi;

/// Rank of a process within its process group.
pub type Rank = i32;

/// An ordered set of cooperating worker processes sharing a
/// collective-communication context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessGroup {
    ranks: Vec<Rank>,
}

impl ProcessGroup {
    pub fn new(ranks: Vec<Rank>) -> Self {
        Self { ranks }
    }

    /// The group containing only the calling process.
    pub fn self_group() -> Self {
        Self { ranks: vec![0] }
    }

    /// The group of all `size` cooperating processes.
    pub fn world(size: usize) -> Self {
        Self {
            ranks: (0..size as Rank).collect(),
        }
    }

    pub fn size(&self) -> usize {
        self.ranks.len()
    }

    pub fn ranks(&self) -> &[Rank] {
        &self.ranks
    }

    pub fn contains(&self, rank: Rank) -> bool {
        self.ranks.contains(&rank)
    }
}

/// Collective operations over an opaque process group. All results are
/// atomic all-or-nothing per group.
pub trait CollectiveService: Send + Sync {
    /// Rank of the calling process.
    fn rank(&self) -> Rank;

    /// Total number of cooperating processes.
    fn num_processes(&self) -> usize;

    /// Checks whether `exists_locally` holds on every rank of `group` and
    /// returns the first rank where it does not.
    fn presence_gap(&self, group: &ProcessGroup, exists_locally: bool) -> Option<Rank>;

    /// Broadcasts `data` from `root` to every rank of `group`; receivers
    /// may pass an empty buffer.
    fn broadcast(&self, group: &ProcessGroup, data: &mut Vec<Complex64>, root: Rank) -> Result<()>;

    /// Element-wise sum reduction of `data` across `group`; every rank
    /// ends up with the same reduced buffer.
    fn allreduce(&self, group: &ProcessGroup, data: &mut [Complex64]) -> Result<()>;
}

/// Single-process collective service: rank 0 of a world of one, all
/// collectives are no-ops.
#[derive(Debug, Default)]
pub struct LocalCollectives;

impl CollectiveService for LocalCollectives {
    fn rank(&self) -> Rank {
        0
    }

    fn num_processes(&self) -> usize {
        1
    }

    fn presence_gap(&self, _group: &ProcessGroup, exists_locally: bool) -> Option<Rank> {
        (!exists_locally).then_some(0)
    }

    fn broadcast(
        &self,
        _group: &ProcessGroup,
        _data: &mut Vec<Complex64>,
        _root: Rank,
    ) -> Result<()> {
        Ok(())
    }

    fn allreduce(&self, _group: &ProcessGroup, _data: &mut [Complex64]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_world_group() {
        let group = ProcessGroup::world(4);
        assert_eq!(group.size(), 4);
        assert!(group.contains(3));
        assert!(!group.contains(4));
    }

    #[test]
    fn test_local_presence_gap() {
        let service = LocalCollectives;
        let group = ProcessGroup::self_group();
        assert_eq!(service.presence_gap(&group, true), None);
        assert_eq!(service.presence_gap(&group, false), Some(0));
    }
}
