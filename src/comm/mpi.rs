//! MPI-backed collective service (enable with the `mpi` cargo feature).
//!
//! Payloads travel as bincode-serialized byte buffers so receivers never
//! need to know sizes up front; reductions go element-wise over the
//! re-interpreted real/imaginary parts.

use mpi::collective::SystemOperation;
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator, CommunicatorCollectives, Root};
use num_complex::Complex64;

use crate::comm::{CollectiveService, ProcessGroup, Rank};
use crate::errors::{Error, Result};

fn comm_err(op: &str, reason: impl ToString) -> Error {
    Error::ExecutionFailure {
        op: op.to_string(),
        tensor: String::new(),
        reason: reason.to_string(),
    }
}

/// Collectives over the world communicator. Process groups address rank
/// subsets of the world; the communicator itself stays opaque to the rest
/// of the crate.
pub struct MpiCollectives {
    world: SimpleCommunicator,
}

impl MpiCollectives {
    pub fn new(world: SimpleCommunicator) -> Self {
        Self { world }
    }
}

impl CollectiveService for MpiCollectives {
    fn rank(&self) -> Rank {
        self.world.rank()
    }

    fn num_processes(&self) -> usize {
        self.world.size() as usize
    }

    fn presence_gap(&self, group: &ProcessGroup, exists_locally: bool) -> Option<Rank> {
        let mut flags = vec![0i32; self.world.size() as usize];
        self.world
            .all_gather_into(&(exists_locally as i32), &mut flags[..]);
        flags
            .iter()
            .enumerate()
            .find(|&(rank, &flag)| flag == 0 && group.contains(rank as Rank))
            .map(|(rank, _)| rank as Rank)
    }

    fn broadcast(
        &self,
        _group: &ProcessGroup,
        data: &mut Vec<Complex64>,
        root: Rank,
    ) -> Result<()> {
        let root_process = self.world.process_at_rank(root);

        // Broadcast the serialized length first so receivers can size
        // their buffers.
        let mut raw = if self.world.rank() == root {
            bincode::serialize(data).map_err(|e| comm_err("broadcast", e))?
        } else {
            Vec::new()
        };
        let mut len = raw.len();
        root_process.broadcast_into(&mut len);
        raw.resize(len, 0);
        root_process.broadcast_into(&mut raw[..]);

        if self.world.rank() != root {
            *data = bincode::deserialize(&raw).map_err(|e| comm_err("broadcast", e))?;
        }
        Ok(())
    }

    fn allreduce(&self, _group: &ProcessGroup, data: &mut [Complex64]) -> Result<()> {
        let send: Vec<f64> = data.iter().flat_map(|c| [c.re, c.im]).collect();
        let mut recv = vec![0f64; send.len()];
        self.world
            .all_reduce_into(&send[..], &mut recv[..], SystemOperation::sum());
        for (value, pair) in data.iter_mut().zip(recv.chunks_exact(2)) {
            *value = Complex64::new(pair[0], pair[1]);
        }
        Ok(())
    }
}
