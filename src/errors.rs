//! Error types shared across the crate.

use thiserror::Error;

use crate::types::SpaceId;

/// Result type for all fallible server, registry and runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the numerical server and its components.
///
/// Structural errors (`ShapeMismatch`, `Validation`, ...) are detected
/// synchronously at submission time. `ExecutionFailure` is recorded on an
/// execution node and only observed through a later `sync` on an affected
/// entity.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Destroying a space/subspace/tensor that is still referenced.
    #[error("'{name}' is still referenced by {holder}")]
    ReferentialIntegrity { name: String, holder: String },

    /// Leg extents or operator ket/bra shapes disagree.
    #[error("shape mismatch: {left} versus {right}")]
    ShapeMismatch { left: String, right: String },

    /// A network was submitted for execution without a successful finalize.
    #[error("tensor network '{0}' has not been finalized")]
    UnfinalizedNetwork(String),

    /// An operation failed its `is_set` validation at submission time.
    #[error("invalid operation: {0}")]
    Validation(String),

    /// A collective operation addressed a tensor that does not exist on
    /// every process of its process group.
    #[error("tensor '{tensor}' is missing on rank {rank} of the addressed process group")]
    DistributedPrecondition { tensor: String, rank: i32 },

    /// The backend reported failure while executing a ready node.
    #[error("execution of {op} on '{tensor}' failed: {reason}")]
    ExecutionFailure {
        op: String,
        tensor: String,
        reason: String,
    },

    /// A name lookup found no registered space, subspace or tensor.
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    /// A registered name can only have a single owner.
    #[error("name '{0}' is already registered")]
    NameTaken(String),

    /// An id lookup found no registered space or subspace.
    #[error("unknown space id {0}")]
    UnknownSpace(SpaceId),
}
