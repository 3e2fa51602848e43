//! Tensor network numerical server.
//!
//! The crate models tensor networks symbolically (vector spaces, tensors,
//! networks, expansions, operators), plans pairwise contraction orders and
//! executes the resulting primitive tensor operations asynchronously on a
//! dependency graph, optionally across cooperating processes.

pub mod backend;
pub mod comm;
pub mod contractionpath;
pub mod errors;
pub mod operation;
pub mod runtime;
pub mod server;
pub mod spaces;
pub mod symbolic;
pub mod tensornetwork;
pub mod types;
mod utils;

pub use errors::{Error, Result};
pub use server::NumServer;
