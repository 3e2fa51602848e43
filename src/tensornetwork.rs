//! Symbolic tensor algebra: tensors, networks, expansions and operators.

pub mod expansion;
pub mod network;
pub mod operator;
pub mod tensor;

pub use expansion::TensorExpansion;
pub use network::TensorNetwork;
pub use operator::TensorOperator;
pub use tensor::{Tensor, TensorHandle};
