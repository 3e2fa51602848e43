//! Contraction path finders.

use rustc_hash::FxHashSet;

use crate::contractionpath::contraction_cost::path_cost;
use crate::contractionpath::PathInputs;
use crate::errors::{Error, Result};
use crate::types::{ContrTriple, VertexId};

pub mod bisection;
pub mod greedy;
pub mod sequential;

/// An optimizer for finding a contraction path.
pub trait OptimizePath {
    /// Finds a contraction path.
    fn optimize_path(&mut self);

    /// Returns the best found contraction path.
    fn best_path(&self) -> &[ContrTriple];

    /// Returns the total flop proxy of the best path found.
    fn best_flops(&self) -> f64;

    /// Returns the peak memory proxy of the best path found.
    fn best_size(&self) -> f64;
}

/// The cost metric to optimize for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CostType {
    /// Number of flops or operations.
    #[default]
    Flops,
    /// Size of the biggest contraction.
    Size,
}

/// The interchangeable planning strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OptimizerKind {
    /// Trivial left-to-right order.
    Sequential,
    /// Heap-driven cost-greedy search.
    #[default]
    Greedy,
    /// Recursive graph bisection for large networks.
    Bisection,
}

impl OptimizerKind {
    /// Resolves a strategy by its registered name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "sequential" => Ok(OptimizerKind::Sequential),
            "greedy" => Ok(OptimizerKind::Greedy),
            "bisection" => Ok(OptimizerKind::Bisection),
            _ => Err(Error::UnknownEntity(format!(
                "contraction-sequence optimizer '{name}'"
            ))),
        }
    }
}

/// Runs the selected strategy over the inputs and returns the path with
/// its flop and memory costs.
pub fn optimize(kind: OptimizerKind, inputs: &PathInputs) -> (Vec<ContrTriple>, f64, f64) {
    match kind {
        OptimizerKind::Sequential => {
            let mut opt = sequential::Sequential::new(inputs);
            opt.optimize_path();
            (opt.best_path().to_vec(), opt.best_flops(), opt.best_size())
        }
        OptimizerKind::Greedy => {
            let mut opt = greedy::Greedy::new(inputs, CostType::Flops);
            opt.optimize_path();
            (opt.best_path().to_vec(), opt.best_flops(), opt.best_size())
        }
        OptimizerKind::Bisection => {
            let mut opt = bisection::Bisection::new(inputs);
            opt.optimize_path();
            (opt.best_path().to_vec(), opt.best_flops(), opt.best_size())
        }
    }
}

/// Asserts that a path consumes every input exactly once, introduces every
/// intermediate before use and ends in the output id 0.
pub(crate) fn validate_path(inputs: &PathInputs, path: &[ContrTriple]) {
    assert!(
        inputs.ids.len() >= 2,
        "a contraction path needs at least two inputs"
    );
    assert_eq!(path.len(), inputs.ids.len() - 1, "path length mismatch");
    let mut alive: FxHashSet<VertexId> = inputs.ids.iter().copied().collect();
    for (i, step) in path.iter().enumerate() {
        assert!(
            alive.remove(&step.left_id),
            "contracting a consumed or unknown id: {step:?} in {path:?}"
        );
        assert!(
            alive.remove(&step.right_id),
            "contracting a consumed or unknown id: {step:?} in {path:?}"
        );
        let expected = if i + 1 == path.len() { 0 } else { step.result_id };
        assert_eq!(step.result_id, expected, "only the last step may write the output");
        assert!(
            alive.insert(step.result_id),
            "result id {} reused in {path:?}",
            step.result_id
        );
    }
}

/// Replays a path to compute its costs and validates it on the way.
pub(crate) fn finish(inputs: &PathInputs, path: Vec<ContrTriple>) -> (Vec<ContrTriple>, f64, f64) {
    validate_path(inputs, &path);
    let (flops, size) = path_cost(inputs, &path);
    (path, flops, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::contr;
    use crate::contractionpath::EdgeTensor;

    fn setup() -> PathInputs {
        PathInputs {
            ids: vec![1, 2, 3],
            tensors: vec![
                EdgeTensor::new(vec![0, 1]),
                EdgeTensor::new(vec![1, 2]),
                EdgeTensor::new(vec![2, 3]),
            ],
            output: EdgeTensor::new(vec![0, 3]),
            bond_dims: [(0, 2), (1, 3), (2, 4), (3, 5)].into_iter().collect(),
        }
    }

    #[test]
    fn test_validate_path_accepts_well_formed() {
        let inputs = setup();
        validate_path(&inputs, &contr![(4, 1, 2), (0, 4, 3)]);
    }

    #[test]
    #[should_panic(expected = "consumed or unknown id")]
    fn test_validate_path_rejects_reuse() {
        let inputs = setup();
        validate_path(&inputs, &contr![(4, 1, 2), (0, 1, 3)]);
    }

    #[test]
    fn test_optimizer_kind_from_name() {
        assert_eq!(
            OptimizerKind::from_name("greedy").unwrap(),
            OptimizerKind::Greedy
        );
        assert!(OptimizerKind::from_name("metis").is_err());
    }
}
