//! Cost model for pairwise contractions.
//!
//! The per-step flop proxy is the product of the extents of the union of
//! both operands' legs; the memory proxy is the combined size of both
//! operands and the result. Both are monotonic in the operand sizes, which
//! is all the optimizers rely on.

use rustc_hash::FxHashMap;

use crate::contractionpath::{EdgeTensor, PathInputs};
use crate::types::{ContrTriple, DimExtent, EdgeId, VertexId};

/// Flop proxy of contracting two edge tensors.
pub fn contract_flops(
    t_1: &EdgeTensor,
    t_2: &EdgeTensor,
    bond_dims: &FxHashMap<EdgeId, DimExtent>,
) -> f64 {
    (t_1 | t_2).size(bond_dims)
}

/// Memory proxy of contracting two edge tensors.
pub fn contract_size(
    t_1: &EdgeTensor,
    t_2: &EdgeTensor,
    bond_dims: &FxHashMap<EdgeId, DimExtent>,
) -> f64 {
    let result = t_1 ^ t_2;
    t_1.size(bond_dims) + t_2.size(bond_dims) + result.size(bond_dims)
}

/// Replays a contraction sequence over the inputs and returns the summed
/// flop cost and the peak memory cost.
///
/// # Panics
/// Panics if the sequence references an id that was never produced or
/// consumes an id twice; such a sequence is a planner bug.
pub fn path_cost(inputs: &PathInputs, path: &[ContrTriple]) -> (f64, f64) {
    let mut alive: FxHashMap<VertexId, EdgeTensor> = inputs
        .ids
        .iter()
        .copied()
        .zip(inputs.tensors.iter().cloned())
        .collect();

    let mut flops = 0f64;
    let mut mem = 0f64;
    for step in path {
        let left = alive
            .remove(&step.left_id)
            .unwrap_or_else(|| panic!("id {} is not alive in {path:?}", step.left_id));
        let right = alive
            .remove(&step.right_id)
            .unwrap_or_else(|| panic!("id {} is not alive in {path:?}", step.right_id));
        flops += contract_flops(&left, &right, &inputs.bond_dims);
        let step_mem = contract_size(&left, &right, &inputs.bond_dims);
        if step_mem > mem {
            mem = step_mem;
        }
        alive.insert(step.result_id, &left ^ &right);
    }
    (flops, mem)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::contr;

    fn setup_chain() -> PathInputs {
        // A(10x20) -- B(20x5) -- C(5x30), edges 0:10, 1:20, 2:5, 3:30.
        PathInputs {
            ids: vec![1, 2, 3],
            tensors: vec![
                EdgeTensor::new(vec![0, 1]),
                EdgeTensor::new(vec![1, 2]),
                EdgeTensor::new(vec![2, 3]),
            ],
            output: EdgeTensor::new(vec![0, 3]),
            bond_dims: [(0, 10), (1, 20), (2, 5), (3, 30)].into_iter().collect(),
        }
    }

    #[test]
    fn test_pairwise_costs() {
        let inputs = setup_chain();
        assert_eq!(
            contract_flops(&inputs.tensors[0], &inputs.tensors[1], &inputs.bond_dims),
            1000.0
        );
        assert_eq!(
            contract_size(&inputs.tensors[0], &inputs.tensors[1], &inputs.bond_dims),
            200.0 + 100.0 + 50.0
        );
    }

    #[test]
    fn test_path_cost_orders_differ() {
        let inputs = setup_chain();
        // (A*B)*C is cheap, A*(B*C) is expensive for this chain.
        let (cheap, _) = path_cost(&inputs, &contr![(4, 1, 2), (0, 4, 3)]);
        let (expensive, _) = path_cost(&inputs, &contr![(4, 2, 3), (0, 1, 4)]);
        assert_eq!(cheap, 1000.0 + 1500.0);
        assert_eq!(expensive, 3000.0 + 6000.0);
        assert!(cheap < expensive);
    }

    #[test]
    #[should_panic(expected = "is not alive")]
    fn test_path_cost_rejects_double_consumption() {
        let inputs = setup_chain();
        path_cost(&inputs, &contr![(4, 1, 2), (0, 1, 3)]);
    }
}
