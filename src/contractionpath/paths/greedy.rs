use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::contractionpath::contraction_cost::{contract_flops, contract_size};
use crate::contractionpath::paths::{finish, CostType, OptimizePath};
use crate::contractionpath::{EdgeTensor, PathInputs};
use crate::types::{ContrTriple, VertexId};

/// A candidate pair contraction. The ordering is reversed so that popping
/// from a max-heap yields the cheapest candidate; ties break on the
/// secondary cost and then on the vertex ids, keeping the search fully
/// deterministic.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    cost: f64,
    tie: f64,
    pair: (VertexId, VertexId),
    stamps: (u64, u64),
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.tie.total_cmp(&self.tie))
            .then_with(|| other.pair.cmp(&self.pair))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Cost-greedy search: repeatedly contracts the cheapest available pair,
/// preferring pairs that share an edge. Candidates carry generation stamps
/// so that entries referring to already-consumed tensors are skipped
/// instead of invalidated in place.
pub struct Greedy<'a> {
    inputs: &'a PathInputs,
    minimize: CostType,
    best_path: Vec<ContrTriple>,
    best_flops: f64,
    best_size: f64,
}

impl<'a> Greedy<'a> {
    pub fn new(inputs: &'a PathInputs, minimize: CostType) -> Self {
        Self {
            inputs,
            minimize,
            best_path: Vec::new(),
            best_flops: f64::MAX,
            best_size: f64::MAX,
        }
    }

    fn candidate(
        &self,
        u: VertexId,
        v: VertexId,
        alive: &FxHashMap<VertexId, (EdgeTensor, u64)>,
    ) -> Candidate {
        let (t_u, stamp_u) = &alive[&u];
        let (t_v, stamp_v) = &alive[&v];
        let flops = contract_flops(t_u, t_v, &self.inputs.bond_dims);
        let size = contract_size(t_u, t_v, &self.inputs.bond_dims);
        let (cost, tie) = match self.minimize {
            CostType::Flops => (flops, size),
            CostType::Size => (size, flops),
        };
        let (pair, stamps) = if u < v {
            ((u, v), (*stamp_u, *stamp_v))
        } else {
            ((v, u), (*stamp_v, *stamp_u))
        };
        Candidate {
            cost,
            tie,
            pair,
            stamps,
        }
    }
}

impl OptimizePath for Greedy<'_> {
    fn optimize_path(&mut self) {
        let mut alive: FxHashMap<VertexId, (EdgeTensor, u64)> = self
            .inputs
            .ids
            .iter()
            .zip(self.inputs.tensors.iter())
            .enumerate()
            .map(|(stamp, (&id, tensor))| (id, (tensor.clone(), stamp as u64)))
            .collect();
        let mut next_stamp = alive.len() as u64;
        let mut next_id = self.inputs.first_intermediate_id();
        let mut heap = BinaryHeap::new();

        // Seed with all pairs that share an edge.
        let ids = &self.inputs.ids;
        for (i, &u) in ids.iter().enumerate() {
            for &v in &ids[i + 1..] {
                if alive[&u].0.shares_edge_with(&alive[&v].0) {
                    heap.push(self.candidate(u, v, &alive));
                }
            }
        }

        let mut path = Vec::with_capacity(ids.len().saturating_sub(1));
        while alive.len() > 1 {
            let Some(candidate) = heap.pop() else {
                // Only disconnected components remain; consider every
                // remaining pair (outer products included).
                let mut remaining: Vec<VertexId> = alive.keys().copied().collect();
                remaining.sort_unstable();
                for (i, &u) in remaining.iter().enumerate() {
                    for &v in &remaining[i + 1..] {
                        heap.push(self.candidate(u, v, &alive));
                    }
                }
                continue;
            };
            let (u, v) = candidate.pair;
            let fresh = alive.get(&u).map(|(_, s)| *s) == Some(candidate.stamps.0)
                && alive.get(&v).map(|(_, s)| *s) == Some(candidate.stamps.1);
            if !fresh {
                continue;
            }

            let (t_u, _) = alive.remove(&u).expect("checked fresh");
            let (t_v, _) = alive.remove(&v).expect("checked fresh");
            let result = &t_u ^ &t_v;
            path.push(ContrTriple {
                result_id: next_id,
                left_id: u,
                right_id: v,
            });
            alive.insert(next_id, (result, next_stamp));

            for (&other, (tensor, _)) in alive.iter() {
                if other != next_id && alive[&next_id].0.shares_edge_with(tensor) {
                    heap.push(self.candidate(next_id, other, &alive));
                }
            }
            next_id += 1;
            next_stamp += 1;
        }

        if let Some(last) = path.last_mut() {
            last.result_id = 0;
        }
        (self.best_path, self.best_flops, self.best_size) = finish(self.inputs, path);
    }

    fn best_path(&self) -> &[ContrTriple] {
        &self.best_path
    }

    fn best_flops(&self) -> f64 {
        self.best_flops
    }

    fn best_size(&self) -> f64 {
        self.best_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::contr;

    fn setup_chain() -> PathInputs {
        // A(10x20) -- B(20x5) -- C(5x30).
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

    fn setup_disconnected() -> PathInputs {
        PathInputs {
            ids: vec![1, 2],
            tensors: vec![EdgeTensor::new(vec![0]), EdgeTensor::new(vec![1])],
            output: EdgeTensor::new(vec![0, 1]),
            bond_dims: [(0, 2), (1, 3)].into_iter().collect(),
        }
    }

    #[test]
    fn test_greedy_picks_the_cheap_side_of_the_chain() {
        let inputs = setup_chain();
        let mut opt = Greedy::new(&inputs, CostType::Flops);
        opt.optimize_path();
        // Contracting A with B first (1000 flops) beats B with C (3000).
        assert_eq!(opt.best_path(), contr![(4, 1, 2), (0, 4, 3)]);
        assert_eq!(opt.best_flops(), 2500.0);
    }

    #[test]
    fn test_greedy_handles_outer_products() {
        let inputs = setup_disconnected();
        let mut opt = Greedy::new(&inputs, CostType::Flops);
        opt.optimize_path();
        assert_eq!(opt.best_path(), contr![(0, 1, 2)]);
    }

    #[test]
    fn test_greedy_is_deterministic() {
        let inputs = setup_chain();
        let mut first = Greedy::new(&inputs, CostType::Flops);
        first.optimize_path();
        let mut second = Greedy::new(&inputs, CostType::Flops);
        second.optimize_path();
        assert_eq!(first.best_path(), second.best_path());
    }
}
