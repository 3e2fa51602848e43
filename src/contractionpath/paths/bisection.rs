use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::contractionpath::paths::{finish, CostType, OptimizePath};
use crate::contractionpath::{EdgeTensor, PathInputs};
use crate::types::{ContrTriple, VertexId};

use super::greedy::Greedy;

/// Graph-partitioning strategy for large networks: the vertex set is
/// recursively bisected along a breadth-first frontier (keeping the parts
/// connected where possible), each half is planned independently and the
/// two partial results are contracted last. Small parts fall back to the
/// greedy search.
pub struct Bisection<'a> {
    inputs: &'a PathInputs,
    /// Parts at or below this size are handed to the greedy search.
    leaf_size: usize,
    best_path: Vec<ContrTriple>,
    best_flops: f64,
    best_size: f64,
}

impl<'a> Bisection<'a> {
    pub fn new(inputs: &'a PathInputs) -> Self {
        Self::with_leaf_size(inputs, 8)
    }

    pub fn with_leaf_size(inputs: &'a PathInputs, leaf_size: usize) -> Self {
        Self {
            inputs,
            leaf_size: leaf_size.max(2),
            best_path: Vec::new(),
            best_flops: f64::MAX,
            best_size: f64::MAX,
        }
    }

    /// Splits `members` (indices into the inputs) into two halves by
    /// growing a breadth-first region from the lowest member.
    fn split(&self, members: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let member_set: FxHashSet<usize> = members.iter().copied().collect();
        let target = members.len() / 2;
        let mut part = FxHashSet::default();
        let mut queue = std::collections::VecDeque::from([members[0]]);
        while let Some(current) = queue.pop_front() {
            if part.len() >= target {
                break;
            }
            if !part.insert(current) {
                continue;
            }
            let neighbors = member_set
                .iter()
                .copied()
                .filter(|&other| {
                    !part.contains(&other)
                        && self.inputs.tensors[current].shares_edge_with(&self.inputs.tensors[other])
                })
                .sorted_unstable()
                .collect_vec();
            queue.extend(neighbors);
        }
        // A disconnected component may leave the region short; fill up in
        // index order to keep the halves balanced.
        for &member in members {
            if part.len() >= target {
                break;
            }
            part.insert(member);
        }
        let (mut left, mut right): (Vec<usize>, Vec<usize>) =
            members.iter().partition(|m| part.contains(m));
        left.sort_unstable();
        right.sort_unstable();
        (left, right)
    }

    /// Plans the contraction of one part; returns the id holding the
    /// part's result and the steps that produce it.
    fn plan(
        &self,
        members: &[usize],
        next_id: &mut VertexId,
        path: &mut Vec<ContrTriple>,
    ) -> VertexId {
        if members.len() == 1 {
            return self.inputs.ids[members[0]];
        }
        if members.len() <= self.leaf_size {
            return self.plan_leaf(members, next_id, path);
        }
        let (left, right) = self.split(members);
        if left.is_empty() || right.is_empty() {
            return self.plan_leaf(members, next_id, path);
        }
        let left_id = self.plan(&left, next_id, path);
        let right_id = self.plan(&right, next_id, path);
        let result_id = *next_id;
        *next_id += 1;
        path.push(ContrTriple {
            result_id,
            left_id,
            right_id,
        });
        result_id
    }

    /// Plans a small part with the greedy search over a restricted input
    /// set, remapping the greedy ids into the global id space.
    fn plan_leaf(
        &self,
        members: &[usize],
        next_id: &mut VertexId,
        path: &mut Vec<ContrTriple>,
    ) -> VertexId {
        let sub_inputs = PathInputs {
            ids: members.iter().map(|&m| self.inputs.ids[m]).collect(),
            tensors: members
                .iter()
                .map(|&m| self.inputs.tensors[m].clone())
                .collect(),
            // Everything not summed inside the part stays open.
            output: part_output(self.inputs, members),
            bond_dims: self.inputs.bond_dims.clone(),
        };
        let mut greedy = Greedy::new(&sub_inputs, CostType::Flops);
        greedy.optimize_path();

        // The sub-path uses sub-local intermediate ids and writes its last
        // result to 0; remap both into the enclosing id space.
        let mut remap = FxHashMap::<VertexId, VertexId>::default();
        let sub_first = sub_inputs.first_intermediate_id();
        let mut result = 0;
        for step in greedy.best_path() {
            let remap_id = |remap: &FxHashMap<VertexId, VertexId>, id: VertexId| {
                if id >= sub_first || id == 0 {
                    remap[&id]
                } else {
                    id
                }
            };
            let result_id = *next_id;
            *next_id += 1;
            remap.insert(step.result_id, result_id);
            let left_id = remap_id(&remap, step.left_id);
            let right_id = remap_id(&remap, step.right_id);
            path.push(ContrTriple {
                result_id,
                left_id,
                right_id,
            });
            result = result_id;
        }
        result
    }
}

/// Open edges of a part: every edge that is not shared between two of its
/// members.
fn part_output(inputs: &PathInputs, members: &[usize]) -> EdgeTensor {
    let mut counts = FxHashMap::<usize, usize>::default();
    for &m in members {
        for &leg in inputs.tensors[m].legs() {
            *counts.entry(leg).or_default() += 1;
        }
    }
    EdgeTensor::new(
        counts
            .into_iter()
            .filter(|&(_, count)| count == 1)
            .map(|(leg, _)| leg)
            .collect(),
    )
}

impl OptimizePath for Bisection<'_> {
    fn optimize_path(&mut self) {
        let members: Vec<usize> = (0..self.inputs.ids.len()).collect();
        let mut next_id = self.inputs.first_intermediate_id();
        let mut path = Vec::with_capacity(members.len().saturating_sub(1));
        self.plan(&members, &mut next_id, &mut path);
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

    use crate::contractionpath::contraction_cost::path_cost;

    /// A ring of `n` matrices with uniform bond dimension.
    fn ring(n: usize, dim: u64) -> PathInputs {
        let tensors: Vec<EdgeTensor> = (0..n)
            .map(|i| EdgeTensor::new(vec![i, (i + 1) % n]))
            .collect();
        PathInputs {
            ids: (1..=n).collect(),
            tensors,
            output: EdgeTensor::new(vec![]),
            bond_dims: (0..n).map(|i| (i, dim)).collect(),
        }
    }

    #[test]
    fn test_bisection_produces_a_valid_path() {
        let inputs = ring(12, 2);
        let mut opt = Bisection::with_leaf_size(&inputs, 4);
        opt.optimize_path();
        assert_eq!(opt.best_path().len(), 11);
        // Costs are consistent with an independent replay.
        let (flops, size) = path_cost(&inputs, opt.best_path());
        assert_eq!(flops, opt.best_flops());
        assert_eq!(size, opt.best_size());
    }

    #[test]
    fn test_bisection_matches_greedy_on_small_inputs() {
        let inputs = ring(4, 3);
        let mut bisection = Bisection::new(&inputs);
        bisection.optimize_path();
        let mut greedy = Greedy::new(&inputs, CostType::Flops);
        greedy.optimize_path();
        assert_eq!(bisection.best_path(), greedy.best_path());
    }
}
