use std::collections::BTreeMap;
use std::sync::Arc;

use log::error;
use rustc_hash::FxHashMap;

use crate::tensornetwork::tensor::{Tensor, TensorHandle};
use crate::types::{LegDirection, VertexId};

/// Vertex id reserved for the implicit output tensor.
pub const OUTPUT_VERTEX: VertexId = 0;

/// One leg of a tensor inside a network: the partner vertex, the partner's
/// dimension index and the direction of the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorLeg {
    vertex: VertexId,
    dim: usize,
    direction: LegDirection,
}

impl TensorLeg {
    /// Undirected leg pointing at dimension `dim` of `vertex`.
    pub fn new(vertex: VertexId, dim: usize) -> Self {
        Self {
            vertex,
            dim,
            direction: LegDirection::Undirected,
        }
    }

    pub fn directed(vertex: VertexId, dim: usize, direction: LegDirection) -> Self {
        Self {
            vertex,
            dim,
            direction,
        }
    }

    pub fn vertex(&self) -> VertexId {
        self.vertex
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn direction(&self) -> LegDirection {
        self.direction
    }

    fn reverse_direction(&mut self) {
        self.direction = self.direction.reversed();
    }
}

/// A tensor placed in a network: its handle, its legs (one per dimension)
/// and whether it enters complex-conjugated.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorConn {
    tensor: TensorHandle,
    legs: Vec<TensorLeg>,
    conjugated: bool,
}

impl TensorConn {
    pub fn tensor(&self) -> &TensorHandle {
        &self.tensor
    }

    pub fn legs(&self) -> &[TensorLeg] {
        &self.legs
    }

    pub fn is_conjugated(&self) -> bool {
        self.conjugated
    }
}

/// A tensor network: a graph keyed by vertex id whose vertices are tensors
/// and whose edges are contracted dimension pairs. Vertex 0 is the implicit
/// output tensor collecting all open legs.
///
/// Finalization is a one-way transition: once [TensorNetwork::finalize]
/// succeeded the topology is immutable (the tensors' data may still
/// change).
#[derive(Debug, Clone, PartialEq)]
pub struct TensorNetwork {
    name: String,
    vertices: FxHashMap<VertexId, TensorConn>,
    finalized: bool,
}

impl TensorNetwork {
    /// Creates an empty, unfinalized network.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertices: FxHashMap::default(),
            finalized: false,
        }
    }

    /// Lifts a bare tensor into a finalized single-tensor network whose
    /// output legs are the identity permutation of the tensor's legs. This
    /// is the standard promotion of a plain tensor into operator algebra.
    pub fn from_tensor(name: impl Into<String>, tensor: TensorHandle) -> Self {
        let mut network = Self::new(name);
        let legs = (0..tensor.rank())
            .map(|dim| TensorLeg::new(OUTPUT_VERTEX, dim))
            .collect();
        let placed = network.place_tensor(1, tensor, legs, false);
        debug_assert!(placed);
        let finalized = network.finalize();
        debug_assert!(finalized);
        network
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Number of input vertices (the output vertex does not count).
    pub fn num_inputs(&self) -> usize {
        self.vertices.len() - usize::from(self.vertices.contains_key(&OUTPUT_VERTEX))
    }

    /// Rank of the output tensor; only meaningful once finalized.
    pub fn rank(&self) -> usize {
        self.vertices
            .get(&OUTPUT_VERTEX)
            .map(|conn| conn.legs.len())
            .unwrap_or(0)
    }

    /// Tensor placed at `vertex`, if any.
    pub fn tensor(&self, vertex: VertexId) -> Option<&TensorHandle> {
        self.vertices.get(&vertex).map(|conn| &conn.tensor)
    }

    /// Full connection record of `vertex`, if any.
    pub fn conn(&self, vertex: VertexId) -> Option<&TensorConn> {
        self.vertices.get(&vertex)
    }

    /// The implicit output tensor; present once finalized.
    pub fn output_tensor(&self) -> Option<&TensorHandle> {
        self.tensor(OUTPUT_VERTEX)
    }

    /// All vertex ids in ascending order, output vertex included if placed.
    pub fn vertex_ids(&self) -> Vec<VertexId> {
        let mut ids: Vec<_> = self.vertices.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Input vertex ids in ascending order.
    pub fn input_ids(&self) -> Vec<VertexId> {
        let mut ids: Vec<_> = self
            .vertices
            .keys()
            .copied()
            .filter(|&v| v != OUTPUT_VERTEX)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Places an input tensor at `vertex` with the given legs. Returns
    /// false (and leaves the network untouched) if the vertex id is taken,
    /// reserved, the leg count disagrees with the tensor rank, or the
    /// network is already finalized.
    pub fn place_tensor(
        &mut self,
        vertex: VertexId,
        tensor: TensorHandle,
        legs: Vec<TensorLeg>,
        conjugated: bool,
    ) -> bool {
        if self.finalized {
            error!(network = self.name; "can not place a tensor into a finalized network");
            return false;
        }
        if vertex == OUTPUT_VERTEX {
            error!(network = self.name; "vertex 0 is reserved for the output tensor");
            return false;
        }
        if self.vertices.contains_key(&vertex) {
            error!(network = self.name, vertex; "vertex id already occupied");
            return false;
        }
        if legs.len() != tensor.rank() {
            error!(network = self.name, vertex; "leg count does not match tensor rank");
            return false;
        }
        if legs.iter().any(|leg| leg.vertex == vertex) {
            error!(network = self.name, vertex; "a tensor can not be contracted with itself");
            return false;
        }
        self.vertices.insert(
            vertex,
            TensorConn {
                tensor,
                legs,
                conjugated,
            },
        );
        true
    }

    /// Places an explicit output tensor at vertex 0. If absent, finalize
    /// synthesizes one from the open legs.
    pub fn place_output_tensor(&mut self, tensor: TensorHandle, legs: Vec<TensorLeg>) -> bool {
        if self.finalized {
            error!(network = self.name; "can not place the output tensor into a finalized network");
            return false;
        }
        if self.vertices.contains_key(&OUTPUT_VERTEX) {
            error!(network = self.name; "output tensor already placed");
            return false;
        }
        if legs.len() != tensor.rank() {
            error!(network = self.name; "output leg count does not match tensor rank");
            return false;
        }
        self.vertices.insert(
            OUTPUT_VERTEX,
            TensorConn {
                tensor,
                legs,
                conjugated: false,
            },
        );
        true
    }

    /// Verifies that every leg is either paired with a matching partner or
    /// open (collected by the output vertex) and freezes the topology.
    ///
    /// Non-throwing contract: returns false on any violation and leaves the
    /// network usable for inspection but not for execution submission.
    /// Idempotent once successful.
    pub fn finalize(&mut self) -> bool {
        if self.finalized {
            return true;
        }
        if self.num_inputs() == 0 {
            error!(network = self.name; "can not finalize an empty network");
            return false;
        }

        // Output dim position -> owning input leg.
        let mut open = BTreeMap::<usize, (VertexId, usize)>::new();
        for (&vertex, conn) in self.vertices.iter().filter(|(&v, _)| v != OUTPUT_VERTEX) {
            for (dim, leg) in conn.legs.iter().enumerate() {
                if leg.vertex == OUTPUT_VERTEX {
                    if open.insert(leg.dim, (vertex, dim)).is_some() {
                        error!(network = self.name, vertex, dim; "two legs claim the same output position");
                        return false;
                    }
                    continue;
                }
                let Some(partner) = self.vertices.get(&leg.vertex) else {
                    error!(network = self.name, vertex, dim; "leg points at a missing vertex");
                    return false;
                };
                let Some(back) = partner.legs.get(leg.dim) else {
                    error!(network = self.name, vertex, dim; "leg points at a missing dimension");
                    return false;
                };
                if back.vertex != vertex || back.dim != dim {
                    error!(network = self.name, vertex, dim; "legs are not mutually paired");
                    return false;
                }
                if conn.tensor.dim_extent(dim) != partner.tensor.dim_extent(leg.dim) {
                    error!(network = self.name, vertex, dim; "paired legs have mismatching extents");
                    return false;
                }
            }
        }

        if let Some(output) = self.vertices.get(&OUTPUT_VERTEX) {
            if output.legs.len() != open.len() {
                error!(network = self.name; "output rank does not match the number of open legs");
                return false;
            }
            for (pos, leg) in output.legs.iter().enumerate() {
                if open.get(&pos) != Some(&(leg.vertex, leg.dim)) {
                    error!(network = self.name, pos; "output leg does not mirror its open leg");
                    return false;
                }
                let input = &self.vertices[&leg.vertex];
                if output.tensor.dim_extent(pos) != input.tensor.dim_extent(leg.dim) {
                    error!(network = self.name, pos; "output extent does not match its open leg");
                    return false;
                }
            }
        } else {
            // Synthesize the implicit output tensor from the open legs.
            if open.keys().enumerate().any(|(i, &pos)| i != pos) {
                error!(network = self.name; "open legs do not form a contiguous output index range");
                return false;
            }
            let mut shape = Vec::with_capacity(open.len());
            let mut signature = Vec::with_capacity(open.len());
            let mut legs = Vec::with_capacity(open.len());
            for &(vertex, dim) in open.values() {
                let conn = &self.vertices[&vertex];
                shape.push(conn.tensor.dim_extent(dim));
                signature.push(conn.tensor.signature()[dim]);
                legs.push(TensorLeg::directed(vertex, dim, conn.legs[dim].direction));
            }
            let output = Tensor::with_signature(format!("_{}", self.name), shape, signature)
                .expect("shape and signature are built together");
            self.vertices.insert(
                OUTPUT_VERTEX,
                TensorConn {
                    tensor: Arc::new(output),
                    legs,
                    conjugated: false,
                },
            );
        }

        self.finalized = true;
        true
    }

    /// Complex-conjugates the network: every input tensor is flagged
    /// conjugated and every edge direction is reversed. The output vertex
    /// is structurally unaffected. Conjugation is an involution.
    pub fn conjugate(&mut self) {
        for (&vertex, conn) in self.vertices.iter_mut() {
            if vertex != OUTPUT_VERTEX {
                conn.conjugated = !conn.conjugated;
            }
            for leg in conn.legs.iter_mut() {
                leg.reverse_direction();
            }
        }
    }

    /// Permutes the output modes of a finalized network: the leg currently
    /// at position `i` moves to position `order[i]`. Returns false if the
    /// network is not finalized or `order` is not a permutation.
    pub fn reorder_output_modes(&mut self, order: &[usize]) -> bool {
        if !self.finalized {
            error!(network = self.name; "can not reorder the output of an unfinalized network");
            return false;
        }
        let rank = self.rank();
        let mut seen = vec![false; rank];
        if order.len() != rank || order.iter().any(|&p| p >= rank || std::mem::replace(&mut seen[p], true)) {
            error!(network = self.name; "output reordering is not a permutation");
            return false;
        }

        let output = &self.vertices[&OUTPUT_VERTEX];
        let mut legs = vec![TensorLeg::new(OUTPUT_VERTEX, 0); rank];
        let mut shape = vec![0; rank];
        let mut signature = vec![(0, 0); rank];
        for (i, &new_pos) in order.iter().enumerate() {
            legs[new_pos] = output.legs[i];
            shape[new_pos] = output.tensor.dim_extent(i);
            signature[new_pos] = output.tensor.signature()[i];
        }
        let name = output.tensor.name().to_string();
        let tensor = Tensor::with_signature(name, shape, signature)
            .expect("shape and signature are built together");

        for (i, &new_pos) in order.iter().enumerate() {
            let TensorLeg { vertex, dim, .. } = self.vertices[&OUTPUT_VERTEX].legs[i];
            let input_leg = &mut self.vertices.get_mut(&vertex).unwrap().legs[dim];
            debug_assert_eq!(input_leg.vertex, OUTPUT_VERTEX);
            input_leg.dim = new_pos;
        }
        let output = self.vertices.get_mut(&OUTPUT_VERTEX).unwrap();
        output.legs = legs;
        output.tensor = Arc::new(tensor);
        true
    }

    /// Appends another finalized network, contracting this network's open
    /// leg `a` with the appended network's open leg `b` for every pairing
    /// entry `(a, b)`. An empty pairing forms the direct product. Remaining
    /// open legs keep their relative order, own legs first.
    ///
    /// Returns false (and mutates nothing) on any inconsistency.
    pub fn append_network(&mut self, other: &TensorNetwork, pairing: &[(usize, usize)]) -> bool {
        if !self.finalized || !other.finalized {
            error!(network = self.name; "both networks must be finalized before appending");
            return false;
        }
        let own_rank = self.rank();
        let other_rank = other.rank();
        if pairing.len() > own_rank || pairing.len() > other_rank {
            error!(network = self.name; "pairing is longer than the open legs available");
            return false;
        }
        let mut seen_a = vec![false; own_rank];
        let mut seen_b = vec![false; other_rank];
        for &(a, b) in pairing {
            if a >= own_rank || b >= other_rank || seen_a[a] || seen_b[b] {
                error!(network = self.name, a, b; "invalid or duplicate pairing entry");
                return false;
            }
            seen_a[a] = true;
            seen_b[b] = true;
        }

        let offset = self.vertices.keys().copied().max().unwrap_or(0);
        let renumber = |v: VertexId| if v == OUTPUT_VERTEX { v } else { v + offset };

        // Work on a copy so that a failed append mutates nothing.
        let mut merged: FxHashMap<VertexId, TensorConn> = self
            .vertices
            .iter()
            .filter(|(&v, _)| v != OUTPUT_VERTEX)
            .map(|(&v, conn)| (v, conn.clone()))
            .collect();
        for (&v, conn) in other.vertices.iter().filter(|(&v, _)| v != OUTPUT_VERTEX) {
            let mut conn = conn.clone();
            for leg in conn.legs.iter_mut() {
                leg.vertex = renumber(leg.vertex);
            }
            merged.insert(renumber(v), conn);
        }

        let own_output = &self.vertices[&OUTPUT_VERTEX];
        let other_output = &other.vertices[&OUTPUT_VERTEX];

        // Contract the paired open legs.
        for &(a, b) in pairing {
            let leg_a = own_output.legs[a];
            let leg_b = other_output.legs[b];
            let (va, da) = (leg_a.vertex, leg_a.dim);
            let (vb, db) = (renumber(leg_b.vertex), leg_b.dim);
            if own_output.tensor.dim_extent(a) != other_output.tensor.dim_extent(b) {
                error!(network = self.name, a, b; "paired open legs have mismatching extents");
                return false;
            }
            let dir_a = merged[&va].legs[da].direction;
            let dir_b = merged[&vb].legs[db].direction;
            merged.get_mut(&va).unwrap().legs[da] = TensorLeg::directed(vb, db, dir_a);
            merged.get_mut(&vb).unwrap().legs[db] = TensorLeg::directed(va, da, dir_b);
        }

        // Rebuild the output from the remaining open legs.
        let mut shape = Vec::new();
        let mut signature = Vec::new();
        let mut legs = Vec::new();
        let mut remaining = Vec::new();
        for (pos, leg) in own_output.legs.iter().enumerate() {
            if !seen_a[pos] {
                remaining.push((leg.vertex, leg.dim, own_output.tensor.dim_extent(pos)));
                signature.push(own_output.tensor.signature()[pos]);
            }
        }
        for (pos, leg) in other_output.legs.iter().enumerate() {
            if !seen_b[pos] {
                remaining.push((
                    renumber(leg.vertex),
                    leg.dim,
                    other_output.tensor.dim_extent(pos),
                ));
                signature.push(other_output.tensor.signature()[pos]);
            }
        }
        for (pos, &(vertex, dim, extent)) in remaining.iter().enumerate() {
            shape.push(extent);
            let direction = merged[&vertex].legs[dim].direction;
            merged.get_mut(&vertex).unwrap().legs[dim] =
                TensorLeg::directed(OUTPUT_VERTEX, pos, direction);
            legs.push(TensorLeg::directed(vertex, dim, direction));
        }
        let output = Tensor::with_signature(format!("_{}", self.name), shape, signature)
            .expect("shape and signature are built together");
        merged.insert(
            OUTPUT_VERTEX,
            TensorConn {
                tensor: Arc::new(output),
                legs,
                conjugated: false,
            },
        );

        self.vertices = merged;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matmul_network() -> TensorNetwork {
        // C(i,j) = A(i,k) * B(k,j)
        let mut network = TensorNetwork::new("matmul");
        let a = Arc::new(Tensor::new("A", vec![2, 4]));
        let b = Arc::new(Tensor::new("B", vec![4, 3]));
        assert!(network.place_tensor(
            1,
            a,
            vec![TensorLeg::new(OUTPUT_VERTEX, 0), TensorLeg::new(2, 0)],
            false,
        ));
        assert!(network.place_tensor(
            2,
            b,
            vec![TensorLeg::new(1, 1), TensorLeg::new(OUTPUT_VERTEX, 1)],
            false,
        ));
        network
    }

    #[test]
    fn test_finalize_matmul() {
        let mut network = matmul_network();
        assert!(network.finalize());
        assert!(network.is_finalized());
        assert_eq!(network.rank(), 2);
        assert_eq!(network.output_tensor().unwrap().shape(), &[2, 3]);
        // Idempotent.
        assert!(network.finalize());
    }

    #[test]
    fn test_finalize_fails_on_extent_mismatch() {
        let mut network = TensorNetwork::new("bad");
        let a = Arc::new(Tensor::new("A", vec![2, 4]));
        let b = Arc::new(Tensor::new("B", vec![5, 3]));
        network.place_tensor(
            1,
            a,
            vec![TensorLeg::new(OUTPUT_VERTEX, 0), TensorLeg::new(2, 0)],
            false,
        );
        network.place_tensor(
            2,
            b,
            vec![TensorLeg::new(1, 1), TensorLeg::new(OUTPUT_VERTEX, 1)],
            false,
        );
        assert!(!network.finalize());
        assert!(!network.is_finalized());
        // Still inspectable.
        assert_eq!(network.num_inputs(), 2);
    }

    #[test]
    fn test_finalize_fails_on_unpaired_leg() {
        let mut network = TensorNetwork::new("dangling");
        let a = Arc::new(Tensor::new("A", vec![2, 4]));
        // Second leg points at vertex 2 which is never placed.
        network.place_tensor(
            1,
            a,
            vec![TensorLeg::new(OUTPUT_VERTEX, 0), TensorLeg::new(2, 0)],
            false,
        );
        assert!(!network.finalize());
    }

    #[test]
    fn test_conjugation_is_an_involution() {
        let mut network = matmul_network();
        assert!(network.finalize());
        let reference = network.clone();

        network.conjugate();
        assert!(network.conn(1).unwrap().is_conjugated());
        assert_ne!(network, reference);

        network.conjugate();
        assert_eq!(network, reference);
        // Finalize again after the double conjugation must still succeed.
        assert!(network.finalize());
    }

    #[test]
    fn test_from_tensor_promotion() {
        let t = Arc::new(Tensor::new("T", vec![3, 5]));
        let network = TensorNetwork::from_tensor("wrapped", t);
        assert!(network.is_finalized());
        assert_eq!(network.num_inputs(), 1);
        assert_eq!(network.rank(), 2);
        assert_eq!(network.output_tensor().unwrap().shape(), &[3, 5]);
    }

    #[test]
    fn test_place_tensor_rejected_after_finalize() {
        let mut network = matmul_network();
        assert!(network.finalize());
        let extra = Arc::new(Tensor::new("X", vec![2]));
        assert!(!network.place_tensor(3, extra, vec![TensorLeg::new(OUTPUT_VERTEX, 2)], false));
    }

    #[test]
    fn test_append_network_inner_product() {
        let mut left = matmul_network();
        assert!(left.finalize());
        let t = Arc::new(Tensor::new("T", vec![2, 3]));
        let right = TensorNetwork::from_tensor("rhs", t);

        // Full pairing produces a scalar network.
        assert!(left.append_network(&right, &[(0, 0), (1, 1)]));
        assert_eq!(left.rank(), 0);
        assert_eq!(left.num_inputs(), 3);
        assert!(left.is_finalized());
    }

    #[test]
    fn test_append_network_direct_product_rank() {
        let mut left = matmul_network();
        assert!(left.finalize());
        let t = Arc::new(Tensor::new("T", vec![7]));
        let right = TensorNetwork::from_tensor("rhs", t);

        assert!(left.append_network(&right, &[]));
        assert_eq!(left.rank(), 3);
        assert_eq!(left.output_tensor().unwrap().shape(), &[2, 3, 7]);
    }

    #[test]
    fn test_append_network_extent_mismatch_mutates_nothing() {
        let mut left = matmul_network();
        assert!(left.finalize());
        let reference = left.clone();
        let t = Arc::new(Tensor::new("T", vec![9, 9]));
        let right = TensorNetwork::from_tensor("rhs", t);

        assert!(!left.append_network(&right, &[(0, 0), (1, 1)]));
        assert_eq!(left, reference);
    }
}
