//! Contraction-order planning for finalized tensor networks.
//!
//! The optimizers work on a reduced view of the network: every input
//! vertex becomes an [EdgeTensor] (just its edge ids), extents live in a
//! separate bond-dimension map, and the implicit output is the set of open
//! edges. Set algebra over legs is expressed through the bit operators,
//! `&` for shared legs, `^` for the contraction result, `|` for the union
//! and `-` for the difference.

pub mod cache;
pub mod contraction_cost;
pub mod paths;

use std::ops::{BitAnd, BitOr, BitXor, Sub};

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::errors::{Error, Result};
use crate::tensornetwork::network::{TensorNetwork, OUTPUT_VERTEX};
use crate::types::{calculate_hash, DimExtent, EdgeId, VertexId};
use crate::utils::HashMapInsertNew;

/// A tensor reduced to the sorted set of its edge ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct EdgeTensor {
    legs: Vec<EdgeId>,
}

impl EdgeTensor {
    pub fn new(mut legs: Vec<EdgeId>) -> Self {
        legs.sort_unstable();
        legs.dedup();
        Self { legs }
    }

    pub fn legs(&self) -> &[EdgeId] {
        &self.legs
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Whether the two tensors share at least one edge.
    pub fn shares_edge_with(&self, other: &EdgeTensor) -> bool {
        self.legs.iter().any(|leg| other.legs.binary_search(leg).is_ok())
    }

    /// Number of elements, as the product of the leg extents.
    pub fn size(&self, bond_dims: &FxHashMap<EdgeId, DimExtent>) -> f64 {
        self.legs.iter().map(|leg| bond_dims[leg] as f64).product()
    }
}

impl BitAnd for &EdgeTensor {
    type Output = EdgeTensor;

    /// Shared legs of both tensors.
    fn bitand(self, rhs: Self) -> EdgeTensor {
        EdgeTensor::new(
            self.legs
                .iter()
                .filter(|leg| rhs.legs.binary_search(leg).is_ok())
                .copied()
                .collect(),
        )
    }
}

impl BitXor for &EdgeTensor {
    type Output = EdgeTensor;

    /// Legs of the tensor resulting from contracting both tensors.
    fn bitxor(self, rhs: Self) -> EdgeTensor {
        EdgeTensor::new(
            self.legs
                .iter()
                .filter(|leg| rhs.legs.binary_search(leg).is_err())
                .chain(
                    rhs.legs
                        .iter()
                        .filter(|leg| self.legs.binary_search(leg).is_err()),
                )
                .copied()
                .collect(),
        )
    }
}

impl BitOr for &EdgeTensor {
    type Output = EdgeTensor;

    /// All legs of both tensors.
    fn bitor(self, rhs: Self) -> EdgeTensor {
        EdgeTensor::new(self.legs.iter().chain(rhs.legs.iter()).copied().collect())
    }
}

impl Sub for &EdgeTensor {
    type Output = EdgeTensor;

    /// Legs of the left tensor not present in the right one.
    fn sub(self, rhs: Self) -> EdgeTensor {
        EdgeTensor::new(
            self.legs
                .iter()
                .filter(|leg| rhs.legs.binary_search(leg).is_err())
                .copied()
                .collect(),
        )
    }
}

/// Optimizer input extracted from a finalized network: the input vertices
/// as edge tensors, the output edge set and the edge extents.
#[derive(Debug, Clone)]
pub struct PathInputs {
    pub ids: Vec<VertexId>,
    pub tensors: Vec<EdgeTensor>,
    pub output: EdgeTensor,
    pub bond_dims: FxHashMap<EdgeId, DimExtent>,
}

/// Deterministic edge labeling of a finalized network: one label per
/// contracted pair or open leg, listed per vertex in dimension order.
/// Topologically identical networks produce identical labelings.
#[derive(Debug, Clone)]
pub struct NetworkLabels {
    /// Per input vertex, the edge label of every dimension.
    pub per_vertex: FxHashMap<VertexId, Vec<EdgeId>>,
    /// Edge labels of the output tensor in dimension order.
    pub output: Vec<EdgeId>,
    /// Extent of every edge.
    pub bond_dims: FxHashMap<EdgeId, DimExtent>,
}

/// Walks the input vertices in ascending order and assigns every edge a
/// sequential label.
pub fn assign_edge_labels(network: &TensorNetwork) -> Result<NetworkLabels> {
    if !network.is_finalized() {
        return Err(Error::UnfinalizedNetwork(network.name().to_string()));
    }
    let mut assigned = FxHashMap::<(VertexId, usize), EdgeId>::default();
    let mut bond_dims = FxHashMap::default();
    let mut per_vertex = FxHashMap::default();
    let mut next_edge: EdgeId = 0;

    for vertex in network.input_ids() {
        let conn = network.conn(vertex).expect("input vertex exists");
        let mut legs = Vec::with_capacity(conn.legs().len());
        for (dim, leg) in conn.legs().iter().enumerate() {
            let edge = match assigned.get(&(vertex, dim)) {
                Some(&edge) => edge,
                None => {
                    let edge = next_edge;
                    next_edge += 1;
                    assigned.insert((vertex, dim), edge);
                    if leg.vertex() != OUTPUT_VERTEX {
                        assigned.insert((leg.vertex(), leg.dim()), edge);
                    }
                    bond_dims.insert(edge, conn.tensor().dim_extent(dim));
                    edge
                }
            };
            legs.push(edge);
        }
        per_vertex.insert_new(vertex, legs);
    }

    let output_conn = network.conn(OUTPUT_VERTEX).expect("finalized network");
    let output = output_conn
        .legs()
        .iter()
        .map(|leg| assigned[&(leg.vertex(), leg.dim())])
        .collect();

    Ok(NetworkLabels {
        per_vertex,
        output,
        bond_dims,
    })
}

impl PathInputs {
    /// Reduces a finalized network to the optimizer view.
    pub fn from_network(network: &TensorNetwork) -> Result<Self> {
        let labels = assign_edge_labels(network)?;
        let ids = network.input_ids();
        let tensors = ids
            .iter()
            .map(|v| EdgeTensor::new(labels.per_vertex[v].clone()))
            .collect();
        Ok(Self {
            ids,
            tensors,
            output: EdgeTensor::new(labels.output.clone()),
            bond_dims: labels.bond_dims,
        })
    }

    /// First vertex id available for intermediate results.
    pub fn first_intermediate_id(&self) -> VertexId {
        self.ids.iter().copied().max().unwrap_or(0) + 1
    }

    /// Canonical topology fingerprint: vertex count, edge structure and
    /// extents. Used as the key of the contraction-sequence cache.
    pub fn fingerprint(&self) -> u64 {
        let dims = self
            .bond_dims
            .iter()
            .map(|(&e, &d)| (e, d))
            .sorted_unstable()
            .collect_vec();
        calculate_hash(&(&self.tensors, &self.output, dims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::tensornetwork::network::TensorLeg;
    use crate::tensornetwork::tensor::Tensor;

    fn matmul_network() -> TensorNetwork {
        let mut network = TensorNetwork::new("matmul");
        let a = Arc::new(Tensor::new("A", vec![2, 4]));
        let b = Arc::new(Tensor::new("B", vec![4, 3]));
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
        assert!(network.finalize());
        network
    }

    #[test]
    fn test_edge_tensor_algebra() {
        let t1 = EdgeTensor::new(vec![0, 1, 2]);
        let t2 = EdgeTensor::new(vec![2, 3, 4]);
        assert_eq!(&t1 & &t2, EdgeTensor::new(vec![2]));
        assert_eq!(&t1 ^ &t2, EdgeTensor::new(vec![0, 1, 3, 4]));
        assert_eq!(&t1 | &t2, EdgeTensor::new(vec![0, 1, 2, 3, 4]));
        assert_eq!(&t1 - &t2, EdgeTensor::new(vec![0, 1]));
        assert!(t1.shares_edge_with(&t2));
    }

    #[test]
    fn test_path_inputs_from_network() {
        let inputs = PathInputs::from_network(&matmul_network()).unwrap();
        assert_eq!(inputs.ids, vec![1, 2]);
        assert_eq!(inputs.tensors.len(), 2);
        // One shared edge, two open edges.
        assert_eq!(inputs.bond_dims.len(), 3);
        assert_eq!(
            &inputs.tensors[0] & &inputs.tensors[1],
            EdgeTensor::new(vec![1])
        );
        assert_eq!(inputs.output.legs().len(), 2);
    }

    #[test]
    fn test_unfinalized_network_is_rejected() {
        let network = TensorNetwork::new("empty");
        assert!(matches!(
            PathInputs::from_network(&network),
            Err(Error::UnfinalizedNetwork(_))
        ));
    }

    #[test]
    fn test_fingerprint_stability() {
        let a = PathInputs::from_network(&matmul_network()).unwrap();
        let b = PathInputs::from_network(&matmul_network()).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
