use std::hash::{DefaultHasher, Hash, Hasher};

/// Id of a registered vector space. The anonymous space is [SOME_SPACE].
pub type SpaceId = u32;
/// Id of a registered subspace within its parent space.
pub type SubspaceId = u64;
/// Extent of a single tensor dimension.
pub type DimExtent = u64;
/// Base offset of a tensor dimension within its space.
pub type DimOffset = u64;

/// Vertex id inside a tensor network; vertex 0 is the implicit output.
pub type VertexId = usize;
/// Id of a (contracted or open) edge of a tensor network.
pub type EdgeId = usize;

/// The anonymous vector space. Always registered, never destructible.
pub const SOME_SPACE: SpaceId = 0;
/// The trivial (full) subspace every named space registers automatically.
pub const FULL_SUBSPACE: SubspaceId = 0;
/// Sentinel id of an unregistered subspace; such a dimension is described
/// by its base offset instead.
pub const UNREG_SUBSPACE: SubspaceId = SubspaceId::MAX;
/// Dimension of the anonymous vector space.
pub const MAX_SPACE_DIM: DimExtent = DimExtent::MAX;

/// Direction of a tensor leg within a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LegDirection {
    #[default]
    Undirected,
    Inward,
    Outward,
}

impl LegDirection {
    /// Returns the opposite direction; [LegDirection::Undirected] is its own
    /// opposite.
    #[must_use]
    pub fn reversed(self) -> Self {
        match self {
            LegDirection::Undirected => LegDirection::Undirected,
            LegDirection::Inward => LegDirection::Outward,
            LegDirection::Outward => LegDirection::Inward,
        }
    }
}

/// One step of a pairwise contraction sequence: contract `left_id` with
/// `right_id` into `result_id`. Input vertices keep their network vertex
/// ids, intermediates get fresh ids, the final step writes vertex 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContrTriple {
    pub result_id: VertexId,
    pub left_id: VertexId,
    pub right_id: VertexId,
}

#[macro_export]
macro_rules! contr {
    ($(($r:expr, $l:expr, $g:expr)),* $(,)?) => {
        vec![$($crate::types::ContrTriple {
            result_id: $r,
            left_id: $l,
            right_id: $g,
        }),*]
    };
}

/// Stable hash of any hashable value, used for topology fingerprints.
pub fn calculate_hash<T: Hash + ?Sized>(t: &T) -> u64 {
    let mut s = DefaultHasher::new();
    t.hash(&mut s);
    s.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leg_direction_reversal() {
        assert_eq!(LegDirection::Inward.reversed(), LegDirection::Outward);
        assert_eq!(LegDirection::Outward.reversed(), LegDirection::Inward);
        assert_eq!(
            LegDirection::Undirected.reversed(),
            LegDirection::Undirected
        );
    }

    #[test]
    fn test_contr_macro() {
        let seq = contr![(4, 1, 2), (0, 4, 3)];
        assert_eq!(
            seq,
            vec![
                ContrTriple {
                    result_id: 4,
                    left_id: 1,
                    right_id: 2
                },
                ContrTriple {
                    result_id: 0,
                    left_id: 4,
                    right_id: 3
                },
            ]
        );
    }
}
