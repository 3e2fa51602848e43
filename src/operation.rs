//! Primitive tensor operations and the executor capability set.
//!
//! Operations are a tagged variant; [TensorOperation::accept] dispatches an
//! operation to a [TensorNodeExecutor] by identifying itself, so new
//! operation kinds extend the enum and the trait without touching the
//! dispatch site in the runtime.

use std::fmt;
use std::sync::Arc;

use num_complex::Complex64;

use crate::comm::{ProcessGroup, Rank};
use crate::errors::{Error, Result};
use crate::symbolic::SymbolicSpec;
use crate::tensornetwork::tensor::{Tensor, TensorHandle};
use crate::types::DimOffset;

/// Leg-to-leg pattern of a binary contraction `dst += left * right`,
/// expressed in integer labels. Labels shared between `left` and `right`
/// and absent from `dst` are summed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractionPattern {
    pub dst: Vec<usize>,
    pub left: Vec<usize>,
    pub right: Vec<usize>,
}

impl ContractionPattern {
    /// Builds the pattern from a parsed two-operand symbolic specification.
    pub fn from_spec(spec: &SymbolicSpec) -> Result<Self> {
        if spec.operands.len() != 2 {
            return Err(Error::Validation(format!(
                "a contraction needs exactly two operands, got {}",
                spec.operands.len()
            )));
        }
        let (_, mut terms) = spec.label_ids();
        let right = terms.pop().unwrap();
        let left = terms.pop().unwrap();
        let dst = terms.pop().unwrap();
        Ok(Self { dst, left, right })
    }
}

/// Pattern of a tensor factorization `tensor = left [* middle] * right`.
/// `middle` carries the two labels of the singular-value factor for
/// three-factor decompositions and is absent for two-factor ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvdPattern {
    pub tensor: Vec<usize>,
    pub left: Vec<usize>,
    pub middle: Option<(usize, usize)>,
    pub right: Vec<usize>,
}

impl SvdPattern {
    /// Builds the pattern from a parsed symbolic specification with two
    /// factors (`D = L * R`) or three (`D = L * S * R`).
    pub fn from_spec(spec: &SymbolicSpec) -> Result<Self> {
        let contracted = spec.contracted_indices();
        let (_, terms) = spec.label_ids();
        match spec.operands.len() {
            2 => {
                if contracted.len() != 1 {
                    return Err(Error::Validation(format!(
                        "a two-factor decomposition needs exactly one contracted index, got {}",
                        contracted.len()
                    )));
                }
                Ok(Self {
                    tensor: terms[0].clone(),
                    left: terms[1].clone(),
                    middle: None,
                    right: terms[2].clone(),
                })
            }
            3 => {
                if contracted.len() != 2 || terms[2].len() != 2 {
                    return Err(Error::Validation(
                        "a three-factor decomposition needs a rank-2 middle factor and two contracted indices"
                            .to_string(),
                    ));
                }
                let middle = (terms[2][0], terms[2][1]);
                let left = &terms[1];
                let right = &terms[3];
                if !(left.contains(&middle.0) && right.contains(&middle.1))
                    || left.contains(&middle.1)
                    || right.contains(&middle.0)
                {
                    return Err(Error::Validation(
                        "the left factor must carry the first contracted index and the right factor the second"
                            .to_string(),
                    ));
                }
                Ok(Self {
                    tensor: terms[0].clone(),
                    left: left.clone(),
                    middle: Some(middle),
                    right: right.clone(),
                })
            }
            n => Err(Error::Validation(format!(
                "a decomposition needs two or three factors, got {n}"
            ))),
        }
    }

    /// Label summed between the left factor and the middle (or right)
    /// factor.
    pub fn left_contracted(&self) -> usize {
        match self.middle {
            Some((i, _)) => i,
            None => *self
                .left
                .iter()
                .find(|&&l| !self.tensor.contains(&l))
                .expect("validated at construction"),
        }
    }

    /// Label summed between the right factor and the middle (or left)
    /// factor.
    pub fn right_contracted(&self) -> usize {
        match self.middle {
            Some((_, j)) => j,
            None => self.left_contracted(),
        }
    }
}

/// Which factor absorbs the singular-value diagonal of a two-factor SVD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvdAbsorb {
    Left,
    Right,
    /// Both factors absorb the square root of the singular values.
    Split,
}

/// A user-defined tensor transformation applied in place.
pub trait TensorFunctor: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, shape: &[u64], data: &mut [Complex64]);
}

/// Multiplies every element by a constant factor.
pub struct ScaleFunctor {
    factor: Complex64,
}

impl ScaleFunctor {
    pub fn new(factor: Complex64) -> Self {
        Self { factor }
    }
}

impl TensorFunctor for ScaleFunctor {
    fn name(&self) -> &str {
        "scale"
    }

    fn apply(&self, _shape: &[u64], data: &mut [Complex64]) {
        for value in data {
            *value *= self.factor;
        }
    }
}

/// Overwrites the tensor body with externally provided row-major data.
pub struct InitDataFunctor {
    data: Vec<Complex64>,
}

impl InitDataFunctor {
    pub fn new(data: Vec<Complex64>) -> Self {
        Self { data }
    }
}

impl TensorFunctor for InitDataFunctor {
    fn name(&self) -> &str {
        "init-data"
    }

    fn apply(&self, _shape: &[u64], data: &mut [Complex64]) {
        data.copy_from_slice(&self.data);
    }
}

/// A polymorphic unit of work over tensor arguments.
#[derive(Clone)]
pub enum TensorOperation {
    /// Binds storage to a declared tensor (zero-initialized).
    Create { tensor: TensorHandle },
    /// Releases the storage of a tensor.
    Destroy { tensor: TensorHandle },
    /// Sets every element to a scalar value.
    InitValue {
        tensor: TensorHandle,
        value: Complex64,
    },
    /// Fills the tensor with random values.
    InitRandom { tensor: TensorHandle },
    /// `dst += src * alpha` under a dimension permutation:
    /// `dst[d]` pairs with `src[permutation[d]]`.
    Add {
        dst: TensorHandle,
        src: TensorHandle,
        permutation: Vec<usize>,
        alpha: Complex64,
        conj_src: bool,
    },
    /// `dst += left * right * alpha` over a leg-to-leg pattern.
    Contract {
        dst: TensorHandle,
        left: TensorHandle,
        right: TensorHandle,
        pattern: ContractionPattern,
        alpha: Complex64,
        conj_left: bool,
        conj_right: bool,
    },
    /// `tensor = left * middle * right` via SVD; `middle` receives the
    /// singular-value diagonal.
    DecomposeSvd3 {
        tensor: TensorHandle,
        left: TensorHandle,
        middle: TensorHandle,
        right: TensorHandle,
        pattern: SvdPattern,
    },
    /// `tensor = left * right` via SVD with the singular values absorbed
    /// into one or both factors.
    DecomposeSvd2 {
        tensor: TensorHandle,
        left: TensorHandle,
        right: TensorHandle,
        pattern: SvdPattern,
        absorb: SvdAbsorb,
    },
    /// Replaces the tensor by the recomposition of its SVD factors with
    /// the singular values discarded; requires exactly one contracted
    /// index.
    OrthogonalizeSvd {
        tensor: TensorHandle,
        pattern: SvdPattern,
    },
    /// Orthogonalizes the tensor via modified Gram-Schmidt over its
    /// leading dimensions.
    OrthogonalizeMgs { tensor: TensorHandle },
    /// Applies a user-defined functor to the tensor body.
    Transform {
        tensor: TensorHandle,
        functor: Arc<dyn TensorFunctor>,
    },
    /// Copies the slice of `tensor` selected by the slice's shape and
    /// offsets into `slice`.
    SliceExtract {
        tensor: TensorHandle,
        slice: TensorHandle,
        offsets: Vec<DimOffset>,
    },
    /// Writes `slice` into `tensor` at the given offsets.
    SliceInsert {
        tensor: TensorHandle,
        slice: TensorHandle,
        offsets: Vec<DimOffset>,
    },
    /// Makes the tensor available on every rank of the group, sourcing it
    /// from `root`.
    Replicate {
        tensor: TensorHandle,
        group: ProcessGroup,
        root: Rank,
    },
    /// Overwrites the tensor on every rank of the group with the value
    /// held by `root`; the tensor must exist everywhere.
    Broadcast {
        tensor: TensorHandle,
        group: ProcessGroup,
        root: Rank,
    },
    /// Global element-wise sum across the group; the tensor must exist
    /// everywhere.
    Allreduce {
        tensor: TensorHandle,
        group: ProcessGroup,
    },
}

impl TensorOperation {
    pub fn kind(&self) -> &'static str {
        match self {
            TensorOperation::Create { .. } => "Create",
            TensorOperation::Destroy { .. } => "Destroy",
            TensorOperation::InitValue { .. } => "InitValue",
            TensorOperation::InitRandom { .. } => "InitRandom",
            TensorOperation::Add { .. } => "Add",
            TensorOperation::Contract { .. } => "Contract",
            TensorOperation::DecomposeSvd3 { .. } => "DecomposeSvd3",
            TensorOperation::DecomposeSvd2 { .. } => "DecomposeSvd2",
            TensorOperation::OrthogonalizeSvd { .. } => "OrthogonalizeSvd",
            TensorOperation::OrthogonalizeMgs { .. } => "OrthogonalizeMgs",
            TensorOperation::Transform { .. } => "Transform",
            TensorOperation::SliceExtract { .. } => "SliceExtract",
            TensorOperation::SliceInsert { .. } => "SliceInsert",
            TensorOperation::Replicate { .. } => "Replicate",
            TensorOperation::Broadcast { .. } => "Broadcast",
            TensorOperation::Allreduce { .. } => "Allreduce",
        }
    }

    /// Names of the tensors this operation reads.
    pub fn reads(&self) -> Vec<&str> {
        match self {
            TensorOperation::Add { src, .. } => vec![src.name()],
            TensorOperation::Contract { left, right, .. } => {
                vec![left.name(), right.name()]
            }
            TensorOperation::DecomposeSvd3 { tensor, .. }
            | TensorOperation::DecomposeSvd2 { tensor, .. } => vec![tensor.name()],
            TensorOperation::SliceExtract { tensor, .. } => vec![tensor.name()],
            TensorOperation::SliceInsert { slice, .. } => vec![slice.name()],
            _ => Vec::new(),
        }
    }

    /// Names of the tensors this operation writes (or destroys).
    pub fn writes(&self) -> Vec<&str> {
        match self {
            TensorOperation::Create { tensor }
            | TensorOperation::Destroy { tensor }
            | TensorOperation::InitValue { tensor, .. }
            | TensorOperation::InitRandom { tensor }
            | TensorOperation::OrthogonalizeSvd { tensor, .. }
            | TensorOperation::OrthogonalizeMgs { tensor }
            | TensorOperation::Transform { tensor, .. }
            | TensorOperation::Replicate { tensor, .. }
            | TensorOperation::Broadcast { tensor, .. }
            | TensorOperation::Allreduce { tensor, .. } => vec![tensor.name()],
            TensorOperation::Add { dst, .. } => vec![dst.name()],
            TensorOperation::Contract { dst, .. } => vec![dst.name()],
            TensorOperation::DecomposeSvd3 {
                left,
                middle,
                right,
                ..
            } => vec![left.name(), middle.name(), right.name()],
            TensorOperation::DecomposeSvd2 { left, right, .. } => {
                vec![left.name(), right.name()]
            }
            TensorOperation::SliceExtract { slice, .. } => vec![slice.name()],
            TensorOperation::SliceInsert { tensor, .. } => vec![tensor.name()],
        }
    }

    /// Returns true iff all required tensor slots and parameters are bound
    /// consistently. Checked by the runtime at submission time.
    pub fn is_set(&self) -> bool {
        match self {
            TensorOperation::Create { tensor }
            | TensorOperation::Destroy { tensor }
            | TensorOperation::InitValue { tensor, .. }
            | TensorOperation::InitRandom { tensor }
            | TensorOperation::OrthogonalizeMgs { tensor }
            | TensorOperation::Transform { tensor, .. } => !tensor.name().is_empty(),
            TensorOperation::Add {
                dst,
                src,
                permutation,
                ..
            } => {
                permutation.len() == dst.rank()
                    && src.rank() == dst.rank()
                    && is_permutation(permutation)
                    && permutation
                        .iter()
                        .enumerate()
                        .all(|(d, &s)| dst.dim_extent(d) == src.dim_extent(s))
            }
            TensorOperation::Contract {
                dst,
                left,
                right,
                pattern,
                ..
            } => contract_pattern_is_set(dst, left, right, pattern),
            TensorOperation::DecomposeSvd3 {
                tensor,
                left,
                middle,
                right,
                pattern,
            } => {
                pattern.middle.is_some()
                    && svd_factors_are_set(tensor, left, right, pattern)
                    && middle.rank() == 2
                    && middle.dim_extent(0) == middle.dim_extent(1)
                    && factor_extent(left, &pattern.left, pattern.left_contracted())
                        == Some(middle.dim_extent(0))
                    && factor_extent(right, &pattern.right, pattern.right_contracted())
                        == Some(middle.dim_extent(1))
            }
            TensorOperation::DecomposeSvd2 {
                tensor,
                left,
                right,
                pattern,
                ..
            } => pattern.middle.is_none() && svd_factors_are_set(tensor, left, right, pattern),
            TensorOperation::OrthogonalizeSvd { tensor, pattern } => {
                pattern.middle.is_none()
                    && pattern.tensor.len() == tensor.rank()
                    && pattern.left.len() + pattern.right.len() == tensor.rank() + 2
            }
            TensorOperation::SliceExtract {
                tensor,
                slice,
                offsets,
            }
            | TensorOperation::SliceInsert {
                tensor,
                slice,
                offsets,
            } => {
                slice.rank() == tensor.rank()
                    && offsets.len() == tensor.rank()
                    && offsets
                        .iter()
                        .enumerate()
                        .all(|(d, &o)| o + slice.dim_extent(d) <= tensor.dim_extent(d))
            }
            TensorOperation::Replicate { group, root, .. }
            | TensorOperation::Broadcast { group, root, .. } => {
                group.size() > 0 && group.contains(*root)
            }
            TensorOperation::Allreduce { group, .. } => group.size() > 0,
        }
    }

    /// Hands the operation to the executor that knows how to run it.
    pub fn accept(&self, executor: &dyn TensorNodeExecutor) -> Result<()> {
        match self {
            TensorOperation::Create { tensor } => executor.create(tensor),
            TensorOperation::Destroy { tensor } => executor.destroy(tensor),
            TensorOperation::InitValue { tensor, value } => executor.init_value(tensor, *value),
            TensorOperation::InitRandom { tensor } => executor.init_random(tensor),
            TensorOperation::Add {
                dst,
                src,
                permutation,
                alpha,
                conj_src,
            } => executor.add(dst, src, permutation, *alpha, *conj_src),
            TensorOperation::Contract {
                dst,
                left,
                right,
                pattern,
                alpha,
                conj_left,
                conj_right,
            } => executor.contract(
                dst,
                left,
                right,
                pattern,
                *alpha,
                (*conj_left, *conj_right),
            ),
            TensorOperation::DecomposeSvd3 {
                tensor,
                left,
                middle,
                right,
                pattern,
            } => executor.decompose_svd3(tensor, left, middle, right, pattern),
            TensorOperation::DecomposeSvd2 {
                tensor,
                left,
                right,
                pattern,
                absorb,
            } => executor.decompose_svd2(tensor, left, right, pattern, *absorb),
            TensorOperation::OrthogonalizeSvd { tensor, pattern } => {
                executor.orthogonalize_svd(tensor, pattern)
            }
            TensorOperation::OrthogonalizeMgs { tensor } => executor.orthogonalize_mgs(tensor),
            TensorOperation::Transform { tensor, functor } => {
                executor.transform(tensor, functor.as_ref())
            }
            TensorOperation::SliceExtract {
                tensor,
                slice,
                offsets,
            } => executor.slice_extract(tensor, slice, offsets),
            TensorOperation::SliceInsert {
                tensor,
                slice,
                offsets,
            } => executor.slice_insert(tensor, slice, offsets),
            TensorOperation::Replicate {
                tensor,
                group,
                root,
            } => executor.replicate(group, tensor, *root),
            TensorOperation::Broadcast {
                tensor,
                group,
                root,
            } => executor.broadcast(group, tensor, *root),
            TensorOperation::Allreduce { tensor, group } => executor.allreduce(group, tensor),
        }
    }
}

impl fmt::Debug for TensorOperation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{:?}", self.kind(), self.writes())
    }
}

fn is_permutation(perm: &[usize]) -> bool {
    let mut seen = vec![false; perm.len()];
    perm.iter()
        .all(|&p| p < seen.len() && !std::mem::replace(&mut seen[p], true))
}

/// Extent of the factor dimension carrying `label`, if present.
fn factor_extent(factor: &Tensor, labels: &[usize], label: usize) -> Option<u64> {
    labels
        .iter()
        .position(|&l| l == label)
        .map(|dim| factor.dim_extent(dim))
}

fn contract_pattern_is_set(
    dst: &Tensor,
    left: &Tensor,
    right: &Tensor,
    pattern: &ContractionPattern,
) -> bool {
    if pattern.dst.len() != dst.rank()
        || pattern.left.len() != left.rank()
        || pattern.right.len() != right.rank()
    {
        return false;
    }
    // Shared labels must agree in extent; destination labels must be found
    // on exactly one operand with the same extent.
    for (d, &label) in pattern.left.iter().enumerate() {
        if let Some(p) = pattern.right.iter().position(|&l| l == label) {
            if left.dim_extent(d) != right.dim_extent(p) {
                return false;
            }
        }
    }
    for (d, &label) in pattern.dst.iter().enumerate() {
        let in_left = pattern.left.iter().position(|&l| l == label);
        let in_right = pattern.right.iter().position(|&l| l == label);
        let extent = match (in_left, in_right) {
            (Some(p), None) => left.dim_extent(p),
            (None, Some(p)) => right.dim_extent(p),
            _ => return false,
        };
        if extent != dst.dim_extent(d) {
            return false;
        }
    }
    true
}

fn svd_factors_are_set(
    tensor: &Tensor,
    left: &Tensor,
    right: &Tensor,
    pattern: &SvdPattern,
) -> bool {
    if pattern.tensor.len() != tensor.rank()
        || pattern.left.len() != left.rank()
        || pattern.right.len() != right.rank()
    {
        return false;
    }
    // Every factor dimension carrying a label of the decomposed tensor
    // must match that dimension's extent.
    for (factor, labels) in [(left, &pattern.left), (right, &pattern.right)] {
        for (d, &label) in labels.iter().enumerate() {
            if let Some(p) = pattern.tensor.iter().position(|&l| l == label) {
                if factor.dim_extent(d) != tensor.dim_extent(p) {
                    return false;
                }
            }
        }
    }
    // The contracted extents must agree between the two factors for
    // two-factor decompositions.
    if pattern.middle.is_none() {
        let label = pattern.left_contracted();
        let l = pattern.left.iter().position(|&x| x == label);
        let r = pattern.right.iter().position(|&x| x == label);
        match (l, r) {
            (Some(l), Some(r)) => {
                if left.dim_extent(l) != right.dim_extent(r) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

/// The capability set a node executor must provide. The runtime hands
/// every ready operation to exactly one of these methods via
/// [TensorOperation::accept].
pub trait TensorNodeExecutor: Send + Sync {
    fn create(&self, tensor: &Tensor) -> Result<()>;
    fn destroy(&self, tensor: &Tensor) -> Result<()>;
    fn init_value(&self, tensor: &Tensor, value: Complex64) -> Result<()>;
    fn init_random(&self, tensor: &Tensor) -> Result<()>;
    fn add(
        &self,
        dst: &Tensor,
        src: &Tensor,
        permutation: &[usize],
        alpha: Complex64,
        conj_src: bool,
    ) -> Result<()>;
    #[allow(clippy::too_many_arguments)]
    fn contract(
        &self,
        dst: &Tensor,
        left: &Tensor,
        right: &Tensor,
        pattern: &ContractionPattern,
        alpha: Complex64,
        conj: (bool, bool),
    ) -> Result<()>;
    fn decompose_svd3(
        &self,
        tensor: &Tensor,
        left: &Tensor,
        middle: &Tensor,
        right: &Tensor,
        pattern: &SvdPattern,
    ) -> Result<()>;
    fn decompose_svd2(
        &self,
        tensor: &Tensor,
        left: &Tensor,
        right: &Tensor,
        pattern: &SvdPattern,
        absorb: SvdAbsorb,
    ) -> Result<()>;
    fn orthogonalize_svd(&self, tensor: &Tensor, pattern: &SvdPattern) -> Result<()>;
    fn orthogonalize_mgs(&self, tensor: &Tensor) -> Result<()>;
    fn transform(&self, tensor: &Tensor, functor: &dyn TensorFunctor) -> Result<()>;
    fn slice_extract(&self, tensor: &Tensor, slice: &Tensor, offsets: &[DimOffset]) -> Result<()>;
    fn slice_insert(&self, tensor: &Tensor, slice: &Tensor, offsets: &[DimOffset]) -> Result<()>;
    fn replicate(&self, group: &ProcessGroup, tensor: &Tensor, root: Rank) -> Result<()>;
    fn broadcast(&self, group: &ProcessGroup, tensor: &Tensor, root: Rank) -> Result<()>;
    fn allreduce(&self, group: &ProcessGroup, tensor: &Tensor) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::symbolic::parse_spec;

    fn handle(name: &str, shape: Vec<u64>) -> TensorHandle {
        Arc::new(Tensor::new(name, shape))
    }

    #[test]
    fn test_contract_is_set() {
        let spec = parse_spec("C(i,j)=A(i,k)*B(k,j)").unwrap();
        let pattern = ContractionPattern::from_spec(&spec).unwrap();
        let op = TensorOperation::Contract {
            dst: handle("C", vec![2, 3]),
            left: handle("A", vec![2, 4]),
            right: handle("B", vec![4, 3]),
            pattern: pattern.clone(),
            alpha: Complex64::ONE,
            conj_left: false,
            conj_right: false,
        };
        assert!(op.is_set());
        assert_eq!(op.reads(), vec!["A", "B"]);
        assert_eq!(op.writes(), vec!["C"]);

        // Mismatching contracted extent invalidates the operation.
        let bad = TensorOperation::Contract {
            dst: handle("C", vec![2, 3]),
            left: handle("A", vec![2, 4]),
            right: handle("B", vec![5, 3]),
            pattern,
            alpha: Complex64::ONE,
            conj_left: false,
            conj_right: false,
        };
        assert!(!bad.is_set());
    }

    #[test]
    fn test_add_permutation_validation() {
        let op = TensorOperation::Add {
            dst: handle("C", vec![2, 3]),
            src: handle("A", vec![3, 2]),
            permutation: vec![1, 0],
            alpha: Complex64::ONE,
            conj_src: false,
        };
        assert!(op.is_set());

        let bad = TensorOperation::Add {
            dst: handle("C", vec![2, 3]),
            src: handle("A", vec![3, 2]),
            permutation: vec![0, 1],
            alpha: Complex64::ONE,
            conj_src: false,
        };
        assert!(!bad.is_set());
    }

    #[test]
    fn test_svd3_pattern_from_spec() {
        let spec = parse_spec("D(a,b)=L(a,i)*S(i,j)*R(j,b)").unwrap();
        let pattern = SvdPattern::from_spec(&spec).unwrap();
        assert!(pattern.middle.is_some());
        assert_ne!(pattern.left_contracted(), pattern.right_contracted());

        let op = TensorOperation::DecomposeSvd3 {
            tensor: handle("D", vec![4, 6]),
            left: handle("L", vec![4, 4]),
            middle: handle("S", vec![4, 4]),
            right: handle("R", vec![4, 6]),
            pattern,
        };
        assert!(op.is_set());
        assert_eq!(op.writes(), vec!["L", "S", "R"]);
    }

    #[test]
    fn test_orthogonalize_requires_single_contracted_index() {
        let spec = parse_spec("D(a,b,c)=L(a,b,i)*R(i,c)").unwrap();
        let pattern = SvdPattern::from_spec(&spec).unwrap();
        let op = TensorOperation::OrthogonalizeSvd {
            tensor: handle("D", vec![2, 3, 4]),
            pattern,
        };
        assert!(op.is_set());
    }

    #[test]
    fn test_slice_bounds() {
        let op = TensorOperation::SliceExtract {
            tensor: handle("T", vec![4, 4]),
            slice: handle("S", vec![2, 2]),
            offsets: vec![2, 2],
        };
        assert!(op.is_set());

        let bad = TensorOperation::SliceExtract {
            tensor: handle("T", vec![4, 4]),
            slice: handle("S", vec![2, 2]),
            offsets: vec![3, 2],
        };
        assert!(!bad.is_set());
    }
}
