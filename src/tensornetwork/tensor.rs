use std::fmt;
use std::sync::Arc;

use crate::errors::{Error, Result};
use crate::types::{DimExtent, DimOffset, SpaceId, SubspaceId, SOME_SPACE, UNREG_SUBSPACE};

/// Shared handle to a tensor. A tensor may participate in multiple
/// networks, expansions and operators simultaneously.
pub type TensorHandle = Arc<Tensor>;

/// Per-dimension space/subspace reference. For a dimension over the
/// anonymous space the second entry carries the base offset instead of a
/// subspace id.
pub type TensorSignature = Vec<(SpaceId, SubspaceId)>;

/// Symbolic representation of a tensor: a name, a shape and a signature.
///
/// A tensor is purely declarative; whether storage is bound to it is
/// tracked by the server's tensor registry, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tensor {
    name: String,
    shape: Vec<DimExtent>,
    signature: TensorSignature,
}

impl Tensor {
    /// Declares a tensor over the anonymous space with base offset 0 in
    /// every dimension.
    ///
    /// # Examples
    /// ```
    /// use tensornet::tensornetwork::tensor::Tensor;
    ///
    /// let t = Tensor::new("A", vec![2, 3]);
    /// assert_eq!(t.rank(), 2);
    /// assert_eq!(t.volume(), 6);
    /// ```
    pub fn new(name: impl Into<String>, shape: Vec<DimExtent>) -> Self {
        let signature = shape.iter().map(|_| (SOME_SPACE, 0)).collect();
        Self {
            name: name.into(),
            shape,
            signature,
        }
    }

    /// Declares a tensor with an explicit signature; the signature must
    /// have one entry per dimension.
    pub fn with_signature(
        name: impl Into<String>,
        shape: Vec<DimExtent>,
        signature: TensorSignature,
    ) -> Result<Self> {
        if shape.len() != signature.len() {
            return Err(Error::ShapeMismatch {
                left: format!("shape of rank {}", shape.len()),
                right: format!("signature of rank {}", signature.len()),
            });
        }
        Ok(Self {
            name: name.into(),
            shape,
            signature,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[DimExtent] {
        &self.shape
    }

    pub fn signature(&self) -> &TensorSignature {
        &self.signature
    }

    /// Extent of dimension `dim`.
    pub fn dim_extent(&self, dim: usize) -> DimExtent {
        self.shape[dim]
    }

    /// Base offset of dimension `dim` if it is described by one, i.e. the
    /// dimension lives in the anonymous space or carries an unregistered
    /// subspace.
    pub fn dim_offset(&self, dim: usize) -> Option<DimOffset> {
        match self.signature[dim] {
            (SOME_SPACE, offset) => Some(offset),
            (_, UNREG_SUBSPACE) => None,
            _ => None,
        }
    }

    /// Total number of elements.
    pub fn volume(&self) -> DimExtent {
        self.shape.iter().product()
    }

    /// Structural congruence: equal shape and equal signature. Names are
    /// irrelevant.
    pub fn is_congruent_to(&self, other: &Tensor) -> bool {
        self.shape == other.shape && self.signature == other.signature
    }

    /// Whether any dimension references the given space.
    pub fn references_space(&self, space: SpaceId) -> bool {
        self.signature.iter().any(|(s, _)| *s == space)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, extent) in self.shape.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{extent}")?;
        }
        write!(f, ")")
    }
}
