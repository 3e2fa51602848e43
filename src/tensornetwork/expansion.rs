use log::error;
use num_complex::Complex64;

use crate::errors::{Error, Result};
use crate::tensornetwork::network::TensorNetwork;
use crate::tensornetwork::operator::TensorOperator;
use crate::tensornetwork::tensor::TensorSignature;
use crate::types::DimExtent;

/// One term of a tensor network expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionComponent {
    pub network: TensorNetwork,
    pub coefficient: Complex64,
}

/// A linear combination of tensor networks with complex coefficients,
/// tagged as living in the ket or bra dual space. The output tensors of
/// all components are pairwise congruent.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorExpansion {
    name: String,
    ket: bool,
    components: Vec<ExpansionComponent>,
}

impl TensorExpansion {
    /// Creates an empty ket expansion.
    pub fn new_ket(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ket: true,
            components: Vec::new(),
        }
    }

    /// Creates an empty bra expansion.
    pub fn new_bra(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ket: false,
            components: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_ket(&self) -> bool {
        self.ket
    }

    pub fn is_bra(&self) -> bool {
        !self.ket
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn component(&self, index: usize) -> Option<&ExpansionComponent> {
        self.components.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExpansionComponent> {
        self.components.iter()
    }

    /// Rank of the expansion, i.e. of every component's output tensor.
    pub fn rank(&self) -> usize {
        self.components
            .first()
            .map(|c| c.network.rank())
            .unwrap_or(0)
    }

    /// Shape and signature of the expansion's output, taken from the first
    /// component.
    pub fn shape(&self) -> Option<(Vec<DimExtent>, TensorSignature)> {
        let output = self.components.first()?.network.output_tensor()?;
        Some((output.shape().to_vec(), output.signature().clone()))
    }

    /// Appends a finalized tensor network scaled by `coefficient`.
    ///
    /// Non-throwing contract: returns false (and mutates nothing) if the
    /// network is unfinalized or its output tensor is not congruent, in
    /// shape, signature and leg directions, to the existing components.
    pub fn append_component(&mut self, network: TensorNetwork, coefficient: Complex64) -> bool {
        if !network.is_finalized() {
            error!(expansion = self.name, network = network.name(); "can not append an unfinalized network");
            return false;
        }
        if let Some(first) = self.components.first() {
            let existing = first
                .network
                .output_tensor()
                .expect("finalized network has an output tensor");
            let incoming = network
                .output_tensor()
                .expect("finalized network has an output tensor");
            if !existing.is_congruent_to(incoming) {
                error!(expansion = self.name, network = network.name(); "output tensor is not congruent");
                return false;
            }
            let existing_dirs = first.network.conn(0).unwrap().legs();
            let incoming_dirs = network.conn(0).unwrap().legs();
            if existing_dirs
                .iter()
                .zip(incoming_dirs)
                .any(|(a, b)| a.direction() != b.direction())
            {
                error!(expansion = self.name, network = network.name(); "output leg directions disagree");
                return false;
            }
        }
        self.components.push(ExpansionComponent {
            network,
            coefficient,
        });
        true
    }

    /// Appends every component of another expansion, scaled by
    /// `coefficient`. Both expansions must share duality and rank.
    pub fn append_expansion(&mut self, other: &TensorExpansion, coefficient: Complex64) -> bool {
        if self.ket != other.ket {
            error!(expansion = self.name; "can not append an expansion of the opposite duality");
            return false;
        }
        if !self.components.is_empty() && self.rank() != other.rank() {
            error!(expansion = self.name; "can not append an expansion of different rank");
            return false;
        }
        for component in &other.components {
            if !self.append_component(
                component.network.clone(),
                component.coefficient * coefficient,
            ) {
                return false;
            }
        }
        true
    }

    /// Conjugates the expansion: every component network is conjugated,
    /// every coefficient is complex-conjugated and the ket/bra tag flips.
    pub fn conjugate(&mut self) {
        for component in &mut self.components {
            component.network.conjugate();
            component.coefficient = component.coefficient.conj();
        }
        self.ket = !self.ket;
    }

    /// Direct product of two expansions of the same duality.
    pub fn direct_product(
        name: impl Into<String>,
        left: &TensorExpansion,
        right: &TensorExpansion,
    ) -> Result<TensorExpansion> {
        if left.ket != right.ket {
            return Err(Error::Validation(
                "direct product requires expansions of the same duality".to_string(),
            ));
        }
        let name = name.into();
        let mut product = if left.ket {
            TensorExpansion::new_ket(name)
        } else {
            TensorExpansion::new_bra(name)
        };
        for l in &left.components {
            for r in &right.components {
                let mut network = l.network.clone();
                network.rename(format!("{}*{}", l.network.name(), r.network.name()));
                if !network.append_network(&r.network, &[]) {
                    return Err(Error::Validation(format!(
                        "failed to form the direct product of '{}' and '{}'",
                        l.network.name(),
                        r.network.name()
                    )));
                }
                if !product.append_component(network, l.coefficient * r.coefficient) {
                    return Err(Error::Validation(
                        "direct product components are not congruent".to_string(),
                    ));
                }
            }
        }
        Ok(product)
    }

    /// Inner product of a bra and a ket expansion of matching shape,
    /// producing a scalar (rank 0) expansion.
    pub fn inner_product(
        name: impl Into<String>,
        bra: &TensorExpansion,
        ket: &TensorExpansion,
    ) -> Result<TensorExpansion> {
        if !bra.is_bra() || !ket.is_ket() {
            return Err(Error::Validation(
                "inner product requires a bra and a ket expansion".to_string(),
            ));
        }
        let (bra_shape, bra_signature) = bra
            .shape()
            .ok_or_else(|| Error::Validation("empty bra expansion".to_string()))?;
        let (ket_shape, ket_signature) = ket
            .shape()
            .ok_or_else(|| Error::Validation("empty ket expansion".to_string()))?;
        if bra_shape != ket_shape || bra_signature != ket_signature {
            return Err(Error::ShapeMismatch {
                left: format!("bra shape {bra_shape:?}"),
                right: format!("ket shape {ket_shape:?}"),
            });
        }

        let pairing: Vec<(usize, usize)> = (0..bra_shape.len()).map(|i| (i, i)).collect();
        let mut product = TensorExpansion::new_ket(name);
        for b in &bra.components {
            for k in &ket.components {
                let mut network = k.network.clone();
                network.rename(format!("{}*{}", b.network.name(), k.network.name()));
                if !network.append_network(&b.network, &pairing) {
                    return Err(Error::Validation(format!(
                        "failed to contract '{}' with '{}'",
                        b.network.name(),
                        k.network.name()
                    )));
                }
                if !product.append_component(network, b.coefficient * k.coefficient) {
                    return Err(Error::Validation(
                        "inner product components are not congruent".to_string(),
                    ));
                }
            }
        }
        Ok(product)
    }

    /// Applies a tensor network operator to this expansion, producing a new
    /// expansion of the same duality. For a ket expansion the operator's
    /// ket shape must match the expansion's shape (and vice versa for a
    /// bra); the result's open legs follow the operator's opposite-duality
    /// mode order.
    pub fn apply_operator(
        name: impl Into<String>,
        expansion: &TensorExpansion,
        operator: &TensorOperator,
    ) -> Result<TensorExpansion> {
        let (shape, signature) = expansion
            .shape()
            .ok_or_else(|| Error::Validation("empty expansion".to_string()))?;
        let acting = if expansion.is_ket() {
            operator.ket_shape()
        } else {
            operator.bra_shape()
        };
        let expected: Vec<_> = shape
            .iter()
            .copied()
            .zip(signature.iter().copied())
            .collect();
        if acting != expected {
            return Err(Error::ShapeMismatch {
                left: format!("operator shape {acting:?}"),
                right: format!("expansion shape {expected:?}"),
            });
        }

        let name = name.into();
        let mut result = if expansion.is_ket() {
            TensorExpansion::new_ket(name)
        } else {
            TensorExpansion::new_bra(name)
        };
        for term in &expansion.components {
            for component in operator.iter() {
                let (pairing, free_modes) = if expansion.is_ket() {
                    (&component.ket_legs, &component.bra_legs)
                } else {
                    (&component.bra_legs, &component.ket_legs)
                };
                let mut network = term.network.clone();
                network.rename(format!(
                    "{}*{}",
                    component.network.name(),
                    term.network.name()
                ));
                if !network.append_network(&component.network, pairing) {
                    return Err(Error::Validation(format!(
                        "failed to apply operator component '{}'",
                        component.network.name()
                    )));
                }

                // The remaining open legs are the operator component's
                // opposite-duality legs, currently in positional order;
                // reorder them by their global mode ids.
                let mut free: Vec<(usize, usize)> = free_modes.clone();
                free.sort_unstable_by_key(|&(_, leg)| leg);
                let mut order = vec![0; free.len()];
                let mut by_mode: Vec<usize> = (0..free.len()).collect();
                by_mode.sort_unstable_by_key(|&i| free[i].0);
                for (new_pos, &i) in by_mode.iter().enumerate() {
                    order[i] = new_pos;
                }
                if !network.reorder_output_modes(&order) {
                    return Err(Error::Validation(
                        "failed to reorder the product's open legs".to_string(),
                    ));
                }
                if !result.append_component(network, component.coefficient * term.coefficient) {
                    return Err(Error::Validation(
                        "operator application produced incongruent components".to_string(),
                    ));
                }
            }
        }
        Ok(result)
    }
}

/// Checks that a full contraction (bra expansion × operator × ket
/// expansion) is legal: the operator's bra shape must match the bra
/// expansion and its ket shape the ket expansion. Shape equality is
/// structural equality of the ordered signatures, not merely matching
/// extents.
pub fn full_contraction_legal(
    bra: &TensorExpansion,
    operator: &TensorOperator,
    ket: &TensorExpansion,
) -> Result<()> {
    for (expansion, acting, side) in [
        (bra, operator.bra_shape(), "bra"),
        (ket, operator.ket_shape(), "ket"),
    ] {
        let (shape, signature) = expansion
            .shape()
            .ok_or_else(|| Error::Validation(format!("empty {side} expansion")))?;
        let expected: Vec<_> = shape
            .iter()
            .copied()
            .zip(signature.iter().copied())
            .collect();
        if acting != expected {
            return Err(Error::ShapeMismatch {
                left: format!("operator {side} shape {acting:?}"),
                right: format!("{side} expansion shape {expected:?}"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::tensornetwork::tensor::Tensor;

    fn wrapped(name: &str, tensor_name: &str, shape: Vec<u64>) -> TensorNetwork {
        TensorNetwork::from_tensor(name, Arc::new(Tensor::new(tensor_name, shape)))
    }

    #[test]
    fn test_append_component_congruence() {
        let mut expansion = TensorExpansion::new_ket("psi");
        assert!(expansion.append_component(wrapped("n1", "A", vec![2, 3]), Complex64::ONE));
        assert!(expansion.append_component(
            wrapped("n2", "B", vec![2, 3]),
            Complex64::new(0.0, -1.0)
        ));
        // Mismatching output shape is rejected without mutation.
        assert!(!expansion.append_component(wrapped("n3", "C", vec![3, 2]), Complex64::ONE));
        assert_eq!(expansion.num_components(), 2);
    }

    #[test]
    fn test_conjugate_flips_duality_and_coefficients() {
        let mut expansion = TensorExpansion::new_ket("psi");
        expansion.append_component(wrapped("n1", "A", vec![2]), Complex64::new(1.0, 2.0));
        expansion.conjugate();
        assert!(expansion.is_bra());
        assert_eq!(
            expansion.component(0).unwrap().coefficient,
            Complex64::new(1.0, -2.0)
        );
        assert!(expansion.component(0).unwrap().network.conn(1).unwrap().is_conjugated());
        expansion.conjugate();
        assert!(expansion.is_ket());
        assert!(!expansion.component(0).unwrap().network.conn(1).unwrap().is_conjugated());
    }

    #[test]
    fn test_inner_product_is_scalar() {
        let mut ket = TensorExpansion::new_ket("psi");
        ket.append_component(wrapped("k", "A", vec![2, 3]), Complex64::ONE);
        let mut bra = TensorExpansion::new_bra("phi");
        bra.append_component(wrapped("b", "B", vec![2, 3]), Complex64::ONE);

        let product = TensorExpansion::inner_product("overlap", &bra, &ket).unwrap();
        assert_eq!(product.num_components(), 1);
        assert_eq!(product.rank(), 0);
    }

    #[test]
    fn test_inner_product_shape_mismatch() {
        let mut ket = TensorExpansion::new_ket("psi");
        ket.append_component(wrapped("k", "A", vec![2, 3]), Complex64::ONE);
        let mut bra = TensorExpansion::new_bra("phi");
        bra.append_component(wrapped("b", "B", vec![3, 3]), Complex64::ONE);

        assert!(matches!(
            TensorExpansion::inner_product("overlap", &bra, &ket),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_direct_product_requires_same_duality() {
        let mut ket = TensorExpansion::new_ket("psi");
        ket.append_component(wrapped("k", "A", vec![2]), Complex64::ONE);
        let mut bra = TensorExpansion::new_bra("phi");
        bra.append_component(wrapped("b", "B", vec![2]), Complex64::ONE);
        assert!(TensorExpansion::direct_product("p", &ket, &bra).is_err());
    }
}
