use log::error;
use num_complex::Complex64;

use crate::tensornetwork::network::TensorNetwork;
use crate::tensornetwork::tensor::TensorHandle;
use crate::types::{DimExtent, SpaceId, SubspaceId};

/// Mapping from a global operator mode id to an open leg of a component.
pub type ModePairing = Vec<(usize, usize)>;

/// One term of a tensor network operator: a network (or a promoted bare
/// tensor) whose open legs are split between the ket and bra dual spaces.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorComponent {
    pub network: TensorNetwork,
    /// Global ket mode id -> open leg of the component.
    pub ket_legs: ModePairing,
    /// Global bra mode id -> open leg of the component.
    pub bra_legs: ModePairing,
    pub coefficient: Complex64,
}

/// A linear combination of ket/bra-labeled tensor networks establishing a
/// map between two dual spaces.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TensorOperator {
    name: String,
    components: Vec<OperatorComponent>,
}

impl TensorOperator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn component(&self, index: usize) -> Option<&OperatorComponent> {
        self.components.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OperatorComponent> {
        self.components.iter()
    }

    /// Appends a finalized network with the given ket/bra leg pairings.
    ///
    /// Non-throwing contract: returns false (logging the reason, mutating
    /// nothing) if the network is unfinalized, the pairing sizes do not sum
    /// to the component's open-leg count, or a pairing entry is out of
    /// range or duplicated.
    pub fn append_component(
        &mut self,
        network: TensorNetwork,
        ket_legs: ModePairing,
        bra_legs: ModePairing,
        coefficient: Complex64,
    ) -> bool {
        if !network.is_finalized() {
            error!(operator = self.name, network = network.name(); "can not append an unfinalized network");
            return false;
        }
        let rank = network.rank();
        if ket_legs.len() + bra_legs.len() != rank {
            error!(
                operator = self.name,
                network = network.name(),
                ket = ket_legs.len(),
                bra = bra_legs.len(),
                rank;
                "ket and bra pairings must cover the component's open legs"
            );
            return false;
        }
        let mut seen_legs = vec![false; rank];
        for &(_, leg) in ket_legs.iter().chain(bra_legs.iter()) {
            if leg >= rank || std::mem::replace(&mut seen_legs[leg], true) {
                error!(operator = self.name, leg; "invalid or duplicate leg in pairing");
                return false;
            }
        }
        for pairing in [&ket_legs, &bra_legs] {
            let mut modes: Vec<_> = pairing.iter().map(|&(mode, _)| mode).collect();
            modes.sort_unstable();
            modes.dedup();
            if modes.len() != pairing.len() {
                error!(operator = self.name; "duplicate mode id in pairing");
                return false;
            }
        }
        if let Some(first) = self.components.first() {
            if first.ket_legs.len() != ket_legs.len() || first.bra_legs.len() != bra_legs.len() {
                error!(operator = self.name; "component ket/bra ranks disagree with the operator");
                return false;
            }
        }
        self.components.push(OperatorComponent {
            network,
            ket_legs,
            bra_legs,
            coefficient,
        });
        true
    }

    /// Appends a bare tensor, auto-wrapping it into a single-tensor network
    /// whose output legs are the identity permutation of the tensor's legs.
    pub fn append_tensor_component(
        &mut self,
        tensor: TensorHandle,
        ket_legs: ModePairing,
        bra_legs: ModePairing,
        coefficient: Complex64,
    ) -> bool {
        let network = TensorNetwork::from_tensor(tensor.name().to_string(), tensor);
        self.append_component(network, ket_legs, bra_legs, coefficient)
    }

    /// Conjugates the operator: every component network is conjugated, each
    /// component's ket and bra pairings swap and each coefficient is
    /// complex-conjugated. Operator adjunction swaps the two dual spaces.
    pub fn conjugate(&mut self) {
        for component in &mut self.components {
            component.network.conjugate();
            std::mem::swap(&mut component.ket_legs, &mut component.bra_legs);
            component.coefficient = component.coefficient.conj();
        }
    }

    /// Shape of the operator's ket side, ordered by global ket mode id.
    pub fn ket_shape(&self) -> Vec<(DimExtent, (SpaceId, SubspaceId))> {
        self.side_shape(|c| &c.ket_legs)
    }

    /// Shape of the operator's bra side, ordered by global bra mode id.
    pub fn bra_shape(&self) -> Vec<(DimExtent, (SpaceId, SubspaceId))> {
        self.side_shape(|c| &c.bra_legs)
    }

    fn side_shape(
        &self,
        pairing: impl Fn(&OperatorComponent) -> &ModePairing,
    ) -> Vec<(DimExtent, (SpaceId, SubspaceId))> {
        let Some(first) = self.components.first() else {
            return Vec::new();
        };
        let output = first
            .network
            .output_tensor()
            .expect("finalized network has an output tensor");
        let mut modes: Vec<_> = pairing(first)
            .iter()
            .map(|&(mode, leg)| (mode, (output.dim_extent(leg), output.signature()[leg])))
            .collect();
        modes.sort_unstable_by_key(|&(mode, _)| mode);
        modes.into_iter().map(|(_, entry)| entry).collect()
    }
}
