//! The numerical server: the single context object owning the space
//! registry, the tensor registry, the execution runtime and the
//! contraction planner.
//!
//! There is no ambient global state; several servers may coexist in one
//! process, each with its own registries and worker pool.

use std::sync::Arc;

use log::debug;
use num_complex::Complex64;
use rustc_hash::FxHashMap;

use crate::backend::{DenseExecutor, DenseTensor};
use crate::comm::{CollectiveService, LocalCollectives, ProcessGroup, Rank};
use crate::contractionpath::cache::ContrSeqCache;
use crate::contractionpath::paths::{optimize, OptimizerKind};
use crate::contractionpath::{assign_edge_labels, EdgeTensor, PathInputs};
use crate::errors::{Error, Result};
use crate::operation::{
    ContractionPattern, InitDataFunctor, ScaleFunctor, SvdAbsorb, SvdPattern, TensorFunctor,
    TensorNodeExecutor, TensorOperation,
};
use crate::runtime::TensorRuntime;
use crate::spaces::{SpaceRegistry, Subspace, VectorSpace};
use crate::symbolic::{parse_spec, SymbolicSpec, SymbolicTerm};
use crate::tensornetwork::expansion::TensorExpansion;
use crate::tensornetwork::network::{TensorLeg, TensorNetwork, OUTPUT_VERTEX};
use crate::tensornetwork::tensor::{Tensor, TensorHandle, TensorSignature};
use crate::types::{
    ContrTriple, DimExtent, DimOffset, EdgeId, SpaceId, SubspaceId, VertexId, SOME_SPACE,
    UNREG_SUBSPACE,
};

/// The numerical server session.
pub struct NumServer {
    space_register: SpaceRegistry,
    tensors: FxHashMap<String, TensorHandle>,
    functors: FxHashMap<String, Arc<dyn TensorFunctor>>,
    executor: Arc<DenseExecutor>,
    runtime: TensorRuntime,
    comm: Arc<dyn CollectiveService>,
    optimizer: OptimizerKind,
    contr_seq_cache: Option<ContrSeqCache>,
    default_group: ProcessGroup,
    intermediates: u64,
}

impl Default for NumServer {
    fn default() -> Self {
        Self::new()
    }
}

impl NumServer {
    /// Starts a server with local (single-process) collectives and as many
    /// worker slots as the machine offers.
    pub fn new() -> Self {
        Self::with_workers(0)
    }

    /// Starts a server with an explicit worker-slot count (0 picks the
    /// available parallelism).
    pub fn with_workers(num_workers: usize) -> Self {
        Self::with_collectives(Arc::new(LocalCollectives), num_workers)
    }

    /// Starts a server on top of an explicit collective-communication
    /// service (e.g. an MPI-backed one).
    pub fn with_collectives(comm: Arc<dyn CollectiveService>, num_workers: usize) -> Self {
        let executor = Arc::new(DenseExecutor::new(Arc::clone(&comm)));
        let dyn_executor: Arc<dyn TensorNodeExecutor> = executor.clone();
        let runtime = TensorRuntime::new(dyn_executor, num_workers);
        let default_group = ProcessGroup::world(comm.num_processes());
        Self {
            space_register: SpaceRegistry::new(),
            tensors: FxHashMap::default(),
            functors: FxHashMap::default(),
            executor,
            runtime,
            comm,
            optimizer: OptimizerKind::default(),
            contr_seq_cache: None,
            default_group,
            intermediates: 0,
        }
    }

    // --- Spaces -----------------------------------------------------------

    /// Creates a named vector space; its full subspace is registered
    /// automatically under `"<name>.full"`.
    pub fn create_vector_space(&mut self, name: &str, dim: DimExtent) -> Result<SpaceId> {
        self.space_register.create_space(name, dim)
    }

    /// Destroys a named vector space. Fails while any registered tensor
    /// signature still references it.
    pub fn destroy_vector_space(&mut self, name: &str) -> Result<()> {
        let id = self.space_register.space(name)?.id();
        if let Some(tensor) = self.tensors.values().find(|t| t.references_space(id)) {
            return Err(Error::ReferentialIntegrity {
                name: name.to_string(),
                holder: format!("tensor '{}'", tensor.name()),
            });
        }
        self.space_register.destroy_space(name)
    }

    pub fn create_subspace(
        &mut self,
        name: &str,
        space_name: &str,
        bounds: (DimOffset, DimOffset),
    ) -> Result<SubspaceId> {
        self.space_register.create_subspace(name, space_name, bounds)
    }

    pub fn destroy_subspace(&mut self, name: &str) -> Result<()> {
        self.space_register.destroy_subspace(name)
    }

    pub fn get_vector_space(&self, name: &str) -> Result<&VectorSpace> {
        self.space_register.space(name)
    }

    pub fn get_subspace(&self, name: &str) -> Result<&Subspace> {
        self.space_register.subspace(name)
    }

    // --- Tensors ----------------------------------------------------------

    /// Declares and creates a tensor over the anonymous space.
    pub fn create_tensor(&mut self, name: &str, shape: Vec<DimExtent>) -> Result<TensorHandle> {
        let signature = shape.iter().map(|_| (SOME_SPACE, 0)).collect();
        self.create_tensor_with_signature(name, shape, signature)
    }

    /// Declares and creates a tensor with an explicit signature.
    pub fn create_tensor_with_signature(
        &mut self,
        name: &str,
        shape: Vec<DimExtent>,
        signature: TensorSignature,
    ) -> Result<TensorHandle> {
        if self.tensors.contains_key(name) {
            return Err(Error::NameTaken(name.to_string()));
        }
        self.validate_signature(&shape, &signature)?;
        let handle = Arc::new(Tensor::with_signature(name, shape, signature)?);
        self.tensors.insert(name.to_string(), Arc::clone(&handle));
        self.runtime.submit(TensorOperation::Create {
            tensor: Arc::clone(&handle),
        })?;
        Ok(handle)
    }

    /// Declares and creates a tensor over registered subspaces, one per
    /// dimension; the shape is taken from the subspace dimensions.
    pub fn create_tensor_in(&mut self, name: &str, subspaces: &[&str]) -> Result<TensorHandle> {
        let mut shape = Vec::with_capacity(subspaces.len());
        let mut signature = Vec::with_capacity(subspaces.len());
        for sub_name in subspaces {
            let sub = self.space_register.subspace(sub_name)?;
            shape.push(sub.dim());
            signature.push((sub.space_id(), sub.id()));
        }
        self.create_tensor_with_signature(name, shape, signature)
    }

    /// [NumServer::create_tensor] followed by a blocking sync.
    pub fn create_tensor_sync(&mut self, name: &str, shape: Vec<DimExtent>) -> Result<TensorHandle> {
        let handle = self.create_tensor(name, shape)?;
        self.sync(name, true)?;
        Ok(handle)
    }

    /// Destroys a tensor: releases its storage asynchronously and removes
    /// the symbolic registration.
    pub fn destroy_tensor(&mut self, name: &str) -> Result<()> {
        let handle = self
            .tensors
            .remove(name)
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))?;
        self.runtime
            .submit(TensorOperation::Destroy { tensor: handle })
    }

    pub fn destroy_tensor_sync(&mut self, name: &str) -> Result<()> {
        self.destroy_tensor(name)?;
        self.sync(name, true).map(|_| ())
    }

    /// Shared handle of a registered tensor.
    pub fn get_tensor(&self, name: &str) -> Result<TensorHandle> {
        self.tensors
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    /// Whether storage is currently bound to the tensor.
    pub fn tensor_allocated(&self, name: &str) -> bool {
        self.executor.is_allocated(name)
    }

    /// Synchronizes outstanding updates and copies out the local dense
    /// storage of a tensor.
    pub fn get_local_tensor(&self, name: &str) -> Result<DenseTensor> {
        self.runtime.sync_tensor(name, true)?;
        self.executor.local_tensor(name)
    }

    /// Initializes a tensor to a scalar value.
    pub fn init_tensor(&mut self, name: &str, value: Complex64) -> Result<()> {
        let tensor = self.get_tensor(name)?;
        self.runtime
            .submit(TensorOperation::InitValue { tensor, value })
    }

    pub fn init_tensor_sync(&mut self, name: &str, value: Complex64) -> Result<()> {
        self.init_tensor(name, value)?;
        self.sync(name, true).map(|_| ())
    }

    /// Initializes a tensor with externally provided row-major data.
    pub fn init_tensor_data(&mut self, name: &str, data: Vec<Complex64>) -> Result<()> {
        let tensor = self.get_tensor(name)?;
        if tensor.volume() as usize != data.len() {
            return Err(Error::ShapeMismatch {
                left: format!("tensor '{}' of volume {}", name, tensor.volume()),
                right: format!("{} provided elements", data.len()),
            });
        }
        self.runtime.submit(TensorOperation::Transform {
            tensor,
            functor: Arc::new(InitDataFunctor::new(data)),
        })
    }

    pub fn init_tensor_data_sync(&mut self, name: &str, data: Vec<Complex64>) -> Result<()> {
        self.init_tensor_data(name, data)?;
        self.sync(name, true).map(|_| ())
    }

    /// Fills a tensor with random values.
    pub fn init_tensor_rnd(&mut self, name: &str) -> Result<()> {
        let tensor = self.get_tensor(name)?;
        self.runtime.submit(TensorOperation::InitRandom { tensor })
    }

    pub fn init_tensor_rnd_sync(&mut self, name: &str) -> Result<()> {
        self.init_tensor_rnd(name)?;
        self.sync(name, true).map(|_| ())
    }

    /// Scales a tensor by a scalar value.
    pub fn scale_tensor(&mut self, name: &str, value: Complex64) -> Result<()> {
        let tensor = self.get_tensor(name)?;
        self.runtime.submit(TensorOperation::Transform {
            tensor,
            functor: Arc::new(ScaleFunctor::new(value)),
        })
    }

    pub fn scale_tensor_sync(&mut self, name: &str, value: Complex64) -> Result<()> {
        self.scale_tensor(name, value)?;
        self.sync(name, true).map(|_| ())
    }

    /// Registers an external tensor transformation under a tag.
    pub fn register_tensor_method(&mut self, tag: &str, functor: Arc<dyn TensorFunctor>) {
        self.functors.insert(tag.to_string(), functor);
    }

    /// Retrieves a registered tensor transformation.
    pub fn get_tensor_method(&self, tag: &str) -> Result<Arc<dyn TensorFunctor>> {
        self.functors
            .get(tag)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(tag.to_string()))
    }

    /// Transforms (updates) a tensor with a registered functor.
    pub fn transform_tensor(&mut self, name: &str, tag: &str) -> Result<()> {
        let tensor = self.get_tensor(name)?;
        let functor = self.get_tensor_method(tag)?;
        self.runtime
            .submit(TensorOperation::Transform { tensor, functor })
    }

    pub fn transform_tensor_sync(&mut self, name: &str, tag: &str) -> Result<()> {
        self.transform_tensor(name, tag)?;
        self.sync(name, true).map(|_| ())
    }

    // --- Symbolic tensor operations --------------------------------------

    /// Tensor addition `tensor0 += tensor1 * alpha` from a symbolic
    /// specification such as `"C(i,j) = A(j,i)"`.
    pub fn add_tensors(&mut self, addition: &str, alpha: Complex64) -> Result<()> {
        let spec = parse_spec(addition)?;
        if spec.operands.len() != 1 {
            return Err(Error::Validation(format!(
                "an addition takes exactly one operand: '{addition}'"
            )));
        }
        let dst = self.resolve(&spec.result)?;
        let src = self.resolve(&spec.operands[0])?;
        let permutation = spec
            .result
            .indices
            .iter()
            .map(|index| {
                spec.operands[0]
                    .indices
                    .iter()
                    .position(|i| i == index)
                    .ok_or_else(|| {
                        Error::Validation(format!("index '{index}' is missing on the operand"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        self.runtime.submit(TensorOperation::Add {
            dst,
            src,
            permutation,
            alpha,
            conj_src: spec.operands[0].conjugated,
        })
    }

    pub fn add_tensors_sync(&mut self, addition: &str, alpha: Complex64) -> Result<()> {
        let result = parse_spec(addition)?.result.name;
        self.add_tensors(addition, alpha)?;
        self.sync(&result, true).map(|_| ())
    }

    /// Tensor contraction `tensor0 += tensor1 * tensor2 * alpha` from a
    /// symbolic specification such as `"C(i,j) = A(i,k) * B(k,j)"`.
    pub fn contract_tensors(&mut self, contraction: &str, alpha: Complex64) -> Result<()> {
        let spec = parse_spec(contraction)?;
        if spec.operands.len() != 2 {
            return Err(Error::Validation(format!(
                "a contraction takes exactly two operands: '{contraction}'"
            )));
        }
        let dst = self.resolve(&spec.result)?;
        let left = self.resolve(&spec.operands[0])?;
        let right = self.resolve(&spec.operands[1])?;
        let pattern = ContractionPattern::from_spec(&spec)?;
        self.runtime.submit(TensorOperation::Contract {
            dst,
            left,
            right,
            pattern,
            alpha,
            conj_left: spec.operands[0].conjugated,
            conj_right: spec.operands[1].conjugated,
        })
    }

    pub fn contract_tensors_sync(&mut self, contraction: &str, alpha: Complex64) -> Result<()> {
        let result = parse_spec(contraction)?.result.name;
        self.contract_tensors(contraction, alpha)?;
        self.sync(&result, true).map(|_| ())
    }

    /// Three-factor SVD decomposition `D = L * S * R`; the factor tensors
    /// must already exist. The ordering of the newly introduced contracted
    /// indices is not guaranteed.
    pub fn decompose_tensor_svd(&mut self, contraction: &str) -> Result<()> {
        let spec = parse_spec(contraction)?;
        if spec.operands.len() != 3 {
            return Err(Error::Validation(format!(
                "a three-factor decomposition takes three operands: '{contraction}'"
            )));
        }
        let tensor = self.resolve(&spec.result)?;
        let left = self.resolve(&spec.operands[0])?;
        let middle = self.resolve(&spec.operands[1])?;
        let right = self.resolve(&spec.operands[2])?;
        let pattern = SvdPattern::from_spec(&spec)?;
        self.runtime.submit(TensorOperation::DecomposeSvd3 {
            tensor,
            left,
            middle,
            right,
            pattern,
        })
    }

    pub fn decompose_tensor_svd_sync(&mut self, contraction: &str) -> Result<()> {
        let spec = parse_spec(contraction)?;
        self.decompose_tensor_svd(contraction)?;
        for operand in &spec.operands {
            self.sync(&operand.name, true)?;
        }
        Ok(())
    }

    fn decompose_svd2(&mut self, contraction: &str, absorb: SvdAbsorb) -> Result<()> {
        let spec = parse_spec(contraction)?;
        if spec.operands.len() != 2 {
            return Err(Error::Validation(format!(
                "a two-factor decomposition takes two operands: '{contraction}'"
            )));
        }
        let tensor = self.resolve(&spec.result)?;
        let left = self.resolve(&spec.operands[0])?;
        let right = self.resolve(&spec.operands[1])?;
        let pattern = SvdPattern::from_spec(&spec)?;
        self.runtime.submit(TensorOperation::DecomposeSvd2 {
            tensor,
            left,
            right,
            pattern,
            absorb,
        })
    }

    /// Two-factor SVD with the singular values absorbed into the left
    /// factor.
    pub fn decompose_tensor_svd_l(&mut self, contraction: &str) -> Result<()> {
        self.decompose_svd2(contraction, SvdAbsorb::Left)
    }

    /// Two-factor SVD with the singular values absorbed into the right
    /// factor.
    pub fn decompose_tensor_svd_r(&mut self, contraction: &str) -> Result<()> {
        self.decompose_svd2(contraction, SvdAbsorb::Right)
    }

    /// Two-factor SVD with the square root of the singular values absorbed
    /// into both factors.
    pub fn decompose_tensor_svd_lr(&mut self, contraction: &str) -> Result<()> {
        self.decompose_svd2(contraction, SvdAbsorb::Split)
    }

    pub fn decompose_tensor_svd_l_sync(&mut self, contraction: &str) -> Result<()> {
        self.decompose_svd2_sync(contraction, SvdAbsorb::Left)
    }

    pub fn decompose_tensor_svd_r_sync(&mut self, contraction: &str) -> Result<()> {
        self.decompose_svd2_sync(contraction, SvdAbsorb::Right)
    }

    pub fn decompose_tensor_svd_lr_sync(&mut self, contraction: &str) -> Result<()> {
        self.decompose_svd2_sync(contraction, SvdAbsorb::Split)
    }

    fn decompose_svd2_sync(&mut self, contraction: &str, absorb: SvdAbsorb) -> Result<()> {
        let spec = parse_spec(contraction)?;
        self.decompose_svd2(contraction, absorb)?;
        for operand in &spec.operands {
            self.sync(&operand.name, true)?;
        }
        Ok(())
    }

    /// Orthogonalizes a tensor by discarding the singular values of its
    /// two-factor SVD; the specification must contain exactly one
    /// contracted index. Only the decomposed tensor is updated.
    pub fn orthogonalize_tensor_svd(&mut self, contraction: &str) -> Result<()> {
        let spec = parse_spec(contraction)?;
        if spec.operands.len() != 2 {
            return Err(Error::Validation(format!(
                "an orthogonalization takes two factors: '{contraction}'"
            )));
        }
        let tensor = self.resolve(&spec.result)?;
        let pattern = SvdPattern::from_spec(&spec)?;
        self.runtime
            .submit(TensorOperation::OrthogonalizeSvd { tensor, pattern })
    }

    pub fn orthogonalize_tensor_svd_sync(&mut self, contraction: &str) -> Result<()> {
        let result = parse_spec(contraction)?.result.name;
        self.orthogonalize_tensor_svd(contraction)?;
        self.sync(&result, true).map(|_| ())
    }

    /// Orthogonalizes a tensor via the modified Gram-Schmidt procedure.
    pub fn orthogonalize_tensor_mgs(&mut self, name: &str) -> Result<()> {
        let tensor = self.get_tensor(name)?;
        self.runtime
            .submit(TensorOperation::OrthogonalizeMgs { tensor })
    }

    pub fn orthogonalize_tensor_mgs_sync(&mut self, name: &str) -> Result<()> {
        self.orthogonalize_tensor_mgs(name)?;
        self.sync(name, true).map(|_| ())
    }

    /// Extracts a slice from a tensor; the slice tensor's shape and
    /// signature determine which region is taken.
    pub fn extract_tensor_slice(&mut self, tensor_name: &str, slice_name: &str) -> Result<()> {
        let tensor = self.get_tensor(tensor_name)?;
        let slice = self.get_tensor(slice_name)?;
        let offsets = self.slice_offsets(&slice)?;
        self.runtime.submit(TensorOperation::SliceExtract {
            tensor,
            slice,
            offsets,
        })
    }

    pub fn extract_tensor_slice_sync(&mut self, tensor_name: &str, slice_name: &str) -> Result<()> {
        self.extract_tensor_slice(tensor_name, slice_name)?;
        self.sync(slice_name, true).map(|_| ())
    }

    /// Inserts a slice into a tensor at the position encoded in the
    /// slice's signature.
    pub fn insert_tensor_slice(&mut self, tensor_name: &str, slice_name: &str) -> Result<()> {
        let tensor = self.get_tensor(tensor_name)?;
        let slice = self.get_tensor(slice_name)?;
        let offsets = self.slice_offsets(&slice)?;
        self.runtime.submit(TensorOperation::SliceInsert {
            tensor,
            slice,
            offsets,
        })
    }

    pub fn insert_tensor_slice_sync(&mut self, tensor_name: &str, slice_name: &str) -> Result<()> {
        self.insert_tensor_slice(tensor_name, slice_name)?;
        self.sync(tensor_name, true).map(|_| ())
    }

    // --- Collectives ------------------------------------------------------

    /// Replicates a tensor within a process group; only the root rank is
    /// required to have it.
    pub fn replicate_tensor(&mut self, name: &str, root: Rank) -> Result<()> {
        let group = self.default_group.clone();
        self.replicate_tensor_in(&group, name, root)
    }

    pub fn replicate_tensor_in(
        &mut self,
        group: &ProcessGroup,
        name: &str,
        root: Rank,
    ) -> Result<()> {
        let tensor = self.get_tensor(name)?;
        self.runtime.submit(TensorOperation::Replicate {
            tensor,
            group: group.clone(),
            root,
        })
    }

    pub fn replicate_tensor_sync(&mut self, name: &str, root: Rank) -> Result<()> {
        self.replicate_tensor(name, root)?;
        self.sync(name, true).map(|_| ())
    }

    /// Broadcasts a tensor within a process group; the tensor must exist
    /// on every participating process.
    pub fn broadcast_tensor(&mut self, name: &str, root: Rank) -> Result<()> {
        let group = self.default_group.clone();
        self.broadcast_tensor_in(&group, name, root)
    }

    pub fn broadcast_tensor_in(
        &mut self,
        group: &ProcessGroup,
        name: &str,
        root: Rank,
    ) -> Result<()> {
        let tensor = self.get_tensor(name)?;
        self.runtime.submit(TensorOperation::Broadcast {
            tensor,
            group: group.clone(),
            root,
        })
    }

    pub fn broadcast_tensor_sync(&mut self, name: &str, root: Rank) -> Result<()> {
        self.broadcast_tensor(name, root)?;
        self.sync(name, true).map(|_| ())
    }

    /// Global sum reduction of a tensor within a process group; the tensor
    /// must exist on every participating process.
    pub fn allreduce_tensor(&mut self, name: &str) -> Result<()> {
        let group = self.default_group.clone();
        self.allreduce_tensor_in(&group, name)
    }

    pub fn allreduce_tensor_in(&mut self, group: &ProcessGroup, name: &str) -> Result<()> {
        let tensor = self.get_tensor(name)?;
        self.runtime.submit(TensorOperation::Allreduce {
            tensor,
            group: group.clone(),
        })
    }

    pub fn allreduce_tensor_sync(&mut self, name: &str) -> Result<()> {
        self.allreduce_tensor(name)?;
        self.sync(name, true).map(|_| ())
    }

    // --- Network and expansion evaluation ---------------------------------

    /// Evaluates a finalized tensor network: plans a contraction order,
    /// lowers it into primitive operations and submits them. Returns
    /// immediately; use [NumServer::sync_network] to await the output.
    pub fn evaluate(&mut self, network: &TensorNetwork) -> Result<()> {
        self.submit_network(network).map(|_| ())
    }

    /// [NumServer::evaluate] followed by a blocking sync on the output.
    pub fn evaluate_sync(&mut self, network: &TensorNetwork) -> Result<()> {
        let (output, _) = self.submit_network(network)?;
        self.runtime.sync_tensor(output.name(), true).map(|_| ())
    }

    /// Evaluates a tensor network given symbolically over previously
    /// created tensors, e.g. `"O(i,j) = A(i,k) * B(k,j)"`.
    pub fn evaluate_tensor_network(&mut self, name: &str, network: &str) -> Result<()> {
        let spec = parse_spec(network)?;
        let network = self.network_from_spec(name, &spec)?;
        self.evaluate(&network)
    }

    pub fn evaluate_tensor_network_sync(&mut self, name: &str, network: &str) -> Result<()> {
        let spec = parse_spec(network)?;
        let network = self.network_from_spec(name, &spec)?;
        self.evaluate_sync(&network)
    }

    /// Evaluates a tensor network expansion into the provided accumulator
    /// tensor: `accumulator += sum_i coefficient_i * network_i`.
    pub fn evaluate_expansion(
        &mut self,
        expansion: &TensorExpansion,
        accumulator: &str,
    ) -> Result<()> {
        let acc = self.get_tensor(accumulator)?;
        let (shape, signature) = expansion
            .shape()
            .ok_or_else(|| Error::Validation("empty expansion".to_string()))?;
        if acc.shape() != shape || acc.signature() != &signature {
            return Err(Error::ShapeMismatch {
                left: format!("accumulator '{}'", acc.name()),
                right: format!("expansion '{}'", expansion.name()),
            });
        }

        for component in expansion.iter() {
            let (output, created_here) = self.submit_network(&component.network)?;
            self.runtime.submit(TensorOperation::Add {
                dst: Arc::clone(&acc),
                src: Arc::clone(&output),
                permutation: (0..acc.rank()).collect(),
                alpha: component.coefficient,
                conj_src: false,
            })?;
            if created_here {
                self.runtime
                    .submit(TensorOperation::Destroy { tensor: output })?;
            }
        }
        Ok(())
    }

    pub fn evaluate_expansion_sync(
        &mut self,
        expansion: &TensorExpansion,
        accumulator: &str,
    ) -> Result<()> {
        self.evaluate_expansion(expansion, accumulator)?;
        self.sync(accumulator, true).map(|_| ())
    }

    // --- Synchronization and scopes ---------------------------------------

    /// Synchronizes all outstanding update operations on a tensor. With
    /// `wait = false` this is a non-blocking completion poll.
    pub fn sync(&self, name: &str, wait: bool) -> Result<bool> {
        self.runtime.sync_tensor(name, wait)
    }

    /// Synchronizes all outstanding operations writing a network's output.
    pub fn sync_network(&self, network: &TensorNetwork, wait: bool) -> Result<bool> {
        let output = network
            .output_tensor()
            .ok_or_else(|| Error::UnfinalizedNetwork(network.name().to_string()))?;
        self.runtime.sync_tensor(output.name(), wait)
    }

    /// Synchronizes every outstanding operation in the current scope.
    pub fn sync_all(&self, wait: bool) -> Result<bool> {
        self.runtime.sync_scope(wait)
    }

    /// Opens a new scope with its own execution graph.
    pub fn open_scope(&mut self, name: &str) -> Result<()> {
        self.runtime.open_scope(name)
    }

    /// Closes the current scope, implicitly synchronizing its outstanding
    /// nodes, and returns the parent scope name.
    pub fn close_scope(&mut self) -> Result<String> {
        self.runtime.close_scope()
    }

    // --- Planner configuration --------------------------------------------

    /// Selects the contraction-sequence optimizer invoked when evaluating
    /// tensor networks: one of `"sequential"`, `"greedy"`, `"bisection"`.
    pub fn reset_contr_seq_optimizer(&mut self, name: &str) -> Result<()> {
        self.optimizer = OptimizerKind::from_name(name)?;
        Ok(())
    }

    /// Activates optimized contraction-sequence caching for later reuse.
    pub fn activate_contr_seq_caching(&mut self) {
        if self.contr_seq_cache.is_none() {
            self.contr_seq_cache = Some(ContrSeqCache::new());
        }
    }

    /// Deactivates (and drops) the contraction-sequence cache.
    pub fn deactivate_contr_seq_caching(&mut self) {
        self.contr_seq_cache = None;
    }

    // --- Process groups ----------------------------------------------------

    /// The group of all cooperating processes.
    pub fn default_process_group(&self) -> &ProcessGroup {
        &self.default_group
    }

    /// The group containing solely the current process.
    pub fn current_process_group(&self) -> ProcessGroup {
        ProcessGroup::self_group()
    }

    pub fn process_rank(&self) -> Rank {
        self.comm.rank()
    }

    pub fn num_processes(&self) -> usize {
        self.comm.num_processes()
    }

    // --- Internals ---------------------------------------------------------

    fn resolve(&self, term: &SymbolicTerm) -> Result<TensorHandle> {
        let handle = self.get_tensor(&term.name)?;
        if handle.rank() != term.indices.len() {
            return Err(Error::ShapeMismatch {
                left: format!("tensor '{}' of rank {}", term.name, handle.rank()),
                right: format!("term with {} indices", term.indices.len()),
            });
        }
        Ok(handle)
    }

    fn validate_signature(&self, shape: &[DimExtent], signature: &TensorSignature) -> Result<()> {
        for (dim, &(space, sub)) in signature.iter().enumerate() {
            if space == SOME_SPACE {
                continue;
            }
            if !self.space_register.space_exists(space) {
                return Err(Error::UnknownSpace(space));
            }
            if sub == UNREG_SUBSPACE {
                continue;
            }
            let Some(subspace) = self.space_register.subspace_by_id(space, sub) else {
                return Err(Error::UnknownEntity(format!(
                    "subspace {sub} of space {space}"
                )));
            };
            if subspace.dim() != shape[dim] {
                return Err(Error::ShapeMismatch {
                    left: format!("dimension {dim} of extent {}", shape[dim]),
                    right: format!("subspace of dimension {}", subspace.dim()),
                });
            }
        }
        Ok(())
    }

    fn slice_offsets(&self, slice: &Tensor) -> Result<Vec<DimOffset>> {
        slice
            .signature()
            .iter()
            .map(|&(space, sub)| match space {
                SOME_SPACE => Ok(sub),
                _ => self
                    .space_register
                    .subspace_by_id(space, sub)
                    .map(|s| s.lower_bound())
                    .ok_or_else(|| {
                        Error::Validation(format!(
                            "slice dimension carries unresolvable subspace {sub} of space {space}"
                        ))
                    }),
            })
            .collect()
    }

    /// Builds a tensor network from a parsed symbolic specification over
    /// registered tensors.
    fn network_from_spec(&self, name: &str, spec: &SymbolicSpec) -> Result<TensorNetwork> {
        // Index name -> its (term, dimension) occurrences; term 0 is the
        // result, term t > 0 is operand t.
        let mut occurrences = FxHashMap::<&str, Vec<(usize, usize)>>::default();
        for (term_idx, term) in std::iter::once(&spec.result)
            .chain(spec.operands.iter())
            .enumerate()
        {
            for (dim, index) in term.indices.iter().enumerate() {
                occurrences
                    .entry(index.as_str())
                    .or_default()
                    .push((term_idx, dim));
            }
        }
        let partner_of = |term_idx: usize, dim: usize, index: &str| -> (usize, usize) {
            *occurrences[index]
                .iter()
                .find(|&&(t, d)| (t, d) != (term_idx, dim))
                .expect("the parser guarantees two occurrences")
        };

        let mut network = TensorNetwork::new(name);
        for (operand_idx, term) in spec.operands.iter().enumerate() {
            let vertex = operand_idx + 1;
            let tensor = self.resolve(term)?;
            let legs = term
                .indices
                .iter()
                .enumerate()
                .map(|(dim, index)| {
                    let (t, d) = partner_of(vertex, dim, index);
                    TensorLeg::new(t, d)
                })
                .collect();
            if !network.place_tensor(vertex, tensor, legs, term.conjugated) {
                return Err(Error::Validation(format!(
                    "failed to place '{}' into network '{name}'",
                    term.name
                )));
            }
        }

        let output = self.resolve(&spec.result)?;
        let legs = spec
            .result
            .indices
            .iter()
            .enumerate()
            .map(|(dim, index)| {
                let (t, d) = partner_of(0, dim, index);
                TensorLeg::new(t, d)
            })
            .collect();
        if !network.place_output_tensor(output, legs) {
            return Err(Error::Validation(format!(
                "failed to place the output tensor of network '{name}'"
            )));
        }
        if !network.finalize() {
            return Err(Error::ShapeMismatch {
                left: format!("network '{name}'"),
                right: "its tensors' extents".to_string(),
            });
        }
        Ok(network)
    }

    /// Lowers a finalized network into primitive operations: a planned
    /// sequence of binary contractions over freshly created intermediates,
    /// the last one writing the output tensor, followed by the destruction
    /// of the intermediates. Returns the output handle and whether its
    /// storage was created by this submission.
    fn submit_network(&mut self, network: &TensorNetwork) -> Result<(TensorHandle, bool)> {
        if !network.is_finalized() {
            return Err(Error::UnfinalizedNetwork(network.name().to_string()));
        }
        for vertex in network.input_ids() {
            let tensor = network.tensor(vertex).expect("input vertex exists");
            if !self.executor.is_allocated(tensor.name()) {
                return Err(Error::Validation(format!(
                    "input tensor '{}' of network '{}' is not allocated",
                    tensor.name(),
                    network.name()
                )));
            }
        }

        let output = Arc::clone(network.output_tensor().expect("finalized network"));
        let created_here = !self.executor.is_allocated(output.name());
        if created_here {
            self.runtime.submit(TensorOperation::Create {
                tensor: Arc::clone(&output),
            })?;
        }
        self.runtime.submit(TensorOperation::InitValue {
            tensor: Arc::clone(&output),
            value: Complex64::ZERO,
        })?;

        if network.num_inputs() == 1 {
            let vertex = network.input_ids()[0];
            let conn = network.conn(vertex).expect("input vertex exists");
            let out_conn = network.conn(OUTPUT_VERTEX).expect("finalized network");
            let permutation = out_conn.legs().iter().map(|leg| leg.dim()).collect();
            self.runtime.submit(TensorOperation::Add {
                dst: Arc::clone(&output),
                src: Arc::clone(conn.tensor()),
                permutation,
                alpha: Complex64::ONE,
                conj_src: conn.is_conjugated(),
            })?;
            return Ok((output, created_here));
        }

        let labels = assign_edge_labels(network)?;
        let inputs = PathInputs::from_network(network)?;
        let path = self.plan(&inputs);
        debug!(network = network.name(), steps = path.len(); "lowering contraction plan");

        let batch = self.intermediates;
        self.intermediates += 1;

        // id -> (tensor, per-dim labels, conjugated)
        let mut alive: FxHashMap<VertexId, (TensorHandle, Vec<EdgeId>, bool)> = network
            .input_ids()
            .into_iter()
            .map(|v| {
                let conn = network.conn(v).expect("input vertex exists");
                (
                    v,
                    (
                        Arc::clone(conn.tensor()),
                        labels.per_vertex[&v].clone(),
                        conn.is_conjugated(),
                    ),
                )
            })
            .collect();

        let mut created = Vec::new();
        for step in path.iter() {
            let (left, left_labels, conj_left) = alive
                .remove(&step.left_id)
                .expect("validated contraction path");
            let (right, right_labels, conj_right) = alive
                .remove(&step.right_id)
                .expect("validated contraction path");

            let (dst, dst_labels) = if step.result_id == OUTPUT_VERTEX {
                (Arc::clone(&output), labels.output.clone())
            } else {
                let result =
                    &EdgeTensor::new(left_labels.clone()) ^ &EdgeTensor::new(right_labels.clone());
                let dst_labels: Vec<EdgeId> = result.legs().to_vec();
                let shape: Vec<DimExtent> =
                    dst_labels.iter().map(|e| labels.bond_dims[e]).collect();
                let handle = Arc::new(Tensor::new(
                    format!("_{}.{batch}.{}", network.name(), step.result_id),
                    shape,
                ));
                self.runtime.submit(TensorOperation::Create {
                    tensor: Arc::clone(&handle),
                })?;
                created.push(Arc::clone(&handle));
                (handle, dst_labels)
            };

            self.runtime.submit(TensorOperation::Contract {
                dst: Arc::clone(&dst),
                left,
                right,
                pattern: ContractionPattern {
                    dst: dst_labels.clone(),
                    left: left_labels,
                    right: right_labels,
                },
                alpha: Complex64::ONE,
                conj_left,
                conj_right,
            })?;
            alive.insert(step.result_id, (dst, dst_labels, false));
        }

        for tensor in created {
            self.runtime.submit(TensorOperation::Destroy { tensor })?;
        }
        Ok((output, created_here))
    }

    /// Plans a contraction order, consulting the cache when activated.
    fn plan(&mut self, inputs: &PathInputs) -> Arc<Vec<ContrTriple>> {
        if let Some(cache) = &mut self.contr_seq_cache {
            let fingerprint = inputs.fingerprint();
            if let Some(hit) = cache.get(fingerprint) {
                return hit;
            }
            let (path, flops, size) = optimize(self.optimizer, inputs);
            debug!(flops, size; "optimized contraction sequence");
            return cache.insert(fingerprint, path);
        }
        let (path, flops, size) = optimize(self.optimizer, inputs);
        debug!(flops, size; "optimized contraction sequence");
        Arc::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use float_cmp::assert_approx_eq;

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    fn fill(server: &mut NumServer, name: &str, shape: Vec<u64>, values: &[f64]) {
        server.create_tensor(name, shape).unwrap();
        let data = values.iter().map(|&v| c(v)).collect();
        server.init_tensor_data_sync(name, data).unwrap();
    }

    #[test]
    fn test_space_and_full_subspace() {
        let mut server = NumServer::with_workers(2);
        server.create_vector_space("V", 4).unwrap();
        let full = server.get_subspace("V.full").unwrap();
        assert_eq!(full.lower_bound(), 0);
        assert_eq!(full.upper_bound(), 3);
    }

    #[test]
    fn test_destroy_space_referenced_by_tensor_fails() {
        let mut server = NumServer::with_workers(2);
        server.create_vector_space("V", 3).unwrap();
        server.create_tensor_in("T", &["V.full"]).unwrap();
        assert!(matches!(
            server.destroy_vector_space("V"),
            Err(Error::ReferentialIntegrity { .. })
        ));
        server.destroy_tensor_sync("T").unwrap();
        server.destroy_vector_space("V").unwrap();
    }

    #[test]
    fn test_symbolic_contraction_matmul() {
        let mut server = NumServer::with_workers(2);
        fill(&mut server, "A", vec![2, 2], &[1.0, 2.0, 3.0, 4.0]);
        fill(&mut server, "B", vec![2, 2], &[5.0, 6.0, 7.0, 8.0]);
        server.create_tensor("C", vec![2, 2]).unwrap();

        server
            .contract_tensors("C(i,j)=A(i,k)*B(k,j)", c(1.0))
            .unwrap();
        assert!(server.sync("C", true).unwrap());

        let result = server.get_local_tensor("C").unwrap();
        assert_approx_eq!(f64, result.data[0].re, 19.0);
        assert_approx_eq!(f64, result.data[1].re, 22.0);
        assert_approx_eq!(f64, result.data[2].re, 43.0);
        assert_approx_eq!(f64, result.data[3].re, 50.0);
    }

    #[test]
    fn test_add_with_permutation() {
        let mut server = NumServer::with_workers(2);
        fill(&mut server, "A", vec![2, 2], &[1.0, 2.0, 3.0, 4.0]);
        server.create_tensor("C", vec![2, 2]).unwrap();
        server.add_tensors_sync("C(i,j)=A(j,i)", c(2.0)).unwrap();
        let result = server.get_local_tensor("C").unwrap();
        assert_approx_eq!(f64, result.data[1].re, 6.0);
        assert_approx_eq!(f64, result.data[2].re, 4.0);
    }

    #[test]
    fn test_evaluate_symbolic_network() {
        let mut server = NumServer::with_workers(2);
        fill(&mut server, "A", vec![2, 2], &[1.0, 0.0, 0.0, 1.0]);
        fill(&mut server, "B", vec![2, 2], &[1.0, 2.0, 3.0, 4.0]);
        fill(&mut server, "D", vec![2, 2], &[1.0, 0.0, 0.0, 1.0]);
        server.create_tensor("O", vec![2, 2]).unwrap();

        server
            .evaluate_tensor_network_sync("net", "O(i,l)=A(i,j)*B(j,k)*D(k,l)")
            .unwrap();
        let result = server.get_local_tensor("O").unwrap();
        // Identity * B * Identity = B.
        assert_approx_eq!(f64, result.data[0].re, 1.0);
        assert_approx_eq!(f64, result.data[1].re, 2.0);
        assert_approx_eq!(f64, result.data[2].re, 3.0);
        assert_approx_eq!(f64, result.data[3].re, 4.0);
    }

    #[test]
    fn test_unallocated_input_is_rejected() {
        let mut server = NumServer::with_workers(2);
        fill(&mut server, "A", vec![2], &[1.0, 2.0]);
        // A network over a tensor that never received storage.
        let phantom = Arc::new(Tensor::new("Phantom", vec![2]));
        let mut network = TensorNetwork::new("net");
        network.place_tensor(
            1,
            server.get_tensor("A").unwrap(),
            vec![TensorLeg::new(2, 0)],
            false,
        );
        network.place_tensor(2, phantom, vec![TensorLeg::new(1, 0)], false);
        assert!(network.finalize());
        assert!(matches!(
            server.evaluate(&network),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_optimizer_selection_and_caching() {
        let mut server = NumServer::with_workers(2);
        assert!(server.reset_contr_seq_optimizer("sequential").is_ok());
        assert!(server.reset_contr_seq_optimizer("bisection").is_ok());
        assert!(server.reset_contr_seq_optimizer("metis").is_err());
        server.reset_contr_seq_optimizer("greedy").unwrap();
        server.activate_contr_seq_caching();
        server.deactivate_contr_seq_caching();
    }
}
