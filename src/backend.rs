//! Reference dense backend: row-major complex storage plus a
//! [TensorNodeExecutor] implementation driving the naive kernels. A real
//! deployment would swap this for a vendor BLAS/LAPACK-backed executor;
//! the runtime only ever talks to the trait.

pub mod kernels;

use std::sync::{Arc, Mutex, RwLock};

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashMap;

use crate::comm::{CollectiveService, LocalCollectives, ProcessGroup, Rank};
use crate::errors::{Error, Result};
use crate::operation::{
    ContractionPattern, SvdAbsorb, SvdPattern, TensorFunctor, TensorNodeExecutor,
};
use crate::tensornetwork::tensor::Tensor;
use crate::types::DimOffset;

/// Dense row-major storage of one tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseTensor {
    pub shape: Vec<usize>,
    pub data: Vec<Complex64>,
}

impl DenseTensor {
    pub fn zeros(shape: Vec<usize>) -> Self {
        let volume = shape.iter().product();
        Self {
            shape,
            data: vec![Complex64::ZERO; volume],
        }
    }

    fn shape_of(tensor: &Tensor) -> Vec<usize> {
        tensor.shape().iter().map(|&e| e as usize).collect()
    }
}

fn exec_err(op: &str, tensor: &Tensor, reason: impl Into<String>) -> Error {
    Error::ExecutionFailure {
        op: op.to_string(),
        tensor: tensor.name().to_string(),
        reason: reason.into(),
    }
}

/// Executor binding tensor names to in-process dense storage.
///
/// Individual tensors are locked one at a time (operands are copied out
/// under their own short-lived locks), so concurrently executing nodes can
/// never deadlock regardless of their operand order.
pub struct DenseExecutor {
    store: RwLock<FxHashMap<String, Arc<Mutex<DenseTensor>>>>,
    comm: Arc<dyn CollectiveService>,
    rng: Mutex<StdRng>,
}

impl Default for DenseExecutor {
    fn default() -> Self {
        Self::new(Arc::new(LocalCollectives))
    }
}

impl DenseExecutor {
    pub fn new(comm: Arc<dyn CollectiveService>) -> Self {
        Self {
            store: RwLock::new(FxHashMap::default()),
            comm,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeded variant for reproducible `init_random`.
    pub fn with_seed(comm: Arc<dyn CollectiveService>, seed: u64) -> Self {
        Self {
            store: RwLock::new(FxHashMap::default()),
            comm,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Whether storage is currently bound to the name.
    pub fn is_allocated(&self, name: &str) -> bool {
        self.store.read().expect("store poisoned").contains_key(name)
    }

    /// Copies out the local storage of a tensor.
    pub fn local_tensor(&self, name: &str) -> Result<DenseTensor> {
        let storage = self.storage_by_name(name)?;
        let guard = storage.lock().expect("tensor storage poisoned");
        Ok(guard.clone())
    }

    fn storage_by_name(&self, name: &str) -> Result<Arc<Mutex<DenseTensor>>> {
        self.store
            .read()
            .expect("store poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownEntity(name.to_string()))
    }

    fn storage(&self, op: &str, tensor: &Tensor) -> Result<Arc<Mutex<DenseTensor>>> {
        self.storage_by_name(tensor.name())
            .map_err(|_| exec_err(op, tensor, "tensor has no storage bound"))
    }

    /// Copies the operand data out under its own lock.
    fn operand(&self, op: &str, tensor: &Tensor) -> Result<DenseTensor> {
        let storage = self.storage(op, tensor)?;
        let guard = storage.lock().expect("tensor storage poisoned");
        Ok(guard.clone())
    }

    fn write_whole(&self, op: &str, tensor: &Tensor, value: DenseTensor) -> Result<()> {
        let storage = self.storage(op, tensor)?;
        let mut guard = storage.lock().expect("tensor storage poisoned");
        *guard = value;
        Ok(())
    }

    /// Labels of the factor dimensions resolved against the decomposed
    /// tensor: `Ok(dim)` draws from the unfolded multi-index position,
    /// `Err(())` is the introduced bond dimension.
    fn factor_layout(
        factor_labels: &[usize],
        outer_labels: &[usize],
        bond_label: usize,
    ) -> Vec<std::result::Result<usize, ()>> {
        factor_labels
            .iter()
            .map(|&label| {
                if label == bond_label {
                    Err(())
                } else {
                    Ok(outer_labels
                        .iter()
                        .position(|&o| o == label)
                        .expect("validated pattern"))
                }
            })
            .collect()
    }

    /// Scatters an unfolded factor matrix into the factor tensor layout.
    /// For the left factor (`bond_last = true`) the matrix is `m x k` with
    /// the outer multi-index on rows; for the right factor it is `k x n`.
    fn scatter_factor(
        matrix: &[Complex64],
        outer_extents: &[usize],
        k: usize,
        layout: &[std::result::Result<usize, ()>],
        bond_last: bool,
    ) -> DenseTensor {
        let shape: Vec<usize> = layout
            .iter()
            .map(|entry| match entry {
                Ok(pos) => outer_extents[*pos],
                Err(()) => k,
            })
            .collect();
        let mut out = DenseTensor::zeros(shape.clone());
        let out_strides = kernels::strides(&shape);
        let outer_volume: usize = outer_extents.iter().product();

        let mut outer_multi = vec![0; outer_extents.len()];
        for outer in 0..outer_volume {
            let mut rem = outer;
            for dim in (0..outer_extents.len()).rev() {
                outer_multi[dim] = rem % outer_extents[dim];
                rem /= outer_extents[dim];
            }
            for bond in 0..k {
                let value = if bond_last {
                    matrix[outer * k + bond]
                } else {
                    matrix[bond * outer_volume + outer]
                };
                let idx: usize = layout
                    .iter()
                    .enumerate()
                    .map(|(dim, entry)| {
                        out_strides[dim]
                            * match entry {
                                Ok(pos) => outer_multi[*pos],
                                Err(()) => bond,
                            }
                    })
                    .sum();
                out.data[idx] = value;
            }
        }
        out
    }

    /// Shared SVD plumbing: unfolds the tensor according to the pattern
    /// and returns the factor matrices plus the bookkeeping needed to
    /// scatter them back.
    fn svd_split(
        &self,
        op: &str,
        tensor: &Tensor,
        pattern: &SvdPattern,
    ) -> Result<SvdSplit> {
        let source = self.operand(op, tensor)?;
        let i = pattern.left_contracted();
        let j = pattern.right_contracted();
        let row_labels: Vec<usize> = pattern
            .left
            .iter()
            .copied()
            .filter(|&l| l != i && l != j)
            .collect();
        let col_labels: Vec<usize> = pattern
            .right
            .iter()
            .copied()
            .filter(|&l| l != i && l != j)
            .collect();
        let position = |label: usize| {
            pattern
                .tensor
                .iter()
                .position(|&t| t == label)
                .ok_or_else(|| exec_err(op, tensor, "factor label missing on the tensor"))
        };
        let row_dims: Vec<usize> = row_labels
            .iter()
            .map(|&l| position(l))
            .collect::<Result<_>>()?;
        let col_dims: Vec<usize> = col_labels
            .iter()
            .map(|&l| position(l))
            .collect::<Result<_>>()?;
        let (m, n, matrix) = kernels::unfold(&source.data, &source.shape, &row_dims, &col_dims);
        let (u, s, vt) = kernels::svd(m, n, &matrix)
            .map_err(|e| exec_err(op, tensor, e.to_string()))?;

        let row_extents: Vec<usize> = row_dims.iter().map(|&d| source.shape[d]).collect();
        let col_extents: Vec<usize> = col_dims.iter().map(|&d| source.shape[d]).collect();
        Ok(SvdSplit {
            u,
            s,
            vt,
            row_labels,
            col_labels,
            row_extents,
            col_extents,
            row_dims,
            col_dims,
            source_shape: source.shape,
        })
    }
}

/// Result of unfolding and decomposing a tensor.
struct SvdSplit {
    u: Vec<Complex64>,
    s: Vec<f64>,
    vt: Vec<Complex64>,
    row_labels: Vec<usize>,
    col_labels: Vec<usize>,
    row_extents: Vec<usize>,
    col_extents: Vec<usize>,
    row_dims: Vec<usize>,
    col_dims: Vec<usize>,
    source_shape: Vec<usize>,
}

impl SvdSplit {
    fn k(&self) -> usize {
        self.s.len()
    }
}

impl TensorNodeExecutor for DenseExecutor {
    fn create(&self, tensor: &Tensor) -> Result<()> {
        let mut store = self.store.write().expect("store poisoned");
        if store.contains_key(tensor.name()) {
            return Err(exec_err("Create", tensor, "storage is already bound"));
        }
        store.insert(
            tensor.name().to_string(),
            Arc::new(Mutex::new(DenseTensor::zeros(DenseTensor::shape_of(tensor)))),
        );
        Ok(())
    }

    fn destroy(&self, tensor: &Tensor) -> Result<()> {
        let mut store = self.store.write().expect("store poisoned");
        store
            .remove(tensor.name())
            .map(|_| ())
            .ok_or_else(|| exec_err("Destroy", tensor, "tensor has no storage bound"))
    }

    fn init_value(&self, tensor: &Tensor, value: Complex64) -> Result<()> {
        let storage = self.storage("InitValue", tensor)?;
        let mut guard = storage.lock().expect("tensor storage poisoned");
        guard.data.fill(value);
        Ok(())
    }

    fn init_random(&self, tensor: &Tensor) -> Result<()> {
        let storage = self.storage("InitRandom", tensor)?;
        let mut guard = storage.lock().expect("tensor storage poisoned");
        let mut rng = self.rng.lock().expect("rng poisoned");
        for value in guard.data.iter_mut() {
            *value = Complex64::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        }
        Ok(())
    }

    fn add(
        &self,
        dst: &Tensor,
        src: &Tensor,
        permutation: &[usize],
        alpha: Complex64,
        conj_src: bool,
    ) -> Result<()> {
        let source = self.operand("Add", src)?;
        let storage = self.storage("Add", dst)?;
        let mut guard = storage.lock().expect("tensor storage poisoned");
        let dst_shape = guard.shape.clone();
        kernels::add_into(
            &mut guard.data,
            &dst_shape,
            &source.data,
            &source.shape,
            permutation,
            alpha,
            conj_src,
        );
        Ok(())
    }

    fn contract(
        &self,
        dst: &Tensor,
        left: &Tensor,
        right: &Tensor,
        pattern: &ContractionPattern,
        alpha: Complex64,
        conj: (bool, bool),
    ) -> Result<()> {
        let left_data = self.operand("Contract", left)?;
        let right_data = self.operand("Contract", right)?;
        let storage = self.storage("Contract", dst)?;
        let mut guard = storage.lock().expect("tensor storage poisoned");
        let result = kernels::contract(
            &pattern.dst,
            &guard.shape,
            &pattern.left,
            &left_data.shape,
            &left_data.data,
            &pattern.right,
            &right_data.shape,
            &right_data.data,
            conj,
        );
        for (slot, value) in guard.data.iter_mut().zip(result) {
            *slot += alpha * value;
        }
        Ok(())
    }

    fn decompose_svd3(
        &self,
        tensor: &Tensor,
        left: &Tensor,
        middle: &Tensor,
        right: &Tensor,
        pattern: &SvdPattern,
    ) -> Result<()> {
        let split = self.svd_split("DecomposeSvd3", tensor, pattern)?;
        let k = split.k();
        let i = pattern.left_contracted();
        let j = pattern.right_contracted();

        let left_layout =
            Self::factor_layout(&pattern.left, &split.row_labels, i);
        let left_value =
            Self::scatter_factor(&split.u, &split.row_extents, k, &left_layout, true);
        self.write_whole("DecomposeSvd3", left, left_value)?;

        let mut middle_value = DenseTensor::zeros(vec![k, k]);
        for (idx, &sv) in split.s.iter().enumerate() {
            middle_value.data[idx * k + idx] = Complex64::new(sv, 0.0);
        }
        self.write_whole("DecomposeSvd3", middle, middle_value)?;

        let right_layout =
            Self::factor_layout(&pattern.right, &split.col_labels, j);
        let right_value =
            Self::scatter_factor(&split.vt, &split.col_extents, k, &right_layout, false);
        self.write_whole("DecomposeSvd3", right, right_value)
    }

    fn decompose_svd2(
        &self,
        tensor: &Tensor,
        left: &Tensor,
        right: &Tensor,
        pattern: &SvdPattern,
        absorb: SvdAbsorb,
    ) -> Result<()> {
        let mut split = self.svd_split("DecomposeSvd2", tensor, pattern)?;
        let k = split.k();
        let n: usize = split.col_extents.iter().product();

        // Absorb the singular values into the requested factor(s).
        match absorb {
            SvdAbsorb::Left => {
                for row in 0..split.u.len() / k {
                    for (bond, &sv) in split.s.iter().enumerate() {
                        split.u[row * k + bond] *= sv;
                    }
                }
            }
            SvdAbsorb::Right => {
                for (bond, &sv) in split.s.iter().enumerate() {
                    for col in 0..n {
                        split.vt[bond * n + col] *= sv;
                    }
                }
            }
            SvdAbsorb::Split => {
                for row in 0..split.u.len() / k {
                    for (bond, &sv) in split.s.iter().enumerate() {
                        split.u[row * k + bond] *= sv.sqrt();
                    }
                }
                for (bond, &sv) in split.s.iter().enumerate() {
                    for col in 0..n {
                        split.vt[bond * n + col] *= sv.sqrt();
                    }
                }
            }
        }

        let bond = pattern.left_contracted();
        let left_layout = Self::factor_layout(&pattern.left, &split.row_labels, bond);
        let left_value = Self::scatter_factor(&split.u, &split.row_extents, k, &left_layout, true);
        self.write_whole("DecomposeSvd2", left, left_value)?;

        let right_layout = Self::factor_layout(&pattern.right, &split.col_labels, bond);
        let right_value =
            Self::scatter_factor(&split.vt, &split.col_extents, k, &right_layout, false);
        self.write_whole("DecomposeSvd2", right, right_value)
    }

    fn orthogonalize_svd(&self, tensor: &Tensor, pattern: &SvdPattern) -> Result<()> {
        let split = self.svd_split("OrthogonalizeSvd", tensor, pattern)?;
        let k = split.k();
        let n: usize = split.col_extents.iter().product();
        let m: usize = split.row_extents.iter().product();

        // Recompose with the singular values discarded: t = u * vt.
        let mut matrix = vec![Complex64::ZERO; m * n];
        for row in 0..m {
            for col in 0..n {
                let mut acc = Complex64::ZERO;
                for bond in 0..k {
                    acc += split.u[row * k + bond] * split.vt[bond * n + col];
                }
                matrix[row * n + col] = acc;
            }
        }
        let folded = kernels::fold(&matrix, &split.source_shape, &split.row_dims, &split.col_dims);
        self.write_whole(
            "OrthogonalizeSvd",
            tensor,
            DenseTensor {
                shape: split.source_shape.clone(),
                data: folded,
            },
        )
    }

    fn orthogonalize_mgs(&self, tensor: &Tensor) -> Result<()> {
        let storage = self.storage("OrthogonalizeMgs", tensor)?;
        let mut guard = storage.lock().expect("tensor storage poisoned");
        let shape = guard.shape.clone();
        if shape.is_empty() {
            return Err(exec_err("OrthogonalizeMgs", tensor, "scalar tensor"));
        }
        let n = *shape.last().expect("checked non-empty");
        let m: usize = shape[..shape.len() - 1].iter().product();
        kernels::mgs(m, n, &mut guard.data);
        Ok(())
    }

    fn transform(&self, tensor: &Tensor, functor: &dyn TensorFunctor) -> Result<()> {
        let storage = self.storage("Transform", tensor)?;
        let mut guard = storage.lock().expect("tensor storage poisoned");
        let shape: Vec<u64> = guard.shape.iter().map(|&e| e as u64).collect();
        functor.apply(&shape, &mut guard.data);
        Ok(())
    }

    fn slice_extract(&self, tensor: &Tensor, slice: &Tensor, offsets: &[DimOffset]) -> Result<()> {
        let source = self.operand("SliceExtract", tensor)?;
        let storage = self.storage("SliceExtract", slice)?;
        let mut guard = storage.lock().expect("tensor storage poisoned");
        let slice_shape = guard.shape.clone();
        let src_strides = kernels::strides(&source.shape);
        let mut multi = vec![0; slice_shape.len()];
        for (flat, value) in guard.data.iter_mut().enumerate() {
            let mut rem = flat;
            for dim in (0..slice_shape.len()).rev() {
                multi[dim] = rem % slice_shape[dim];
                rem /= slice_shape[dim];
            }
            let src_flat: usize = multi
                .iter()
                .enumerate()
                .map(|(dim, &v)| src_strides[dim] * (v + offsets[dim] as usize))
                .sum();
            *value = source.data[src_flat];
        }
        Ok(())
    }

    fn slice_insert(&self, tensor: &Tensor, slice: &Tensor, offsets: &[DimOffset]) -> Result<()> {
        let source = self.operand("SliceInsert", slice)?;
        let storage = self.storage("SliceInsert", tensor)?;
        let mut guard = storage.lock().expect("tensor storage poisoned");
        let dst_strides = kernels::strides(&guard.shape);
        let mut multi = vec![0; source.shape.len()];
        for (flat, &value) in source.data.iter().enumerate() {
            let mut rem = flat;
            for dim in (0..source.shape.len()).rev() {
                multi[dim] = rem % source.shape[dim];
                rem /= source.shape[dim];
            }
            let dst_flat: usize = multi
                .iter()
                .enumerate()
                .map(|(dim, &v)| dst_strides[dim] * (v + offsets[dim] as usize))
                .sum();
            guard.data[dst_flat] = value;
        }
        Ok(())
    }

    fn replicate(&self, group: &ProcessGroup, tensor: &Tensor, root: Rank) -> Result<()> {
        let exists = self.is_allocated(tensor.name());
        if self.comm.rank() == root && !exists {
            return Err(Error::DistributedPrecondition {
                tensor: tensor.name().to_string(),
                rank: root,
            });
        }
        if !exists {
            self.create(tensor)?;
        }
        let storage = self.storage("Replicate", tensor)?;
        let mut guard = storage.lock().expect("tensor storage poisoned");
        let mut buffer = std::mem::take(&mut guard.data);
        self.comm.broadcast(group, &mut buffer, root)?;
        guard.data = buffer;
        Ok(())
    }

    fn broadcast(&self, group: &ProcessGroup, tensor: &Tensor, root: Rank) -> Result<()> {
        if let Some(rank) = self
            .comm
            .presence_gap(group, self.is_allocated(tensor.name()))
        {
            return Err(Error::DistributedPrecondition {
                tensor: tensor.name().to_string(),
                rank,
            });
        }
        let storage = self.storage("Broadcast", tensor)?;
        let mut guard = storage.lock().expect("tensor storage poisoned");
        let mut buffer = std::mem::take(&mut guard.data);
        self.comm.broadcast(group, &mut buffer, root)?;
        guard.data = buffer;
        Ok(())
    }

    fn allreduce(&self, group: &ProcessGroup, tensor: &Tensor) -> Result<()> {
        if let Some(rank) = self
            .comm
            .presence_gap(group, self.is_allocated(tensor.name()))
        {
            return Err(Error::DistributedPrecondition {
                tensor: tensor.name().to_string(),
                rank,
            });
        }
        let storage = self.storage("Allreduce", tensor)?;
        let mut guard = storage.lock().expect("tensor storage poisoned");
        let mut buffer = std::mem::take(&mut guard.data);
        self.comm.allreduce(group, &mut buffer)?;
        guard.data = buffer;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use float_cmp::assert_approx_eq;

    use crate::symbolic::parse_spec;

    fn tensor(name: &str, shape: Vec<u64>) -> Tensor {
        Tensor::new(name, shape)
    }

    fn filled(executor: &DenseExecutor, t: &Tensor, values: Vec<Complex64>) {
        executor.create(t).unwrap();
        let storage = executor.storage_by_name(t.name()).unwrap();
        storage.lock().unwrap().data = values;
    }

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    #[test]
    fn test_create_twice_fails() {
        let executor = DenseExecutor::default();
        let t = tensor("A", vec![2]);
        executor.create(&t).unwrap();
        assert!(executor.create(&t).is_err());
        executor.destroy(&t).unwrap();
        assert!(executor.destroy(&t).is_err());
    }

    #[test]
    fn test_contract_matrices() {
        let executor = DenseExecutor::default();
        let a = tensor("A", vec![2, 2]);
        let b = tensor("B", vec![2, 2]);
        let out = tensor("C", vec![2, 2]);
        filled(&executor, &a, vec![c(1.0), c(2.0), c(3.0), c(4.0)]);
        filled(&executor, &b, vec![c(5.0), c(6.0), c(7.0), c(8.0)]);
        executor.create(&out).unwrap();

        let spec = parse_spec("C(i,j)=A(i,k)*B(k,j)").unwrap();
        let pattern = ContractionPattern::from_spec(&spec).unwrap();
        executor
            .contract(&out, &a, &b, &pattern, Complex64::ONE, (false, false))
            .unwrap();

        let result = executor.local_tensor("C").unwrap();
        assert_approx_eq!(f64, result.data[0].re, 19.0);
        assert_approx_eq!(f64, result.data[3].re, 50.0);
    }

    #[test]
    fn test_svd3_reconstructs_the_tensor() {
        let executor = DenseExecutor::default();
        let d = tensor("D", vec![2, 2]);
        let l = tensor("L", vec![2, 2]);
        let s = tensor("S", vec![2, 2]);
        let r = tensor("R", vec![2, 2]);
        filled(&executor, &d, vec![c(4.0), c(1.0), c(2.0), c(3.0)]);
        executor.create(&l).unwrap();
        executor.create(&s).unwrap();
        executor.create(&r).unwrap();

        let spec = parse_spec("D(a,b)=L(a,i)*S(i,j)*R(j,b)").unwrap();
        let pattern = SvdPattern::from_spec(&spec).unwrap();
        executor.decompose_svd3(&d, &l, &s, &r, &pattern).unwrap();

        // Recompose L * S * R and compare with D.
        let ls = tensor("LS", vec![2, 2]);
        executor.create(&ls).unwrap();
        let spec = parse_spec("LS(a,j)=L(a,i)*S(i,j)").unwrap();
        let pattern = ContractionPattern::from_spec(&spec).unwrap();
        executor
            .contract(&ls, &l, &s, &pattern, Complex64::ONE, (false, false))
            .unwrap();

        let lsr = tensor("LSR", vec![2, 2]);
        executor.create(&lsr).unwrap();
        let spec = parse_spec("LSR(a,b)=LS(a,j)*R(j,b)").unwrap();
        let pattern = ContractionPattern::from_spec(&spec).unwrap();
        executor
            .contract(&lsr, &ls, &r, &pattern, Complex64::ONE, (false, false))
            .unwrap();

        let original = executor.local_tensor("D").unwrap();
        let recomposed = executor.local_tensor("LSR").unwrap();
        for (x, y) in original.data.iter().zip(recomposed.data.iter()) {
            assert_approx_eq!(f64, x.re, y.re, epsilon = 1e-10);
            assert_approx_eq!(f64, x.im, y.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_svd2_split_reconstructs_the_tensor() {
        let executor = DenseExecutor::default();
        let d = tensor("D", vec![2, 3]);
        let l = tensor("L", vec![2, 2]);
        let r = tensor("R", vec![2, 3]);
        filled(
            &executor,
            &d,
            vec![c(1.0), c(0.5), c(-1.0), c(2.0), c(0.0), c(1.5)],
        );
        executor.create(&l).unwrap();
        executor.create(&r).unwrap();

        let spec = parse_spec("D(a,b)=L(a,i)*R(i,b)").unwrap();
        let pattern = SvdPattern::from_spec(&spec).unwrap();
        executor
            .decompose_svd2(&d, &l, &r, &pattern, SvdAbsorb::Split)
            .unwrap();

        let lr = tensor("LR", vec![2, 3]);
        executor.create(&lr).unwrap();
        let spec = parse_spec("LR(a,b)=L(a,i)*R(i,b)").unwrap();
        let contraction = ContractionPattern::from_spec(&spec).unwrap();
        executor
            .contract(&lr, &l, &r, &contraction, Complex64::ONE, (false, false))
            .unwrap();

        let original = executor.local_tensor("D").unwrap();
        let recomposed = executor.local_tensor("LR").unwrap();
        for (x, y) in original.data.iter().zip(recomposed.data.iter()) {
            assert_approx_eq!(f64, x.re, y.re, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_slice_roundtrip() {
        let executor = DenseExecutor::default();
        let t = tensor("T", vec![3, 3]);
        let s = tensor("S", vec![2, 2]);
        filled(
            &executor,
            &t,
            (0..9).map(|v| c(v as f64)).collect(),
        );
        executor.create(&s).unwrap();

        executor.slice_extract(&t, &s, &[1, 1]).unwrap();
        let slice = executor.local_tensor("S").unwrap();
        assert_eq!(slice.data, vec![c(4.0), c(5.0), c(7.0), c(8.0)]);

        // Clear the region and write the slice back.
        executor.init_value(&t, c(0.0)).unwrap();
        executor.slice_insert(&t, &s, &[1, 1]).unwrap();
        let back = executor.local_tensor("T").unwrap();
        assert_eq!(back.data[4], c(4.0));
        assert_eq!(back.data[8], c(8.0));
        assert_eq!(back.data[0], c(0.0));
    }

    #[test]
    fn test_broadcast_requires_presence() {
        let executor = DenseExecutor::default();
        let t = tensor("T", vec![2]);
        let group = ProcessGroup::self_group();
        assert!(matches!(
            executor.broadcast(&group, &t, 0),
            Err(Error::DistributedPrecondition { .. })
        ));
        executor.create(&t).unwrap();
        executor.broadcast(&group, &t, 0).unwrap();
        executor.allreduce(&group, &t).unwrap();
    }
}
