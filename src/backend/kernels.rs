//! Naive dense kernels backing the reference executor.
//!
//! The contraction and addition kernels are straightforward loop nests
//! over row-major storage; singular value decompositions go through the
//! faer backend of `mdarray-linalg`.

use mdarray::{tensor, Dense, Slice};
use mdarray_linalg::svd::{SVDDecomp, SVD};
use mdarray_linalg_faer::Faer;
use num_complex::Complex64;
use rustc_hash::FxHashMap;

use crate::errors::{Error, Result};

/// Row-major strides of a shape.
pub fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for dim in (0..shape.len().saturating_sub(1)).rev() {
        strides[dim] = strides[dim + 1] * shape[dim + 1];
    }
    strides
}

fn decode(mut flat: usize, extents: &[usize], out: &mut [usize]) {
    for dim in (0..extents.len()).rev() {
        out[dim] = flat % extents[dim];
        flat /= extents[dim];
    }
}

fn maybe_conj(value: Complex64, conj: bool) -> Complex64 {
    if conj {
        value.conj()
    } else {
        value
    }
}

/// `dst += alpha * src` where dst dimension `d` pairs with src dimension
/// `permutation[d]`.
pub fn add_into(
    dst: &mut [Complex64],
    dst_shape: &[usize],
    src: &[Complex64],
    src_shape: &[usize],
    permutation: &[usize],
    alpha: Complex64,
    conj_src: bool,
) {
    let src_strides = strides(src_shape);
    let mut multi = vec![0; dst_shape.len()];
    for (flat, value) in dst.iter_mut().enumerate() {
        decode(flat, dst_shape, &mut multi);
        let src_flat: usize = multi
            .iter()
            .enumerate()
            .map(|(d, &v)| src_strides[permutation[d]] * v)
            .sum();
        *value += alpha * maybe_conj(src[src_flat], conj_src);
    }
}

/// Contracts two dense tensors over a label pattern: labels shared by both
/// operands and absent from the destination are summed over. Returns the
/// destination-shaped result (not accumulated).
#[allow(clippy::too_many_arguments)]
pub fn contract(
    dst_labels: &[usize],
    dst_shape: &[usize],
    left_labels: &[usize],
    left_shape: &[usize],
    left: &[Complex64],
    right_labels: &[usize],
    right_shape: &[usize],
    right: &[Complex64],
    conj: (bool, bool),
) -> Vec<Complex64> {
    let left_strides = strides(left_shape);
    let right_strides = strides(right_shape);

    // Per-label stride contributions into each operand.
    let mut left_of = FxHashMap::<usize, usize>::default();
    for (dim, &label) in left_labels.iter().enumerate() {
        left_of.insert(label, left_strides[dim]);
    }
    let mut right_of = FxHashMap::<usize, usize>::default();
    for (dim, &label) in right_labels.iter().enumerate() {
        right_of.insert(label, right_strides[dim]);
    }

    // Summed labels with their extents, in label order for determinism.
    let mut summed: Vec<(usize, usize)> = left_labels
        .iter()
        .enumerate()
        .filter(|(_, label)| right_of.contains_key(label) && !dst_labels.contains(label))
        .map(|(dim, &label)| (label, left_shape[dim]))
        .collect();
    summed.sort_unstable();
    let sum_extents: Vec<usize> = summed.iter().map(|&(_, extent)| extent).collect();
    let sum_volume: usize = sum_extents.iter().product();

    let out_volume: usize = dst_shape.iter().product();
    let mut out = vec![Complex64::ZERO; out_volume];
    let mut out_multi = vec![0; dst_shape.len()];
    let mut sum_multi = vec![0; sum_extents.len()];

    for (out_flat, slot) in out.iter_mut().enumerate() {
        decode(out_flat, dst_shape, &mut out_multi);
        let mut base_left = 0;
        let mut base_right = 0;
        for (d, &label) in dst_labels.iter().enumerate() {
            if let Some(&stride) = left_of.get(&label) {
                base_left += stride * out_multi[d];
            }
            if let Some(&stride) = right_of.get(&label) {
                base_right += stride * out_multi[d];
            }
        }

        let mut acc = Complex64::ZERO;
        for sum_flat in 0..sum_volume {
            decode(sum_flat, &sum_extents, &mut sum_multi);
            let mut idx_left = base_left;
            let mut idx_right = base_right;
            for (s, &(label, _)) in summed.iter().enumerate() {
                idx_left += left_of[&label] * sum_multi[s];
                idx_right += right_of[&label] * sum_multi[s];
            }
            acc += maybe_conj(left[idx_left], conj.0) * maybe_conj(right[idx_right], conj.1);
        }
        *slot = acc;
    }
    out
}

/// Unfolds a tensor into an `m x n` matrix: `row_dims` (in order) form the
/// row multi-index, `col_dims` the column multi-index.
pub fn unfold(
    data: &[Complex64],
    shape: &[usize],
    row_dims: &[usize],
    col_dims: &[usize],
) -> (usize, usize, Vec<Complex64>) {
    let tensor_strides = strides(shape);
    let row_extents: Vec<usize> = row_dims.iter().map(|&d| shape[d]).collect();
    let col_extents: Vec<usize> = col_dims.iter().map(|&d| shape[d]).collect();
    let m: usize = row_extents.iter().product();
    let n: usize = col_extents.iter().product();

    let mut out = vec![Complex64::ZERO; m * n];
    let mut row_multi = vec![0; row_dims.len()];
    let mut col_multi = vec![0; col_dims.len()];
    for row in 0..m {
        decode(row, &row_extents, &mut row_multi);
        let base: usize = row_multi
            .iter()
            .zip(row_dims)
            .map(|(&v, &d)| tensor_strides[d] * v)
            .sum();
        for col in 0..n {
            decode(col, &col_extents, &mut col_multi);
            let idx: usize = base
                + col_multi
                    .iter()
                    .zip(col_dims)
                    .map(|(&v, &d)| tensor_strides[d] * v)
                    .sum::<usize>();
            out[row * n + col] = data[idx];
        }
    }
    (m, n, out)
}

/// Inverse of [unfold] for a matrix of the same unfolding.
pub fn fold(
    matrix: &[Complex64],
    shape: &[usize],
    row_dims: &[usize],
    col_dims: &[usize],
) -> Vec<Complex64> {
    let tensor_strides = strides(shape);
    let row_extents: Vec<usize> = row_dims.iter().map(|&d| shape[d]).collect();
    let col_extents: Vec<usize> = col_dims.iter().map(|&d| shape[d]).collect();
    let m: usize = row_extents.iter().product();
    let n: usize = col_extents.iter().product();

    let mut out = vec![Complex64::ZERO; shape.iter().product()];
    let mut row_multi = vec![0; row_dims.len()];
    let mut col_multi = vec![0; col_dims.len()];
    for row in 0..m {
        decode(row, &row_extents, &mut row_multi);
        let base: usize = row_multi
            .iter()
            .zip(row_dims)
            .map(|(&v, &d)| tensor_strides[d] * v)
            .sum();
        for col in 0..n {
            decode(col, &col_extents, &mut col_multi);
            let idx: usize = base
                + col_multi
                    .iter()
                    .zip(col_dims)
                    .map(|(&v, &d)| tensor_strides[d] * v)
                    .sum::<usize>();
            out[idx] = matrix[row * n + col];
        }
    }
    out
}

/// Thin SVD `a = u * diag(s) * vt` of an `m x n` row-major matrix through
/// the faer backend; returns `u` as `m x k`, the `k` singular values and
/// `vt` as `k x n` with `k = min(m, n)`.
pub fn svd(m: usize, n: usize, a: &[Complex64]) -> Result<(Vec<Complex64>, Vec<f64>, Vec<Complex64>)> {
    let mut a_tensor = tensor![[Complex64::ZERO; n]; m];
    for i in 0..m {
        for j in 0..n {
            a_tensor[[i, j]] = a[i * n + j];
        }
    }

    let bd = Faer;
    let a_slice: &mut Slice<Complex64, (usize, usize), Dense> = a_tensor.as_mut();
    let SVDDecomp { s, u, vt } = bd.svd(a_slice).map_err(|error| Error::ExecutionFailure {
        op: "svd".to_string(),
        tensor: String::new(),
        reason: error.to_string(),
    })?;

    let k = m.min(n);
    // The singular values live in the rank-1 singular-value vector.
    let s_vec: Vec<f64> = (0..k).map(|i| s[[i]].re).collect();
    let mut u_vec = Vec::with_capacity(m * k);
    for i in 0..m {
        for j in 0..k {
            u_vec.push(u[[i, j]]);
        }
    }
    let mut vt_vec = Vec::with_capacity(k * n);
    for i in 0..k {
        for j in 0..n {
            vt_vec.push(vt[[i, j]]);
        }
    }
    Ok((u_vec, s_vec, vt_vec))
}

/// Orthonormalizes the columns of an `m x n` row-major matrix in place via
/// the modified Gram-Schmidt procedure.
pub fn mgs(m: usize, n: usize, a: &mut [Complex64]) {
    for j in 0..n {
        for i in 0..j {
            let mut dot = Complex64::ZERO;
            for r in 0..m {
                dot += a[r * n + i].conj() * a[r * n + j];
            }
            for r in 0..m {
                let q = a[r * n + i];
                a[r * n + j] -= dot * q;
            }
        }
        let norm: f64 = (0..m).map(|r| a[r * n + j].norm_sqr()).sum::<f64>().sqrt();
        if norm > 0.0 {
            for r in 0..m {
                a[r * n + j] /= norm;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use float_cmp::assert_approx_eq;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn test_matrix_contraction() {
        // C(i,j) = A(i,k) * B(k,j), labels i=0, j=1, k=2.
        let a = vec![c(1.0, 0.0), c(2.0, 0.0), c(3.0, 0.0), c(4.0, 0.0)];
        let b = vec![c(5.0, 0.0), c(6.0, 0.0), c(7.0, 0.0), c(8.0, 0.0)];
        let out = contract(
            &[0, 1],
            &[2, 2],
            &[0, 2],
            &[2, 2],
            &a,
            &[2, 1],
            &[2, 2],
            &b,
            (false, false),
        );
        assert_approx_eq!(f64, out[0].re, 19.0);
        assert_approx_eq!(f64, out[1].re, 22.0);
        assert_approx_eq!(f64, out[2].re, 43.0);
        assert_approx_eq!(f64, out[3].re, 50.0);
    }

    #[test]
    fn test_contraction_with_conjugation() {
        // N() = A+(i) * A(i) is the squared norm.
        let a = vec![c(1.0, 2.0), c(0.0, -1.0)];
        let out = contract(&[], &[], &[0], &[2], &a, &[0], &[2], &a, (true, false));
        assert_approx_eq!(f64, out[0].re, 6.0);
        assert_approx_eq!(f64, out[0].im, 0.0);
    }

    #[test]
    fn test_outer_product() {
        let a = vec![c(1.0, 0.0), c(2.0, 0.0)];
        let b = vec![c(3.0, 0.0), c(4.0, 0.0), c(5.0, 0.0)];
        let out = contract(
            &[0, 1],
            &[2, 3],
            &[0],
            &[2],
            &a,
            &[1],
            &[3],
            &b,
            (false, false),
        );
        assert_eq!(out.len(), 6);
        assert_approx_eq!(f64, out[5].re, 10.0);
    }

    #[test]
    fn test_add_with_transposition() {
        // dst(i,j) += src(j,i)
        let mut dst = vec![Complex64::ZERO; 4];
        let src = vec![c(1.0, 0.0), c(2.0, 0.0), c(3.0, 0.0), c(4.0, 0.0)];
        add_into(
            &mut dst,
            &[2, 2],
            &src,
            &[2, 2],
            &[1, 0],
            Complex64::ONE,
            false,
        );
        assert_approx_eq!(f64, dst[1].re, 3.0);
        assert_approx_eq!(f64, dst[2].re, 2.0);
    }

    #[test]
    fn test_unfold_fold_roundtrip() {
        let data: Vec<Complex64> = (0..24).map(|v| c(v as f64, 0.0)).collect();
        let shape = [2, 3, 4];
        let (m, n, matrix) = unfold(&data, &shape, &[2, 0], &[1]);
        assert_eq!((m, n), (8, 3));
        let back = fold(&matrix, &shape, &[2, 0], &[1]);
        assert_eq!(back, data);
    }

    #[test]
    fn test_mgs_orthonormalizes() {
        // Two linearly independent columns.
        let mut a = vec![c(1.0, 0.0), c(1.0, 0.0), c(0.0, 1.0), c(1.0, 0.0)];
        mgs(2, 2, &mut a);
        let mut dot = Complex64::ZERO;
        let mut norm0 = 0.0;
        let mut norm1 = 0.0;
        for r in 0..2 {
            dot += a[r * 2].conj() * a[r * 2 + 1];
            norm0 += a[r * 2].norm_sqr();
            norm1 += a[r * 2 + 1].norm_sqr();
        }
        assert_approx_eq!(f64, dot.norm(), 0.0, epsilon = 1e-12);
        assert_approx_eq!(f64, norm0, 1.0, epsilon = 1e-12);
        assert_approx_eq!(f64, norm1, 1.0, epsilon = 1e-12);
    }
}
