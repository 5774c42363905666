//! Dense kernels for the projected eigenproblem.
//!
//! Each outer iteration reduces the small `m x m` projected matrix to real
//! Schur form `H = X T X^T`, reads the Ritz values off the 1x1 and 2x2
//! diagonal blocks of `T`, and computes the right eigenvectors of `T` by
//! back-substitution on its quasi-triangular structure. Restarts additionally
//! need `T` reordered so that a chosen subset of its spectrum occupies the
//! leading block; [`ordschur`] performs that with a sweep of Givens
//! rotations.
//!
//! The Schur decomposition itself is delegated to `nalgebra`'s dense backend;
//! everything here besides that call operates on `faer` matrices, which is
//! what the rest of the crate stores. The conversion at the boundary touches
//! only `m x m` data and is negligible next to the `n`-sized work.

use faer::{Mat, MatRef};
use nalgebra::DMatrix;
use num_complex::Complex;

use crate::error::{KrylovError, KrylovErrorKind};

/// Computes the real Schur decomposition `h = X T X^T` with `X` orthogonal
/// and `T` quasi-triangular (1x1 blocks for real eigenvalues, 2x2 blocks for
/// complex conjugate pairs).
///
/// A convergence failure in the dense backend is propagated unchanged as an
/// error; it is the only numerical failure mode of the analysis stage.
pub(crate) fn real_schur(h: MatRef<'_, f64>) -> Result<(Mat<f64>, Mat<f64>), KrylovError> {
    let m = h.nrows();
    debug_assert_eq!(h.ncols(), m);

    let dense = DMatrix::from_fn(m, m, |i, j| h[(i, j)]);
    let schur = nalgebra::linalg::Schur::try_new(dense, f64::EPSILON, 0)
        .ok_or(KrylovErrorKind::SchurFailure)?;
    let (q, t) = schur.unpack();

    let x = Mat::from_fn(m, m, |i, j| q[(i, j)]);
    let t = Mat::from_fn(m, m, |i, j| t[(i, j)]);
    Ok((x, t))
}

/// Eigenvalues and right eigenvectors of a real quasi-triangular matrix `t`.
///
/// Returns the complex eigenvalues in diagonal-block order together with the
/// eigenvector matrix split into real and imaginary parts (`e_re`, `e_im`),
/// each column normalized to unit 2-norm. A conjugate pair occupies two
/// consecutive columns with the positive-imaginary eigenvalue first and the
/// second eigenvector the conjugate of the first.
///
/// The eigenvalues come straight from the diagonal blocks; the eigenvectors
/// are obtained by complex back-substitution climbing the quasi-triangular
/// structure, with 2x2 diagonal blocks solved jointly and near-singular
/// denominators clamped so that clustered Ritz values cannot produce
/// infinities.
pub(crate) fn eigen_from_schur(t: MatRef<'_, f64>) -> (Vec<Complex<f64>>, Mat<f64>, Mat<f64>) {
    let m = t.nrows();
    debug_assert_eq!(t.ncols(), m);

    let mut d = vec![Complex::new(0.0, 0.0); m];
    let mut e_re = Mat::<f64>::zeros(m, m);
    let mut e_im = Mat::<f64>::zeros(m, m);

    // Scale-aware clamps for the back-substitution denominators.
    let mut t_norm = 0.0_f64;
    for j in 0..m {
        for i in 0..m {
            t_norm = t_norm.max(t[(i, j)].abs());
        }
    }
    let smin = (f64::EPSILON * t_norm).max(f64::MIN_POSITIVE);
    let smin_det = (f64::EPSILON * t_norm * t_norm).max(f64::MIN_POSITIVE);

    let mut j = 0;
    while j < m {
        let pair = j + 1 < m && t[(j + 1, j)] != 0.0;
        if pair {
            // 2x2 block [[a, b], [c, dd]] carrying a conjugate pair.
            let a = t[(j, j)];
            let b = t[(j, j + 1)];
            let c = t[(j + 1, j)];
            let dd = t[(j + 1, j + 1)];
            let disc = (a - dd) * (a - dd) + 4.0 * b * c;
            let lambda = Complex::new(0.5 * (a + dd), 0.5 * (-disc).max(0.0).sqrt());
            d[j] = lambda;
            d[j + 1] = lambda.conj();

            // In-block eigenvector [b, lambda - a]; b is nonzero for a
            // genuine complex pair.
            let mut y = vec![Complex::new(0.0, 0.0); j + 2];
            y[j] = Complex::new(b, 0.0);
            y[j + 1] = lambda - a;
            back_substitute(t, &mut y, j, j + 1, lambda, smin, smin_det);
            normalize(&mut y);
            for (row, value) in y.iter().enumerate() {
                e_re.as_mut()[(row, j)] = value.re;
                e_im.as_mut()[(row, j)] = value.im;
                e_re.as_mut()[(row, j + 1)] = value.re;
                e_im.as_mut()[(row, j + 1)] = -value.im;
            }
            j += 2;
        } else {
            let lambda = Complex::new(t[(j, j)], 0.0);
            d[j] = lambda;

            let mut y = vec![Complex::new(0.0, 0.0); j + 1];
            y[j] = Complex::new(1.0, 0.0);
            back_substitute(t, &mut y, j, j, lambda, smin, smin_det);
            normalize(&mut y);
            for (row, value) in y.iter().enumerate() {
                e_re.as_mut()[(row, j)] = value.re;
                e_im.as_mut()[(row, j)] = value.im;
            }
            j += 1;
        }
    }

    (d, e_re, e_im)
}

/// Solves `(T - lambda I) y = 0` upward from the seeded block: rows
/// `block_start - 1` down to 0 are filled in, with rows belonging to a 2x2
/// diagonal block solved as a joint 2x2 complex system.
fn back_substitute(
    t: MatRef<'_, f64>,
    y: &mut [Complex<f64>],
    block_start: usize,
    support_end: usize,
    lambda: Complex<f64>,
    smin: f64,
    smin_det: f64,
) {
    let mut i = block_start as isize - 1;
    while i >= 0 {
        let row = i as usize;
        // A nonzero on (row, row - 1) marks rows (row - 1, row) as an atomic
        // 2x2 block.
        let joint = row > 0 && t[(row, row - 1)] != 0.0;
        if joint {
            let mut r1 = Complex::new(0.0, 0.0);
            let mut r2 = Complex::new(0.0, 0.0);
            for l in row + 1..support_end + 1 {
                r1 += t[(row - 1, l)] * y[l];
                r2 += t[(row, l)] * y[l];
            }
            let a11 = Complex::new(t[(row - 1, row - 1)], 0.0) - lambda;
            let a12 = Complex::new(t[(row - 1, row)], 0.0);
            let a21 = Complex::new(t[(row, row - 1)], 0.0);
            let a22 = Complex::new(t[(row, row)], 0.0) - lambda;
            let mut det = a11 * a22 - a12 * a21;
            if det.norm() < smin_det {
                det = Complex::new(smin_det, 0.0);
            }
            y[row - 1] = (-r1 * a22 + a12 * r2) / det;
            y[row] = (-r2 * a11 + a21 * r1) / det;
            i -= 2;
        } else {
            let mut r = Complex::new(0.0, 0.0);
            for l in row + 1..support_end + 1 {
                r += t[(row, l)] * y[l];
            }
            let mut den = Complex::new(t[(row, row)], 0.0) - lambda;
            if den.norm() < smin {
                den = Complex::new(smin, 0.0);
            }
            y[row] = -r / den;
            i -= 1;
        }
    }
}

fn normalize(y: &mut [Complex<f64>]) {
    let norm = y.iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in y.iter_mut() {
            *v /= norm;
        }
    }
}

/// Reorders the real Schur pair `(x, t)` in place so that the diagonal
/// blocks flagged by `select` occupy the leading rows and columns of `t`.
///
/// The reordering is a sequence of adjacent swaps realized with Givens
/// rotations applied symmetrically to `t` and on the right of `x`, following
/// a destination permutation that numbers selected blocks first while
/// preserving the original order inside each class.
///
/// A complex conjugate pair occupies indices `(i, i + 1)` exactly when
/// `t[i + 1, i]` is nonzero; such a pair must be selected atomically. The
/// caller is responsible for expanding `select` so that both members of each
/// pair carry the same flag.
pub(crate) fn ordschur(x: &mut Mat<f64>, t: &mut Mat<f64>, select: &[bool]) {
    let m = select.len();
    debug_assert_eq!(t.nrows(), m);
    debug_assert_eq!(t.ncols(), m);
    debug_assert_eq!(x.ncols(), m);

    // Destination permutation: selected indices first, both classes in
    // original order.
    let mut permutation = vec![0usize; m];
    let mut next = 0usize;
    for (j, &flag) in select.iter().enumerate() {
        if flag {
            permutation[j] = next;
            next += 1;
        }
    }
    for (j, &flag) in select.iter().enumerate() {
        if !flag {
            permutation[j] = next;
            next += 1;
        }
    }

    for i in 0..m.saturating_sub(1) {
        // Locate the block destined for position i; everything below i is
        // already in place, so the search starts there.
        let mut j = i;
        while permutation[j] != i {
            j += 1;
        }
        // Bubble it up with adjacent rotations.
        for k in (i..j).rev() {
            let a = t.as_ref()[(k, k + 1)];
            let b = t.as_ref()[(k + 1, k + 1)] - t.as_ref()[(k, k)];
            let (c, s) = givens(a, b);

            rotate_rows(t, k, c, s);
            rotate_cols(t, k, c, s);
            rotate_cols(x, k, c, s);
            permutation.swap(k, k + 1);
        }
    }
}

/// Plane rotation `(c, s)` with `c * a + s * b = hypot(a, b)` and
/// `-s * a + c * b = 0`; the identity when both inputs vanish.
#[inline]
fn givens(a: f64, b: f64) -> (f64, f64) {
    let r = a.hypot(b);
    if r <= f64::MIN_POSITIVE {
        (1.0, 0.0)
    } else {
        (a / r, b / r)
    }
}

/// Applies the rotation to rows `k` and `k + 1` (multiplication by G^T on
/// the left).
fn rotate_rows(mat: &mut Mat<f64>, k: usize, c: f64, s: f64) {
    let ncols = mat.ncols();
    for l in 0..ncols {
        let upper = mat.as_ref()[(k, l)];
        let lower = mat.as_ref()[(k + 1, l)];
        mat.as_mut()[(k, l)] = c * upper + s * lower;
        mat.as_mut()[(k + 1, l)] = -s * upper + c * lower;
    }
}

/// Applies the rotation to columns `k` and `k + 1` (multiplication by G on
/// the right).
fn rotate_cols(mat: &mut Mat<f64>, k: usize, c: f64, s: f64) {
    let nrows = mat.nrows();
    for r in 0..nrows {
        let left = mat.as_ref()[(r, k)];
        let right = mat.as_ref()[(r, k + 1)];
        mat.as_mut()[(r, k)] = c * left + s * right;
        mat.as_mut()[(r, k + 1)] = -s * left + c * right;
    }
}
