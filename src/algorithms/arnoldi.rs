//! The B-orthonormal Arnoldi factorization that underpins the restarted
//! iteration.
//!
//! The engine maintains the relation
//!
//!     A * V[:, :p] = V[:, :p] * H[:p, :p] + v_next * H[p, :p]
//!
//! where the columns of `V` are orthonormal in the B-inner product supplied
//! by the operator, `H` is upper Hessenberg in the columns built by the
//! Arnoldi process, and the bottom row of `H` carries the coupling of the
//! residual direction `v_next` to the basis. Directly after an extension to
//! length `m` that row is `beta * e_{m-1}^T`; after a restart truncation it
//! is a dense row vector, which is exactly the "Krylov-Schur form" that makes
//! the restart cheap: the leading block of `H` is then quasi-triangular
//! rather than Hessenberg, and the extension simply continues from column
//! `p`.
//!
//! Storage follows the bordered layout of the restarted scheme: `V` is
//! `n x (m + 1)` with the unit residual direction in its last column, and `H`
//! is `(m + 1) x m` with the coupling row at the bottom. The
//! [`restart`](KrylovFactorization::restart) operation rewrites both in place
//! from a reordered Schur pair.

use faer::{Mat, MatRef, Scale};

use super::{breakdown_threshold, REFINEMENT_THRESHOLD};
use crate::error::{KrylovError, KrylovErrorKind};
use crate::operator::ArnoldiOperator;

/// An m-step Krylov factorization of a linear operator.
///
/// Created once per solver with [`new`](Self::new), re-seeded with
/// [`init`](Self::init), grown by [`extend`](Self::extend) and compressed by
/// [`restart`](Self::restart). All storage is allocated up front from
/// `(n, m)`.
pub struct KrylovFactorization {
    /// Orthonormal basis, `n x (m + 1)`. Column `m` holds the unit residual
    /// direction once an extension has completed.
    v: Mat<f64>,
    /// Projected matrix with its coupling row, `(m + 1) x m`.
    h: Mat<f64>,
    /// Number of valid basis columns.
    p: usize,
    n: usize,
    m: usize,
}

impl KrylovFactorization {
    /// Allocates a zero factorization for a problem of dimension `n` with
    /// subspace size `m`.
    pub fn new(n: usize, m: usize) -> Self {
        Self {
            v: Mat::zeros(n, m + 1),
            h: Mat::zeros(m + 1, m),
            p: 0,
            n,
            m,
        }
    }

    /// Seeds the factorization: normalizes `v0` in the B-norm into the first
    /// basis column and resets the length to zero.
    ///
    /// Fails with `InvalidArgument` when `v0` has the wrong length or is
    /// (numerically) the zero vector, which cannot span a Krylov subspace.
    pub fn init(&mut self, op: &impl ArnoldiOperator, v0: MatRef<'_, f64>) -> Result<(), KrylovError> {
        if v0.nrows() != self.n || v0.ncols() != 1 {
            return Err(KrylovErrorKind::DimensionMismatch {
                expected: self.n,
                actual: v0.nrows(),
            }
            .into());
        }
        let norm = op.norm(v0);
        if norm <= f64::MIN_POSITIVE {
            return Err(KrylovErrorKind::InvalidArgument(
                "the initial residual vector must not be the zero vector".to_string(),
            )
            .into());
        }

        for c in 0..self.m {
            for r in 0..self.m + 1 {
                self.h.as_mut()[(r, c)] = 0.0;
            }
        }
        for c in 0..self.m + 1 {
            for r in 0..self.n {
                self.v.as_mut()[(r, c)] = 0.0;
            }
        }
        let normalized = v0 * Scale(1.0 / norm);
        self.v.col_mut(0).copy_from(normalized.as_ref().col(0));
        self.p = 0;
        Ok(())
    }

    /// Grows the factorization from its current length to `to` columns by
    /// the B-orthonormal Arnoldi process, incrementing `op_counter` once per
    /// application of `A`.
    ///
    /// Returns `true` when the process breaks down: the residual B-norm fell
    /// below the invariant-subspace threshold, so the Krylov subspace is
    /// exhausted and no further information can be extracted from this start
    /// vector. The driver must then stop and report the eigenpairs converged
    /// so far.
    pub fn extend(&mut self, op: &impl ArnoldiOperator, to: usize, op_counter: &mut usize) -> bool {
        debug_assert!(to <= self.m);

        for j in self.p..to {
            // w = A * v_j
            let mut w = op.apply_a(self.v.as_ref().get(.., j..j + 1));
            *op_counter += 1;

            let w_norm = op.norm(w.as_ref());

            // Project w against the current basis in the B-inner product.
            // Forming B * w once turns the j + 1 inner products into a single
            // dense matrix product.
            let basis = self.v.as_ref().get(.., 0..j + 1);
            let bw = op.apply_b(w.as_ref());
            let mut h_col = basis.transpose() * bw.as_ref();
            let projection = basis * &h_col;
            w = &w - &projection;

            let mut beta = op.norm(w.as_ref());

            // One round of iterative refinement when cancellation ate a
            // substantial part of the norm.
            if beta < REFINEMENT_THRESHOLD * w_norm {
                let bw = op.apply_b(w.as_ref());
                let correction = basis.transpose() * bw.as_ref();
                let projection = basis * &correction;
                w = &w - &projection;
                h_col = &h_col + &correction;
                beta = op.norm(w.as_ref());
            }

            // Record column j of H. The column is cleared first so that no
            // state from before a restart leaks into the projected matrix.
            for r in 0..self.m + 1 {
                self.h.as_mut()[(r, j)] = 0.0;
            }
            for r in 0..j + 1 {
                self.h.as_mut()[(r, j)] = h_col.as_ref()[(r, 0)];
            }

            // Invariant-subspace test, relative to the size of the new
            // column. An exactly zero column (A * v_j in the span of V) is
            // breakdown as well.
            let column_scale = h_col.norm_l2().hypot(beta);
            if column_scale <= f64::MIN_POSITIVE || beta <= breakdown_threshold(column_scale) {
                self.p = j;
                return true;
            }

            self.h.as_mut()[(j + 1, j)] = beta;
            let v_next = &w * Scale(1.0 / beta);
            self.v.col_mut(j + 1).copy_from(v_next.as_ref().col(0));
        }

        self.p = to;
        false
    }

    /// Truncates the factorization to length `k` from a reordered Schur pair
    /// of the projected matrix: with `Xk` the leading `k` Schur vectors,
    ///
    ///     V[:, :k] = V[:, :m] * Xk        (new basis)
    ///     V[:, k]  = V[:, m]              (residual direction, unchanged)
    ///     H[:k,:k] = T[:k, :k]            (quasi-triangular block)
    ///     H[k, :k] = H[m, :m] * Xk        (new coupling row)
    ///
    /// Everything else in `H` is zeroed so the next extension starts clean.
    pub fn restart(&mut self, xk: MatRef<'_, f64>, t: MatRef<'_, f64>, k: usize) {
        debug_assert_eq!(xk.nrows(), self.m);
        debug_assert_eq!(xk.ncols(), k);
        debug_assert!(k <= self.m);

        let m = self.m;

        let new_basis = self.v.as_ref().get(.., 0..m) * xk;
        let residual = self.v.as_ref().get(.., m..m + 1).to_owned();
        let new_coupling = self.h.as_ref().get(m..m + 1, 0..m) * xk;

        self.v.as_mut().get_mut(.., 0..k).copy_from(&new_basis);
        self.v.as_mut().get_mut(.., k..k + 1).copy_from(&residual);

        for c in 0..m {
            for r in 0..m + 1 {
                self.h.as_mut()[(r, c)] = 0.0;
            }
        }
        for c in 0..k {
            for r in 0..k {
                self.h.as_mut()[(r, c)] = t[(r, c)];
            }
            self.h.as_mut()[(k, c)] = new_coupling.as_ref()[(0, c)];
        }

        self.p = k;
    }

    /// Current factorization length.
    pub fn len(&self) -> usize {
        self.p
    }

    /// Whether the factorization holds no basis columns yet.
    pub fn is_empty(&self) -> bool {
        self.p == 0
    }

    /// The projected matrix `H[:m, :m]`.
    pub fn projected(&self) -> MatRef<'_, f64> {
        self.h.as_ref().get(0..self.m, 0..self.m)
    }

    /// The residual coupling row `H[m, :m]`.
    pub fn coupling_row(&self) -> MatRef<'_, f64> {
        self.h.as_ref().get(self.m..self.m + 1, 0..self.m)
    }

    /// The basis `V[:, :m]`.
    pub fn basis(&self) -> MatRef<'_, f64> {
        self.v.as_ref().get(.., 0..self.m)
    }
}
