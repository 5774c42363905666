//! Numerical building blocks of the Krylov-Schur iteration.
//!
//! [`arnoldi`] maintains the Krylov factorization `A V = V H + f e_p^T` under
//! a user-supplied operator; [`schur`] provides the dense kernels applied to
//! the small projected matrix: the real Schur decomposition, eigenvectors of
//! the quasi-triangular factor, and the reordering sweep that drives
//! restarts.

pub mod arnoldi;
pub mod schur;

/// Threshold for one round of iterative refinement in the Gram-Schmidt
/// projection: when the candidate basis vector loses more than this fraction
/// of its norm, the projection is repeated once (the classical
/// Daniel-Gragg-Kaufman-Stewart criterion).
pub(crate) const REFINEMENT_THRESHOLD: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Relative invariant-subspace test: the factorization has broken down when
/// the residual norm is at most `breakdown_threshold(scale)`, with `scale`
/// the norm of the freshly computed column of the projected matrix.
#[inline]
pub(crate) fn breakdown_threshold(column_scale: f64) -> f64 {
    f64::EPSILON * column_scale
}
