//! This module defines the core abstractions for linear operators.
//!
//! The Krylov-Schur iteration never needs direct access to the entries of the
//! matrix `A` whose eigenvalues are sought. Its fundamental operation is the
//! matrix-vector product, which allows the solver to be written against a
//! "matrix-free" interface: any object that can perform the action
//! `x -> A * x` can drive the iteration. This is essential for the intended
//! use cases, where `A` is huge, sparse, or only available implicitly (for
//! example as the solve `(A - sigma * I)^{-1} x` in shift-invert mode).
//!
//! Two layers are provided:
//!
//! 1. [`LinearOperator`] is the elementary capability: dimensions plus one
//!    application. It is implemented for `faer`'s dense matrix types, for its
//!    sparse column-major matrices, and by [`ShiftInvertOp`].
//! 2. [`ArnoldiOperator`] is what the factorization engine actually consumes:
//!    the action of `A` together with the inner product in which the Krylov
//!    basis must be orthonormal. For a standard eigenproblem that is the
//!    Euclidean inner product ([`StandardProblem`]); for a generalized
//!    problem `A x = lambda B x` with symmetric positive definite `B` it is
//!    the B-inner product `<x, y> = x^T B y` ([`GeneralizedProblem`]).
//!
//! Both wrappers borrow their operators, so a caller can keep ownership of a
//! large matrix while several solver instances reference it.

use faer::linalg::solvers::PartialPivLu;
use faer::prelude::*;
use faer::sparse::{SparseColMat, SparseColMatRef};
use faer::{Mat, MatMut, MatRef};

use crate::error::{KrylovError, KrylovErrorKind};

/// Represents a linear operator that can be applied to a vector (or a matrix).
///
/// This trait provides an abstraction for the matrix-vector product, the
/// fundamental operation of Krylov subspace methods. By depending on this
/// trait rather than a concrete matrix type, the eigensolver can be used with
/// dense matrices, sparse matrices, or operators that never materialize a
/// matrix at all.
pub trait LinearOperator {
    /// Returns the number of rows of the operator.
    fn nrows(&self) -> usize;

    /// Returns the number of columns of the operator.
    fn ncols(&self) -> usize;

    /// Applies the linear operator to a matrix `rhs`.
    ///
    /// In the context of the Arnoldi process, `rhs` will be a single-column
    /// matrix (a vector). The implementation must return an owned matrix
    /// containing the result of `A * rhs`.
    ///
    /// # Panics
    ///
    /// This method is expected to panic if the inner dimension of the
    /// operator does not match the number of rows of `rhs`.
    fn apply(&self, rhs: MatRef<'_, f64>) -> Mat<f64>;
}

/// Implementation for `faer`'s immutable dense matrix view.
impl<'a> LinearOperator for MatRef<'a, f64> {
    #[inline]
    fn nrows(&self) -> usize {
        MatRef::nrows(self)
    }

    #[inline]
    fn ncols(&self) -> usize {
        MatRef::ncols(self)
    }

    #[inline]
    fn apply(&self, rhs: MatRef<'_, f64>) -> Mat<f64> {
        assert_eq!(
            MatRef::ncols(self),
            rhs.nrows(),
            "Dimension mismatch: operator columns ({}) do not match vector rows ({}).",
            MatRef::ncols(self),
            rhs.nrows(),
        );

        // Defer to faer's optimized matrix multiplication routine.
        self * rhs
    }
}

/// Implementation for `faer`'s mutable dense matrix view, delegating to the
/// `MatRef` implementation via a reborrow.
impl<'a> LinearOperator for MatMut<'a, f64> {
    #[inline]
    fn nrows(&self) -> usize {
        self.rb().nrows()
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.rb().ncols()
    }

    #[inline]
    fn apply(&self, rhs: MatRef<'_, f64>) -> Mat<f64> {
        self.rb().apply(rhs)
    }
}

/// Implementation for `faer`'s owned dense matrix.
impl LinearOperator for Mat<f64> {
    #[inline]
    fn nrows(&self) -> usize {
        self.as_ref().nrows()
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.as_ref().ncols()
    }

    #[inline]
    fn apply(&self, rhs: MatRef<'_, f64>) -> Mat<f64> {
        self.as_ref().apply(rhs)
    }
}

/// Implementation for `faer`'s sparse column-major matrix view.
impl<'a> LinearOperator for SparseColMatRef<'a, usize, f64> {
    #[inline]
    fn nrows(&self) -> usize {
        (**self).nrows()
    }

    #[inline]
    fn ncols(&self) -> usize {
        (**self).ncols()
    }

    #[inline]
    fn apply(&self, rhs: MatRef<'_, f64>) -> Mat<f64> {
        assert_eq!(
            SparseColMatRef::ncols(self),
            rhs.nrows(),
            "Dimension mismatch: operator columns ({}) do not match vector rows ({}).",
            SparseColMatRef::ncols(self),
            rhs.nrows(),
        );

        self * rhs
    }
}

/// Implementation for `faer`'s owned sparse column-major matrix.
impl LinearOperator for SparseColMat<usize, f64> {
    #[inline]
    fn nrows(&self) -> usize {
        self.as_ref().nrows()
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.as_ref().ncols()
    }

    #[inline]
    fn apply(&self, rhs: MatRef<'_, f64>) -> Mat<f64> {
        LinearOperator::apply(&self.as_ref(), rhs)
    }
}

/// The shift-invert spectral transformation `x -> (A - sigma * I)^{-1} x`.
///
/// Eigenvalues `lambda` of `A` close to the shift `sigma` are mapped to
/// eigenvalues `nu = 1 / (lambda - sigma)` of large magnitude, which the
/// iteration finds quickly. The caller recovers the original eigenvalues via
/// `lambda = sigma + 1 / nu`; eigenvectors are unchanged by the
/// transformation.
///
/// The shifted matrix is factorized once at construction with a
/// partial-pivoting LU decomposition, so each application costs only a pair
/// of triangular solves.
pub struct ShiftInvertOp {
    lu: PartialPivLu<f64>,
    dim: usize,
    sigma: f64,
}

impl ShiftInvertOp {
    /// Factorizes `a - sigma * I` for a square dense matrix `a`.
    pub fn new(a: MatRef<'_, f64>, sigma: f64) -> Result<Self, KrylovError> {
        if a.nrows() != a.ncols() {
            return Err(KrylovErrorKind::DimensionMismatch {
                expected: a.nrows(),
                actual: a.ncols(),
            }
            .into());
        }
        let n = a.nrows();
        let shifted = Mat::from_fn(n, n, |i, j| {
            if i == j {
                a[(i, j)] - sigma
            } else {
                a[(i, j)]
            }
        });
        Ok(Self {
            lu: shifted.as_ref().partial_piv_lu(),
            dim: n,
            sigma,
        })
    }

    /// The shift the operator was built around.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl LinearOperator for ShiftInvertOp {
    #[inline]
    fn nrows(&self) -> usize {
        self.dim
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.dim
    }

    #[inline]
    fn apply(&self, rhs: MatRef<'_, f64>) -> Mat<f64> {
        assert_eq!(
            self.dim,
            rhs.nrows(),
            "Dimension mismatch: operator columns ({}) do not match vector rows ({}).",
            self.dim,
            rhs.nrows(),
        );
        self.lu.solve(rhs)
    }
}

/// The operator pair consumed by the Arnoldi factorization: the action of the
/// system matrix together with the inner product defining orthonormality of
/// the Krylov basis.
///
/// All methods are synchronous and side-effect-free with respect to their
/// arguments; within one solve the factorization engine issues `apply_a`
/// calls in strict program order, so implementations must be deterministic
/// for runs to be reproducible.
pub trait ArnoldiOperator {
    /// The dimension `n` of the problem. Fixed across a solve.
    fn dim(&self) -> usize;

    /// Applies the system operator: `y = A * x`.
    fn apply_a(&self, x: MatRef<'_, f64>) -> Mat<f64>;

    /// Applies the inner-product operator: `y = B * x` (the identity for a
    /// standard problem).
    fn apply_b(&self, x: MatRef<'_, f64>) -> Mat<f64>;

    /// The B-inner product `<x, y> = x^T B y`.
    fn inner(&self, x: MatRef<'_, f64>, y: MatRef<'_, f64>) -> f64;

    /// The B-norm `sqrt(<x, x>)`.
    fn norm(&self, x: MatRef<'_, f64>) -> f64;
}

/// Standard eigenproblem `A x = lambda x`: the inner-product operator is the
/// identity and the B-inner product reduces to the Euclidean dot product.
pub struct StandardProblem<'a, O: LinearOperator> {
    op: &'a O,
}

impl<'a, O: LinearOperator> StandardProblem<'a, O> {
    /// Wraps a square operator. Fails when the operator is not square.
    pub fn new(op: &'a O) -> Result<Self, KrylovError> {
        if op.nrows() != op.ncols() {
            return Err(KrylovErrorKind::DimensionMismatch {
                expected: op.nrows(),
                actual: op.ncols(),
            }
            .into());
        }
        Ok(Self { op })
    }
}

impl<'a, O: LinearOperator> ArnoldiOperator for StandardProblem<'a, O> {
    #[inline]
    fn dim(&self) -> usize {
        self.op.nrows()
    }

    #[inline]
    fn apply_a(&self, x: MatRef<'_, f64>) -> Mat<f64> {
        self.op.apply(x)
    }

    #[inline]
    fn apply_b(&self, x: MatRef<'_, f64>) -> Mat<f64> {
        x.to_owned()
    }

    #[inline]
    fn inner(&self, x: MatRef<'_, f64>, y: MatRef<'_, f64>) -> f64 {
        let dot = x.transpose() * y;
        dot.as_ref()[(0, 0)]
    }

    #[inline]
    fn norm(&self, x: MatRef<'_, f64>) -> f64 {
        x.norm_l2()
    }
}

/// Generalized eigenproblem `A x = lambda B x` with `B` symmetric positive
/// definite. Orthonormality of the Krylov basis is taken in the B-inner
/// product, which keeps the projected matrix consistent with the pair
/// `(A, B)`.
///
/// Positive definiteness of `B` is the caller's responsibility; it is what
/// makes `<., .>_B` a genuine inner product.
pub struct GeneralizedProblem<'a, O: LinearOperator, B: LinearOperator> {
    a: &'a O,
    b: &'a B,
}

impl<'a, O: LinearOperator, B: LinearOperator> GeneralizedProblem<'a, O, B> {
    /// Pairs the system operator with the inner-product operator. Fails when
    /// either operator is not square or their dimensions differ.
    pub fn new(a: &'a O, b: &'a B) -> Result<Self, KrylovError> {
        if a.nrows() != a.ncols() {
            return Err(KrylovErrorKind::DimensionMismatch {
                expected: a.nrows(),
                actual: a.ncols(),
            }
            .into());
        }
        if b.nrows() != b.ncols() || b.nrows() != a.nrows() {
            return Err(KrylovErrorKind::DimensionMismatch {
                expected: a.nrows(),
                actual: b.nrows(),
            }
            .into());
        }
        Ok(Self { a, b })
    }
}

impl<'a, O: LinearOperator, B: LinearOperator> ArnoldiOperator for GeneralizedProblem<'a, O, B> {
    #[inline]
    fn dim(&self) -> usize {
        self.a.nrows()
    }

    #[inline]
    fn apply_a(&self, x: MatRef<'_, f64>) -> Mat<f64> {
        self.a.apply(x)
    }

    #[inline]
    fn apply_b(&self, x: MatRef<'_, f64>) -> Mat<f64> {
        self.b.apply(x)
    }

    #[inline]
    fn inner(&self, x: MatRef<'_, f64>, y: MatRef<'_, f64>) -> f64 {
        let by = self.b.apply(y);
        let dot = x.transpose() * by.as_ref();
        dot.as_ref()[(0, 0)]
    }

    #[inline]
    fn norm(&self, x: MatRef<'_, f64>) -> f64 {
        // Round-off can push <x, x>_B marginally negative for tiny x.
        self.inner(x, x).max(0.0).sqrt()
    }
}

// Unit tests for the operator abstractions.
#[cfg(test)]
mod tests {
    use super::*;
    use faer::mat;
    use faer::sparse::Triplet;

    #[test]
    fn test_linear_operator_for_mat() {
        let matrix: Mat<f64> = mat![[2.0, -1.0, 0.0], [-1.0, 2.0, -1.0], [0.0, -1.0, 2.0],];
        let vector: Mat<f64> = mat![[1.0], [2.0], [3.0]];

        let expected = &matrix * &vector;

        let operator: &dyn LinearOperator = &matrix;
        let result = operator.apply(vector.as_ref());

        assert_eq!(result, expected);
        assert_eq!(operator.nrows(), 3);
        assert_eq!(operator.ncols(), 3);
    }

    #[test]
    #[should_panic(
        expected = "Dimension mismatch: operator columns (2) do not match vector rows (3)."
    )]
    fn test_dimension_mismatch_panic() {
        let matrix: Mat<f64> = mat![[1.0, 0.0], [0.0, 1.0]];
        let vector: Mat<f64> = mat![[1.0], [2.0], [3.0]];

        let operator: &dyn LinearOperator = &matrix;
        operator.apply(vector.as_ref());
    }

    #[test]
    fn test_sparse_matches_dense() {
        let n = 4;
        let mut triplets = Vec::new();
        let mut dense = Mat::<f64>::zeros(n, n);
        for i in 0..n {
            let val = (i + 1) as f64;
            triplets.push(Triplet {
                row: i,
                col: i,
                val,
            });
            dense.as_mut()[(i, i)] = val;
        }
        let sparse = SparseColMat::try_new_from_triplets(n, n, &triplets).unwrap();

        let x: Mat<f64> = mat![[1.0], [-2.0], [0.5], [4.0]];
        let dense_result = LinearOperator::apply(&dense, x.as_ref());
        let sparse_result = LinearOperator::apply(&sparse, x.as_ref());
        assert!((dense_result - sparse_result).norm_l2() < 1e-14);
    }

    #[test]
    fn test_standard_problem_inner_and_norm() {
        let matrix: Mat<f64> = mat![[1.0, 0.0], [0.0, 2.0]];
        let problem = StandardProblem::new(&matrix).unwrap();

        let x: Mat<f64> = mat![[3.0], [4.0]];
        let y: Mat<f64> = mat![[1.0], [1.0]];

        assert_eq!(problem.dim(), 2);
        assert_eq!(problem.inner(x.as_ref(), y.as_ref()), 7.0);
        assert!((problem.norm(x.as_ref()) - 5.0).abs() < 1e-15);
        // apply_b is the identity.
        assert_eq!(problem.apply_b(x.as_ref()), x);
    }

    #[test]
    fn test_generalized_problem_b_inner_product() {
        let a: Mat<f64> = mat![[1.0, 0.0], [0.0, 2.0]];
        let b: Mat<f64> = mat![[2.0, 0.0], [0.0, 3.0]];
        let problem = GeneralizedProblem::new(&a, &b).unwrap();

        let x: Mat<f64> = mat![[1.0], [2.0]];
        let y: Mat<f64> = mat![[3.0], [1.0]];

        // x^T B y = 1 * 2 * 3 + 2 * 3 * 1 = 12
        assert!((problem.inner(x.as_ref(), y.as_ref()) - 12.0).abs() < 1e-15);
        // ||x||_B = sqrt(1 * 2 * 1 + 2 * 3 * 2) = sqrt(14)
        assert!((problem.norm(x.as_ref()) - 14.0_f64.sqrt()).abs() < 1e-15);
    }

    #[test]
    fn test_generalized_problem_dimension_validation() {
        let a: Mat<f64> = Mat::zeros(3, 3);
        let b: Mat<f64> = Mat::zeros(2, 2);
        assert!(GeneralizedProblem::new(&a, &b).is_err());
    }

    #[test]
    fn test_shift_invert_matches_direct_solve() {
        let a: Mat<f64> = mat![[4.0, 1.0], [1.0, 3.0]];
        let sigma = 0.5;
        let op = ShiftInvertOp::new(a.as_ref(), sigma).unwrap();
        assert_eq!(op.sigma(), 0.5);

        let rhs: Mat<f64> = mat![[1.0], [2.0]];
        let y = op.apply(rhs.as_ref());

        // Verify (A - sigma I) y = rhs.
        let shifted: Mat<f64> = mat![[3.5, 1.0], [1.0, 2.5]];
        let residual = &shifted * &y - &rhs;
        assert!(residual.norm_l2() < 1e-12);
    }
}
