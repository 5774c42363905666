//! This module defines the custom error types for the library.
//!
//! All error conditions that can arise while setting up or driving the
//! Krylov-Schur iteration are collected into a single enum wrapped by
//! [`KrylovError`].
//!
//! Two conditions are deliberately *not* errors: breakdown of the Arnoldi
//! process (the Krylov subspace became invariant, which is a form of success)
//! and failure to converge within the iteration budget (partial results are
//! still useful). Both are reported through
//! [`ComputationInfo`](crate::solver::ComputationInfo) so that callers keep
//! access to whatever eigenpairs were found.
use thiserror::Error;

/// Represents all possible errors that can occur while running the solver.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct KrylovError(#[from] KrylovErrorKind);

/// Private enum containing the distinct kinds of errors.
/// This separation allows for a clean `Display` implementation via
/// [`thiserror`] while keeping the public surface a single opaque type.
#[derive(Error, Debug, PartialEq)]
pub(crate) enum KrylovErrorKind {
    /// A constructor or entry point was called with an out-of-range
    /// parameter, e.g. a requested eigenvalue count outside `[1, n - 1]`.
    #[error("Invalid input parameter: {0}")]
    InvalidArgument(String),

    /// Indicates that the dimensions of two operators (or an operator and a
    /// vector) are incompatible.
    #[error("Dimension mismatch: expected a dimension of {expected} but found {actual}.")]
    DimensionMismatch { expected: usize, actual: usize },

    /// `compute` was called before an initial residual vector was supplied.
    #[error("The solver has not been initialized. Call `init` or `init_with` before `compute`.")]
    NotInitialized,

    /// The real Schur decomposition of the projected matrix failed to
    /// converge. Propagated unchanged from the dense backend.
    #[error("The Schur decomposition of the projected Hessenberg matrix did not converge.")]
    SchurFailure,
}

// Manually implement PartialEq for the public error type.
// We compare the inner `KrylovErrorKind`.
impl PartialEq for KrylovError {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
