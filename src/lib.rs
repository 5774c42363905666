//! # Krylov-Schur Eigensolver Library

//! A library for computing a few extremal eigenpairs of large standard and
//! generalized eigenproblems by the restarted Krylov-Schur method, driven by
//! matrix-free linear operators.

// Declare the modules that form the public API of the crate.
pub mod algorithms;
pub mod error;
pub mod operator;
pub mod selection;
pub mod solver;

// Re-export key types to the top level of the crate for easier access.
pub use error::KrylovError;
pub use operator::{
    ArnoldiOperator, GeneralizedProblem, LinearOperator, ShiftInvertOp, StandardProblem,
};
pub use selection::{SelectionRule, SortRule};
pub use solver::{ComputationInfo, ComputeOptions, KrylovSchurSolver};
