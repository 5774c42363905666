//! The restarted Krylov-Schur eigensolver.
//!
//! This module provides the user-facing API for computing a few extremal
//! eigenpairs of a large linear operator $\mathbf{A}$ (or of a generalized
//! pair $(\mathbf{A}, \mathbf{B})$ with $\mathbf{B}$ symmetric positive
//! definite). The solver repeatedly
//!
//! 1. extends an m-step Arnoldi factorization
//!    $\mathbf{A}\mathbf{V} = \mathbf{V}\mathbf{H} + \mathbf{f}\mathbf{e}_p^T$,
//! 2. reduces the projected matrix $\mathbf{H}$ to real Schur form
//!    $(\mathbf{X}, \mathbf{T})$ and extracts Ritz values with implicit
//!    residual bounds,
//! 3. counts the converged wanted Ritz values,
//! 4. reorders the Schur form so that the wanted part of the spectrum
//!    occupies the leading block, and
//! 5. truncates the factorization to that block and continues,
//!
//! until the requested number of eigenpairs has converged or the iteration
//! budget is exhausted. The truncation step is what distinguishes
//! Krylov-Schur from implicitly restarted Arnoldi: because the leading block
//! of $\mathbf{T}$ is already quasi-triangular, a restart is an exact
//! compression rather than a delicate QR sweep, which makes the method
//! considerably more robust in floating point.
//!
//! Breakdown of the factorization (the Krylov subspace became invariant) and
//! failure to converge within the budget are reported through
//! [`ComputationInfo`], never as errors: callers routinely want whatever
//! partial results exist.

use faer::{Mat, MatRef};
use num_complex::Complex;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::algorithms::arnoldi::KrylovFactorization;
use crate::algorithms::schur::{eigen_from_schur, ordschur, real_schur};
use crate::error::{KrylovError, KrylovErrorKind};
use crate::operator::ArnoldiOperator;
use crate::selection::{rank_exported, rank_ritz_values, SelectionRule, SortRule};

/// Status of the computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationInfo {
    /// `compute` has not been run (or `init` has not been called).
    NotComputed,
    /// The solver is inside `compute`. Never observable through `info()` in
    /// single-threaded use; it exists so the state machine is explicit.
    Running,
    /// The requested eigenpairs converged, or the factorization broke down
    /// with an exactly invariant subspace.
    Successful,
    /// The iteration budget was exhausted before `nev` eigenpairs converged.
    /// Partial results are available.
    NotConverging,
}

/// Parameters of a [`KrylovSchurSolver::compute`] run.
///
/// The defaults mirror the classical choices: hunt for the eigenvalues of
/// largest magnitude, allow 1000 restarts, converge to `1e-10`, and hand the
/// results back algebraically largest first.
#[derive(Debug, Clone, Copy)]
pub struct ComputeOptions {
    /// Which part of the spectrum the iteration concentrates on.
    pub selection: SelectionRule,
    /// Maximum number of outer (restart) iterations.
    pub max_iterations: usize,
    /// Relative convergence tolerance for the Ritz residual bounds.
    pub tolerance: f64,
    /// Ordering of the final eigenvalues and eigenvectors.
    pub sorting: SortRule,
}

impl Default for ComputeOptions {
    fn default() -> Self {
        Self {
            selection: SelectionRule::LargestMagnitude,
            max_iterations: 1000,
            tolerance: 1e-10,
            sorting: SortRule::LargestAlgebraic,
        }
    }
}

/// Restarted Krylov-Schur eigensolver over an [`ArnoldiOperator`].
///
/// The solver owns its factorization and the exported eigenpairs and borrows
/// nothing: operators enter by value. Since [`StandardProblem`](crate::operator::StandardProblem)
/// and [`GeneralizedProblem`](crate::operator::GeneralizedProblem) themselves
/// borrow the underlying matrices, callers keep ownership of their (possibly
/// very large) data.
///
/// # Example
///
/// ```
/// use faer::Mat;
/// use krylov_schur::{ComputeOptions, KrylovSchurSolver, StandardProblem};
///
/// // diag(1, ..., 10): the three largest eigenvalues are 10, 9, 8.
/// let a = Mat::from_fn(10, 10, |i, j| if i == j { (i + 1) as f64 } else { 0.0 });
/// let problem = StandardProblem::new(&a).unwrap();
///
/// let mut solver = KrylovSchurSolver::new(problem, 3, 6).unwrap();
/// solver.init().unwrap();
/// let nconv = solver.compute(ComputeOptions::default()).unwrap();
///
/// assert_eq!(nconv, 3);
/// assert!((solver.eigenvalues()[0] - 10.0).abs() < 1e-8);
/// ```
pub struct KrylovSchurSolver<Op: ArnoldiOperator> {
    op: Op,
    /// Problem dimension.
    n: usize,
    /// Number of requested eigenpairs.
    nev: usize,
    /// Krylov subspace dimension.
    ncv: usize,
    /// Number of applications of `A`, accumulated across `compute` calls.
    nmatop: usize,
    /// Number of outer iterations, accumulated across `compute` calls.
    niter: usize,
    fac: KrylovFactorization,
    evals: Vec<f64>,
    evecs: Mat<f64>,
    conv: Vec<bool>,
    info: ComputationInfo,
    initialized: bool,
}

impl<Op: ArnoldiOperator> KrylovSchurSolver<Op> {
    /// Creates a solver for `nev` eigenpairs with a Krylov subspace of
    /// dimension `ncv`.
    ///
    /// Fails with `InvalidArgument` unless `1 <= nev <= n - 1` and
    /// `nev < ncv <= n`. Larger `ncv` means faster convergence per restart at
    /// the cost of `O(n * ncv)` memory and denser projected problems;
    /// `ncv >= 2 * nev` is a reasonable starting point.
    pub fn new(op: Op, nev: usize, ncv: usize) -> Result<Self, KrylovError> {
        let n = op.dim();
        if nev < 1 || nev + 1 > n {
            return Err(KrylovErrorKind::InvalidArgument(format!(
                "nev must satisfy 1 <= nev <= n - 1, n is the dimension of the operator ({n})"
            ))
            .into());
        }
        if ncv <= nev || ncv > n {
            return Err(KrylovErrorKind::InvalidArgument(format!(
                "ncv must satisfy nev < ncv <= n, n is the dimension of the operator ({n})"
            ))
            .into());
        }
        Ok(Self {
            fac: KrylovFactorization::new(n, ncv),
            op,
            n,
            nev,
            ncv,
            nmatop: 0,
            niter: 0,
            evals: Vec::new(),
            evecs: Mat::zeros(n, 0),
            conv: vec![false; nev],
            info: ComputationInfo::NotComputed,
            initialized: false,
        })
    }

    /// Initializes the solver with a user-supplied initial residual vector
    /// of length `n`, resetting the counters and the convergence state.
    pub fn init_with(&mut self, v0: MatRef<'_, f64>) -> Result<(), KrylovError> {
        self.fac.init(&self.op, v0)?;
        self.evals.clear();
        self.evecs = Mat::zeros(self.n, 0);
        self.conv = vec![false; self.nev];
        self.nmatop = 0;
        self.niter = 0;
        self.info = ComputationInfo::NotComputed;
        self.initialized = true;
        Ok(())
    }

    /// Initializes the solver with a random initial residual vector whose
    /// entries follow Uniform(-0.5, 0.5), drawn with a fixed seed so that
    /// repeated runs are bit-for-bit reproducible.
    pub fn init(&mut self) -> Result<(), KrylovError> {
        let mut rng = StdRng::seed_from_u64(0);
        let v0 = Mat::from_fn(self.n, 1, |_, _| rng.random::<f64>() - 0.5);
        self.init_with(v0.as_ref())
    }

    /// Runs the restarted iteration and returns the number of converged
    /// eigenpairs, at most `nev`.
    ///
    /// Breakdown and non-convergence are not errors (see [`info`](Self::info));
    /// the only error paths are calling this before `init`/`init_with` and a
    /// convergence failure inside the dense Schur kernel.
    pub fn compute(&mut self, options: ComputeOptions) -> Result<usize, KrylovError> {
        if !self.initialized {
            return Err(KrylovErrorKind::NotInitialized.into());
        }
        self.info = ComputationInfo::Running;

        let nev = self.nev;
        let ncv = self.ncv;
        let ComputeOptions {
            selection,
            max_iterations,
            tolerance,
            sorting,
        } = options;

        let mut nconv = 0usize;
        let mut performed = 0usize;
        let mut broke_down = false;

        // Spectral data of the most recent analysis step; the export after
        // the loop reads these.
        let mut d_ranked: Vec<Complex<f64>> = Vec::new();
        let mut ind: Vec<usize> = Vec::new();
        let mut u_re = Mat::<f64>::zeros(ncv, ncv);

        for iter in 0..max_iterations {
            performed = iter + 1;

            // 1. Grow the factorization back to full length.
            if self.fac.extend(&self.op, ncv, &mut self.nmatop) {
                broke_down = true;
                break;
            }

            // 2. Real Schur form of the projected matrix, eigen data of T,
            // and Schur vectors U = X * E.
            let (mut x, mut t) = real_schur(self.fac.projected())?;
            let (d, e_re, e_im) = eigen_from_schur(t.as_ref());
            let u_re_full = x.as_ref() * e_re.as_ref();
            let u_im_full = x.as_ref() * e_im.as_ref();

            // Implicit residual bounds |H[m, :] * U[:, j]|: the size of the
            // component each Ritz vector leaves outside the subspace.
            let res_re = self.fac.coupling_row() * u_re_full.as_ref();
            let res_im = self.fac.coupling_row() * u_im_full.as_ref();
            let res: Vec<f64> = (0..ncv)
                .map(|j| res_re.as_ref()[(0, j)].hypot(res_im.as_ref()[(0, j)]))
                .collect();

            // 3. Rank by the selection rule. The Ritz values and residuals
            // follow the ranking; U stays in block order until the export.
            ind = rank_ritz_values(&d, selection);
            d_ranked = ind.iter().map(|&j| d[j]).collect();
            let res_ranked: Vec<f64> = ind.iter().map(|&j| res[j]).collect();
            u_re = u_re_full;

            let nconv_prev = nconv;
            self.conv = count_converged(tolerance, &d_ranked, &res_ranked, nev);
            nconv = self.conv.iter().filter(|&&c| c).count();

            // 4. Done, or out of budget. No restart happens on the final
            // pass, so the export below reads the factorization this
            // analysis came from.
            if nconv >= nev || iter + 1 == max_iterations {
                break;
            }

            // 5. Restart. The target size adapts to the convergence history
            // and the selection vector is built from the raw diagonal of T
            // (the Ritz values up to the pairing of 2x2 blocks), whose
            // positions match the blocks ordschur moves.
            let mut nev_new = adjusted_nev(nev, ncv, nconv, nconv_prev);

            let diag: Vec<Complex<f64>> = (0..ncv)
                .map(|i| Complex::new(t.as_ref()[(i, i)], 0.0))
                .collect();
            let ind_sel = rank_ritz_values(&diag, selection);
            let mut select = vec![false; ncv];
            for &i in &ind_sel[..nev_new] {
                select[i] = true;
            }

            // Both members of a conjugate pair must move together, so a
            // selected index drags its partner in.
            for i in 0..ncv {
                if !select[i] {
                    continue;
                }
                if i + 1 < ncv && t.as_ref()[(i + 1, i)] != 0.0 && !select[i + 1] {
                    select[i + 1] = true;
                    nev_new += 1;
                }
                if i > 0 && t.as_ref()[(i, i - 1)] != 0.0 && !select[i - 1] {
                    select[i - 1] = true;
                    nev_new += 1;
                }
            }

            // 6. Reorder and truncate.
            ordschur(&mut x, &mut t, &select);
            self.fac
                .restart(x.as_ref().get(.., 0..nev_new), t.as_ref(), nev_new);
        }

        self.niter += performed;

        if broke_down {
            // The Krylov subspace is exactly invariant: the start vector has
            // no components left to explore. Report success with zero
            // eigenpairs rather than an error.
            self.evals.clear();
            self.evecs = Mat::zeros(self.n, 0);
            self.conv = vec![false; nev];
            self.info = ComputationInfo::Successful;
            return Ok(0);
        }

        // Export the prefix of the ranked Ritz values: eigenvalues are real
        // parts, eigenvectors the real part of V * U under the same ranking.
        let n_out = nev.min(nconv);
        let raw_evals: Vec<f64> = (0..n_out).map(|l| d_ranked[l].re).collect();
        let mut raw_evecs = Mat::<f64>::zeros(self.n, n_out);
        for l in 0..n_out {
            let col = ind[l];
            let vec = self.fac.basis() * u_re.as_ref().get(.., col..col + 1);
            raw_evecs.as_mut().get_mut(.., l..l + 1).copy_from(&vec);
        }

        // Hand the results back in the caller's requested order.
        let order = rank_exported(&raw_evals, sorting);
        self.evals = order.iter().map(|&l| raw_evals[l]).collect();
        let mut sorted_evecs = Mat::<f64>::zeros(self.n, n_out);
        for (pos, &l) in order.iter().enumerate() {
            sorted_evecs
                .as_mut()
                .get_mut(.., pos..pos + 1)
                .copy_from(raw_evecs.as_ref().get(.., l..l + 1));
        }
        self.evecs = sorted_evecs;

        self.info = if nconv >= nev {
            ComputationInfo::Successful
        } else {
            ComputationInfo::NotConverging
        };
        Ok(n_out)
    }

    /// Returns the status of the computation.
    pub fn info(&self) -> ComputationInfo {
        self.info
    }

    /// Returns the number of outer (restart) iterations used so far. The
    /// counter accumulates across `compute` calls and is reset by `init`.
    pub fn num_iterations(&self) -> usize {
        self.niter
    }

    /// Returns the number of applications of the operator `A` so far. The
    /// counter accumulates across `compute` calls and is reset by `init`.
    pub fn num_operations(&self) -> usize {
        self.nmatop
    }

    /// Returns the converged eigenvalues (real parts), ordered by the sort
    /// rule of the last `compute` call. The slice has one entry per
    /// converged pair, at most `nev`.
    pub fn eigenvalues(&self) -> &[f64] {
        &self.evals
    }

    /// Returns the eigenvectors associated with the converged eigenvalues,
    /// one column per eigenvalue in [`eigenvalues`](Self::eigenvalues) order,
    /// truncated to at most `nvec` columns.
    pub fn eigenvectors(&self, nvec: usize) -> Mat<f64> {
        let take = nvec.min(self.evals.len());
        self.evecs.as_ref().get(.., 0..take).to_owned()
    }

    /// Returns all converged eigenvectors.
    pub fn eigenvectors_all(&self) -> Mat<f64> {
        self.eigenvectors(self.nev)
    }
}

/// Per-value convergence flags over the `nev` wanted (ranked) Ritz values:
/// a value counts as converged when its residual bound falls below
/// `tol * max(eps^(2/3), |theta|)`. The `eps^(2/3)` floor keeps the
/// threshold away from zero for Ritz values near the origin.
fn count_converged(tol: f64, d: &[Complex<f64>], res: &[f64], nev: usize) -> Vec<bool> {
    let eps23 = f64::EPSILON.powf(2.0 / 3.0);
    (0..nev)
        .map(|j| res[j] < tol * d[j].norm().max(eps23))
        .collect()
}

/// The restart size for the next iteration: keep the wanted `nev` plus up to
/// half of the unwanted space worth of converged values, promote a
/// degenerate size of one to `ncv / 2`, and grow by one when convergence
/// regressed (the classical anti-stagnation adjustments of the ARPACK
/// lineage).
fn adjusted_nev(nev: usize, ncv: usize, nconv: usize, nconv_prev: usize) -> usize {
    let mut nev_new = nev + nconv.min((ncv - nev) / 2);
    if nev_new == 1 && ncv > 3 {
        nev_new = ncv / 2;
    }
    if nev_new + 1 < ncv && nconv_prev > nconv {
        nev_new += 1;
    }
    nev_new
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::StandardProblem;

    fn diag_matrix(n: usize) -> Mat<f64> {
        Mat::from_fn(n, n, |i, j| if i == j { (i + 1) as f64 } else { 0.0 })
    }

    #[test]
    fn test_count_converged_thresholds() {
        let tol = 1e-10;
        let d = vec![
            Complex::new(10.0, 0.0),
            Complex::new(1.0, 0.0),
            Complex::new(0.0, 0.0),
        ];
        // First residual just below threshold, second just above, third
        // tests the eps^(2/3) floor at the origin.
        let eps23 = f64::EPSILON.powf(2.0 / 3.0);
        let res = vec![0.5e-9, 2e-10, tol * eps23 * 0.5];
        let flags = count_converged(tol, &d, &res, 3);
        assert_eq!(flags, vec![true, false, true]);
        // Only the wanted prefix is examined.
        assert_eq!(count_converged(tol, &d, &res, 2).len(), 2);
    }

    #[test]
    fn test_adjusted_nev_rules() {
        // Base rule: nev + min(nconv, (ncv - nev) / 2).
        assert_eq!(adjusted_nev(4, 12, 2, 0), 6);
        assert_eq!(adjusted_nev(4, 12, 10, 0), 8);
        // Degenerate size of one is promoted to ncv / 2.
        assert_eq!(adjusted_nev(1, 6, 0, 0), 3);
        // The promotion does not apply to tiny subspaces.
        assert_eq!(adjusted_nev(1, 3, 0, 0), 1);
        // Stagnation (lost converged values) grows the restart by one.
        assert_eq!(adjusted_nev(4, 12, 1, 3), 6);
        // ... unless that would fill the whole subspace.
        assert_eq!(adjusted_nev(4, 5, 0, 2), 4);
    }

    #[test]
    fn test_construction_validation() {
        let a = diag_matrix(10);
        let problem = StandardProblem::new(&a).unwrap();
        assert!(KrylovSchurSolver::new(problem, 0, 5).is_err());

        let problem = StandardProblem::new(&a).unwrap();
        assert!(KrylovSchurSolver::new(problem, 10, 10).is_err());

        let problem = StandardProblem::new(&a).unwrap();
        assert!(KrylovSchurSolver::new(problem, 3, 3).is_err());

        let problem = StandardProblem::new(&a).unwrap();
        assert!(KrylovSchurSolver::new(problem, 3, 11).is_err());

        let problem = StandardProblem::new(&a).unwrap();
        assert!(KrylovSchurSolver::new(problem, 3, 6).is_ok());
    }

    #[test]
    fn test_compute_before_init_is_an_error() {
        let a = diag_matrix(8);
        let problem = StandardProblem::new(&a).unwrap();
        let mut solver = KrylovSchurSolver::new(problem, 2, 5).unwrap();
        assert!(solver.compute(ComputeOptions::default()).is_err());
        assert_eq!(solver.info(), ComputationInfo::NotComputed);
    }

    #[test]
    fn test_small_diagonal_problem_end_to_end() -> Result<(), KrylovError> {
        let a = diag_matrix(6);
        let problem = StandardProblem::new(&a)?;
        let mut solver = KrylovSchurSolver::new(problem, 2, 4)?;
        solver.init()?;
        let nconv = solver.compute(ComputeOptions::default())?;

        assert_eq!(nconv, 2);
        assert_eq!(solver.info(), ComputationInfo::Successful);
        let evals = solver.eigenvalues();
        assert!((evals[0] - 6.0).abs() < 1e-8);
        assert!((evals[1] - 5.0).abs() < 1e-8);
        assert!(solver.num_iterations() >= 1);
        assert!(solver.num_operations() >= 4);
        Ok(())
    }
}
