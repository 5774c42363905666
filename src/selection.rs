//! Selection and sorting rules for Ritz values.
//!
//! The iteration uses two independent orderings. The *selection* rule decides
//! which part of the spectrum the restarts concentrate on and which Ritz
//! values count as "wanted" for convergence; it ranks the complex Ritz values
//! of the projected matrix. The *sort* rule only orders the final, real
//! eigenvalues handed back to the caller.

use num_complex::Complex;

/// Ranks Ritz values during the iteration: which eigenvalues of the full
/// spectrum the solver hunts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionRule {
    /// Largest modulus first.
    LargestMagnitude,
    /// Smallest modulus first.
    SmallestMagnitude,
    /// Largest real part first.
    LargestReal,
    /// Smallest real part first.
    SmallestReal,
    /// Largest imaginary part first.
    LargestImaginary,
    /// Smallest imaginary part first.
    SmallestImaginary,
}

/// Orders the converged eigenvalues (and their eigenvectors) in the final
/// output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortRule {
    /// Algebraically largest first.
    LargestAlgebraic,
    /// Algebraically smallest first.
    SmallestAlgebraic,
    /// Largest modulus first.
    LargestMagnitude,
    /// Smallest modulus first.
    SmallestMagnitude,
}

/// Returns the permutation that ranks `values` under `rule`.
///
/// The sort is stable: ties keep their original relative order, so the
/// permutation is deterministic for repeated runs.
pub(crate) fn rank_ritz_values(values: &[Complex<f64>], rule: SelectionRule) -> Vec<usize> {
    let mut ind: Vec<usize> = (0..values.len()).collect();
    match rule {
        SelectionRule::LargestMagnitude => {
            ind.sort_by(|&a, &b| values[b].norm().total_cmp(&values[a].norm()));
        }
        SelectionRule::SmallestMagnitude => {
            ind.sort_by(|&a, &b| values[a].norm().total_cmp(&values[b].norm()));
        }
        SelectionRule::LargestReal => {
            ind.sort_by(|&a, &b| values[b].re.total_cmp(&values[a].re));
        }
        SelectionRule::SmallestReal => {
            ind.sort_by(|&a, &b| values[a].re.total_cmp(&values[b].re));
        }
        SelectionRule::LargestImaginary => {
            ind.sort_by(|&a, &b| values[b].im.total_cmp(&values[a].im));
        }
        SelectionRule::SmallestImaginary => {
            ind.sort_by(|&a, &b| values[a].im.total_cmp(&values[b].im));
        }
    }
    ind
}

/// Returns the permutation that orders the exported real eigenvalues under
/// `rule`. Stable, like [`rank_ritz_values`].
pub(crate) fn rank_exported(values: &[f64], rule: SortRule) -> Vec<usize> {
    let mut ind: Vec<usize> = (0..values.len()).collect();
    match rule {
        SortRule::LargestAlgebraic => {
            ind.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
        }
        SortRule::SmallestAlgebraic => {
            ind.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        }
        SortRule::LargestMagnitude => {
            ind.sort_by(|&a, &b| values[b].abs().total_cmp(&values[a].abs()));
        }
        SortRule::SmallestMagnitude => {
            ind.sort_by(|&a, &b| values[a].abs().total_cmp(&values[b].abs()));
        }
    }
    ind
}
