// analysis/linalg.rs

//! Dense Cholesky factor/solve for the small symmetric positive-definite
//! systems the linear models produce (normal equations, IRLS steps). The
//! matrices here are p x p with p in the tens, so a direct O(p^3) factor is
//! the right tool.

use ndarray::{Array1, Array2};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinalgError {
    #[error(
        "Matrix is not positive definite (pivot {0} is not positive); the system cannot be \
         solved by Cholesky factorization."
    )]
    NotPositiveDefinite(usize),
    #[error("Dimension mismatch: matrix is {rows}x{cols}, right-hand side has length {rhs}.")]
    DimensionMismatch { rows: usize, cols: usize, rhs: usize },
}

/// Solves `a * x = b` for symmetric positive-definite `a`.
pub fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, LinalgError> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(LinalgError::DimensionMismatch {
            rows: a.nrows(),
            cols: a.ncols(),
            rhs: b.len(),
        });
    }

    // Lower-triangular factor, in place over a copy.
    let mut l = a.clone();
    for j in 0..n {
        let mut diagonal = l[[j, j]];
        for k in 0..j {
            diagonal -= l[[j, k]] * l[[j, k]];
        }
        if diagonal <= 0.0 || !diagonal.is_finite() {
            return Err(LinalgError::NotPositiveDefinite(j));
        }
        let pivot = diagonal.sqrt();
        l[[j, j]] = pivot;
        for i in (j + 1)..n {
            let mut value = l[[i, j]];
            for k in 0..j {
                value -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = value / pivot;
        }
    }

    // Forward substitution: L y = b.
    let mut y = b.clone();
    for i in 0..n {
        for k in 0..i {
            let subtract = l[[i, k]] * y[k];
            y[i] -= subtract;
        }
        y[i] /= l[[i, i]];
    }

    // Back substitution: L^T x = y.
    let mut x = y;
    for i in (0..n).rev() {
        for k in (i + 1)..n {
            let subtract = l[[k, i]] * x[k];
            x[i] -= subtract;
        }
        x[i] /= l[[i, i]];
    }
    Ok(x)
}
