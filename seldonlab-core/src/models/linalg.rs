//! Dense linear solve for the small normal-equation systems the base models fit.

use super::ModelError;

/// Solve `a · x = b` by Gaussian elimination with partial pivoting.
///
/// `a` is row-major `n × n`; both inputs are consumed as scratch space.
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, ModelError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(ModelError::Singular);
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// `[1, x_1, …, x_d]`: the design row with an intercept column.
pub fn design_row(x: &[f64]) -> Vec<f64> {
    let mut row = Vec::with_capacity(x.len() + 1);
    row.push(1.0);
    row.extend_from_slice(x);
    row
}

/// θ₀ + Σ θⱼ xⱼ.
pub fn affine(theta: &[f64], x: &[f64]) -> f64 {
    theta[0] + theta[1..].iter().zip(x).map(|(t, v)| t * v).sum::<f64>()
}
