use anyhow::{Context, Result};
use ndarray::prelude::*;
use ndarray_linalg::{Eigh, UPLO};

/// Fitting coefficients M with M M^T = J^-1 for the symmetric, positive semi-definite
/// metric J. Only the eigenvectors with eigenvalues of at least `condition` times the largest
/// eigenvalue are kept, so M has the shape naux x n_kept. Returns M and the number of
/// discarded eigenvalues and the largest eigenvalue.
pub fn inverse_sqrt_metric(
    metric: ArrayView2<f64>,
    condition: f64,
) -> Result<(Array2<f64>, usize, f64)> {
    let naux: usize = metric.nrows();
    let (eigenvalues, eigenvectors): (Array1<f64>, Array2<f64>) = metric
        .eigh(UPLO::Upper)
        .context("Diagonalization of the auxiliary metric failed")?;
    let lambda_max: f64 = eigenvalues.iter().cloned().fold(0.0, f64::max);
    let threshold: f64 = condition * lambda_max;

    let kept: Vec<usize> = eigenvalues
        .iter()
        .enumerate()
        .filter(|(_, lambda)| lambda_max > 0.0 && **lambda >= threshold && **lambda > 0.0)
        .map(|(idx, _)| idx)
        .collect();

    let mut m: Array2<f64> = eigenvectors.select(Axis(1), &kept);
    for (mut column, idx) in m.axis_iter_mut(Axis(1)).zip(kept.iter()) {
        column /= eigenvalues[*idx].sqrt();
    }
    Ok((m, naux - kept.len(), lambda_max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::AbsDiffEq;

    #[test]
    fn inverse_of_well_conditioned_metric() {
        let metric: Array2<f64> = arr2(&[[2.0, 0.5, 0.1], [0.5, 1.5, 0.2], [0.1, 0.2, 1.0]]);
        let (m, n_discarded, _) = inverse_sqrt_metric(metric.view(), 1.0e-12).unwrap();
        assert_eq!(n_discarded, 0);
        let identity: Array2<f64> = m.dot(&m.t()).dot(&metric);
        assert!(identity.abs_diff_eq(&Array2::eye(3), 1.0e-12));
    }

    #[test]
    fn singular_metric_is_truncated() {
        // rank one metric v v^T
        let v: Array1<f64> = arr1(&[1.0, 2.0, 2.0]);
        let metric: Array2<f64> = v
            .view()
            .insert_axis(Axis(1))
            .dot(&v.view().insert_axis(Axis(0)));
        let (m, n_discarded, lambda_max) = inverse_sqrt_metric(metric.view(), 1.0e-10).unwrap();
        assert_eq!(n_discarded, 2);
        assert_eq!(m.dim(), (3, 1));
        assert!((lambda_max - 9.0).abs() < 1.0e-12);

        let zero: Array2<f64> = Array2::zeros([2, 2]);
        let (m, n_discarded, _) = inverse_sqrt_metric(zero.view(), 1.0e-10).unwrap();
        assert_eq!(n_discarded, 2);
        assert_eq!(m.ncols(), 0);
    }
}
