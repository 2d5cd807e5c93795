use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, Axis};

use crate::data::model::CurveMatrix;
use crate::error::CurveError;

/// Principal component projection with a frozen basis.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Column means of the reference matrix.
    pub mean: Array1<f64>,
    /// One unit-norm basis vector per row, highest variance first.
    pub components: Array2<f64>,
    pub explained_variance: Array1<f64>,
    pub explained_variance_ratio: Array1<f64>,
}

impl Projection {
    /// Fit `k` components on `reference`.
    ///
    /// Eigendecomposition of the sample covariance. Each component's sign is
    /// fixed so its largest-magnitude loading is positive, which keeps the
    /// output stable across runs.
    pub fn fit(reference: &CurveMatrix, k: usize) -> Result<Self, CurveError> {
        let n = reference.nrows();
        let d = reference.ncols();
        if n < 2 {
            return Err(CurveError::InsufficientPoints { found: n });
        }
        if k == 0 || k > d.min(n) {
            return Err(CurveError::ShapeMismatch {
                expected: d.min(n),
                found: k,
            });
        }

        let mean = reference
            .values
            .mean_axis(Axis(0))
            .ok_or(CurveError::InsufficientPoints { found: 0 })?;
        let centered = &reference.values - &mean;
        let cov = centered.t().dot(&centered) / (n - 1) as f64;

        let eig = SymmetricEigen::new(DMatrix::from_fn(d, d, |i, j| cov[[i, j]]));
        let mut order: Vec<usize> = (0..d).collect();
        order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

        let total: f64 = eig.eigenvalues.iter().map(|v| v.max(0.0)).sum();
        let mut components = Array2::zeros((k, d));
        let mut explained_variance = Array1::zeros(k);
        for (row, &idx) in order.iter().take(k).enumerate() {
            let vec = eig.eigenvectors.column(idx);
            let pivot = vec
                .iter()
                .copied()
                .max_by(|a, b| a.abs().total_cmp(&b.abs()))
                .unwrap_or(1.0);
            let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
            for (j, v) in vec.iter().enumerate() {
                components[[row, j]] = sign * v;
            }
            explained_variance[row] = eig.eigenvalues[idx].max(0.0);
        }
        let explained_variance_ratio = if total > 0.0 {
            &explained_variance / total
        } else {
            Array1::zeros(k)
        };

        Ok(Projection {
            mean,
            components,
            explained_variance,
            explained_variance_ratio,
        })
    }

    /// Project `matrix` onto the frozen basis.
    pub fn apply(&self, matrix: &CurveMatrix) -> Result<CurveMatrix, CurveError> {
        matrix.check_width(self.mean.len())?;
        let values = (&matrix.values - &self.mean).dot(&self.components.t());
        Ok(CurveMatrix {
            names: matrix.names.clone(),
            values,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn matrix(values: Array2<f64>) -> CurveMatrix {
        let names = (0..values.nrows()).map(|i| format!("S{i}")).collect();
        CurveMatrix::with_names(names, values).unwrap()
    }

    fn sample() -> CurveMatrix {
        matrix(array![
            [2.5, 2.4, 0.5],
            [0.5, 0.7, 1.1],
            [2.2, 2.9, 0.3],
            [1.9, 2.2, 0.9],
            [3.1, 3.0, 0.2],
            [2.3, 2.7, 0.6],
            [2.0, 1.6, 1.4],
            [1.0, 1.1, 1.3],
        ])
    }

    #[test]
    fn basis_is_orthonormal() {
        let p = Projection::fit(&sample(), 2).unwrap();
        let c = &p.components;
        assert!((c.row(0).dot(&c.row(0)) - 1.0).abs() < 1e-9);
        assert!((c.row(1).dot(&c.row(1)) - 1.0).abs() < 1e-9);
        assert!(c.row(0).dot(&c.row(1)).abs() < 1e-9);
    }

    #[test]
    fn components_ranked_by_variance() {
        let p = Projection::fit(&sample(), 3).unwrap();
        let ev = &p.explained_variance;
        assert!(ev[0] >= ev[1] && ev[1] >= ev[2]);
        assert!((p.explained_variance_ratio.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn projected_variance_matches_eigenvalues() {
        let m = sample();
        let p = Projection::fit(&m, 2).unwrap();
        let z = p.apply(&m).unwrap();
        assert_eq!(z.ncols(), 2);
        assert_eq!(z.names, m.names);
        for i in 0..2 {
            let col = z.values.column(i);
            assert!(col.mean().unwrap().abs() < 1e-9);
            assert!((col.var(1.0) - p.explained_variance[i]).abs() < 1e-9);
        }
    }

    #[test]
    fn line_data_has_one_dominant_component() {
        let m = matrix(array![[0.0, 0.0], [1.0, 2.0], [2.0, 4.0], [3.0, 6.0]]);
        let p = Projection::fit(&m, 1).unwrap();
        assert!((p.explained_variance_ratio[0] - 1.0).abs() < 1e-9);
        let expected = [1.0 / 5f64.sqrt(), 2.0 / 5f64.sqrt()];
        assert!((p.components[[0, 0]] - expected[0]).abs() < 1e-9);
        assert!((p.components[[0, 1]] - expected[1]).abs() < 1e-9);
    }

    #[test]
    fn frozen_basis_rejects_other_widths() {
        let p = Projection::fit(&sample(), 2).unwrap();
        let err = p.apply(&matrix(array![[1.0, 2.0]]));
        assert!(matches!(err, Err(CurveError::ShapeMismatch { .. })));
    }

    #[test]
    fn too_few_rows() {
        let err = Projection::fit(&matrix(array![[1.0, 2.0]]), 1);
        assert!(matches!(err, Err(CurveError::InsufficientPoints { found: 1 })));
    }
}
