// src/truncated_svd.rs

use log::{debug, info};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::Normal;
use std::time::Instant;

use crate::config::{SolverConfig, SvdAlgorithm};
use crate::error::{Result, SvdImageError};
use crate::linalg_backends::{BackendQR, BackendSVD, LinAlgBackendProvider};

/// Top-k singular triplets of a matrix.
#[derive(Debug, Clone)]
pub struct TruncatedSvdOutput {
    /// Left singular vectors, shape (n_rows, k).
    pub u: Array2<f64>,
    /// Singular values in descending order, length k.
    pub s: Array1<f64>,
    /// Right singular vectors as rows, shape (k, n_cols).
    pub vt: Array2<f64>,
}

/// Truncated SVD solver over a pluggable linear algebra backend.
///
/// Signs are normalized so that the largest-magnitude entry of every row of
/// `vt` is positive; the matching column of `u` is flipped with it. This makes
/// the exact and randomized paths produce comparable factors.
#[derive(Debug, Clone)]
pub struct TruncatedSvd<B = LinAlgBackendProvider> {
    config: SolverConfig,
    backend: B,
}

impl TruncatedSvd<LinAlgBackendProvider> {
    pub fn new(config: SolverConfig) -> Self {
        Self::with_backend(config, LinAlgBackendProvider::new())
    }
}

impl<B: BackendSVD + BackendQR> TruncatedSvd<B> {
    pub fn with_backend(config: SolverConfig, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Computes the top `k` singular triplets of `matrix`.
    ///
    /// # Errors
    /// `InvalidInput` for an empty matrix, `InvalidRank` when `k` is not in
    /// `1..=min(n_rows, n_cols)`, `Linalg` when a factorization fails.
    pub fn fit(&self, matrix: ArrayView2<f64>, k: usize) -> Result<TruncatedSvdOutput> {
        let (n_rows, n_cols) = matrix.dim();
        if n_rows == 0 || n_cols == 0 {
            return Err(SvdImageError::InvalidInput(format!(
                "cannot decompose a {}x{} matrix",
                n_rows, n_cols
            )));
        }
        let max_rank = n_rows.min(n_cols);
        if k == 0 || k > max_rank {
            return Err(SvdImageError::InvalidRank { k, max: max_rank });
        }

        let start = Instant::now();
        let mut output = match self.config.algorithm {
            SvdAlgorithm::Exact => self.fit_exact(matrix, k)?,
            SvdAlgorithm::Randomized => self.fit_randomized(matrix, k)?,
        };
        flip_signs(&mut output);
        info!(
            "Truncated SVD ({:?}) of {}x{} matrix to rank {} in {:?}",
            self.config.algorithm,
            n_rows,
            n_cols,
            k,
            start.elapsed()
        );
        Ok(output)
    }

    fn fit_exact(&self, matrix: ArrayView2<f64>, k: usize) -> Result<TruncatedSvdOutput> {
        let svd = self
            .backend
            .svd_into(matrix.to_owned(), true, true)
            .map_err(|e| SvdImageError::Linalg(format!("dense SVD failed: {}", e)))?;
        let u = svd
            .u
            .ok_or_else(|| SvdImageError::Linalg("dense SVD did not return U".into()))?;
        let vt = svd
            .vt
            .ok_or_else(|| SvdImageError::Linalg("dense SVD did not return V^T".into()))?;
        take_leading(&u, &svd.s, &vt, k)
    }

    fn fit_randomized(&self, matrix: ArrayView2<f64>, k: usize) -> Result<TruncatedSvdOutput> {
        let (n_rows, n_cols) = matrix.dim();
        let max_rank = n_rows.min(n_cols);

        // Sketch width l = k + p, never wider than the matrix allows.
        let sketch_width = (k + self.config.n_oversamples).min(max_rank).max(k);
        debug!(
            "Randomized SVD: k={}, sketch width={}, power iterations={}",
            k, sketch_width, self.config.n_iter
        );

        let mut rng = match self.config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| SvdImageError::Linalg(format!("failed to build normal distribution: {}", e)))?;

        if n_cols <= n_rows {
            // Tall or square: sketch the column space of M directly.
            let omega = Array2::from_shape_fn((n_cols, sketch_width), |_| rng.sample(normal));
            let mut q_basis = self.orthonormalize(matrix.dot(&omega), "initial sketch of M")?;
            for i in 0..self.config.n_iter {
                let w_basis = self.orthonormalize(matrix.t().dot(&q_basis), "power iteration on M^T")?;
                q_basis = self.orthonormalize(matrix.dot(&w_basis), "power iteration on M")?;
                debug!("Power iteration {} complete, basis shape {:?}", i, q_basis.dim());
            }

            // B = Q^T M is small (l x n_cols); its SVD lifts back through Q.
            let b_projected = q_basis.t().dot(&matrix);
            let svd = self
                .backend
                .svd_into(b_projected, true, true)
                .map_err(|e| SvdImageError::Linalg(format!("SVD of projected sketch failed: {}", e)))?;
            let u_b = svd
                .u
                .ok_or_else(|| SvdImageError::Linalg("sketch SVD did not return U".into()))?;
            let vt_b = svd
                .vt
                .ok_or_else(|| SvdImageError::Linalg("sketch SVD did not return V^T".into()))?;
            let u = q_basis.dot(&u_b);
            take_leading(&u, &svd.s, &vt_b, k)
        } else {
            // Wide: sketch the row space through M^T so the basis lives in the
            // smaller dimension.
            let omega = Array2::from_shape_fn((n_rows, sketch_width), |_| rng.sample(normal));
            let mut q_basis = self.orthonormalize(matrix.t().dot(&omega), "initial sketch of M^T")?;
            for i in 0..self.config.n_iter {
                let w_basis = self.orthonormalize(matrix.dot(&q_basis), "power iteration on M")?;
                q_basis = self.orthonormalize(matrix.t().dot(&w_basis), "power iteration on M^T")?;
                debug!("Power iteration {} complete, basis shape {:?}", i, q_basis.dim());
            }

            // M ≈ (M Q) Q^T; the SVD of M Q (n_rows x l) gives U and Σ, and
            // V^T = V_small^T Q^T.
            let mq = matrix.dot(&q_basis);
            let svd = self
                .backend
                .svd_into(mq, true, true)
                .map_err(|e| SvdImageError::Linalg(format!("SVD of projected sketch failed: {}", e)))?;
            let u = svd
                .u
                .ok_or_else(|| SvdImageError::Linalg("sketch SVD did not return U".into()))?;
            let vt_small = svd
                .vt
                .ok_or_else(|| SvdImageError::Linalg("sketch SVD did not return V^T".into()))?;
            let vt = vt_small.dot(&q_basis.t());
            take_leading(&u, &svd.s, &vt, k)
        }
    }

    fn orthonormalize(&self, sketch: Array2<f64>, stage: &str) -> Result<Array2<f64>> {
        if sketch.ncols() == 0 {
            return Err(SvdImageError::Linalg(format!("{} has zero columns", stage)));
        }
        self.backend
            .qr_q_factor(&sketch)
            .map_err(|e| SvdImageError::Linalg(format!("QR decomposition of {} failed: {}", stage, e)))
    }
}

fn take_leading(
    u: &Array2<f64>,
    s_values: &Array1<f64>,
    vt: &Array2<f64>,
    k: usize,
) -> Result<TruncatedSvdOutput> {
    if u.ncols() < k || s_values.len() < k || vt.nrows() < k {
        return Err(SvdImageError::Linalg(format!(
            "SVD returned fewer than {} components (u: {:?}, s: {}, vt: {:?})",
            k,
            u.dim(),
            s_values.len(),
            vt.dim()
        )));
    }
    Ok(TruncatedSvdOutput {
        u: u.slice(s![.., ..k]).to_owned(),
        s: s_values.slice(s![..k]).to_owned(),
        vt: vt.slice(s![..k, ..]).to_owned(),
    })
}

fn flip_signs(output: &mut TruncatedSvdOutput) {
    for (i, mut row) in output.vt.axis_iter_mut(Axis(0)).enumerate() {
        let pivot = row
            .iter()
            .copied()
            .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
        if pivot < 0.0 {
            row.mapv_inplace(|v| -v);
            output.u.column_mut(i).mapv_inplace(|v| -v);
        }
    }
}
