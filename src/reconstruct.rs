// src/reconstruct.rs

use log::{debug, info, warn};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;

use crate::config::{AppConfig, DegeneratePolicy, SolverConfig};
use crate::error::{Result, SvdImageError};
use crate::linalg_backends::{BackendQR, BackendSVD, LinAlgBackendProvider};
use crate::truncated_svd::TruncatedSvd;
use crate::types::{Decomposition, IntensityMatrix, ReconstructedMatrix};

/// Total variance below this is treated as a constant image.
const ZERO_VARIANCE_THRESHOLD: f64 = 1e-12;
/// Relative span below which a reconstruction counts as constant.
const DEGENERATE_SPAN_TOLERANCE: f64 = 1e-9;
const MID_GRAY: u8 = 128;

/// Builds the best rank-k approximation of an image and rescales it for
/// display.
#[derive(Debug, Clone)]
pub struct RankKReconstructor<B = LinAlgBackendProvider> {
    svd: TruncatedSvd<B>,
    degenerate_policy: DegeneratePolicy,
}

impl RankKReconstructor<LinAlgBackendProvider> {
    pub fn new(solver: SolverConfig, degenerate_policy: DegeneratePolicy) -> Self {
        Self {
            svd: TruncatedSvd::new(solver),
            degenerate_policy,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.solver.clone(), config.degenerate_policy)
    }
}

impl Default for RankKReconstructor<LinAlgBackendProvider> {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl<B: BackendSVD + BackendQR> RankKReconstructor<B> {
    pub fn with_svd(svd: TruncatedSvd<B>, degenerate_policy: DegeneratePolicy) -> Self {
        Self {
            svd,
            degenerate_policy,
        }
    }

    /// Reconstructs `matrix` from its top `k` singular components.
    ///
    /// Color input is averaged to one channel first. The returned
    /// decomposition carries the explained-variance ratios so callers never
    /// need to refit.
    ///
    /// # Errors
    /// - `InvalidInput` if the matrix is empty or has non-finite values.
    /// - `InvalidRank` if `k` is not in `1..=min(height, width)`.
    /// - `DegenerateInput` if the reconstruction is constant and the policy is
    ///   `Reject`.
    /// - `Linalg` if the factorization fails.
    pub fn reconstruct(
        &self,
        matrix: &IntensityMatrix,
        k: usize,
    ) -> Result<(ReconstructedMatrix, Decomposition)> {
        matrix.validate()?;
        let max_rank = matrix.max_rank();
        if k == 0 || k > max_rank {
            return Err(SvdImageError::InvalidRank { k, max: max_rank });
        }

        let gray = matrix.to_grayscale()?;
        let decomposition = self.decompose(&gray, k)?;
        let pixels = rescale_to_u8(&decomposition.approximation(), self.degenerate_policy)?;
        Ok((ReconstructedMatrix { pixels }, decomposition))
    }

    /// Reconstructs the same source at several ranks in parallel.
    ///
    /// Results are returned in the order of `ranks`; each entry fails or
    /// succeeds independently.
    pub fn reconstruct_many(
        &self,
        matrix: &IntensityMatrix,
        ranks: &[usize],
    ) -> Vec<Result<(ReconstructedMatrix, Decomposition)>>
    where
        B: Sync,
    {
        info!("Reconstructing {} ranks in parallel", ranks.len());
        ranks
            .par_iter()
            .map(|&k| self.reconstruct(matrix, k))
            .collect()
    }

    fn decompose(&self, gray: &Array2<f64>, k: usize) -> Result<Decomposition> {
        let svd = self.svd.fit(gray.view(), k)?;

        // U·Σ, broadcasting the singular values over rows.
        let left_factor = &svd.u * &svd.s;
        let explained_variance = left_factor.var_axis(Axis(0), 0.0);
        let total_variance = gray.var_axis(Axis(0), 0.0).sum();
        let explained_variance_ratio = if total_variance > ZERO_VARIANCE_THRESHOLD {
            &explained_variance / total_variance
        } else {
            warn!("Source image has zero variance; explained-variance ratios set to 0");
            Array1::zeros(k)
        };
        debug!(
            "Decomposition: left factor {:?}, components {:?}, ratio sum {:.6}",
            left_factor.dim(),
            svd.vt.dim(),
            explained_variance_ratio.sum()
        );

        Ok(Decomposition {
            left_factor,
            components: svd.vt,
            singular_values: svd.s,
            explained_variance,
            explained_variance_ratio,
        })
    }
}

/// Min-max rescales `approximation` to [0, 255] and truncates to u8.
///
/// A constant matrix has no span to divide by; `policy` decides the output.
pub fn rescale_to_u8(approximation: &Array2<f64>, policy: DegeneratePolicy) -> Result<Array2<u8>> {
    let min = approximation.iter().copied().fold(f64::INFINITY, f64::min);
    let max = approximation.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return Err(SvdImageError::InvalidInput(
            "reconstruction is empty or non-finite".into(),
        ));
    }

    let span = max - min;
    let scale_reference = 1.0_f64.max(min.abs()).max(max.abs());
    if span <= DEGENERATE_SPAN_TOLERANCE * scale_reference {
        warn!(
            "Reconstruction is constant (min={}, max={}); applying {:?} policy",
            min, max, policy
        );
        return match policy {
            DegeneratePolicy::MidGray => Ok(Array2::from_elem(approximation.dim(), MID_GRAY)),
            DegeneratePolicy::Black => Ok(Array2::zeros(approximation.dim())),
            DegeneratePolicy::Reject => Err(SvdImageError::DegenerateInput),
        };
    }

    Ok(approximation.mapv(|v| ((v - min) / span * 255.0).clamp(0.0, 255.0) as u8))
}
