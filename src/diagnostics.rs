// src/diagnostics.rs

use ndarray::ArrayView2;
use serde::Serialize;

/// Quality figures for one rank-k reconstruction.
#[derive(Debug, Clone, Serialize)]
pub struct ReconstructionSummary {
    pub height: usize,
    pub width: usize,
    pub rank: usize,
    /// ||A - A_k||_F / ||A||_F on the unscaled approximation.
    pub relative_error: f64,
    /// Storage of the rank-k factors relative to the dense image.
    pub storage_ratio: f64,
    pub cumulative_variance: f64,
}

/// Computes Frobenius norm for an f64 matrix.
pub fn frobenius_norm(matrix: &ArrayView2<f64>) -> f64 {
    if matrix.is_empty() {
        return 0.0;
    }
    matrix.iter().map(|&x| x * x).sum::<f64>().sqrt()
}

/// ||original - approximation||_F / ||original||_F.
///
/// Returns `None` on shape mismatch or empty input. A zero original yields 0
/// when the approximation is also zero and infinity otherwise.
pub fn relative_reconstruction_error(
    original: &ArrayView2<f64>,
    approximation: &ArrayView2<f64>,
) -> Option<f64> {
    if original.is_empty() || original.dim() != approximation.dim() {
        return None;
    }
    let diff = original - approximation;
    let norm_diff = frobenius_norm(&diff.view());
    let norm_original = frobenius_norm(original);

    if norm_original < 1e-12 {
        if norm_diff < 1e-12 {
            Some(0.0)
        } else {
            Some(f64::INFINITY)
        }
    } else {
        Some(norm_diff / norm_original)
    }
}

/// k·(h + w + 1) / (h·w): values stored by U, Σ and Vᵗ versus the pixels.
pub fn storage_ratio(height: usize, width: usize, rank: usize) -> f64 {
    if height == 0 || width == 0 {
        return 0.0;
    }
    (rank * (height + width + 1)) as f64 / (height * width) as f64
}
