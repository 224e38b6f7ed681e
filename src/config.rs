// src/config.rs

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SvdImageError};

/// Default number of retained components shown for a fresh image.
pub const DEFAULT_RANK: usize = 10;
/// Increment used when stepping through ranks.
pub const DEFAULT_RANK_STEP: usize = 2;

/// Which truncated SVD algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SvdAlgorithm {
    /// Randomized range finder (Halko, Martinsson, Tropp 2011) followed by a
    /// small dense SVD.
    Randomized,
    /// Full dense SVD, truncated afterwards.
    Exact,
}

/// Parameters of the truncated SVD solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub algorithm: SvdAlgorithm,
    /// Extra sketch columns beyond `k` for the randomized algorithm.
    pub n_oversamples: usize,
    /// Power iterations for the randomized algorithm.
    pub n_iter: usize,
    /// RNG seed for the sketch. `None` draws from OS entropy, which makes
    /// repeated runs differ.
    pub seed: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            algorithm: SvdAlgorithm::Randomized,
            n_oversamples: 10,
            n_iter: 5,
            seed: Some(42),
        }
    }
}

/// What to output when the rank-k reconstruction is constant and min-max
/// rescaling would divide by zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Every pixel set to 128.
    MidGray,
    /// Every pixel set to 0.
    Black,
    /// Fail with `SvdImageError::DegenerateInput`.
    Reject,
}

/// How a decoded color image becomes an intensity matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    /// ITU-R 601-2 luma with 299/587/114 weights, truncated to 8 bits.
    Luma,
    /// Keep RGB channels; the reconstructor averages them unweighted.
    Mean,
}

/// Top-level configuration shared by the library entry points and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub solver: SolverConfig,
    pub degenerate_policy: DegeneratePolicy,
    pub channel_mode: ChannelMode,
    /// Timeout for the single GET issued for URL sources.
    pub fetch_timeout_secs: u64,
    /// Route URL fetches through the proxy configured in the environment.
    pub use_system_proxy: bool,
    pub default_rank: usize,
    pub rank_step: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            degenerate_policy: DegeneratePolicy::MidGray,
            channel_mode: ChannelMode::Luma,
            fetch_timeout_secs: 30,
            use_system_proxy: true,
            default_rank: DEFAULT_RANK,
            rank_step: DEFAULT_RANK_STEP,
        }
    }
}

impl AppConfig {
    /// Loads a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = serde_json::from_str(&text).map_err(|e| {
            SvdImageError::InvalidInput(format!(
                "failed to parse config {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_rank == 0 {
            return Err(SvdImageError::InvalidInput(
                "default_rank must be at least 1".into(),
            ));
        }
        if self.rank_step == 0 {
            return Err(SvdImageError::InvalidInput(
                "rank_step must be at least 1".into(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(SvdImageError::InvalidInput(
                "fetch_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
