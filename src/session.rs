// src/session.rs

use log::{info, warn};

use crate::config::AppConfig;
use crate::diagnostics::{relative_reconstruction_error, storage_ratio, ReconstructionSummary};
use crate::error::{Result, SvdImageError};
use crate::image_source::ImageSource;
use crate::linalg_backends::{BackendQR, BackendSVD, LinAlgBackendProvider};
use crate::reconstruct::RankKReconstructor;
use crate::types::{CumulativeVarianceSeries, Decomposition, IntensityMatrix, ReconstructedMatrix};
use crate::variance::cumulative_variance;

/// Selectable range of component counts for one image.
///
/// Bounded by min(height, width). The step only affects `positions`;
/// any in-range rank is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankControl {
    max: usize,
    value: usize,
    step: usize,
}

impl RankControl {
    pub const MIN: usize = 1;

    /// Creates a control for an image whose rank is at most `max_rank`,
    /// starting at `default_rank` clamped into range.
    pub fn new(max_rank: usize, default_rank: usize, step: usize) -> Result<Self> {
        if max_rank == 0 {
            return Err(SvdImageError::InvalidInput(
                "rank control needs a non-empty image".into(),
            ));
        }
        let mut control = Self {
            max: max_rank,
            value: Self::MIN,
            step: step.max(1),
        };
        control.value = control.clamp(default_rank);
        Ok(control)
    }

    pub fn min(&self) -> usize {
        Self::MIN
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn value(&self) -> usize {
        self.value
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn clamp(&self, k: usize) -> usize {
        k.clamp(Self::MIN, self.max)
    }

    /// Moves the control to `k`, clamped into range. Returns the new value.
    pub fn set(&mut self, k: usize) -> usize {
        let clamped = self.clamp(k);
        if clamped != k {
            warn!("Rank {} is outside 1..={}; using {}", k, self.max, clamped);
        }
        self.value = clamped;
        clamped
    }

    /// Slider positions from the minimum, spaced by `step`.
    pub fn positions(&self) -> Vec<usize> {
        (Self::MIN..=self.max).step_by(self.step).collect()
    }
}

/// Everything the presentation layer shows for one rank.
#[derive(Debug, Clone)]
pub struct Frame {
    /// (height, width) of the source.
    pub source_dims: (usize, usize),
    pub rank: usize,
    pub reconstructed: ReconstructedMatrix,
    pub decomposition: Decomposition,
    pub variance: CumulativeVarianceSeries,
    pub summary: ReconstructionSummary,
}

/// Per-user state: the selected image and its rank control.
///
/// Each call to `render` recomputes from scratch; sessions share nothing.
#[derive(Debug)]
pub struct Session<B = LinAlgBackendProvider> {
    config: AppConfig,
    reconstructor: RankKReconstructor<B>,
    image: Option<IntensityMatrix>,
    control: Option<RankControl>,
}

impl Session<LinAlgBackendProvider> {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let reconstructor = RankKReconstructor::from_config(&config);
        Ok(Self::with_reconstructor(config, reconstructor))
    }
}

impl<B: BackendSVD + BackendQR> Session<B> {
    pub fn with_reconstructor(config: AppConfig, reconstructor: RankKReconstructor<B>) -> Self {
        Self {
            config,
            reconstructor,
            image: None,
            control: None,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Loads `source` and makes it the current image.
    ///
    /// On failure the session no longer has an image, so rendering stops until
    /// a valid source is selected.
    pub fn select(&mut self, source: &ImageSource) -> Result<(usize, usize)> {
        match source.load_intensity(&self.config) {
            Ok(matrix) => self.select_matrix(matrix),
            Err(e) => {
                warn!("Failed to load {}: {}", source.describe(), e);
                self.clear();
                Err(e)
            }
        }
    }

    /// Makes an already-decoded matrix the current image.
    pub fn select_matrix(&mut self, matrix: IntensityMatrix) -> Result<(usize, usize)> {
        matrix.validate()?;
        let dims = matrix.dims();
        let control = RankControl::new(matrix.max_rank(), self.config.default_rank, self.config.rank_step)?;
        info!(
            "Original width = {}px and height = {}px; rank range 1..={}",
            dims.1,
            dims.0,
            control.max()
        );
        self.image = Some(matrix);
        self.control = Some(control);
        Ok(dims)
    }

    pub fn clear(&mut self) {
        self.image = None;
        self.control = None;
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn rank_control(&self) -> Option<&RankControl> {
        self.control.as_ref()
    }

    /// Moves the rank control. Out-of-range values are clamped.
    pub fn set_rank(&mut self, k: usize) -> Result<usize> {
        let control = self.control.as_mut().ok_or(SvdImageError::NoImageSelected)?;
        Ok(control.set(k))
    }

    /// Renders the current image at the control's rank.
    pub fn render(&self) -> Result<Frame> {
        let control = self.control.as_ref().ok_or(SvdImageError::NoImageSelected)?;
        self.render_rank(control.value())
    }

    /// Renders the current image at an explicit rank, without clamping.
    pub fn render_rank(&self, k: usize) -> Result<Frame> {
        let image = self.image.as_ref().ok_or(SvdImageError::NoImageSelected)?;
        build_frame(&self.reconstructor, image, k)
    }

    /// Renders several ranks of the current image in parallel.
    pub fn render_ranks(&self, ranks: &[usize]) -> Result<Vec<Result<Frame>>>
    where
        B: Sync,
    {
        let image = self.image.as_ref().ok_or(SvdImageError::NoImageSelected)?;
        let gray = image.to_grayscale()?;
        Ok(self
            .reconstructor
            .reconstruct_many(image, ranks)
            .into_iter()
            .zip(ranks)
            .map(|(result, &k)| {
                let (reconstructed, decomposition) = result?;
                assemble_frame(&gray, k, reconstructed, decomposition)
            })
            .collect())
    }
}

/// Stateless request/response entry point: load `source`, reconstruct at
/// rank `k`, report the variance curve.
pub fn handle_request(config: &AppConfig, source: &ImageSource, k: usize) -> Result<Frame> {
    config.validate()?;
    let matrix = source.load_intensity(config)?;
    build_frame(&RankKReconstructor::from_config(config), &matrix, k)
}

fn build_frame<B: BackendSVD + BackendQR>(
    reconstructor: &RankKReconstructor<B>,
    matrix: &IntensityMatrix,
    k: usize,
) -> Result<Frame> {
    let (reconstructed, decomposition) = reconstructor.reconstruct(matrix, k)?;
    let gray = matrix.to_grayscale()?;
    assemble_frame(&gray, k, reconstructed, decomposition)
}

fn assemble_frame(
    gray: &ndarray::Array2<f64>,
    k: usize,
    reconstructed: ReconstructedMatrix,
    decomposition: Decomposition,
) -> Result<Frame> {
    let variance = cumulative_variance(&decomposition)?;
    let (height, width) = gray.dim();
    let approximation = decomposition.approximation();
    let summary = ReconstructionSummary {
        height,
        width,
        rank: k,
        relative_error: relative_reconstruction_error(&gray.view(), &approximation.view())
            .unwrap_or(f64::NAN),
        storage_ratio: storage_ratio(height, width, k),
        cumulative_variance: variance.final_value().unwrap_or(0.0),
    };
    Ok(Frame {
        source_dims: (height, width),
        rank: k,
        reconstructed,
        decomposition,
        variance,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn control_defaults_to_ten_and_clamps() {
        let control = RankControl::new(50, 10, 2).unwrap();
        assert_eq!(control.value(), 10);
        assert_eq!(control.clamp(0), 1);
        assert_eq!(control.clamp(80), 50);

        let small = RankControl::new(4, 10, 2).unwrap();
        assert_eq!(small.value(), 4);
    }

    #[test]
    fn control_positions_follow_step() {
        let control = RankControl::new(7, 1, 2).unwrap();
        assert_eq!(control.positions(), vec![1, 3, 5, 7]);
    }

    #[test]
    fn control_rejects_empty_range() {
        assert!(RankControl::new(0, 10, 2).is_err());
    }

    #[test]
    fn render_without_image_is_no_image_selected() {
        let session = Session::new(AppConfig::default()).unwrap();
        assert!(matches!(session.render(), Err(SvdImageError::NoImageSelected)));
    }

    #[test]
    fn set_rank_without_image_is_no_image_selected() {
        let mut session = Session::new(AppConfig::default()).unwrap();
        assert!(matches!(session.set_rank(3), Err(SvdImageError::NoImageSelected)));
    }

    #[test]
    fn failed_select_clears_previous_image() {
        let mut session = Session::new(AppConfig::default()).unwrap();
        session
            .select_matrix(IntensityMatrix::from(Array2::from_shape_fn((4, 4), |(r, c)| (r + c) as f64)))
            .unwrap();
        assert!(session.has_image());

        let err = session.select(&ImageSource::Camera(b"junk".to_vec())).unwrap_err();
        assert!(matches!(err, SvdImageError::ImageDecode(_)));
        assert!(!session.has_image());
        assert!(matches!(session.render(), Err(SvdImageError::NoImageSelected)));
    }
}
