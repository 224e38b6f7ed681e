// src/types.rs

use image::{DynamicImage, GrayImage};
use ndarray::{Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::config::ChannelMode;
use crate::error::{Result, SvdImageError};

/// Pixel intensities of a source image, before any decomposition.
///
/// `Channels` has shape (height, width, channels) and is collapsed to a single
/// channel by the reconstructor.
#[derive(Debug, Clone, PartialEq)]
pub enum IntensityMatrix {
    Gray(Array2<f64>),
    Channels(Array3<f64>),
}

impl IntensityMatrix {
    /// Builds an intensity matrix from a decoded image.
    pub fn from_image(img: &DynamicImage, mode: ChannelMode) -> Self {
        match mode {
            ChannelMode::Luma => {
                let rgb = img.to_rgb8();
                let (w, h) = rgb.dimensions();
                IntensityMatrix::Gray(Array2::from_shape_fn((h as usize, w as usize), |(r, c)| {
                    rec601_luma(rgb.get_pixel(c as u32, r as u32).0) as f64
                }))
            }
            ChannelMode::Mean => {
                let rgb = img.to_rgb8();
                let (w, h) = rgb.dimensions();
                IntensityMatrix::Channels(Array3::from_shape_fn(
                    (h as usize, w as usize, 3),
                    |(r, c, ch)| rgb.get_pixel(c as u32, r as u32).0[ch] as f64,
                ))
            }
        }
    }

    /// (height, width)
    pub fn dims(&self) -> (usize, usize) {
        match self {
            IntensityMatrix::Gray(m) => m.dim(),
            IntensityMatrix::Channels(m) => (m.shape()[0], m.shape()[1]),
        }
    }

    /// Upper bound for the rank: min(height, width).
    pub fn max_rank(&self) -> usize {
        let (h, w) = self.dims();
        h.min(w)
    }

    /// Collapses channels by unweighted mean; grayscale input is cloned.
    pub fn to_grayscale(&self) -> Result<Array2<f64>> {
        match self {
            IntensityMatrix::Gray(m) => Ok(m.clone()),
            IntensityMatrix::Channels(m) => {
                if m.shape()[2] == 0 {
                    return Err(SvdImageError::InvalidInput(
                        "image has zero color channels".into(),
                    ));
                }
                m.mean_axis(Axis(2)).ok_or_else(|| {
                    SvdImageError::InvalidInput("failed to average color channels".into())
                })
            }
        }
    }

    /// Checks the matrix is non-empty and finite.
    pub fn validate(&self) -> Result<()> {
        let (h, w) = self.dims();
        if h == 0 || w == 0 {
            return Err(SvdImageError::InvalidInput(format!(
                "image has zero size ({}x{})",
                w, h
            )));
        }
        let all_finite = match self {
            IntensityMatrix::Gray(m) => m.iter().all(|v| v.is_finite()),
            IntensityMatrix::Channels(m) => m.iter().all(|v| v.is_finite()),
        };
        if !all_finite {
            return Err(SvdImageError::InvalidInput(
                "image contains non-finite intensities".into(),
            ));
        }
        Ok(())
    }
}

/// ITU-R 601-2 luma, L = (299 R + 587 G + 114 B) / 1000, truncated to 8 bits.
fn rec601_luma([r, g, b]: [u8; 3]) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

impl From<Array2<f64>> for IntensityMatrix {
    fn from(m: Array2<f64>) -> Self {
        IntensityMatrix::Gray(m)
    }
}

impl From<Array3<f64>> for IntensityMatrix {
    fn from(m: Array3<f64>) -> Self {
        IntensityMatrix::Channels(m)
    }
}

/// The fitted rank-k factorization of a grayscale matrix.
#[derive(Debug, Clone)]
pub struct Decomposition {
    /// U·Σ, shape (height, k).
    pub left_factor: Array2<f64>,
    /// Vᵗ, shape (k, width). Rows are unit vectors.
    pub components: Array2<f64>,
    /// Descending, length k.
    pub singular_values: Array1<f64>,
    /// Variance of each column of `left_factor`.
    pub explained_variance: Array1<f64>,
    /// `explained_variance` divided by the total variance of the source.
    pub explained_variance_ratio: Array1<f64>,
}

impl Decomposition {
    pub fn rank(&self) -> usize {
        self.components.nrows()
    }

    /// The unscaled rank-k approximation U·Σ·Vᵗ.
    pub fn approximation(&self) -> Array2<f64> {
        self.left_factor.dot(&self.components)
    }
}

/// A rescaled 8-bit reconstruction, same shape as the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconstructedMatrix {
    pub pixels: Array2<u8>,
}

impl ReconstructedMatrix {
    /// (height, width)
    pub fn dims(&self) -> (usize, usize) {
        self.pixels.dim()
    }

    pub fn to_gray_image(&self) -> GrayImage {
        let (h, w) = self.dims();
        GrayImage::from_fn(w as u32, h as u32, |x, y| {
            image::Luma([self.pixels[[y as usize, x as usize]]])
        })
    }
}

/// Running sum of explained-variance ratios, one entry per component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativeVarianceSeries {
    pub values: Vec<f64>,
}

impl CumulativeVarianceSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cumulative variance after the last retained component.
    pub fn final_value(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// (component number starting at 1, cumulative value) pairs for charting.
    pub fn points(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values.iter().enumerate().map(|(i, v)| (i + 1, *v))
    }
}
