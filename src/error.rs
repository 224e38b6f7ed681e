// src/error.rs

/// Error types for image loading, reconstruction and variance reporting.
///
/// Every error is terminal to the computation that raised it; nothing in the
/// library retries.
#[derive(Debug, thiserror::Error)]
pub enum SvdImageError {
    #[error("the URL does not seem to be valid: {url} ({reason})")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid rank {k}: must be between 1 and {max}")]
    InvalidRank { k: usize, max: usize },

    #[error("reconstruction is constant; min-max normalization is undefined")]
    DegenerateInput,

    #[error("no image selected")]
    NoImageSelected,

    #[error("decomposition has no components")]
    EmptyDecomposition,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("image decode failed: {0}")]
    ImageDecode(String),

    #[error("linear algebra failure: {0}")]
    Linalg(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SvdImageError>;

impl From<image::ImageError> for SvdImageError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => SvdImageError::Io(io),
            other => SvdImageError::ImageDecode(other.to_string()),
        }
    }
}
