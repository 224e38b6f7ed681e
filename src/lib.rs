//! Low-rank image reconstruction with truncated SVD.
//!
//! An image is read as an intensity matrix, decomposed with a randomized (or
//! exact) truncated SVD, rebuilt from its top `k` components and rescaled to
//! 8-bit grayscale. Alongside the image the crate reports the cumulative
//! fraction of variance explained by those components.
//!
//! ```no_run
//! use svd_image::{handle_request, AppConfig, ImageSource};
//!
//! let frame = handle_request(&AppConfig::default(), &ImageSource::File("cat.jpg".into()), 10)?;
//! frame.reconstructed.to_gray_image().save("cat_k10.png")?;
//! println!("explained: {:.3}", frame.summary.cumulative_variance);
//! # Ok::<(), svd_image::SvdImageError>(())
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod image_source;
pub mod linalg_backends;
pub mod reconstruct;
pub mod session;
pub mod truncated_svd;
pub mod types;
pub mod variance;

pub use config::{AppConfig, ChannelMode, DegeneratePolicy, SolverConfig, SvdAlgorithm};
pub use error::{Result, SvdImageError};
pub use image_source::{FetchOptions, ImageSource};
pub use reconstruct::RankKReconstructor;
pub use session::{handle_request, Frame, RankControl, Session};
pub use truncated_svd::{TruncatedSvd, TruncatedSvdOutput};
pub use types::{CumulativeVarianceSeries, Decomposition, IntensityMatrix, ReconstructedMatrix};
pub use variance::cumulative_variance;
