// src/image_source.rs

use image::{DynamicImage, GenericImageView, ImageReader};
use log::{debug, info};
use reqwest::blocking::Client;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::config::AppConfig;
use crate::error::{Result, SvdImageError};
use crate::types::IntensityMatrix;

/// Options for the single GET issued for URL sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Duration,
    /// Honor `HTTP_PROXY` and friends from the environment.
    pub use_system_proxy: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl FetchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.fetch_timeout_secs),
            use_system_proxy: config.use_system_proxy,
        }
    }
}

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// An uploaded file on disk.
    File(PathBuf),
    /// Encoded bytes of a camera frame.
    Camera(Vec<u8>),
    /// A remote image fetched with a single GET.
    Url(String),
}

impl ImageSource {
    /// Short human-readable label for logs and CLI output.
    pub fn describe(&self) -> String {
        match self {
            ImageSource::File(path) => format!("file {}", path.display()),
            ImageSource::Camera(bytes) => format!("camera frame ({} bytes)", bytes.len()),
            ImageSource::Url(url) => format!("URL {}", url),
        }
    }

    /// Decodes the source into an image.
    ///
    /// # Errors
    /// - `NoImageSelected` for an empty URL or an empty camera frame.
    /// - `InvalidUrl` for any failure on the URL path.
    /// - `Io` / `ImageDecode` for file and camera sources.
    pub fn load(&self, fetch: &FetchOptions) -> Result<DynamicImage> {
        let start = Instant::now();
        let img = match self {
            ImageSource::File(path) => ImageReader::open(path)?.with_guessed_format()?.decode()?,
            ImageSource::Camera(bytes) => {
                if bytes.is_empty() {
                    return Err(SvdImageError::NoImageSelected);
                }
                image::load_from_memory(bytes)?
            }
            ImageSource::Url(url) => fetch_url(url, fetch)?,
        };
        let (w, h) = img.dimensions();
        info!(
            "Loaded {} ({}x{}) in {:?}",
            self.describe(),
            w,
            h,
            start.elapsed()
        );
        Ok(img)
    }

    /// Loads the source and converts it per the configured channel mode.
    pub fn load_intensity(&self, config: &AppConfig) -> Result<IntensityMatrix> {
        let img = self.load(&FetchOptions::from_config(config))?;
        let matrix = IntensityMatrix::from_image(&img, config.channel_mode);
        matrix.validate()?;
        Ok(matrix)
    }
}

/// Issues one GET for `url` and decodes the body as an image.
///
/// No retries. Every failure, including a non-success status, maps to
/// `InvalidUrl`.
pub fn fetch_url(url: &str, options: &FetchOptions) -> Result<DynamicImage> {
    let url = url.trim();
    if url.is_empty() {
        return Err(SvdImageError::NoImageSelected);
    }
    let invalid = |reason: String| SvdImageError::InvalidUrl {
        url: url.to_string(),
        reason,
    };

    let mut builder = Client::builder().timeout(options.timeout);
    if !options.use_system_proxy {
        builder = builder.no_proxy();
    }
    let client = builder
        .build()
        .map_err(|e| invalid(format!("failed to build HTTP client: {}", e)))?;
    let response = client
        .get(url)
        .send()
        .map_err(|e| invalid(format!("request failed: {}", e)))?
        .error_for_status()
        .map_err(|e| invalid(format!("server returned an error: {}", e)))?;
    let body = response
        .bytes()
        .map_err(|e| invalid(format!("failed to read response body: {}", e)))?;
    debug!("Fetched {} bytes from {}", body.len(), url);

    image::load_from_memory(&body).map_err(|e| invalid(format!("response is not an image: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    fn encoded_png(width: u32, height: u32) -> Vec<u8> {
        let img = GrayImage::from_fn(width, height, |x, y| Luma([((x * 40 + y * 10) % 256) as u8]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn camera_bytes_decode() {
        let img = ImageSource::Camera(encoded_png(5, 3))
            .load(&FetchOptions::default())
            .unwrap();
        assert_eq!(img.dimensions(), (5, 3));
    }

    #[test]
    fn empty_camera_frame_means_no_image() {
        assert!(matches!(
            ImageSource::Camera(Vec::new()).load(&FetchOptions::default()),
            Err(SvdImageError::NoImageSelected)
        ));
    }

    #[test]
    fn garbage_camera_bytes_fail_to_decode() {
        assert!(matches!(
            ImageSource::Camera(b"not an image".to_vec()).load(&FetchOptions::default()),
            Err(SvdImageError::ImageDecode(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let source = ImageSource::File(PathBuf::from("/definitely/not/here.png"));
        assert!(matches!(source.load(&FetchOptions::default()), Err(SvdImageError::Io(_))));
    }

    #[test]
    fn blank_url_means_no_image() {
        assert!(matches!(
            fetch_url("   ", &FetchOptions::default()),
            Err(SvdImageError::NoImageSelected)
        ));
    }

    #[test]
    fn malformed_url_is_invalid() {
        assert!(matches!(
            fetch_url("not a url", &FetchOptions::default()),
            Err(SvdImageError::InvalidUrl { .. })
        ));
    }
}
