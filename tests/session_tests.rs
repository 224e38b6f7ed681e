// In tests/session_tests.rs

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use ndarray::Array2;
use std::path::PathBuf;
use svd_image::{handle_request, AppConfig, ImageSource, IntensityMatrix, Session, SvdImageError};

fn write_gradient(dir: &tempfile::TempDir, name: &str, width: u32, height: u32) -> PathBuf {
    let img = GrayImage::from_fn(width, height, |x, y| {
        Luma([((x * 7 + y * 11 + (x * y) % 17) % 256) as u8])
    });
    let path = dir.path().join(name);
    DynamicImage::ImageLuma8(img).save_with_format(&path, ImageFormat::Png).unwrap();
    path
}

#[test]
fn fresh_image_renders_at_default_rank() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_gradient(&dir, "upload.png", 40, 30);

    let mut session = Session::new(AppConfig::default()).unwrap();
    let dims = session.select(&ImageSource::File(path)).unwrap();
    assert_eq!(dims, (30, 40));

    let control = session.rank_control().unwrap();
    assert_eq!((control.min(), control.max(), control.value(), control.step()), (1, 30, 10, 2));

    let frame = session.render().unwrap();
    assert_eq!(frame.rank, 10);
    assert_eq!(frame.reconstructed.dims(), (30, 40));
    assert_eq!(frame.variance.len(), 10);
    assert_eq!(frame.summary.rank, 10);
    assert!(frame.summary.relative_error >= 0.0);
}

#[test]
fn small_image_clamps_default_rank() {
    let mut session = Session::new(AppConfig::default()).unwrap();
    session
        .select_matrix(IntensityMatrix::from(Array2::from_shape_fn((5, 9), |(r, c)| {
            ((r * 31 + c * 17) % 255) as f64
        })))
        .unwrap();
    assert_eq!(session.rank_control().unwrap().value(), 5);
    assert_eq!(session.set_rank(0).unwrap(), 1);
    assert_eq!(session.set_rank(99).unwrap(), 5);
    assert_eq!(session.render().unwrap().rank, 5);
}

#[test]
fn render_ranks_keeps_request_order_and_isolates_failures() {
    let mut session = Session::new(AppConfig::default()).unwrap();
    session
        .select_matrix(IntensityMatrix::from(Array2::from_shape_fn((12, 8), |(r, c)| {
            ((r * r + 3 * c) % 200) as f64
        })))
        .unwrap();

    let frames = session.render_ranks(&[6, 1, 20, 3]).unwrap();
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0].as_ref().unwrap().rank, 6);
    assert_eq!(frames[1].as_ref().unwrap().rank, 1);
    assert!(matches!(frames[2], Err(SvdImageError::InvalidRank { k: 20, max: 8 })));
    assert_eq!(frames[3].as_ref().unwrap().rank, 3);

    let explained: Vec<f64> = [&frames[1], &frames[3], &frames[0]]
        .iter()
        .map(|f| f.as_ref().unwrap().summary.cumulative_variance)
        .collect();
    assert!(explained.windows(2).all(|w| w[0] <= w[1] + 1e-12));
}

#[test]
fn selecting_a_new_image_resets_the_control() {
    let dir = tempfile::tempdir().unwrap();
    let big = write_gradient(&dir, "big.png", 64, 48);
    let small = write_gradient(&dir, "small.png", 6, 4);

    let mut session = Session::new(AppConfig::default()).unwrap();
    session.select(&ImageSource::File(big)).unwrap();
    session.set_rank(40).unwrap();
    session.select(&ImageSource::File(small)).unwrap();
    let control = session.rank_control().unwrap();
    assert_eq!(control.max(), 4);
    assert_eq!(control.value(), 4);
}

#[test]
fn request_with_file_source_and_bad_rank() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_gradient(&dir, "upload.png", 16, 12);
    let source = ImageSource::File(path);

    let frame = handle_request(&AppConfig::default(), &source, 12).unwrap();
    assert!((frame.summary.cumulative_variance - 1.0).abs() < 1e-8);

    assert!(matches!(
        handle_request(&AppConfig::default(), &source, 13),
        Err(SvdImageError::InvalidRank { k: 13, max: 12 })
    ));
}

#[test]
fn blank_url_request_means_no_image() {
    assert!(matches!(
        handle_request(&AppConfig::default(), &ImageSource::Url("  ".into()), 10),
        Err(SvdImageError::NoImageSelected)
    ));
}
