// In tests/image_source_tests.rs

use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use std::io::{BufRead, BufReader, Cursor, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;
use svd_image::image_source::{fetch_url, FetchOptions};
use svd_image::{handle_request, AppConfig, ChannelMode, ImageSource, IntensityMatrix, SvdImageError};

/// Loopback fetches must not be routed through a proxy from the environment.
fn direct(timeout_secs: u64) -> FetchOptions {
    FetchOptions {
        timeout: Duration::from_secs(timeout_secs),
        use_system_proxy: false,
    }
}

fn direct_config() -> AppConfig {
    AppConfig {
        use_system_proxy: false,
        ..AppConfig::default()
    }
}

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    buf
}

fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(width, height, |x, y| Luma([((x * 13 + y * 29) % 256) as u8]));
    encode(DynamicImage::ImageLuma8(img), ImageFormat::Png)
}

/// Serves exactly one HTTP response on a loopback port and returns its URL.
fn serve_once(status_line: &'static str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            // Drain the request head.
            while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
                if line == "\r\n" {
                    break;
                }
                line.clear();
            }
            let mut stream = reader.into_inner();
            let head = format!(
                "{}\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                body.len()
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
            let _ = stream.flush();
        }
    });
    format!("http://{}/image.png", addr)
}

#[test]
fn url_fetch_decodes_served_image() {
    let url = serve_once("HTTP/1.1 200 OK", gradient_png(9, 4));
    let img = fetch_url(&url, &direct(5)).unwrap();
    assert_eq!((img.width(), img.height()), (9, 4));
}

#[test]
fn unreachable_host_is_invalid_url() {
    // Port 1 on loopback is closed on any sane test host.
    let result = fetch_url("http://127.0.0.1:1/missing.png", &direct(2));
    assert!(matches!(result, Err(SvdImageError::InvalidUrl { .. })));
}

#[test]
fn error_status_is_invalid_url() {
    let url = serve_once("HTTP/1.1 404 Not Found", b"nope".to_vec());
    let result = fetch_url(&url, &direct(5));
    assert!(matches!(result, Err(SvdImageError::InvalidUrl { .. })));
}

#[test]
fn non_image_body_is_invalid_url() {
    let url = serve_once("HTTP/1.1 200 OK", b"<html>hello</html>".to_vec());
    let result = fetch_url(&url, &direct(5));
    assert!(matches!(result, Err(SvdImageError::InvalidUrl { .. })));
}

#[test]
fn url_request_runs_full_pipeline() {
    let url = serve_once("HTTP/1.1 200 OK", gradient_png(12, 10));
    let frame = handle_request(&direct_config(), &ImageSource::Url(url), 4).unwrap();
    assert_eq!(frame.source_dims, (10, 12));
    assert_eq!(frame.reconstructed.dims(), (10, 12));
    assert_eq!(frame.variance.len(), 4);
}

#[test]
fn unreachable_url_request_attempts_no_reconstruction() {
    let result = handle_request(
        &direct_config(),
        &ImageSource::Url("http://127.0.0.1:1/x.png".to_string()),
        10,
    );
    assert!(matches!(result, Err(SvdImageError::InvalidUrl { .. })));
}

#[test]
fn file_source_reads_jpeg_and_bmp() {
    let dir = tempfile::tempdir().unwrap();
    let rgb = RgbImage::from_fn(8, 6, |x, y| Rgb([(x * 30) as u8, (y * 40) as u8, 90]));

    for (name, format) in [("photo.jpg", ImageFormat::Jpeg), ("photo.bmp", ImageFormat::Bmp)] {
        let path = dir.path().join(name);
        std::fs::write(&path, encode(DynamicImage::ImageRgb8(rgb.clone()), format)).unwrap();
        let matrix = ImageSource::File(path).load_intensity(&AppConfig::default()).unwrap();
        assert_eq!(matrix.dims(), (6, 8));
        assert!(matches!(matrix, IntensityMatrix::Gray(_)));
    }
}

#[test]
fn file_with_misleading_extension_is_sniffed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upload.bin");
    std::fs::write(&path, gradient_png(3, 3)).unwrap();
    let img = ImageSource::File(path).load(&direct(1)).unwrap();
    assert_eq!((img.width(), img.height()), (3, 3));
}

#[test]
fn mean_channel_mode_keeps_rgb() {
    let rgb = RgbImage::from_fn(4, 2, |_, _| Rgb([30, 60, 90]));
    let bytes = encode(DynamicImage::ImageRgb8(rgb), ImageFormat::Png);
    let config = AppConfig {
        channel_mode: ChannelMode::Mean,
        ..AppConfig::default()
    };
    let matrix = ImageSource::Camera(bytes).load_intensity(&config).unwrap();
    match &matrix {
        IntensityMatrix::Channels(m) => assert_eq!(m.shape(), &[2, 4, 3]),
        other => panic!("expected channels, got {:?}", other),
    }
    let gray = matrix.to_grayscale().unwrap();
    assert!(gray.iter().all(|&v| (v - 60.0).abs() < 1e-12));
}
