use anyhow::{anyhow, Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use log::{error, warn};
use std::io::Read;
use std::path::{Path, PathBuf};

use svd_image::{
    AppConfig, ChannelMode, DegeneratePolicy, Frame, ImageSource, RankControl, Session,
    SvdAlgorithm, SvdImageError,
};

/// Singular Value Decomposition on images: reconstruct a picture from its
/// top-k singular components and report the cumulative variance explained.
#[derive(Parser, Debug)]
#[command(name = "svd-image")]
#[command(about = "🖼️ Reconstruct an image from its top-k singular components")]
#[command(group(ArgGroup::new("source").required(true).args(["file", "url", "camera"])))]
struct Args {
    /// Path of the image to decompose
    #[arg(long)]
    file: Option<PathBuf>,

    /// Image URL, fetched with a single GET
    #[arg(long)]
    url: Option<String>,

    /// Read encoded image bytes (e.g. a camera capture) from stdin
    #[arg(long)]
    camera: bool,

    /// Number of components (clamped to 1..=min(height, width)); defaults to 10
    #[arg(short = 'k', long)]
    rank: Option<usize>,

    /// Comma-separated ranks, e.g. 1,5,10,50; each is clamped like --rank
    #[arg(long, value_delimiter = ',', conflicts_with = "rank")]
    ranks: Vec<usize>,

    /// Output image path; '{k}' is replaced by the rank
    #[arg(short, long, default_value = "reconstructed.png")]
    output: String,

    /// Write the cumulative variance curve as CSV
    #[arg(long)]
    variance_csv: Option<PathBuf>,

    /// Write the cumulative variance curve as JSON
    #[arg(long)]
    variance_json: Option<PathBuf>,

    /// Truncated SVD algorithm
    #[arg(long, value_enum)]
    algorithm: Option<AlgorithmArg>,

    /// Seed for the randomized sketch
    #[arg(long)]
    seed: Option<u64>,

    /// Power iterations for the randomized algorithm
    #[arg(long)]
    n_iter: Option<usize>,

    /// Oversampling columns for the randomized algorithm
    #[arg(long)]
    n_oversamples: Option<usize>,

    /// How color images become intensities
    #[arg(long, value_enum)]
    channel_mode: Option<ChannelModeArg>,

    /// Output for a constant reconstruction
    #[arg(long, value_enum)]
    degenerate: Option<DegenerateArg>,

    /// Timeout in seconds for URL fetches
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Ignore proxy settings from the environment for URL fetches
    #[arg(long)]
    no_proxy: bool,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AlgorithmArg {
    Randomized,
    Exact,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ChannelModeArg {
    Luma,
    Mean,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DegenerateArg {
    MidGray,
    Black,
    Reject,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = build_config(&args)?;
    let source = build_source(&args)?;

    let mut session = Session::new(config)?;
    let (height, width) = session
        .select(&source)
        .with_context(|| format!("failed to load {}", source.describe()))?;
    println!("Original width = {}px and height = {}px", width, height);

    if args.ranks.is_empty() {
        let requested = args.rank.unwrap_or(session.config().default_rank);
        session.set_rank(requested)?;
        let frame = session.render()?;
        emit_frame(&args, &frame, false)?;
        print_summary(std::slice::from_ref(&frame));
    } else {
        let control = session
            .rank_control()
            .copied()
            .ok_or(SvdImageError::NoImageSelected)?;
        let ranks = resolve_ranks(&args.ranks, &control);
        let mut frames = Vec::with_capacity(ranks.len());
        let mut failed = 0;
        for (k, result) in ranks.iter().zip(session.render_ranks(&ranks)?) {
            match result {
                Ok(frame) => {
                    emit_frame(&args, &frame, true)?;
                    frames.push(frame);
                }
                Err(e) => {
                    error!("Rank {} failed: {}", k, e);
                    failed += 1;
                }
            }
        }
        print_summary(&frames);
        if failed > 0 {
            return Err(anyhow!("{} of {} ranks failed", failed, ranks.len()));
        }
    }
    Ok(())
}

fn build_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_json_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(algorithm) = args.algorithm {
        config.solver.algorithm = match algorithm {
            AlgorithmArg::Randomized => SvdAlgorithm::Randomized,
            AlgorithmArg::Exact => SvdAlgorithm::Exact,
        };
    }
    if args.seed.is_some() {
        config.solver.seed = args.seed;
    }
    if let Some(n_iter) = args.n_iter {
        config.solver.n_iter = n_iter;
    }
    if let Some(n_oversamples) = args.n_oversamples {
        config.solver.n_oversamples = n_oversamples;
    }
    if let Some(mode) = args.channel_mode {
        config.channel_mode = match mode {
            ChannelModeArg::Luma => ChannelMode::Luma,
            ChannelModeArg::Mean => ChannelMode::Mean,
        };
    }
    if let Some(policy) = args.degenerate {
        config.degenerate_policy = match policy {
            DegenerateArg::MidGray => DegeneratePolicy::MidGray,
            DegenerateArg::Black => DegeneratePolicy::Black,
            DegenerateArg::Reject => DegeneratePolicy::Reject,
        };
    }
    if let Some(timeout) = args.timeout_secs {
        config.fetch_timeout_secs = timeout;
    }
    if args.no_proxy {
        config.use_system_proxy = false;
    }
    config.validate()?;
    Ok(config)
}

fn build_source(args: &Args) -> Result<ImageSource> {
    if let Some(path) = &args.file {
        return Ok(ImageSource::File(path.clone()));
    }
    if let Some(url) = &args.url {
        return Ok(ImageSource::Url(url.clone()));
    }
    if args.camera {
        let mut bytes = Vec::new();
        std::io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("failed to read camera frame from stdin")?;
        return Ok(ImageSource::Camera(bytes));
    }
    Err(anyhow!("Upload an image, take one with your camera, or load image from a URL"))
}

/// Clamps each requested rank into the control's range and drops repeats,
/// keeping first-seen order.
fn resolve_ranks(requested: &[usize], control: &RankControl) -> Vec<usize> {
    let mut ranks = Vec::with_capacity(requested.len());
    for &k in requested {
        let clamped = control.clamp(k);
        if clamped != k {
            warn!("Rank {} is outside 1..={}; using {}", k, control.max(), clamped);
        }
        if !ranks.contains(&clamped) {
            ranks.push(clamped);
        }
    }
    ranks
}

/// Resolves the output path for one frame; batch runs without a `{k}`
/// placeholder get the rank appended to the file stem.
fn output_path(template: &str, k: usize, batch: bool) -> PathBuf {
    if template.contains("{k}") {
        return PathBuf::from(template.replace("{k}", &k.to_string()));
    }
    if !batch {
        return PathBuf::from(template);
    }
    let path = Path::new(template);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("reconstructed");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("png");
    path.with_file_name(format!("{}_k{}.{}", stem, k, ext))
}

fn emit_frame(args: &Args, frame: &Frame, batch: bool) -> Result<()> {
    let image_path = output_path(&args.output, frame.rank, batch);
    frame
        .reconstructed
        .to_gray_image()
        .save(&image_path)
        .with_context(|| format!("failed to write {}", image_path.display()))?;

    if let Some(csv_path) = &args.variance_csv {
        let csv_path = output_path(&csv_path.to_string_lossy(), frame.rank, batch);
        let file = std::fs::File::create(&csv_path)
            .with_context(|| format!("failed to create {}", csv_path.display()))?;
        svd_image::variance::write_csv(&frame.variance, std::io::BufWriter::new(file))?;
    }
    if let Some(json_path) = &args.variance_json {
        let json_path = output_path(&json_path.to_string_lossy(), frame.rank, batch);
        std::fs::write(&json_path, svd_image::variance::to_json(&frame.variance)?)
            .with_context(|| format!("failed to write {}", json_path.display()))?;
    }
    Ok(())
}

fn print_summary(frames: &[Frame]) {
    println!(
        "{:>6}  {:>12}  {:>12}  {:>14}",
        "rank", "cum. var.", "rel. error", "storage ratio"
    );
    for frame in frames {
        let s = &frame.summary;
        println!(
            "{:>6}  {:>12.6}  {:>12.6}  {:>14.4}",
            s.rank, s.cumulative_variance, s.relative_error, s.storage_ratio
        );
    }
}
