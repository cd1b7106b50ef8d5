//! Headless wind viewer.
//!
//! Attaches a session to an off-screen surface, fetches synthetic weather
//! for the initial viewport, animates a number of frames on a virtual clock
//! and writes each composited frame as a PNG.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use projection::{CoordinateProjector, WebMercatorViewport};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use wind_viewer::{Overlay, RandomFetcher, ViewerConfig, WindSession};

#[derive(Parser, Debug)]
#[command(name = "wind-viewer")]
#[command(about = "Render animated wind particle frames without a browser")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "WIND_VIEWER_CONFIG")]
    config: Option<PathBuf>,

    /// Canvas width in pixels
    #[arg(long, env = "WIND_WIDTH")]
    width: Option<u32>,

    /// Canvas height in pixels
    #[arg(long, env = "WIND_HEIGHT")]
    height: Option<u32>,

    /// Map center latitude
    #[arg(long, allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Map center longitude
    #[arg(long, allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Map zoom level
    #[arg(long)]
    zoom: Option<f64>,

    /// Number of frames to render
    #[arg(short = 'n', long, default_value = "60")]
    frames: usize,

    /// Pan the map every N frames
    #[arg(long)]
    pan_every: Option<usize>,

    /// Horizontal pan step in pixels
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pan_dx: f64,

    /// Vertical pan step in pixels
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pan_dy: f64,

    /// Output directory for PNG frames
    #[arg(short, long, default_value = "frames", env = "WIND_OUT_DIR")]
    out_dir: PathBuf,

    /// Seed for synthetic weather and particle placement
    #[arg(long, env = "WIND_SEED")]
    seed: Option<u64>,

    /// Scalar overlay: none, temperature or precipitation
    #[arg(long)]
    overlay: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    if args.log_json {
        let subscriber = FmtSubscriber::builder().with_env_filter(filter).json().finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<ViewerConfig> {
    let mut config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::from_env()?,
    };
    let map = &mut config.map;
    map.width = args.width.unwrap_or(map.width);
    map.height = args.height.unwrap_or(map.height);
    map.center_lat = args.lat.unwrap_or(map.center_lat);
    map.center_lon = args.lon.unwrap_or(map.center_lon);
    map.zoom = args.zoom.unwrap_or(map.zoom);
    if let Some(overlay) = &args.overlay {
        config.session.overlay = Overlay::from_str(overlay);
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(&args)?;

    let config = load_config(&args)?;
    let map = config.map.clone();
    info!(
        lat = map.center_lat,
        lon = map.center_lon,
        zoom = map.zoom,
        width = map.width,
        height = map.height,
        frames = args.frames,
        "Starting wind viewer"
    );

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create output directory: {}", args.out_dir.display()))?;

    let frame_time = Duration::from_secs_f64(1.0 / config.wind.frame_rate);
    let mut session = match args.seed {
        Some(seed) => WindSession::with_seed(config, RandomFetcher::new(seed), seed)?,
        None => WindSession::new(config, RandomFetcher::from_entropy())?,
    };
    let mut view = WebMercatorViewport::new(map.center_lat, map.center_lon, map.zoom, map.width, map.height);

    // The virtual clock only moves forward in frame steps; wall time only
    // bounds the field-build batches.
    let mut now = Instant::now();
    session.attach(map.width, map.height)?;
    session.on_viewport_change(view.bounds(), view.zoom, now);
    session.rebuild()?;
    let fetched = session.refresh(now).await.context("Initial fetch failed")?;
    info!(points = fetched, "Initial grid ready");

    for frame in 0..args.frames {
        if let Some(every) = args.pan_every.filter(|n| *n > 0) {
            if frame > 0 && frame % every == 0 {
                view.pan_by(args.pan_dx, args.pan_dy);
                session.on_viewport_change(view.bounds(), view.zoom, now);
                debug!(frame, lat = view.center_lat, lon = view.center_lon, "Panned");
            }
        }

        match session.tick(&view, now).await {
            Ok(drawn) => debug!(frame, drawn, "Frame ticked"),
            Err(e) => warn!(frame, error = %e, "Frame failed"),
        }

        let image = session.composite()?;
        let png = renderer::png::encode_pixmap(&image)?;
        let path = args.out_dir.join(format!("frame_{:04}.png", frame));
        fs::write(&path, &png).with_context(|| format!("Failed to write {}", path.display()))?;

        now += frame_time;
    }

    if let Some(cache) = session.cache() {
        let stats = cache.stats();
        info!(
            entries = stats.entries,
            hits = stats.hits,
            misses = stats.misses,
            evictions = stats.evictions,
            "Point cache summary"
        );
    }
    session.detach();
    info!(frames = args.frames, out_dir = %args.out_dir.display(), "Done");
    Ok(())
}
