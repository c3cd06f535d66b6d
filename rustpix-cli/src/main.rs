//! Command-line entry point: parses run configuration, connects to the
//! detector server, and drives the reader/analyser/writer pipeline to
//! completion or until interrupted.

use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;

use rustpix_handler::{DataHandler, RunConfig, RunContext};
use rustpix_hist::{BatchingWriter, FileHistogramWriter, HistogramWriter, Manager, PixelMap};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pipeline error: {0}")]
    Handler(#[from] rustpix_handler::Error),

    #[error("histogram error: {0}")]
    Hist(#[from] rustpix_hist::Error),

    #[error("configuration rejected: {0}")]
    Configuration(String),
}

/// Real-time TPX3 decode and TDC-period histogram engine.
#[derive(Parser)]
#[command(name = "rustpix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Detector server address, `host:port`.
    #[arg(long)]
    detector: String,

    /// Server protocol is >= 3.20 and frames an 8-byte packet-id word
    /// after every chunk header.
    #[arg(long, default_value_t = false)]
    has_packet_id: bool,

    /// Number of chips reported by the detector (analyser threads,
    /// histogram rows).
    #[arg(long, default_value_t = 1)]
    n_chips: usize,

    /// Directory histogram files are written to.
    #[arg(long, default_value = "./rustpix-out")]
    output_dir: PathBuf,

    /// Periods combined into a single histogram file.
    #[arg(long, default_value_t = 1)]
    save_interval: usize,

    /// Optional pixel-map file (JSON or CSV); omit for an identity map
    /// with a single energy point per pixel.
    #[arg(long)]
    pixel_map: Option<PathBuf>,

    /// ROI start, in clock ticks relative to each period's start.
    #[arg(long, default_value_t = 0)]
    roi_start: i64,

    /// ROI bin width, in clock ticks.
    #[arg(long, default_value_t = 1)]
    roi_step: i64,

    /// Number of ROI time bins.
    #[arg(long, default_value_t = 1000)]
    roi_bins: i64,

    /// Seed interval (clock ticks) handed to each chip's predictor on
    /// its first TDC.
    #[arg(long, default_value_t = 1000)]
    initial_period: i64,

    /// Completed period intervals each chip keeps live before purging.
    #[arg(long, default_value_t = 2)]
    max_period_queues: usize,

    /// Concurrently live histogram slots in the manager.
    #[arg(long, default_value_t = 4)]
    n_period_slots: usize,

    /// Disputed-boundary half-width, as a fraction of one period.
    #[arg(long, default_value_t = rustpix_handler::RunConfig::default().threshold)]
    threshold: f64,

    /// Byte capacity of each pooled IO buffer.
    #[arg(long, default_value_t = 64 * 1024)]
    buffer_capacity: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    log::info!("state: init");
    let config = RunConfig {
        initial_period: cli.initial_period,
        max_period_queues: cli.max_period_queues,
        buffer_capacity: cli.buffer_capacity,
        n_chips: cli.n_chips,
        n_period_slots: cli.n_period_slots,
        threshold: cli.threshold,
    };
    if !(0.0..0.5).contains(&config.threshold) {
        return Err(CliError::Configuration(format!(
            "threshold must be in (0, 0.5), got {}",
            config.threshold
        )));
    }

    log::info!("state: config");
    let pixel_map = match &cli.pixel_map {
        Some(path) => load_pixel_map(path)?,
        None => PixelMap::empty(1),
    };

    log::info!("state: setup");
    let ctx = Arc::new(RunContext::new(
        config,
        cli.roi_start,
        cli.roi_step,
        cli.roi_bins,
        pixel_map,
    ));
    let manager = Arc::new(Manager::new(
        ctx.config.n_period_slots,
        ctx.config.n_chips,
        cli.roi_bins.max(0) as usize,
        ctx.pixel_map().n_energy_points(),
    ));
    let handler = DataHandler::new(Arc::clone(&ctx), manager);

    let file_writer: Box<dyn HistogramWriter> = Box::new(FileHistogramWriter::new(&cli.output_dir));
    let writer: Box<dyn HistogramWriter> = Box::new(BatchingWriter::new(file_writer, cli.save_interval));

    log::info!("state: await_connection ({})", cli.detector);
    let stream = TcpStream::connect(&cli.detector)?;
    stream.set_nodelay(true)?;

    log::info!("state: collect");
    let result = handler.run(stream, &cli.detector, cli.has_packet_id, writer);
    match &result {
        Ok(()) => log::info!("state: shutdown (clean)"),
        Err(e) => log::error!("state: except ({e})"),
    }
    Ok(result?)
}

fn load_pixel_map(path: &PathBuf) -> Result<PixelMap> {
    let map = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => PixelMap::from_json_file(path)?,
        _ => PixelMap::from_csv_file(path)?,
    };
    Ok(map)
}
