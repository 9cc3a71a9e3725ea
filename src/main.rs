//! Gencam demo: runs a camera array through a full capture session.
//!
//! ```text
//! gencam [--backend mock|v4l2] [--cameras N] [--frames N] [--config FILE]
//! ```
//!
//! Logging follows `RUST_LOG` (default `info`).

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use gencam::mock::MockRig;
use gencam::validation::validate_frame_sequence;
use gencam::{
    BackendRegistry, CameraTarget, DriverConfig, FrameBuffer, FrameMetadata, GenericCameraDriver,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    /// Simulated cameras
    Mock,
    /// Video4Linux2 capture devices
    V4l2,
}

#[derive(Debug, Parser)]
#[command(name = "gencam")]
#[command(version, about = "Run a camera array through a capture session", long_about = None)]
struct Cli {
    /// Camera backend to drive
    #[arg(long, value_enum, default_value_t = BackendKind::Mock)]
    backend: BackendKind,

    /// Number of simulated cameras
    #[arg(long, default_value_t = 2)]
    cameras: usize,

    /// Frames to capture from every camera
    #[arg(long, default_value_t = 10)]
    frames: usize,

    /// Driver configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run() {
        eprintln!("Error: {err}");
        let mut source = err.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}

fn registry(cli: &Cli) -> Result<BackendRegistry, String> {
    match cli.backend {
        BackendKind::Mock => Ok(BackendRegistry::new().with(MockRig::new(cli.cameras))),
        #[cfg(feature = "v4l2")]
        BackendKind::V4l2 => Ok(BackendRegistry::new().with(gencam::V4l2Backend::new())),
        #[cfg(not(feature = "v4l2"))]
        BackendKind::V4l2 => Err("gencam was built without the v4l2 feature".to_owned()),
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => DriverConfig::load(path)?,
        None => DriverConfig::default(),
    };
    let mut driver = GenericCameraDriver::new(registry(&cli)?, config)?;

    driver.init()?;
    for (index, info) in driver.cam_infos()?.iter().enumerate() {
        println!(
            "Camera {index}: {} {} (serial {}), {}, bayer {}",
            info.vendor, info.model, info.serial, info.format, info.bayer_pattern
        );
    }
    if driver.is_hardware_synchronized() {
        println!("All cameras are hardware triggered");
    }

    driver.set_fps(CameraTarget::All, 30.0)?;
    driver.set_auto_exposure(CameraTarget::All, true)?;
    driver.start_capture()?;
    if let Err(err) = driver.make_set_effective_default() {
        warn!(error = %err, "settings did not settle");
    }

    let mut buffers = driver
        .cam_infos()?
        .iter()
        .map(|info| FrameBuffer::new(info.format))
        .collect::<Result<Vec<_>, _>>()?;
    let mut history: Vec<Vec<FrameMetadata>> = vec![Vec::new(); buffers.len()];

    for _ in 0..cli.frames {
        for (index, result) in driver.capture_all(&mut buffers)?.into_iter().enumerate() {
            match result {
                Ok(metadata) => {
                    if let (Some(frames), Some(buffer)) = (history.get_mut(index), buffers.get(index)) {
                        println!(
                            "Camera {index} frame {}: {} bytes, mean {:.3}, timestamp {:?}",
                            metadata.sequence,
                            metadata.bytes_written,
                            buffer.mean_intensity(),
                            metadata.timestamp
                        );
                        frames.push(metadata);
                    }
                }
                Err(err) if err.is_retryable() => warn!(index, error = %err, "frame lost"),
                Err(err) => return Err(err.into()),
            }
        }
    }

    driver.stop_capture()?;
    for (index, frames) in history.iter().enumerate() {
        match validate_frame_sequence(frames) {
            Ok(()) => info!(index, frames = frames.len(), "frame sequence complete"),
            Err(err) => warn!(index, error = %err, "frame sequence irregular"),
        }
    }
    driver.release()?;
    Ok(())
}
