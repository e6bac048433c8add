use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facewatch_core::{FaceRecognizer, Gallery, GalleryMatcher, ScrfdLocator};
use facewatch_hw::{Camera, PreviewWindow};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod clock;
mod config;
mod monitor;
mod overlay;
mod snapshot;

use clock::LocalClock;
use config::Config;
use monitor::{Monitor, MonitorSettings};
use overlay::Overlay;
use snapshot::SnapshotWriter;

#[derive(Parser)]
#[command(name = "facewatch", about = "Live webcam face recognition monitor")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true, env = "FACEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Camera device path (e.g., /dev/video0)
    #[arg(long, global = true)]
    device: Option<String>,

    /// Directory of reference faces, one sub-directory per identity
    #[arg(long, global = true)]
    reference_dir: Option<PathBuf>,

    /// Where frames with unknown faces are saved
    #[arg(long, global = true)]
    unknown_dir: Option<PathBuf>,

    /// Cosine distance above which a face is unknown
    #[arg(long, global = true)]
    threshold: Option<f32>,

    /// Do not save frames with unknown faces
    #[arg(long, global = true)]
    no_save: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the camera and label faces (default)
    Run,
    /// List V4L2 capture devices
    Devices,
    /// Index the reference directory and list identities
    Gallery {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct GallerySummary {
    root: PathBuf,
    images: usize,
    identities: Vec<IdentitySummary>,
}

#[derive(Serialize)]
struct IdentitySummary {
    name: String,
    images: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config),
        Commands::Devices => {
            list_devices();
            Ok(())
        }
        Commands::Gallery { json } => show_gallery(&config, json),
    }
}

/// Config file and environment, then command-line flags.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(device) = &cli.device {
        config.camera_device = device.clone();
    }
    if let Some(dir) = &cli.reference_dir {
        config.reference_dir = dir.clone();
    }
    if let Some(dir) = &cli.unknown_dir {
        config.unknown_dir = dir.clone();
    }
    if let Some(threshold) = cli.threshold {
        config.distance_threshold = threshold;
    }
    if cli.no_save {
        config.save_unknown = false;
    }
    config.validate()?;
    Ok(config)
}

fn run(config: &Config) -> Result<()> {
    tracing::info!(
        device = %config.camera_device,
        reference_dir = %config.reference_dir.display(),
        threshold = config.distance_threshold,
        "facewatch starting"
    );

    if config.save_unknown {
        std::fs::create_dir_all(&config.unknown_dir).with_context(|| {
            format!("failed to create unknown-face directory {}", config.unknown_dir.display())
        })?;
    }

    let detector_path = config.detector_model_path();
    let locator = ScrfdLocator::load(&detector_path).context("loading face detector")?;
    let matcher = load_matcher(config)?;
    tracing::info!(
        images = matcher.gallery().len(),
        identities = matcher.gallery().identities().len(),
        "reference gallery ready"
    );

    let overlay = Overlay::load(config.font_path.as_deref()).context("loading overlay font")?;

    let camera = Camera::open(&config.camera_device, config.fps)
        .with_context(|| format!("opening camera {}", config.camera_device))?;

    let writer = if config.save_unknown {
        Some(
            SnapshotWriter::spawn(&config.unknown_dir, config.snapshot_queue_capacity)
                .context("starting snapshot writer")?,
        )
    } else {
        None
    };

    let settings = MonitorSettings {
        distance_threshold: config.distance_threshold,
        max_consecutive_read_failures: config.max_consecutive_read_failures,
    };
    let mut monitor = Monitor::new(
        camera,
        locator,
        matcher,
        PreviewWindow::new(&config.window_title),
        LocalClock,
        overlay,
        settings,
    );
    if let Some(writer) = &writer {
        monitor = monitor.with_snapshots(writer);
    }

    let result = monitor.run();
    // Releases the camera and closes the window before the writer flushes.
    drop(monitor);

    if let Some(writer) = writer {
        let stats = writer.shutdown();
        tracing::info!(
            written = stats.written,
            failed = stats.failed,
            dropped = stats.dropped,
            "snapshot writer finished"
        );
    }

    let summary = result.context("monitor loop failed")?;
    tracing::info!(
        frames = summary.frames,
        faces = summary.faces,
        unknown = summary.unknown,
        read_failures = summary.read_failures,
        "facewatch stopped"
    );
    Ok(())
}

fn load_matcher(config: &Config) -> Result<GalleryMatcher<ScrfdLocator, FaceRecognizer>> {
    let locator = ScrfdLocator::load(&config.detector_model_path()).context("loading face detector")?;
    let recognizer =
        FaceRecognizer::load(&config.recognizer_model_path()).context("loading face recognizer")?;
    GalleryMatcher::new(&config.reference_dir, locator, recognizer)
        .with_context(|| format!("indexing reference directory {}", config.reference_dir.display()))
}

fn list_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
        return;
    }
    for device in devices {
        println!("{}  {} ({}, {})", device.path, device.name, device.driver, device.bus);
    }
}

fn show_gallery(config: &Config, json: bool) -> Result<()> {
    let matcher = load_matcher(config)?;
    let summary = gallery_summary(matcher.gallery());

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}: {} images", summary.root.display(), summary.images);
    for identity in &summary.identities {
        println!("  {:<24} {}", identity.name, identity.images);
    }
    Ok(())
}

fn gallery_summary(gallery: &Gallery) -> GallerySummary {
    GallerySummary {
        root: gallery.root().to_path_buf(),
        images: gallery.len(),
        identities: gallery
            .identities()
            .into_iter()
            .map(|(name, images)| IdentitySummary { name, images })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["facewatch"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.no_save);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "facewatch",
            "gallery",
            "--json",
            "--reference-dir",
            "faces",
            "--threshold",
            "0.3",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Commands::Gallery { json: true })));
        assert_eq!(cli.reference_dir, Some(PathBuf::from("faces")));
        assert_eq!(cli.threshold, Some(0.3));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "facewatch",
            "--device",
            "/dev/video2",
            "--unknown-dir",
            "/tmp/strangers",
            "--threshold",
            "0.4",
            "--no-save",
            "run",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.camera_device, "/dev/video2");
        assert_eq!(config.unknown_dir, PathBuf::from("/tmp/strangers"));
        assert!((config.distance_threshold - 0.4).abs() < 1e-6);
        assert!(!config.save_unknown);
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let cli = Cli::try_parse_from(["facewatch", "--threshold=-0.1"]).unwrap();
        assert!(resolve_config(&cli).is_err());
    }
}
