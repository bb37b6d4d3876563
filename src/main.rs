//! Booth kiosk - TV playlist player
//!
//! Loops the booth's playlist on the TV and splices in a welcome slide for
//! every visitor registration read (as JSON lines) from stdin.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use booth_kiosk::driver::{self, DriverHandle, DriverOptions};
use booth_kiosk::events::{WelcomeBus, read_json_lines};
use booth_kiosk::source::{DirectorySource, ManifestSource, PlaylistSource, Shuffled};
use booth_kiosk::surface::{LogSurface, present_frames};
use booth_kiosk::video::VideoRunner;
use booth_kiosk::{KioskConfig, PlaylistPlayer};

#[derive(Parser, Debug)]
#[command(name = "booth-kiosk")]
#[command(about = "TV playlist player with live visitor welcomes")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "BOOTH_KIOSK_CONFIG")]
    config: Option<PathBuf>,

    /// JSON playlist manifest (overrides the config file)
    #[arg(short, long, conflicts_with = "directory")]
    manifest: Option<PathBuf>,

    /// Directory of media files (overrides the config file)
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info", env = "BOOTH_KIOSK_LOG")]
    log_level: String,

    /// Log slides instead of opening a window
    #[arg(long)]
    headless: bool,
}

fn load_config(args: &Args) -> Result<KioskConfig> {
    let mut config = match &args.config {
        Some(path) => KioskConfig::load(path)?,
        None => KioskConfig::default(),
    };

    if let Some(manifest) = &args.manifest {
        config.playlist.manifest = Some(manifest.clone());
        config.playlist.directory = None;
    }
    if let Some(directory) = &args.directory {
        config.playlist.directory = Some(directory.clone());
        config.playlist.manifest = None;
    }

    config.validate()?;
    Ok(config)
}

fn playlist_source(config: &KioskConfig) -> Result<Arc<dyn PlaylistSource>> {
    let playlist = &config.playlist;
    let source: Arc<dyn PlaylistSource> = match (&playlist.manifest, &playlist.directory, playlist.shuffle) {
        (Some(path), _, false) => Arc::new(ManifestSource::new(path)),
        (Some(path), _, true) => Arc::new(Shuffled::new(ManifestSource::new(path))),
        (None, Some(dir), false) => Arc::new(DirectorySource::new(dir, config.playback.default_image_duration_ms)),
        (None, Some(dir), true) => Arc::new(Shuffled::new(DirectorySource::new(
            dir,
            config.playback.default_image_duration_ms,
        ))),
        (None, None, _) => anyhow::bail!("No playlist manifest or directory configured"),
    };
    Ok(source)
}

/// Starts the player, the stdin event reader and the video runner.
fn start(config: &KioskConfig) -> Result<DriverHandle> {
    let source = playlist_source(config)?;
    let bus = WelcomeBus::new();

    let stdin_bus = bus.clone();
    tokio::spawn(async move {
        match read_json_lines(BufReader::new(tokio::io::stdin()), stdin_bus).await {
            Ok(count) => info!("Welcome input closed after {} events", count),
            Err(e) => error!("Failed to read welcome events: {}", e),
        }
    });

    let player = PlaylistPlayer::new(config.player_settings());
    let options = DriverOptions {
        stall_warning: config.stall_warning(),
    };
    let handle = driver::spawn(player, source, &bus, options);

    let runner = VideoRunner::new(config.video.command.clone());
    tokio::spawn(runner.run(handle.frames(), handle.media()));

    #[cfg(unix)]
    spawn_reload_on_hangup(&handle);

    Ok(handle)
}

// SIGHUP refetches the playlist.
#[cfg(unix)]
fn spawn_reload_on_hangup(handle: &DriverHandle) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            error!("Failed to install SIGHUP handler: {}", e);
            return;
        }
    };
    let reload = handle.reloader();
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading playlist");
            reload.reload();
        }
    });
}

async fn run_headless(handle: DriverHandle) {
    let mut surface = LogSurface::new();
    tokio::select! {
        _ = present_frames(&mut surface, handle.frames()) => {}
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }
    handle.shutdown().await;
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("booth_kiosk={}", args.log_level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&args).context("Invalid kiosk configuration")?;
    info!("Starting booth kiosk");

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let handle = {
        let _guard = runtime.enter();
        start(&config)?
    };

    #[cfg(feature = "window")]
    let result = if args.headless {
        runtime.block_on(run_headless(handle));
        Ok(())
    } else {
        // raylib needs the main thread; the player keeps running on the runtime.
        let result = booth_kiosk::window::run_window(&config.window, handle.frames());
        runtime.block_on(handle.shutdown());
        result
    };

    #[cfg(not(feature = "window"))]
    let result = {
        if !args.headless {
            info!("Built without the window feature, running headless");
        }
        runtime.block_on(run_headless(handle));
        Ok(())
    };

    // The stdin reader may still be blocked on a read.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}
