use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use rollcall_core::{DescriptorStore, OnnxFaceEngine, Roster, StoreError};
use rollcall_hw::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod ledger;
mod session;
mod sheet;

use config::Config;

#[derive(Parser)]
#[command(name = "rollcalld", about = "Face-recognition attendance logger")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an attendance session against the live camera
    Run {
        /// Camera device index override
        #[arg(short, long)]
        camera: Option<u32>,
    },
    /// Rebuild the descriptor cache from the reference images
    Encode,
    /// List available video capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command.unwrap_or(Commands::Run { camera: None }) {
        Commands::Run { camera } => {
            if let Some(index) = camera {
                config.camera_index = index;
            }
            run(config).await
        }
        Commands::Encode => encode(config),
        Commands::Devices => {
            devices();
            Ok(())
        }
    }
}

async fn run(config: Config) -> Result<()> {
    tracing::info!("rollcalld starting");

    let roster = config::load_roster(&config.roster_path)?;
    let mut engine =
        OnnxFaceEngine::load(&config.detector_model_path(), &config.encoder_model_path())?;
    let store = load_store(&mut engine, &config, &roster)?;
    if store.is_empty() {
        bail!(
            "no usable reference images in {}",
            config.image_dir.display()
        );
    }
    tracing::info!(identities = store.len(), "known identities loaded");

    let camera = Camera::open(config.camera_index)?;
    let mut sheet = sheet::AttendanceSheet::create(&config.log_dir, Local::now())?;
    tracing::info!(log = %sheet.path().display(), "attendance log created");

    let stop = Arc::new(AtomicBool::new(false));
    let stop_on_signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; finishing session");
            stop_on_signal.store(true, Ordering::Relaxed);
        }
    });

    let options = session::SessionOptions {
        detect_every: config.detect_every,
        frame_scale: config.frame_scale,
        tolerance: config.tolerance,
        flush_interval: config.flush_interval,
    };

    // The loop is synchronous and owns its resources for the whole session;
    // the camera and the sheet are released when the thread returns.
    let summary = tokio::task::spawn_blocking(move || -> Result<_, session::SessionError> {
        let stream = camera.frames()?;
        session::run_session(stream, &mut engine, &store, &mut sheet, &options, &stop)
    })
    .await
    .context("session thread panicked")??;

    tracing::info!(
        frames = summary.frames_seen,
        analyzed = summary.frames_analyzed,
        recorded = summary.recorded,
        "session complete"
    );
    Ok(())
}

/// Load the descriptor store, recovering from a corrupt cache by forcing a
/// rebuild. All other store errors are fatal.
fn load_store(
    engine: &mut OnnxFaceEngine,
    config: &Config,
    roster: &Roster,
) -> Result<DescriptorStore> {
    match DescriptorStore::load(engine, &config.image_dir, roster, &config.cache_path) {
        Ok(store) => Ok(store),
        Err(error @ StoreError::CacheCorrupt { .. }) => {
            tracing::warn!(%error, "rebuilding descriptor store from reference images");
            Ok(DescriptorStore::rebuild(
                engine,
                &config.image_dir,
                roster,
                &config.cache_path,
            )?)
        }
        Err(error) => Err(error.into()),
    }
}

fn encode(config: Config) -> Result<()> {
    let roster = config::load_roster(&config.roster_path)?;
    let mut engine =
        OnnxFaceEngine::load(&config.detector_model_path(), &config.encoder_model_path())?;
    let store = DescriptorStore::rebuild(
        &mut engine,
        &config.image_dir,
        &roster,
        &config.cache_path,
    )?;
    println!(
        "Encoded {} identities into {}",
        store.len(),
        config.cache_path.display()
    );
    Ok(())
}

fn devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No video capture devices found");
        return;
    }
    for device in devices {
        println!(
            "{}: {} ({}) [{}]",
            device.index, device.name, device.path, device.driver
        );
    }
}
