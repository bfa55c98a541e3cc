//! Binary entrypoint for the backdrop preview.
//!
//! Delegates all logic to the library crate; no local modules here.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use lure_backdrop::config::Settings;
use lure_backdrop::palette::ImageRef;
use lure_backdrop::palette::cache::PaletteCache;
use lure_backdrop::palette::extract::Extractor;
use lure_backdrop::render::surface::GradientSurface;
use lure_backdrop::render::viewer;
use lure_backdrop::tasks::{animate, extract};
use lure_backdrop::tuning::TuningHandle;

/// Simple CLI
#[derive(Debug, Parser)]
#[command(
    name = "lure-backdrop",
    about = "Animated gradient backdrop for product images"
)]
struct Cli {
    /// Product image to extract a palette from
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Path to YAML settings; built-in defaults apply when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Render this many frames without a window, then exit
    #[arg(long, value_name = "FRAMES")]
    headless_frames: Option<u32>,

    /// With --headless-frames, write the final frame to this PNG
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Headless surface width in pixels
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Headless surface height in pixels
    #[arg(long, default_value_t = 360)]
    height: u32,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("lure_backdrop={level}").parse()?)
        .add_directive("wgpu=warn".parse()?)
        .add_directive("winit=warn".parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let settings = Settings::load_or_default(cli.config.as_deref())?;
    settings.validate().context("validating settings")?;
    info!(
        frame_time = %humantime::format_duration(settings.target_frame_time),
        cache = settings.cache_capacity,
        "settings loaded"
    );

    let extractor = Arc::new(Extractor::new(
        PaletteCache::new(settings.cache_capacity),
        settings.fallback_image.clone(),
    ));
    let (tuning, tuning_rx) = TuningHandle::new(settings.tuning);
    let (request_tx, request_rx) = mpsc::channel::<extract::ExtractRequest>(8);
    let (updates_tx, updates_rx) = watch::channel(extract::PaletteState::default());
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received; shutting down");
                cancel.cancel();
            }
        });
    }

    let mut tasks = JoinSet::new();
    tasks.spawn({
        let extractor = Arc::clone(&extractor);
        let tuning_rx = tuning_rx.clone();
        let cancel = cancel.clone();
        let params = settings.extraction;
        async move {
            extract::run(extractor, request_rx, updates_tx, tuning_rx, params, cancel)
                .await
                .context("extraction task failed")
        }
    });

    let image = ImageRef::new(cli.image.clone());

    let outcome = if let Some(frames) = cli.headless_frames {
        run_headless(
            image,
            frames,
            cli.width,
            cli.height,
            settings.target_frame_time,
            request_tx.clone(),
            updates_rx.clone(),
            &tuning,
            cancel.clone(),
            cli.snapshot.clone(),
        )
        .await
    } else {
        // Bridge the watch channel into the winit loop.
        let (bridge_tx, bridge_rx) = crossbeam_channel::unbounded();
        tasks.spawn({
            let cancel = cancel.clone();
            let mut updates_rx = updates_rx.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        changed = updates_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let state = updates_rx.borrow_and_update().clone();
                            if bridge_tx.send(state).is_err() {
                                break;
                            }
                        }
                    }
                }
                Ok(())
            }
        });

        viewer::run_preview(
            image,
            bridge_rx,
            request_tx.clone(),
            tuning.clone(),
            cancel.clone(),
        )
        .context("preview failed")
    };

    cancel.cancel();
    drop(request_tx);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("task exited with error: {err:#}"),
            Err(err) => warn!("task panicked: {err}"),
        }
    }

    outcome
}

/// Drive the CPU surface for a fixed number of frames; handy on machines
/// without a display and for smoke-testing the whole pipeline.
#[allow(clippy::too_many_arguments)]
async fn run_headless(
    image: ImageRef,
    frames: u32,
    width: u32,
    height: u32,
    frame_interval: Duration,
    request_tx: mpsc::Sender<extract::ExtractRequest>,
    mut updates_rx: watch::Receiver<extract::PaletteState>,
    tuning: &TuningHandle,
    cancel: CancellationToken,
    snapshot: Option<PathBuf>,
) -> Result<()> {
    request_tx
        .send(extract::ExtractRequest(image))
        .await
        .context("extraction task is gone")?;

    tokio::time::timeout(Duration::from_secs(30), updates_rx.changed())
        .await
        .context("timed out waiting for the palette")?
        .context("extraction task ended before delivering a palette")?;
    let state = updates_rx.borrow_and_update().clone();

    if let Some(err) = state.error {
        bail!("extraction failed: {err}");
    }
    let Some(palette) = state.palette else {
        info!("placeholder image: static backdrop, nothing to animate");
        return Ok(());
    };
    for entry in &palette {
        info!(
            rgb = ?entry.base_rgb,
            weight = entry.weight,
            neutral = entry.is_neutral,
            "palette entry"
        );
    }

    let surface = Arc::new(Mutex::new(GradientSurface::new(
        &palette,
        width,
        height,
        &tuning.current(),
    )?));
    let animator = tokio::spawn(animate::run(
        Arc::clone(&surface),
        frame_interval,
        tuning.subscribe(),
        cancel.clone(),
    ));

    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(frame_interval * frames.max(1)) => {}
    }

    // Grab the last frame before the animator disposes the surface.
    let (frame, elapsed, dims) = {
        let guard = surface.lock().unwrap_or_else(|p| p.into_inner());
        (
            guard.frame().map(<[u8]>::to_vec),
            guard.time(),
            guard.dimensions(),
        )
    };
    cancel.cancel();
    animator.await.context("animator panicked")??;
    info!(seconds = elapsed, "headless animation finished");

    if let Some(path) = snapshot {
        let Some(frame) = frame else {
            bail!("no frame was rendered; nothing to snapshot");
        };
        image::save_buffer(&path, &frame, dims.0, dims.1, image::ExtendedColorType::Rgba8)
            .with_context(|| format!("writing snapshot to {}", path.display()))?;
        info!("wrote snapshot to {}", path.display());
    }
    Ok(())
}
