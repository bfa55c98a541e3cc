//! Frame ticker for a headless gradient surface.
//!
//! Drives `GradientSurface::tick` on an interval, applies tuning updates on
//! the next frame, and disposes the surface when cancelled so no callback
//! ever fires after teardown.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::select;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::render::surface::{GradientSurface, SurfaceState};
use crate::tuning::TuningParams;

fn lock(surface: &Arc<Mutex<GradientSurface>>) -> MutexGuard<'_, GradientSurface> {
    surface.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Tick `surface` every `frame_interval` until cancelled (or the surface is
/// disposed underneath us). The surface is disposed on the way out.
pub async fn run(
    surface: Arc<Mutex<GradientSurface>>,
    frame_interval: Duration,
    mut tuning: watch::Receiver<TuningParams>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(frame_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();
    let mut tuning_open = true;

    loop {
        select! {
            _ = cancel.cancelled() => break,

            changed = tuning.changed(), if tuning_open => {
                match changed {
                    Ok(()) => {
                        let params = *tuning.borrow_and_update();
                        lock(&surface).set_tuning(&params);
                    }
                    // Sender gone: freeze the current parameters.
                    Err(_) => tuning_open = false,
                }
            }

            _ = ticker.tick() => {
                let now = Instant::now();
                let delta = now - last;
                last = now;
                let mut guard = lock(&surface);
                if guard.state() == SurfaceState::Disposed {
                    return Ok(());
                }
                guard.tick(delta);
            }
        }
    }

    lock(&surface).dispose();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::ExtractedColor;
    use crate::tuning::TuningHandle;

    fn test_surface() -> GradientSurface {
        let entry = |rgb, weight| ExtractedColor {
            base_rgb: rgb,
            weight,
            score: 0.0,
            is_neutral: false,
        };
        let palette = [
            entry([1.0, 1.0, 1.0], 0.25),
            entry([0.9, 0.3, 0.2], 0.25),
            entry([0.2, 0.5, 0.9], 0.25),
            entry([0.1, 0.1, 0.2], 0.25),
        ];
        GradientSurface::new(&palette, 8, 8, &TuningParams::default()).unwrap()
    }

    #[tokio::test]
    async fn renders_until_cancelled_then_disposes() {
        let surface = Arc::new(Mutex::new(test_surface()));
        let (handle, tuning_rx) = TuningHandle::new(TuningParams::default());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(
            Arc::clone(&surface),
            Duration::from_millis(5),
            tuning_rx,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(lock(&surface).frame().is_some());
        assert!(lock(&surface).time() > 0.0);

        handle.update(|p| p.lightness = 0.4);
        tokio::time::sleep(Duration::from_millis(30)).await;

        cancel.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(lock(&surface).state(), SurfaceState::Disposed);

        // No further frames are produced after teardown.
        assert!(lock(&surface).tick(Duration::from_millis(5)).is_none());
    }

    #[tokio::test]
    async fn stops_when_surface_is_disposed_externally() {
        let surface = Arc::new(Mutex::new(test_surface()));
        let (_handle, tuning_rx) = TuningHandle::new(TuningParams::default());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(
            Arc::clone(&surface),
            Duration::from_millis(5),
            tuning_rx,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        lock(&surface).dispose();
        task.await.unwrap().unwrap();
    }
}
