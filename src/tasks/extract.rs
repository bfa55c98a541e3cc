//! Extraction task: serves palette requests, suppressing results that were
//! superseded before they resolved.

use std::sync::Arc;

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::Receiver;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Error;
use crate::palette::extract::Extractor;
use crate::palette::{ExtractionParams, ImageRef, Palette};
use crate::tuning::TuningParams;

/// Ask for a palette for one image.
#[derive(Debug, Clone)]
pub struct ExtractRequest(pub ImageRef);

/// Latest extraction outcome. `palette == None` with `error == None` means
/// the placeholder image (or nothing requested yet): show the static backdrop.
/// Errors cross this boundary as text; they are never thrown at the renderer.
#[derive(Debug, Clone, Default)]
pub struct PaletteState {
    pub image: Option<ImageRef>,
    pub palette: Option<Palette>,
    pub error: Option<String>,
}

/// Run the extraction loop until cancelled or the request channel closes.
///
/// Each request gets a monotonically increasing generation; a result is only
/// published if no newer request has been issued since, so a renderer can
/// never observe a palette from a superseded extraction.
pub async fn run(
    extractor: Arc<Extractor>,
    mut requests: Receiver<ExtractRequest>,
    updates: watch::Sender<PaletteState>,
    tuning: watch::Receiver<TuningParams>,
    params: ExtractionParams,
    cancel: CancellationToken,
) -> Result<()> {
    let mut latest: u64 = 0;
    let mut requests_open = true;
    let mut in_flight: JoinSet<(u64, ImageRef, Result<Option<Palette>, Error>)> = JoinSet::new();

    loop {
        if !requests_open && in_flight.is_empty() {
            break;
        }
        select! {
            _ = cancel.cancelled() => break,

            maybe_req = requests.recv(), if requests_open => {
                let Some(ExtractRequest(image)) = maybe_req else {
                    // Request side closed; drain what is already in flight.
                    requests_open = false;
                    continue;
                };
                latest += 1;
                let generation = latest;
                let extractor = Arc::clone(&extractor);
                let multipliers = tuning.borrow().weight_multipliers;
                in_flight.spawn(async move {
                    let result = extractor.extract(&image, &params, &multipliers).await;
                    (generation, image, result)
                });
            }

            Some(joined) = in_flight.join_next() => {
                let Ok((generation, image, result)) = joined else {
                    warn!("extraction task panicked");
                    continue;
                };
                if generation != latest {
                    debug!(image = %image.path().display(), "dropping stale extraction result");
                    continue;
                }
                let state = match result {
                    Ok(palette) => PaletteState {
                        image: Some(image),
                        palette,
                        error: None,
                    },
                    Err(err) => {
                        warn!(image = %image.path().display(), error = %err, "extraction failed");
                        PaletteState {
                            image: Some(image),
                            palette: None,
                            error: Some(err.to_string()),
                        }
                    }
                };
                if updates.send(state).is_err() {
                    // Nobody is listening anymore.
                    break;
                }
            }
        }
    }

    Ok(())
}
