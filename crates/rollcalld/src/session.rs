//! The recognition loop: sample frames, match faces, gate through the
//! session ledger, append to the attendance sheet.
//!
//! Single-threaded and cooperative: acquisition, detection, matching, and
//! logging run sequentially on the loop thread, so the store, ledger, and
//! sheet need no locking. The periodic flush is a wall-clock check inside
//! the loop, never a timer thread, and the stop flag is consulted once per
//! iteration.

use crate::ledger::SessionLedger;
use crate::sheet::AttendanceSheet;
use chrono::Local;
use rollcall_core::{DescriptorStore, FaceEngine, Matcher, NearestMatcher};
use rollcall_hw::{AnalysisImage, CameraError, FrameError, FrameSampler, FrameSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;

/// After this many consecutive read failures the source is considered
/// gone and the session ends like end-of-stream.
const MAX_CONSECUTIVE_READ_FAILURES: u32 = 30;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("sampler error: {0}")]
    Sampler(#[from] FrameError),
}

/// Per-session tuning, taken from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub detect_every: u64,
    pub frame_scale: f32,
    pub tolerance: f32,
    pub flush_interval: Duration,
}

#[derive(Debug)]
pub struct SessionSummary {
    pub frames_seen: u64,
    pub frames_analyzed: u64,
    pub recorded: usize,
}

/// Run the recognition loop until the source ends or `stop` is raised.
///
/// Per-frame failures are contained: a read, detect, or encode error skips
/// the frame and the loop continues. The shutdown flush runs on every exit
/// path; its failure is surfaced but never turned into an error.
pub fn run_session<S: FrameSource, E: FaceEngine>(
    source: S,
    engine: &mut E,
    store: &DescriptorStore,
    sheet: &mut AttendanceSheet,
    options: &SessionOptions,
    stop: &AtomicBool,
) -> Result<SessionSummary, SessionError> {
    let mut sampler = FrameSampler::new(source, options.detect_every, options.frame_scale)
        .map_err(SessionError::Sampler)?;
    let matcher = NearestMatcher;
    let mut ledger = SessionLedger::default();
    let mut frames_analyzed = 0u64;
    let mut read_failures = 0u32;
    let mut last_flush = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        let sampled = match sampler.next() {
            Ok(Some(sampled)) => {
                read_failures = 0;
                sampled
            }
            Ok(None) => {
                tracing::info!("frame source ended");
                break;
            }
            Err(error) => {
                read_failures += 1;
                tracing::warn!(%error, consecutive = read_failures, "frame read failed; skipping");
                if read_failures >= MAX_CONSECUTIVE_READ_FAILURES {
                    tracing::error!("frame source unresponsive; ending session");
                    break;
                }
                continue;
            }
        };

        if let Some(analysis) = &sampled.analysis {
            frames_analyzed += 1;
            process_analysis(
                engine,
                store,
                &matcher,
                analysis,
                sampled.frame.sequence,
                options.tolerance,
                &mut ledger,
                sheet,
            );
        }

        if last_flush.elapsed() >= options.flush_interval {
            if let Err(error) = sheet.flush() {
                tracing::warn!(%error, "periodic flush failed; records retained in memory");
            }
            last_flush = Instant::now();
        }
    }

    // Mandatory shutdown flush, on every exit path including interrupt.
    if let Err(error) = sheet.flush() {
        tracing::error!(%error, "final flush failed; session records may be incomplete");
    }

    Ok(SessionSummary {
        frames_seen: sampler.seen(),
        frames_analyzed,
        recorded: ledger.len(),
    })
}

/// Match every face in one analysis image and record first sightings.
#[allow(clippy::too_many_arguments)]
fn process_analysis<E: FaceEngine>(
    engine: &mut E,
    store: &DescriptorStore,
    matcher: &NearestMatcher,
    analysis: &AnalysisImage,
    sequence: u32,
    tolerance: f32,
    ledger: &mut SessionLedger,
    sheet: &mut AttendanceSheet,
) {
    let regions = match engine.locate(&analysis.data, analysis.width, analysis.height) {
        Ok(regions) => regions,
        Err(error) => {
            tracing::warn!(%error, frame = sequence, "face detection failed; frame skipped");
            return;
        }
    };

    for region in &regions {
        let descriptor =
            match engine.descriptor(&analysis.data, analysis.width, analysis.height, region) {
                Ok(descriptor) => descriptor,
                Err(error) => {
                    tracing::warn!(%error, frame = sequence, "descriptor encoding failed; detection skipped");
                    continue;
                }
            };

        let Some(hit) = matcher.nearest(&descriptor, store.entries(), tolerance) else {
            tracing::debug!(frame = sequence, "unrecognized face");
            continue;
        };

        if ledger.try_record(&hit.identity.name) {
            let record = sheet.mark(&hit.identity, Local::now());
            tracing::info!(
                name = %hit.identity.name,
                roll = ?hit.identity.roll_number,
                distance = hit.distance,
                record,
                "attendance recorded"
            );
        } else {
            tracing::debug!(name = %hit.identity.name, "already recorded this session");
        }
    }
}
