//! Frame sampler: every-Nth analysis policy over an abstract frame source.

use crate::camera::CameraError;
use crate::frame::{self, Frame, FrameError};
use thiserror::Error;

/// Source of grayscale frames.
///
/// `Ok(None)` signals end-of-stream. The live camera stream never ends on
/// its own; scripted sources in tests do.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError>;
}

#[derive(Error, Debug)]
pub enum SampleError {
    #[error(transparent)]
    Source(#[from] CameraError),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Downscaled copy of a frame, sized for detection.
pub struct AnalysisImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// A delivered frame. Every source frame passes through; only frames
/// selected by the every-Nth policy carry an analysis image, and only those
/// reach the matcher.
pub struct SampledFrame {
    pub frame: Frame,
    pub analysis: Option<AnalysisImage>,
}

/// Applies the skip policy and downscaling that bound per-frame CPU cost.
pub struct FrameSampler<S: FrameSource> {
    source: S,
    detect_every: u64,
    scale: f32,
    seen: u64,
}

impl<S: FrameSource> FrameSampler<S> {
    pub fn new(source: S, detect_every: u64, scale: f32) -> Result<Self, FrameError> {
        if detect_every < 1 {
            return Err(FrameError::InvalidInterval);
        }
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(FrameError::InvalidScale(scale));
        }
        Ok(Self {
            source,
            detect_every,
            scale,
            seen: 0,
        })
    }

    /// Pull the next frame. The first frame is always selected for
    /// analysis, then every `detect_every`-th after it.
    pub fn next(&mut self) -> Result<Option<SampledFrame>, SampleError> {
        let Some(frame) = self.source.next_frame()? else {
            return Ok(None);
        };

        let selected = self.seen % self.detect_every == 0;
        self.seen += 1;

        let analysis = if selected {
            let (data, width, height) =
                frame::downscale(&frame.data, frame.width, frame.height, self.scale)?;
            Some(AnalysisImage {
                data,
                width,
                height,
            })
        } else {
            None
        };

        Ok(Some(SampledFrame { frame, analysis }))
    }

    /// Frames delivered so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct FakeSource {
        frames: VecDeque<Frame>,
    }

    impl FakeSource {
        fn with_frames(count: usize, width: u32, height: u32) -> Self {
            let frames = (0..count)
                .map(|i| Frame {
                    data: vec![100u8; (width * height) as usize],
                    width,
                    height,
                    timestamp: std::time::Instant::now(),
                    sequence: i as u32,
                })
                .collect();
            Self { frames }
        }
    }

    impl FrameSource for FakeSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
            Ok(self.frames.pop_front())
        }
    }

    #[test]
    fn test_every_frame_delivered() {
        let mut sampler = FrameSampler::new(FakeSource::with_frames(6, 8, 8), 3, 1.0).unwrap();
        let mut delivered = 0;
        while let Some(_) = sampler.next().unwrap() {
            delivered += 1;
        }
        assert_eq!(delivered, 6);
    }

    #[test]
    fn test_analysis_cadence() {
        let mut sampler = FrameSampler::new(FakeSource::with_frames(7, 8, 8), 3, 1.0).unwrap();
        let mut analyzed = Vec::new();
        let mut i = 0;
        while let Some(sampled) = sampler.next().unwrap() {
            if sampled.analysis.is_some() {
                analyzed.push(i);
            }
            i += 1;
        }
        assert_eq!(analyzed, vec![0, 3, 6]);
    }

    #[test]
    fn test_interval_one_analyzes_everything() {
        let mut sampler = FrameSampler::new(FakeSource::with_frames(4, 8, 8), 1, 1.0).unwrap();
        while let Some(sampled) = sampler.next().unwrap() {
            assert!(sampled.analysis.is_some());
        }
    }

    #[test]
    fn test_analysis_is_downscaled() {
        let mut sampler = FrameSampler::new(FakeSource::with_frames(1, 100, 80), 1, 0.25).unwrap();
        let sampled = sampler.next().unwrap().unwrap();
        let analysis = sampled.analysis.unwrap();
        assert_eq!((analysis.width, analysis.height), (25, 20));
        // The delivered frame keeps its native resolution.
        assert_eq!((sampled.frame.width, sampled.frame.height), (100, 80));
    }

    #[test]
    fn test_end_of_stream() {
        let mut sampler = FrameSampler::new(FakeSource::with_frames(0, 8, 8), 1, 1.0).unwrap();
        assert!(sampler.next().unwrap().is_none());
    }

    #[test]
    fn test_rejects_zero_interval() {
        assert!(matches!(
            FrameSampler::new(FakeSource::with_frames(0, 8, 8), 0, 1.0),
            Err(FrameError::InvalidInterval)
        ));
    }

    #[test]
    fn test_rejects_bad_scale() {
        assert!(matches!(
            FrameSampler::new(FakeSource::with_frames(0, 8, 8), 1, 0.0),
            Err(FrameError::InvalidScale(_))
        ));
    }
}
