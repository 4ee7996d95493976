use crate::detector::{DetectorError, FaceDetector};
use crate::encoder::{EncoderError, FaceEncoder};
use crate::types::{Descriptor, FaceRegion};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
}

/// Black-box face engine: locates face regions in a grayscale frame and
/// computes a fixed-length descriptor per region.
///
/// Implementations may be stateful, hence `&mut self`. Production code uses
/// [`OnnxFaceEngine`]; tests substitute scripted stubs.
pub trait FaceEngine {
    fn locate(&mut self, gray: &[u8], width: u32, height: u32)
        -> Result<Vec<FaceRegion>, EngineError>;

    fn descriptor(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
        region: &FaceRegion,
    ) -> Result<Descriptor, EngineError>;
}

/// Detector + encoder pair backed by ONNX Runtime sessions.
pub struct OnnxFaceEngine {
    detector: FaceDetector,
    encoder: FaceEncoder,
}

impl OnnxFaceEngine {
    /// Load both models. Fails fast if either file is missing.
    pub fn load(detector_path: &str, encoder_path: &str) -> Result<Self, EngineError> {
        let detector = FaceDetector::load(detector_path)?;
        let encoder = FaceEncoder::load(encoder_path)?;
        Ok(Self { detector, encoder })
    }
}

impl FaceEngine for OnnxFaceEngine {
    fn locate(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceRegion>, EngineError> {
        Ok(self.detector.detect(gray, width, height)?)
    }

    fn descriptor(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
        region: &FaceRegion,
    ) -> Result<Descriptor, EngineError> {
        Ok(self.encoder.encode(gray, width, height, region)?)
    }
}
