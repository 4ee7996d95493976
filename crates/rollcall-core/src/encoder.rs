//! ONNX face descriptor encoder.
//!
//! Produces L2-normalized 512-dimensional descriptors from a square crop of
//! the detected face region.

use crate::types::{Descriptor, FaceRegion};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ENCODE_INPUT_SIZE: usize = 112;
const ENCODE_MEAN: f32 = 127.5;
const ENCODE_STD: f32 = 127.5;
const DESCRIPTOR_DIM: usize = 512;
/// Crop margin around the detected region, as a fraction of its side.
const CROP_MARGIN: f32 = 0.125;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("encoding model not found: {0}")]
    ModelNotFound(String),
    #[error("encoding inference failed: {0}")]
    Inference(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Descriptor encoder over a face region of a grayscale frame.
pub struct FaceEncoder {
    session: Session,
}

impl FaceEncoder {
    /// Load the embedding ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EncoderError> {
        if !Path::new(model_path).exists() {
            return Err(EncoderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, "loaded encoding model");
        Ok(Self { session })
    }

    /// Compute the descriptor for one detected face region.
    pub fn encode(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
        region: &FaceRegion,
    ) -> Result<Descriptor, EncoderError> {
        let crop = crop_square(gray, width as usize, height as usize, region, ENCODE_INPUT_SIZE);
        let input = to_tensor(&crop, ENCODE_INPUT_SIZE);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::Inference(format!("descriptor extraction: {e}")))?;

        if raw.len() != DESCRIPTOR_DIM {
            return Err(EncoderError::Inference(format!(
                "expected {DESCRIPTOR_DIM}-dim descriptor, got {}",
                raw.len()
            )));
        }

        Ok(Descriptor::new(l2_normalize(raw)))
    }
}

/// Extract a square crop around the region center, with a small margin,
/// resized to `out_size` via nearest-neighbor sampling. Samples outside the
/// frame clamp to the nearest edge pixel.
fn crop_square(
    gray: &[u8],
    width: usize,
    height: usize,
    region: &FaceRegion,
    out_size: usize,
) -> Vec<u8> {
    let side = region.width.max(region.height).max(1.0) * (1.0 + 2.0 * CROP_MARGIN);
    let cx = region.x + region.width / 2.0;
    let cy = region.y + region.height / 2.0;
    let origin_x = cx - side / 2.0;
    let origin_y = cy - side / 2.0;
    let step = side / out_size as f32;

    let mut crop = vec![0u8; out_size * out_size];
    for y in 0..out_size {
        let sy = (origin_y + y as f32 * step).round();
        let sy = (sy.max(0.0) as usize).min(height.saturating_sub(1));
        for x in 0..out_size {
            let sx = (origin_x + x as f32 * step).round();
            let sx = (sx.max(0.0) as usize).min(width.saturating_sub(1));
            crop[y * out_size + x] = gray.get(sy * width + sx).copied().unwrap_or(0);
        }
    }
    crop
}

/// Normalize a square grayscale crop into a NCHW tensor, replicating the
/// single channel into all three.
fn to_tensor(crop: &[u8], size: usize) -> Array4<f32> {
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for y in 0..size {
        for x in 0..size {
            let v = (crop[y * size + x] as f32 - ENCODE_MEAN) / ENCODE_STD;
            tensor[[0, 0, y, x]] = v;
            tensor[[0, 1, y, x]] = v;
            tensor[[0, 2, y, x]] = v;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|v| v / norm).collect()
    } else {
        raw.to_vec()
    }
}
