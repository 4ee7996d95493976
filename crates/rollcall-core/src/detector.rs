//! ONNX face detector.
//!
//! Anchor-free multi-stride decoding (SCRFD-style detection models) with
//! NMS post-processing. Landmark outputs, if the model has any, are ignored:
//! the encoder works on plain region crops.

use crate::types::FaceRegion;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const DETECT_INPUT_SIZE: usize = 640;
const DETECT_MEAN: f32 = 127.5;
const DETECT_STD: f32 = 128.0;
const DETECT_SCORE_THRESHOLD: f32 = 0.5;
const DETECT_NMS_IOU: f32 = 0.4;
const DETECT_STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detection model not found: {0}")]
    ModelNotFound(String),
    #[error("detection inference failed: {0}")]
    Inference(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Face detector over a grayscale frame.
pub struct FaceDetector {
    session: Session,
    input_size: usize,
}

impl FaceDetector {
    /// Load the detection ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        tracing::info!(path = model_path, outputs = num_outputs, "loaded detection model");

        // Outputs are taken positionally: [0..3) = scores per stride,
        // [3..6) = box offsets per stride. Landmark tensors beyond index 5
        // are ignored.
        if num_outputs < 2 * DETECT_STRIDES.len() {
            return Err(DetectorError::Inference(format!(
                "model exports {num_outputs} outputs, need at least {}",
                2 * DETECT_STRIDES.len()
            )));
        }

        Ok(Self {
            session,
            input_size: DETECT_INPUT_SIZE,
        })
    }

    /// Detect faces in a grayscale frame.
    ///
    /// Returns regions in frame coordinates, sorted by descending confidence.
    pub fn detect(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceRegion>, DetectorError> {
        let (input, scale) = preprocess(gray, width as usize, height as usize, self.input_size);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (pos, &stride) in DETECT_STRIDES.iter().enumerate() {
            let (_, scores) = outputs[pos]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::Inference(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[DETECT_STRIDES.len() + pos]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::Inference(format!("boxes stride {stride}: {e}")))?;

            decode_stride(
                scores,
                boxes,
                stride,
                self.input_size,
                scale,
                DETECT_SCORE_THRESHOLD,
                &mut candidates,
            );
        }

        let mut kept = nms(candidates, DETECT_NMS_IOU);
        kept.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(kept)
    }
}

/// Resize a grayscale frame into the square model input and normalize.
///
/// The frame is scaled to fit (nearest-neighbor), anchored top-left; the
/// remainder is padded with the mean so it normalizes to zero. Returns the
/// NCHW tensor and the applied scale, which callers divide by to map model
/// coordinates back to frame coordinates.
fn preprocess(gray: &[u8], width: usize, height: usize, input: usize) -> (Array4<f32>, f32) {
    let scale = input as f32 / width.max(height).max(1) as f32;
    let fit_w = ((width as f32 * scale) as usize).min(input);
    let fit_h = ((height as f32 * scale) as usize).min(input);

    let mut tensor = Array4::<f32>::zeros((1, 3, input, input));
    for y in 0..input {
        for x in 0..input {
            let pixel = if x < fit_w && y < fit_h {
                let sx = ((x as f32 / scale) as usize).min(width.saturating_sub(1));
                let sy = ((y as f32 / scale) as usize).min(height.saturating_sub(1));
                gray.get(sy * width + sx).copied().unwrap_or(0) as f32
            } else {
                DETECT_MEAN
            };
            let v = (pixel - DETECT_MEAN) / DETECT_STD;
            tensor[[0, 0, y, x]] = v;
            tensor[[0, 1, y, x]] = v;
            tensor[[0, 2, y, x]] = v;
        }
    }

    (tensor, scale)
}

/// Decode one stride level into `out`, mapping back to frame coordinates.
fn decode_stride(
    scores: &[f32],
    boxes: &[f32],
    stride: usize,
    input: usize,
    scale: f32,
    threshold: f32,
    out: &mut Vec<FaceRegion>,
) {
    let grid = input / stride;
    let anchors = grid * grid * ANCHORS_PER_CELL;

    for idx in 0..anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }
        let Some(offsets) = boxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / ANCHORS_PER_CELL;
        let cx = ((cell % grid) * stride) as f32;
        let cy = ((cell / grid) * stride) as f32;

        // Offsets are distances from the anchor center to the four edges,
        // in stride units.
        let x1 = (cx - offsets[0] * stride as f32) / scale;
        let y1 = (cy - offsets[1] * stride as f32) / scale;
        let x2 = (cx + offsets[2] * stride as f32) / scale;
        let y2 = (cy + offsets[3] * stride as f32) / scale;

        out.push(FaceRegion {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
        });
    }
}

/// Non-maximum suppression: keep the highest-confidence region of each
/// overlapping cluster.
fn nms(mut candidates: Vec<FaceRegion>, iou_threshold: f32) -> Vec<FaceRegion> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<FaceRegion> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Intersection-over-union of two regions.
fn iou(a: &FaceRegion, b: &FaceRegion) -> f32 {
    let ix = (a.x + a.width).min(b.x + b.width) - a.x.max(b.x);
    let iy = (a.y + a.height).min(b.y + b.height) - a.y.max(b.y);
    let inter = ix.max(0.0) * iy.max(0.0);
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
