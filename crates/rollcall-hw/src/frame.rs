//! Frame type, YUYV conversion, and downscaling.

use thiserror::Error;

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame buffer too short: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("downscale factor must be in (0, 1], got {0}")]
    InvalidScale(f32),
    #[error("analysis interval must be at least 1")]
    InvalidInterval,
}

/// Extract the Y channel from packed YUYV 4:2:2 data.
///
/// Four bytes encode two pixels as [Y0, U, Y1, V]; luma is every even byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].chunks_exact(2).map(|pair| pair[0]).collect())
}

/// Downscale a grayscale frame by `factor` using nearest-neighbor sampling.
///
/// Returns the scaled pixels and their dimensions. Trades recognition
/// recall for detection throughput; 0.25 is the default operating point.
pub fn downscale(
    gray: &[u8],
    width: u32,
    height: u32,
    factor: f32,
) -> Result<(Vec<u8>, u32, u32), FrameError> {
    if !(factor > 0.0 && factor <= 1.0) {
        return Err(FrameError::InvalidScale(factor));
    }
    let expected = (width * height) as usize;
    if gray.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: gray.len(),
        });
    }

    let out_w = ((width as f32 * factor).round() as u32).max(1).min(width);
    let out_h = ((height as f32 * factor).round() as u32).max(1).min(height);

    let mut out = Vec::with_capacity((out_w * out_h) as usize);
    for y in 0..out_h {
        let sy = ((y as f32 / factor) as u32).min(height - 1);
        for x in 0..out_w {
            let sx = ((x as f32 / factor) as u32).min(width - 1);
            out.push(gray[(sy * width + sx) as usize]);
        }
    }
    Ok((out, out_w, out_h))
}
