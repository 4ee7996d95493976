//! rollcall-hw — camera capture and frame sampling.
//!
//! V4L2-based camera access plus the sampling policy (every-Nth analysis,
//! downscaling) that bounds per-frame processing cost.

pub mod camera;
pub mod frame;
pub mod sampler;

pub use camera::{Camera, CameraError, DeviceInfo, FrameStream};
pub use frame::{Frame, FrameError};
pub use sampler::{AnalysisImage, FrameSampler, FrameSource, SampleError, SampledFrame};
