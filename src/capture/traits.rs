//! Capture trait definitions
//!
//! Types exchanged with the camera collaborator, and the traits it is driven
//! through. The camera itself lives outside this crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::recorder::SessionPreset;

/// Pixel encoding identified by a four-character code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelEncoding(pub u32);

impl PixelEncoding {
    /// 32-bit BGRA, the working format of the capture output
    pub const BGRA: PixelEncoding = PixelEncoding::from_fourcc(*b"BGRA");

    /// Bi-planar 4:2:0 video range ('420v')
    pub const YUV420_VIDEO_RANGE: PixelEncoding = PixelEncoding::from_fourcc(*b"420v");

    /// Bi-planar 4:2:0 full range ('420f')
    pub const YUV420_FULL_RANGE: PixelEncoding = PixelEncoding::from_fourcc(*b"420f");

    pub const fn from_fourcc(code: [u8; 4]) -> Self {
        PixelEncoding(u32::from_be_bytes(code))
    }

    pub fn fourcc(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.fourcc() {
            let c = if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '?'
            };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// A capture format offered by the camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureFormat {
    /// Horizontal field of view in degrees
    pub field_of_view_degrees: f32,

    /// Width in pixels
    pub pixel_width: u32,

    /// Height in pixels
    pub pixel_height: u32,

    /// Native pixel encoding
    pub pixel_encoding: PixelEncoding,

    /// Highest frame rate any of the format's ranges supports
    pub max_frame_rate: f64,

    /// Whether standard video stabilization is available
    pub supports_stabilization: bool,
}

/// One frame pushed by the camera
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    /// Pixel data in the capture output's working format
    pub data: Arc<[u8]>,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Presentation timestamp on the device clock
    pub pts: Duration,

    /// Frame duration
    pub duration: Duration,

    /// Raw intrinsic-matrix attachment, if the camera delivered one
    pub intrinsic_attachment: Option<Vec<u8>>,
}

/// Receiver of camera frames.
///
/// Called from the camera's delivery context, one frame at a time.
pub trait FrameHandler: Send + Sync {
    fn on_frame(&self, frame: &CaptureFrame);
}

/// The physical camera, as far as session setup needs it.
pub trait CameraDevice: Send {
    fn set_session_preset(&mut self, preset: SessionPreset) -> CaptureResult<()>;

    /// Formats the device can be switched to, in device enumeration order
    fn formats(&self) -> Vec<CaptureFormat>;

    fn set_active_format(&mut self, format: &CaptureFormat) -> CaptureResult<()>;

    /// Zoom out to the widest field of view the device allows
    fn set_min_zoom(&mut self) -> CaptureResult<()>;

    fn set_geometric_distortion_correction(&mut self, enabled: bool) -> CaptureResult<()>;

    /// Ask the device to attach intrinsic matrices to delivered frames
    fn enable_intrinsics_delivery(&mut self) -> CaptureResult<()>;

    fn set_output_pixel_format(&mut self, encoding: PixelEncoding) -> CaptureResult<()>;

    fn set_frame_handler(&mut self, handler: Arc<dyn FrameHandler>) -> CaptureResult<()>;

    fn start_streaming(&mut self) -> CaptureResult<()>;

    fn stop_streaming(&mut self) -> CaptureResult<()>;

    fn is_streaming(&self) -> bool;
}

/// Capture setup errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera not available: {0}")]
    DeviceUnavailable(String),

    #[error("Configuration rejected: {0}")]
    Configuration(String),

    #[error("No capture formats offered")]
    NoFormats,

    #[error("Streaming error: {0}")]
    Streaming(String),
}

pub type CaptureResult<T> = Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_values() {
        assert_eq!(PixelEncoding::YUV420_VIDEO_RANGE.0, 875704438);
        assert_eq!(PixelEncoding::BGRA.to_string(), "BGRA");
        assert_eq!(PixelEncoding::YUV420_FULL_RANGE.to_string(), "420f");
        assert_eq!(PixelEncoding(0x0000_4142).to_string(), "??AB");
    }
}
