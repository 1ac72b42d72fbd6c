//! Camera capture
//!
//! Types exchanged with the camera, format selection, session setup, and the
//! router that feeds delivered frames to the recorder.

pub mod format;
pub mod router;
pub mod session;
pub mod traits;

pub use format::{FormatSelector, TieBreak};
pub use router::CaptureFrameRouter;
pub use session::{CaptureSession, SetupReport, SetupStep};
pub use traits::{
    CameraDevice, CaptureError, CaptureFormat, CaptureFrame, CaptureResult, FrameHandler,
    PixelEncoding,
};
