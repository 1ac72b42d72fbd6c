//! Wide-FOV camera recording.
//!
//! Captures frames from a wide-angle camera in its widest field of view,
//! extracts the camera intrinsics from the frame stream, and writes the frames
//! to an HEVC movie tagged with lens-calibration metadata.

pub mod calibration;
pub mod capture;
pub mod commands;
pub mod encoder;
pub mod library;
pub mod recorder;
pub mod utils;

pub use capture::{CaptureFrameRouter, CaptureSession, FormatSelector};
pub use recorder::{RecordingConfig, RecordingStateMachine};
pub use utils::{AppError, AppResult, ErrorResponse};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the tracing subscriber. Does nothing if one is already set.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "widefov_capture=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    tracing::debug!("widefov-capture v{}", env!("CARGO_PKG_VERSION"));
}
