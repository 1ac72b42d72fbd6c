//! Frame router
//!
//! Entry point for camera frames: caches the camera intrinsics from the first
//! frame that carries a usable attachment, then hands every frame to the
//! recorder.

use std::sync::Arc;

use super::traits::{CaptureFrame, FrameHandler};
use crate::calibration::{ImageDimensions, IntrinsicMatrix};
use crate::recorder::RecordingStateMachine;

pub struct CaptureFrameRouter {
    recorder: Arc<RecordingStateMachine>,
}

impl CaptureFrameRouter {
    pub fn new(recorder: Arc<RecordingStateMachine>) -> Self {
        Self { recorder }
    }

    pub fn recorder(&self) -> &Arc<RecordingStateMachine> {
        &self.recorder
    }

    fn try_calibrate(&self, frame: &CaptureFrame) {
        let Some(matrix) = frame
            .intrinsic_attachment
            .as_deref()
            .and_then(IntrinsicMatrix::from_attachment)
        else {
            return;
        };
        let dims = ImageDimensions::new(frame.width, frame.height);

        if self.recorder.cache_calibration(matrix, dims) {
            tracing::info!(
                "Camera intrinsics cached: fx={} fy={} cx={} cy={} ({}x{}), HFOV {:.2}°, VFOV {:.2}°",
                matrix.fx(),
                matrix.fy(),
                matrix.cx(),
                matrix.cy(),
                dims.width,
                dims.height,
                matrix.horizontal_fov_degrees(dims.width),
                matrix.vertical_fov_degrees(dims.height)
            );
        }
    }
}

impl FrameHandler for CaptureFrameRouter {
    fn on_frame(&self, frame: &CaptureFrame) {
        if !self.recorder.is_calibrated() {
            self.try_calibrate(frame);
        }
        self.recorder.process_frame(frame);
    }
}
