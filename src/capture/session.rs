//! Capture session setup
//!
//! Configures the camera for wide-FOV recording. Setup is best effort: a step
//! the device rejects is logged and recorded in the `SetupReport`, and the
//! remaining steps still run.

use std::fmt;
use std::sync::Arc;

use super::format::FormatSelector;
use super::router::CaptureFrameRouter;
use super::traits::{CameraDevice, CaptureFormat, CaptureResult, FrameHandler};
use crate::recorder::{RecordingConfig, RecordingStateMachine};

/// A setup step that can fail independently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    SessionPreset,
    OutputPixelFormat,
    FrameHandler,
    IntrinsicsDelivery,
    DistortionCorrection,
    Zoom,
    ActiveFormat,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupStep::SessionPreset => "session preset",
            SetupStep::OutputPixelFormat => "output pixel format",
            SetupStep::FrameHandler => "frame handler",
            SetupStep::IntrinsicsDelivery => "intrinsics delivery",
            SetupStep::DistortionCorrection => "distortion correction",
            SetupStep::Zoom => "zoom",
            SetupStep::ActiveFormat => "active format",
        };
        f.write_str(name)
    }
}

/// Outcome of session setup
#[derive(Debug, Clone, Default)]
pub struct SetupReport {
    /// Format the device was switched to, if any
    pub selected_format: Option<CaptureFormat>,
    pub failed_steps: Vec<(SetupStep, String)>,
}

impl SetupReport {
    pub fn is_degraded(&self) -> bool {
        !self.failed_steps.is_empty()
    }

    pub fn failed(&self, step: SetupStep) -> bool {
        self.failed_steps.iter().any(|(s, _)| *s == step)
    }

    fn record(&mut self, step: SetupStep, result: CaptureResult<()>) {
        if let Err(e) = result {
            tracing::warn!("Capture setup: {} failed: {}", step, e);
            self.failed_steps.push((step, e.to_string()));
        }
    }
}

/// A configured camera
pub struct CaptureSession {
    camera: Box<dyn CameraDevice>,
    report: SetupReport,
}

impl CaptureSession {
    /// Configure `camera` to deliver BGRA frames with intrinsics to `handler`
    /// in its widest-FOV format.
    pub fn configure(
        mut camera: Box<dyn CameraDevice>,
        config: &RecordingConfig,
        handler: Arc<dyn FrameHandler>,
    ) -> Self {
        let mut report = SetupReport::default();

        report.record(
            SetupStep::SessionPreset,
            camera.set_session_preset(config.session_preset),
        );
        report.record(
            SetupStep::OutputPixelFormat,
            camera.set_output_pixel_format(config.working_pixel_format),
        );
        report.record(SetupStep::FrameHandler, camera.set_frame_handler(handler));
        report.record(
            SetupStep::IntrinsicsDelivery,
            camera.enable_intrinsics_delivery(),
        );
        report.record(
            SetupStep::DistortionCorrection,
            camera.set_geometric_distortion_correction(true),
        );
        report.record(SetupStep::Zoom, camera.set_min_zoom());

        let selector =
            FormatSelector::new(config.preferred_capture_encoding, config.format_tie_break);
        let formats = camera.formats();
        match selector.select(&formats) {
            Some(format) => match camera.set_active_format(format) {
                Ok(()) => {
                    tracing::info!(
                        "Active format: {}x{} {} {:.1}° @ {}fps",
                        format.pixel_width,
                        format.pixel_height,
                        format.pixel_encoding,
                        format.field_of_view_degrees,
                        format.max_frame_rate
                    );
                    report.selected_format = Some(format.clone());
                }
                Err(e) => report.record(SetupStep::ActiveFormat, Err(e)),
            },
            None => tracing::warn!("Camera offers no formats, keeping its current one"),
        }

        Self { camera, report }
    }

    /// Configure `camera` to feed `recorder` through a `CaptureFrameRouter`.
    pub fn for_recorder(
        camera: Box<dyn CameraDevice>,
        recorder: Arc<RecordingStateMachine>,
    ) -> Self {
        let router = Arc::new(CaptureFrameRouter::new(recorder.clone()));
        let session = Self::configure(camera, recorder.config(), router);
        if let Some(format) = &session.report.selected_format {
            recorder.set_active_format(format);
        }
        session
    }

    pub fn report(&self) -> &SetupReport {
        &self.report
    }

    pub fn is_running(&self) -> bool {
        self.camera.is_streaming()
    }

    pub fn start(&mut self) -> CaptureResult<()> {
        if !self.camera.is_streaming() {
            self.camera.start_streaming()?;
            tracing::info!("Capture session started");
        }
        Ok(())
    }

    pub fn stop(&mut self) -> CaptureResult<()> {
        if self.camera.is_streaming() {
            self.camera.stop_streaming()?;
            tracing::info!("Capture session stopped");
        }
        Ok(())
    }
}
