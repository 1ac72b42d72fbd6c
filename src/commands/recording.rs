//! Recording commands for a host application

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::capture::{CameraDevice, CaptureFormat, CaptureSession};
use crate::encoder::{FfmpegSinkFactory, SinkFactory};
use crate::library::{DirectoryLibrary, MediaLibrary};
use crate::recorder::{RecordingConfig, RecordingState, RecordingStateMachine, RecordingSummary};
use crate::utils::{AppError, AppResult, ErrorResponse};

/// Application state for recording
pub struct RecorderState {
    pub recorder: Arc<RecordingStateMachine>,
    capture: Mutex<Option<CaptureSession>>,
}

impl RecorderState {
    /// Recorder writing through FFmpeg into a directory library
    pub fn new(config: RecordingConfig) -> Self {
        let sinks = Arc::new(FfmpegSinkFactory::new(
            config.ffmpeg_path.clone(),
            config.encoder_queue_depth,
        ));
        let library = Arc::new(DirectoryLibrary::new(config.library_dir.clone()));
        Self::with_parts(config, sinks, library)
    }

    pub fn with_parts(
        config: RecordingConfig,
        sinks: Arc<dyn SinkFactory>,
        library: Arc<dyn MediaLibrary>,
    ) -> Self {
        Self {
            recorder: Arc::new(RecordingStateMachine::new(config, sinks, library)),
            capture: Mutex::new(None),
        }
    }

    pub fn from_config_file(path: &Path) -> Self {
        Self::new(RecordingConfig::load_or_default(path))
    }
}

/// Camera status after attaching
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraStatus {
    pub active_format: Option<CaptureFormat>,
    pub failed_steps: Vec<String>,
    pub streaming: bool,
}

/// Configure a camera for the recorder and start streaming
pub fn attach_camera(
    state: &RecorderState,
    camera: Box<dyn CameraDevice>,
) -> Result<CameraStatus, ErrorResponse> {
    let mut session = CaptureSession::for_recorder(camera, state.recorder.clone());
    session.start().map_err(AppError::from)?;

    let report = session.report();
    let status = CameraStatus {
        active_format: report.selected_format.clone(),
        failed_steps: report
            .failed_steps
            .iter()
            .map(|(step, reason)| format!("{}: {}", step, reason))
            .collect(),
        streaming: session.is_running(),
    };

    if let Some(mut previous) = state.capture.lock().replace(session) {
        if let Err(e) = previous.stop() {
            tracing::warn!("Failed to stop previous camera: {}", e);
        }
    }
    Ok(status)
}

/// Stop streaming and release the camera
pub fn detach_camera(state: &RecorderState) -> Result<(), ErrorResponse> {
    if let Some(mut session) = state.capture.lock().take() {
        session.stop().map_err(AppError::from)?;
    }
    Ok(())
}

/// Start recording
pub fn start_recording(state: &RecorderState) -> Result<(), ErrorResponse> {
    check_can_start(&state.recorder)?;
    if !state.recorder.start_recording() {
        return Err(AppError::Recording("Failed to start recording".to_string()).into());
    }
    Ok(())
}

fn check_can_start(recorder: &RecordingStateMachine) -> AppResult<()> {
    match recorder.state() {
        RecordingState::Idle => Err(AppError::Recording(
            "Camera intrinsics not available yet".to_string(),
        )),
        RecordingState::Recording => Err(AppError::Recording("Already recording".to_string())),
        RecordingState::Armed => Ok(()),
    }
}

/// Stop recording and wait until the movie is finalized and saved
pub async fn stop_recording(state: &RecorderState) -> Result<RecordingSummary, ErrorResponse> {
    let pending = state
        .recorder
        .begin_stop()
        .ok_or_else(|| AppError::Recording("Not recording".to_string()))?;
    let summary = pending.summary();
    pending.finish().await;
    Ok(summary)
}

/// Get current recording state
pub fn get_recording_state(state: &RecorderState) -> RecordingState {
    state.recorder.state()
}
