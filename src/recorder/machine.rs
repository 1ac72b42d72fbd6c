//! Recording state machine
//!
//! Owns the calibration cache and the active recording session behind one
//! lock. Every operation that reads or changes recording state goes through
//! that lock; nothing is exposed raw.
//!
//! Stopping is split in two: `begin_stop` flips state synchronously (no frame
//! is written after it returns), and the returned `PendingFinalize` flushes
//! the encoder and hands the file to the library without holding the lock.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::state::{
    CalibrationState, RecordingConfig, RecordingEvent, RecordingState, RecordingSummary,
};
use super::timestamp::TimestampNormalizer;
use crate::calibration::{build_descriptor, ImageDimensions, IntrinsicMatrix};
use crate::capture::{CaptureFormat, CaptureFrame};
use crate::encoder::{AppendOutcome, EncoderResult, EncoderSink, SinkFactory, VideoSettings};
use crate::library::MediaLibrary;

/// The one recording session that may exist at a time
struct ActiveSession {
    output_path: PathBuf,
    sink: Box<dyn EncoderSink>,
    clock: TimestampNormalizer,
    frames_written: u64,
    frames_dropped: u64,
    last_pts: Duration,
    append_failed: bool,
}

impl ActiveSession {
    fn new(output_path: PathBuf, sink: Box<dyn EncoderSink>) -> Self {
        Self {
            output_path,
            sink,
            clock: TimestampNormalizer::new(),
            frames_written: 0,
            frames_dropped: 0,
            last_pts: Duration::ZERO,
            append_failed: false,
        }
    }

    fn write(&mut self, frame: &CaptureFrame) {
        // The first frame seen anchors the clock, even if it is dropped
        self.clock.anchor_at(frame.pts);

        if !self.sink.is_ready_for_more_data() {
            self.frames_dropped += 1;
            return;
        }

        let (pts, duration) = self.clock.normalize(frame.pts, frame.duration);
        match self.sink.append(&frame.data, pts, duration) {
            Ok(AppendOutcome::Written) => {
                self.frames_written += 1;
                self.last_pts = pts;
            }
            Ok(AppendOutcome::Skipped) => self.frames_dropped += 1,
            Err(e) => {
                self.frames_dropped += 1;
                if !self.append_failed {
                    tracing::error!("Encoder rejected frame at {:?}: {}", pts, e);
                    self.append_failed = true;
                }
            }
        }
    }

    fn summary(&self) -> RecordingSummary {
        RecordingSummary {
            output_path: self.output_path.clone(),
            frames_written: self.frames_written,
            frames_dropped: self.frames_dropped,
            last_pts_ms: self.last_pts.as_secs_f64() * 1000.0,
        }
    }
}

/// Everything the lock protects
#[derive(Default)]
struct Inner {
    calibration: CalibrationState,
    /// Frame rate of the camera's active format, if known
    nominal_frame_rate: Option<f64>,
    session: Option<ActiveSession>,
}

/// Gates which frames reach the encoder
pub struct RecordingStateMachine {
    inner: Mutex<Inner>,
    config: RecordingConfig,
    sink_factory: Arc<dyn SinkFactory>,
    library: Arc<dyn MediaLibrary>,
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingStateMachine {
    pub fn new(
        config: RecordingConfig,
        sink_factory: Arc<dyn SinkFactory>,
        library: Arc<dyn MediaLibrary>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            inner: Mutex::new(Inner::default()),
            config,
            sink_factory,
            library,
            event_tx,
        }
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    pub fn state(&self) -> RecordingState {
        let inner = self.inner.lock();
        if inner.session.is_some() {
            RecordingState::Recording
        } else if inner.calibration.is_calibrated() {
            RecordingState::Armed
        } else {
            RecordingState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().session.is_some()
    }

    pub fn is_calibrated(&self) -> bool {
        self.inner.lock().calibration.is_calibrated()
    }

    pub fn calibration(&self) -> CalibrationState {
        self.inner.lock().calibration
    }

    /// Output path of the active session
    pub fn current_output_path(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|s| s.output_path.clone())
    }

    /// Anchor timestamp of the active session, once its first frame arrived
    pub fn current_anchor(&self) -> Option<Duration> {
        self.inner
            .lock()
            .session
            .as_ref()
            .and_then(|s| s.clock.anchor())
    }

    /// Remember the camera's active format for the encoder's nominal rate
    pub fn set_active_format(&self, format: &CaptureFormat) {
        let rate = (format.max_frame_rate > 0.0).then_some(format.max_frame_rate);
        self.inner.lock().nominal_frame_rate = rate;
    }

    /// Cache intrinsics. Only the first call has an effect; returns whether
    /// this call populated the cache.
    pub fn cache_calibration(&self, matrix: IntrinsicMatrix, dims: ImageDimensions) -> bool {
        let mut inner = self.inner.lock();
        if inner.calibration.is_calibrated() {
            return false;
        }
        inner.calibration = CalibrationState::Calibrated { matrix, dims };
        true
    }

    /// Start a new recording.
    ///
    /// Returns false, without changing anything, when already recording, when
    /// no intrinsics are cached yet, or when the encoder cannot be opened.
    pub fn start_recording(&self) -> bool {
        let mut inner = self.inner.lock();

        if inner.session.is_some() {
            tracing::debug!("Start requested while already recording");
            return false;
        }

        let CalibrationState::Calibrated { matrix, dims } = inner.calibration else {
            tracing::warn!("Cannot start recording: camera intrinsics not available yet");
            return false;
        };

        let settings = VideoSettings {
            codec: self.config.codec,
            width: dims.width,
            height: dims.height,
            pixel_format: self.config.working_pixel_format,
            frame_rate: inner
                .nominal_frame_rate
                .unwrap_or(self.config.fallback_frame_rate),
            expects_real_time: true,
            calibration: build_descriptor(&matrix, dims),
        };
        let output_path = self.config.new_output_path();

        let sink = match self.open_sink(&settings, &output_path) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::error!("Failed to start recording: {}", e);
                return false;
            }
        };

        inner.session = Some(ActiveSession::new(output_path.clone(), sink));
        drop(inner);

        tracing::info!(
            "Recording started: {}x{} {:?} to {:?}",
            settings.width,
            settings.height,
            settings.codec,
            output_path
        );
        let _ = self.event_tx.send(RecordingEvent::Started { output_path });
        true
    }

    fn open_sink(
        &self,
        settings: &VideoSettings,
        output_path: &Path,
    ) -> EncoderResult<Box<dyn EncoderSink>> {
        let mut sink = self.sink_factory.create_sink()?;
        sink.configure(settings)?;
        sink.open(output_path)?;
        Ok(sink)
    }

    /// Per-frame path: write the frame if recording and the encoder is ready.
    pub fn process_frame(&self, frame: &CaptureFrame) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.session.as_mut() {
            session.write(frame);
        }
    }

    /// Leave the recording state. Once this returns no further frame is
    /// written. Returns `None` when not recording.
    pub fn begin_stop(&self) -> Option<PendingFinalize> {
        let session = self.inner.lock().session.take()?;

        let summary = session.summary();
        tracing::info!(
            "Recording stopped: {} frames written, {} dropped, {:.1}ms",
            summary.frames_written,
            summary.frames_dropped,
            summary.last_pts_ms
        );
        let _ = self.event_tx.send(RecordingEvent::Stopped(summary));

        Some(PendingFinalize {
            session,
            library: self.library.clone(),
            event_tx: self.event_tx.clone(),
        })
    }

    /// Stop recording and wait until the file is finalized and handed to the
    /// library. Returns false when not recording.
    pub async fn stop_recording(&self) -> bool {
        match self.begin_stop() {
            Some(pending) => {
                pending.finish().await;
                true
            }
            None => false,
        }
    }
}

/// A stopped session whose output still has to be finalized
pub struct PendingFinalize {
    session: ActiveSession,
    library: Arc<dyn MediaLibrary>,
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl PendingFinalize {
    pub fn output_path(&self) -> &Path {
        &self.session.output_path
    }

    pub fn summary(&self) -> RecordingSummary {
        self.session.summary()
    }

    /// Finalize the encoder and save the file. The save is attempted even if
    /// finalizing failed. Returns whether finalizing succeeded.
    pub async fn finish(self) -> bool {
        let PendingFinalize {
            mut session,
            library,
            event_tx,
        } = self;
        let output_path = session.output_path.clone();

        session.sink.mark_finished();
        let success = session.sink.finalize().await;
        if success {
            tracing::info!("Recording finalized: {:?}", output_path);
        } else {
            tracing::error!("Finalizing {:?} failed, saving what was written", output_path);
        }
        let _ = event_tx.send(RecordingEvent::Finalized {
            output_path: output_path.clone(),
            success,
        });

        // Release the encoder before the library takes the file
        drop(session);

        library.save(output_path.clone());
        let _ = event_tx.send(RecordingEvent::Saved { output_path });
        success
    }
}
