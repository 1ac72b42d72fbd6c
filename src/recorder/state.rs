//! Recording state management
//!
//! Lifecycle states, the calibration cache, recorder configuration, and the
//! summary produced when a session stops.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::calibration::{ImageDimensions, IntrinsicMatrix};
use crate::capture::{PixelEncoding, TieBreak};
use crate::encoder::VideoCodec;

/// Current state of the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No intrinsics cached yet
    #[default]
    Idle,
    /// Intrinsics cached, ready to record
    Armed,
    /// Frames are being written
    Recording,
}

/// Intrinsics cache. Matrix and dimensions are only ever set together.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CalibrationState {
    #[default]
    Uncalibrated,
    Calibrated {
        matrix: IntrinsicMatrix,
        dims: ImageDimensions,
    },
}

impl CalibrationState {
    pub fn is_calibrated(&self) -> bool {
        matches!(self, CalibrationState::Calibrated { .. })
    }
}

/// Capture session quality preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPreset {
    Medium,
    #[default]
    High,
    Photo,
}

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordingConfig {
    /// Directory new recordings are written to before they are saved
    pub output_dir: PathBuf,

    /// Library directory finished recordings are moved into
    pub library_dir: PathBuf,

    /// File name prefix of new recordings
    pub file_prefix: String,

    /// Container file extension
    pub container_extension: String,

    pub session_preset: SessionPreset,

    /// Pixel format frames are delivered and encoded in
    pub working_pixel_format: PixelEncoding,

    pub codec: VideoCodec,

    /// Capture encoding the format selector prefers
    pub preferred_capture_encoding: PixelEncoding,

    pub format_tie_break: TieBreak,

    /// Frames the encoder may buffer before it reports not-ready
    pub encoder_queue_depth: usize,

    /// FFmpeg executable
    pub ffmpeg_path: String,

    /// Nominal frame rate when the active format's is unknown
    pub fallback_frame_rate: f64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: std::env::temp_dir(),
            library_dir: std::env::temp_dir().join("widefov-library"),
            file_prefix: "video".to_string(),
            container_extension: "mov".to_string(),
            session_preset: SessionPreset::High,
            working_pixel_format: PixelEncoding::BGRA,
            codec: VideoCodec::Hevc,
            preferred_capture_encoding: PixelEncoding::YUV420_VIDEO_RANGE,
            format_tie_break: TieBreak::Last,
            encoder_queue_depth: 8,
            ffmpeg_path: "ffmpeg".to_string(),
            fallback_frame_rate: 30.0,
        }
    }
}

/// Config loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RecordingConfig {
    /// Read a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Read a JSON config file, falling back to defaults
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring invalid config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// A fresh output location: `<prefix>_<unix seconds>_<short id>.<ext>`
    pub fn new_output_path(&self) -> PathBuf {
        let unix = chrono::Utc::now().timestamp();
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.output_dir.join(format!(
            "{}_{}_{}.{}",
            self.file_prefix,
            unix,
            &id[..8],
            self.container_extension
        ))
    }
}

/// Events emitted by the recorder
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    Started {
        output_path: PathBuf,
    },
    /// No further frames will be written
    Stopped(RecordingSummary),
    Finalized {
        output_path: PathBuf,
        success: bool,
    },
    /// Handed to the library
    Saved {
        output_path: PathBuf,
    },
}

/// What a stopped session wrote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSummary {
    pub output_path: PathBuf,
    pub frames_written: u64,
    pub frames_dropped: u64,
    /// Recording-clock timestamp of the last written frame, in milliseconds
    pub last_pts_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = RecordingConfig::default();
        assert_eq!(config.session_preset, SessionPreset::High);
        assert_eq!(config.working_pixel_format, PixelEncoding::BGRA);
        assert_eq!(config.codec, VideoCodec::Hevc);
        assert_eq!(config.format_tie_break, TieBreak::Last);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = RecordingConfig {
            encoder_queue_depth: 3,
            format_tie_break: TieBreak::First,
            ..RecordingConfig::default()
        };
        config.save(&path).unwrap();

        assert_eq!(RecordingConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_and_invalid_files() {
        let dir = tempdir().unwrap();

        let partial = dir.path().join("partial.json");
        std::fs::write(&partial, r#"{ "filePrefix": "clip" }"#).unwrap();
        let config = RecordingConfig::load_or_default(&partial);
        assert_eq!(config.file_prefix, "clip");
        assert_eq!(config.container_extension, "mov");

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ nope").unwrap();
        assert_eq!(RecordingConfig::load_or_default(&broken), RecordingConfig::default());

        let missing = dir.path().join("missing.json");
        assert_eq!(RecordingConfig::load_or_default(&missing), RecordingConfig::default());
    }

    #[test]
    fn test_output_paths_are_fresh() {
        let config = RecordingConfig::default();
        let a = config.new_output_path();
        let b = config.new_output_path();
        assert_ne!(a, b);
        assert_eq!(a.extension().unwrap(), "mov");
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("video_"));
    }

    #[test]
    fn test_calibration_state() {
        assert!(!CalibrationState::default().is_calibrated());
        let calibrated = CalibrationState::Calibrated {
            matrix: IntrinsicMatrix::new(1000.0, 1000.0, 960.0, 540.0),
            dims: ImageDimensions::new(1920, 1080),
        };
        assert!(calibrated.is_calibrated());
    }
}
