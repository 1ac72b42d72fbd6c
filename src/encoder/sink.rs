//! Encoder sink abstraction
//!
//! The recorder drives an encoder/muxer through `EncoderSink`: configure,
//! open, append frames while it reports ready, mark finished, finalize.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::calibration::CalibrationDescriptor;
use crate::capture::PixelEncoding;

/// Output video codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Hevc,
    H264,
}

impl VideoCodec {
    /// FFmpeg encoder for this codec
    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            VideoCodec::Hevc => "libx265",
            VideoCodec::H264 => "libx264",
        }
    }

    /// Sample entry tag written into QuickTime containers
    pub fn codec_tag(&self) -> &'static str {
        match self {
            VideoCodec::Hevc => "hvc1",
            VideoCodec::H264 => "avc1",
        }
    }
}

/// Everything a sink needs to know before it is opened
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    /// Encoding of the pixel data passed to `append`
    pub pixel_format: PixelEncoding,
    /// Nominal frame rate for encoders that need one
    pub frame_rate: f64,
    /// Live source: the sink must not stall the producer
    pub expects_real_time: bool,
    pub calibration: CalibrationDescriptor,
}

/// Encoder errors
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sink not configured")]
    NotConfigured,

    #[error("Sink not open")]
    NotOpen,

    #[error("Sink already open")]
    AlreadyOpen,

    #[error("Sink already finished")]
    Finished,

    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Channel error: {0}")]
    Channel(String),
}

pub type EncoderResult<T> = Result<T, EncoderError>;

/// What `append` did with a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Queued for encoding
    Written,
    /// Not encoded: its place on the output timeline was already taken
    Skipped,
}

/// Video encoder and muxer writing one output file
#[async_trait]
pub trait EncoderSink: Send {
    fn configure(&mut self, settings: &VideoSettings) -> EncoderResult<()>;

    /// Open the output. The sink's session clock starts at zero.
    fn open(&mut self, output_path: &Path) -> EncoderResult<()>;

    /// False while the sink cannot take another frame without blocking
    fn is_ready_for_more_data(&self) -> bool;

    fn append(
        &mut self,
        data: &[u8],
        pts: Duration,
        duration: Duration,
    ) -> EncoderResult<AppendOutcome>;

    /// No more frames will be appended
    fn mark_finished(&mut self);

    /// Flush and close the output. Returns whether the file is complete.
    async fn finalize(&mut self) -> bool;
}

/// Creates a fresh sink for each recording
pub trait SinkFactory: Send + Sync {
    fn create_sink(&self) -> EncoderResult<Box<dyn EncoderSink>>;
}
