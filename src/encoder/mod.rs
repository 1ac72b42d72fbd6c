//! Video encoding
//!
//! The `EncoderSink` seam the recorder writes through, and an FFmpeg-backed
//! implementation of it.

pub mod ffmpeg;
pub mod mov;
pub mod sink;

pub use ffmpeg::{FfmpegSink, FfmpegSinkFactory};
pub use sink::{
    AppendOutcome, EncoderError, EncoderResult, EncoderSink, SinkFactory, VideoCodec,
    VideoSettings,
};
