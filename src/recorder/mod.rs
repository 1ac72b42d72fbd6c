//! Recording system module
//!
//! - RecordingStateMachine gating frames into the encoder
//! - TimestampNormalizer rebasing device time onto the recording clock
//! - Lifecycle states, config, and events

pub mod machine;
pub mod state;
pub mod timestamp;

#[cfg(test)]
pub(crate) mod testing;

pub use machine::{PendingFinalize, RecordingStateMachine};
pub use state::{
    CalibrationState, ConfigError, RecordingConfig, RecordingEvent, RecordingState,
    RecordingSummary, SessionPreset,
};
pub use timestamp::TimestampNormalizer;
