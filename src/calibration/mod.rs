//! Camera calibration
//!
//! Intrinsic matrix handling and the calibration metadata written into
//! recorded movies.

pub mod intrinsics;
pub mod metadata;

pub use intrinsics::{ImageDimensions, IntrinsicMatrix};
pub use metadata::{
    build_descriptor, horizontal_fov_millidegrees, CalibrationDescriptor, LensAlgorithmKind,
    LensDomain, LensEntry, LensRole, ProjectionKind, ReferenceDimensions,
};
