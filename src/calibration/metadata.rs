//! Calibration metadata for the output container
//!
//! Derives the horizontal field of view and the lens collection from the
//! cached intrinsics, and encodes them into the box block the encoder embeds
//! in the movie. Only the pinhole model is emitted: no distortion
//! coefficients, no frame adjustments, no extrinsics.

use serde::{Deserialize, Serialize};

use super::intrinsics::{ImageDimensions, IntrinsicMatrix};

/// Projection the footage should be rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProjectionKind {
    ParametricImmersive,
}

impl ProjectionKind {
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            ProjectionKind::ParametricImmersive => *b"prim",
        }
    }
}

/// Lens model used to interpret the intrinsics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LensAlgorithmKind {
    ParametricLens,
}

impl LensAlgorithmKind {
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            LensAlgorithmKind::ParametricLens => *b"parl",
        }
    }
}

/// Which kind of image the lens produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LensDomain {
    Color,
}

impl LensDomain {
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            LensDomain::Color => *b"colr",
        }
    }
}

/// Role of the lens within the capture rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LensRole {
    Mono,
}

impl LensRole {
    pub fn fourcc(&self) -> [u8; 4] {
        match self {
            LensRole::Mono => *b"mono",
        }
    }
}

/// Dimensions the intrinsic matrix refers to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceDimensions {
    pub width: f32,
    pub height: f32,
}

/// One entry of the lens collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LensEntry {
    pub identifier: u32,
    pub algorithm_kind: LensAlgorithmKind,
    pub domain: LensDomain,
    pub role: LensRole,
    pub reference_dimensions: ReferenceDimensions,
    /// Raw matrix, nine little-endian `f32` values
    pub intrinsic_matrix: Vec<u8>,
    /// Xi of the unified camera model; 0 is a pinhole
    pub projection_offset: i32,
}

/// Calibration block embedded in the output container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationDescriptor {
    pub projection_kind: ProjectionKind,
    pub horizontal_fov_millidegrees: u32,
    pub lens_collection: Vec<LensEntry>,
}

/// Build the calibration block for a recording.
///
/// The matrix must have a non-zero `fx`; the capture path never caches a
/// matrix that does not.
pub fn build_descriptor(
    intrinsics: &IntrinsicMatrix,
    dims: ImageDimensions,
) -> CalibrationDescriptor {
    let horizontal_fov_millidegrees = horizontal_fov_millidegrees(intrinsics, dims.width);

    tracing::info!(
        "Calculated horizontal FOV: {:.3}° ({} millidegrees)",
        horizontal_fov_millidegrees as f64 / 1000.0,
        horizontal_fov_millidegrees
    );

    CalibrationDescriptor {
        projection_kind: ProjectionKind::ParametricImmersive,
        horizontal_fov_millidegrees,
        lens_collection: vec![lens_entry(intrinsics, dims)],
    }
}

/// `round(2 * atan(width / (2 * fx)) * 180/π * 1000)`, computed in `f64`.
pub fn horizontal_fov_millidegrees(intrinsics: &IntrinsicMatrix, width: u32) -> u32 {
    let millidegrees = (intrinsics.horizontal_fov_degrees(width) * 1000.0).round();
    millidegrees.clamp(0.0, u32::MAX as f64) as u32
}

fn lens_entry(intrinsics: &IntrinsicMatrix, dims: ImageDimensions) -> LensEntry {
    LensEntry {
        identifier: 0,
        algorithm_kind: LensAlgorithmKind::ParametricLens,
        domain: LensDomain::Color,
        role: LensRole::Mono,
        reference_dimensions: ReferenceDimensions {
            width: dims.width as f32,
            height: dims.height as f32,
        },
        intrinsic_matrix: intrinsics.to_bytes().to_vec(),
        projection_offset: 0,
    }
}

impl CalibrationDescriptor {
    /// Encode as a sequence of boxes (big-endian u32 size, FourCC, payload):
    ///
    /// ```text
    /// hfov  u32 millidegrees
    /// prji  projection kind FourCC
    /// lncl
    ///   lnhd (per lens)
    ///     lnid u32, lalg/ldom/lrol FourCC, rdim 2 x f32,
    ///     lnin 36 matrix bytes, prjo i32
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_box(&mut out, b"hfov", &self.horizontal_fov_millidegrees.to_be_bytes());
        write_box(&mut out, b"prji", &self.projection_kind.fourcc());

        let mut collection = Vec::new();
        for lens in &self.lens_collection {
            write_box(&mut collection, b"lnhd", &lens.encode());
        }
        write_box(&mut out, b"lncl", &collection);
        out
    }
}

impl LensEntry {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_box(&mut out, b"lnid", &self.identifier.to_be_bytes());
        write_box(&mut out, b"lalg", &self.algorithm_kind.fourcc());
        write_box(&mut out, b"ldom", &self.domain.fourcc());
        write_box(&mut out, b"lrol", &self.role.fourcc());

        let mut rdim = Vec::with_capacity(8);
        rdim.extend_from_slice(&self.reference_dimensions.width.to_be_bytes());
        rdim.extend_from_slice(&self.reference_dimensions.height.to_be_bytes());
        write_box(&mut out, b"rdim", &rdim);

        write_box(&mut out, b"lnin", &self.intrinsic_matrix);
        write_box(&mut out, b"prjo", &self.projection_offset.to_be_bytes());
        out
    }
}

/// Append one size + FourCC box
pub(crate) fn write_box(out: &mut Vec<u8>, kind: &[u8; 4], payload: &[u8]) {
    let size = (8 + payload.len()) as u32;
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
}
