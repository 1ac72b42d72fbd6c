//! Camera intrinsics
//!
//! The capture hardware attaches a 3x3 intrinsic matrix to frames. It is laid
//! out column by column as `[[fx, 0, 0], [0, fy, 0], [cx, cy, 1]]`.

use serde::{Deserialize, Serialize};

/// Size of a tightly packed matrix: nine `f32` values.
///
/// This is the layout written to the `lnin` box. Readers expecting the
/// 48-byte padded-column layout (`PADDED_MATRIX_LEN`) will not parse it.
pub const PACKED_MATRIX_LEN: usize = 9 * 4;

/// Size of a matrix whose columns are padded to 16 bytes (SIMD layout).
pub const PADDED_MATRIX_LEN: usize = 3 * 16;

/// Pinhole intrinsic matrix as delivered by the camera.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicMatrix {
    columns: [[f32; 3]; 3],
}

impl IntrinsicMatrix {
    /// Build a matrix from focal lengths and principal point (pixels).
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self {
            columns: [[fx, 0.0, 0.0], [0.0, fy, 0.0], [cx, cy, 1.0]],
        }
    }

    /// Build a matrix from raw columns.
    pub fn from_columns(columns: [[f32; 3]; 3]) -> Self {
        Self { columns }
    }

    /// Decode the intrinsic-matrix attachment of a frame.
    ///
    /// Accepts both the packed (36 byte) and the column-padded (48 byte)
    /// little-endian layouts. Returns `None` for any other length and for
    /// matrices whose focal lengths are not finite and positive.
    pub fn from_attachment(bytes: &[u8]) -> Option<Self> {
        let stride = match bytes.len() {
            PACKED_MATRIX_LEN => 12,
            PADDED_MATRIX_LEN => 16,
            _ => return None,
        };

        let mut columns = [[0f32; 3]; 3];
        for (c, column) in columns.iter_mut().enumerate() {
            for (r, value) in column.iter_mut().enumerate() {
                let offset = c * stride + r * 4;
                let raw: [u8; 4] = bytes[offset..offset + 4].try_into().ok()?;
                *value = f32::from_le_bytes(raw);
            }
        }

        let matrix = Self { columns };
        if matrix.is_degenerate() {
            return None;
        }
        Some(matrix)
    }

    pub fn fx(&self) -> f32 {
        self.columns[0][0]
    }

    pub fn fy(&self) -> f32 {
        self.columns[1][1]
    }

    pub fn cx(&self) -> f32 {
        self.columns[2][0]
    }

    pub fn cy(&self) -> f32 {
        self.columns[2][1]
    }

    pub fn columns(&self) -> &[[f32; 3]; 3] {
        &self.columns
    }

    /// True when the focal lengths cannot come from real optics.
    pub fn is_degenerate(&self) -> bool {
        let (fx, fy) = (self.fx(), self.fy());
        !(fx.is_finite() && fy.is_finite() && fx > 0.0 && fy > 0.0)
    }

    /// Serialize as nine little-endian `f32` values, column by column.
    pub fn to_bytes(&self) -> [u8; PACKED_MATRIX_LEN] {
        let mut out = [0u8; PACKED_MATRIX_LEN];
        let values = self.columns.iter().flat_map(|column| column.iter());
        for (chunk, value) in out.chunks_exact_mut(4).zip(values) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Horizontal field of view in degrees for an image of the given width.
    pub fn horizontal_fov_degrees(&self, width: u32) -> f64 {
        fov_degrees(width, self.fx())
    }

    /// Vertical field of view in degrees for an image of the given height.
    pub fn vertical_fov_degrees(&self, height: u32) -> f64 {
        fov_degrees(height, self.fy())
    }
}

fn fov_degrees(extent: u32, focal: f32) -> f64 {
    2.0 * (extent as f64 / (2.0 * focal as f64)).atan() * 180.0 / std::f64::consts::PI
}

/// Pixel dimensions of the frames the intrinsics were measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}
