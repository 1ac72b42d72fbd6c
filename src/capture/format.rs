//! Capture format selection
//!
//! Picks one format out of the camera's list by narrowing, in order:
//! widest field of view, widest resolution, preferred pixel encoding (when
//! any candidate has it), highest frame rate. Whatever is left is resolved by
//! an explicit tie-break.

use serde::{Deserialize, Serialize};

use super::traits::{CaptureFormat, PixelEncoding};

/// How to pick among candidates that survive every filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    /// First in device enumeration order
    First,
    /// Last in device enumeration order
    #[default]
    Last,
}

/// Deterministic capture format policy
#[derive(Debug, Clone)]
pub struct FormatSelector {
    preferred_encoding: PixelEncoding,
    tie_break: TieBreak,
}

impl Default for FormatSelector {
    fn default() -> Self {
        Self::new(PixelEncoding::YUV420_VIDEO_RANGE, TieBreak::Last)
    }
}

impl FormatSelector {
    pub fn new(preferred_encoding: PixelEncoding, tie_break: TieBreak) -> Self {
        Self {
            preferred_encoding,
            tie_break,
        }
    }

    /// Select a format. Returns `None` only for an empty list.
    pub fn select<'a>(&self, formats: &'a [CaptureFormat]) -> Option<&'a CaptureFormat> {
        let candidates = self.candidates(formats);
        log_candidates(&candidates);

        match self.tie_break {
            TieBreak::First => candidates.first().copied(),
            TieBreak::Last => candidates.last().copied(),
        }
    }

    /// Formats surviving every narrowing stage, in enumeration order.
    pub fn candidates<'a>(&self, formats: &'a [CaptureFormat]) -> Vec<&'a CaptureFormat> {
        let Some(max_fov) = formats
            .iter()
            .map(|f| f.field_of_view_degrees)
            .reduce(f32::max)
        else {
            return Vec::new();
        };
        let widest: Vec<&CaptureFormat> = formats
            .iter()
            .filter(|f| f.field_of_view_degrees == max_fov)
            .collect();

        let max_width = widest.iter().map(|f| f.pixel_width).max().unwrap_or(0);
        let mut remaining: Vec<&CaptureFormat> = widest
            .into_iter()
            .filter(|f| f.pixel_width == max_width)
            .collect();

        let preferred: Vec<&CaptureFormat> = remaining
            .iter()
            .copied()
            .filter(|f| f.pixel_encoding == self.preferred_encoding)
            .collect();
        if !preferred.is_empty() {
            remaining = preferred;
        }

        let max_fps = remaining
            .iter()
            .map(|f| f.max_frame_rate)
            .fold(0.0, f64::max);
        if max_fps > 0.0 {
            remaining.retain(|f| f.max_frame_rate == max_fps);
        }

        remaining
    }
}

fn log_candidates(candidates: &[&CaptureFormat]) {
    tracing::debug!("Final format candidates: {}", candidates.len());
    for (index, format) in candidates.iter().enumerate() {
        tracing::debug!(
            "  [{}] {}x{}, FOV {}°, {}, up to {} fps, stabilization: {}",
            index,
            format.pixel_width,
            format.pixel_height,
            format.field_of_view_degrees,
            format.pixel_encoding,
            format.max_frame_rate,
            format.supports_stabilization
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V420: PixelEncoding = PixelEncoding::YUV420_VIDEO_RANGE;
    const F420: PixelEncoding = PixelEncoding::YUV420_FULL_RANGE;

    fn format(fov: f32, width: u32, encoding: PixelEncoding, fps: f64) -> CaptureFormat {
        CaptureFormat {
            field_of_view_degrees: fov,
            pixel_width: width,
            pixel_height: width * 9 / 16,
            pixel_encoding: encoding,
            max_frame_rate: fps,
            supports_stabilization: false,
        }
    }

    #[test]
    fn test_empty_list() {
        assert!(FormatSelector::default().select(&[]).is_none());
    }

    #[test]
    fn test_widest_fov_wins_over_resolution() {
        let formats = vec![
            format(100.0, 4032, V420, 60.0),
            format(120.0, 1920, F420, 30.0),
            format(110.0, 3840, V420, 60.0),
        ];
        let selected = FormatSelector::default().select(&formats).unwrap();
        assert_eq!(selected, &formats[1]);
    }

    #[test]
    fn test_resolution_then_encoding_then_fps() {
        let formats = vec![
            format(120.0, 3840, V420, 30.0),
            format(120.0, 3840, F420, 60.0),
            format(120.0, 1920, V420, 120.0),
            format(120.0, 3840, V420, 24.0),
        ];
        let candidates = FormatSelector::default().candidates(&formats);
        assert_eq!(candidates, vec![&formats[0]]);
    }

    #[test]
    fn test_encoding_preference_falls_back_when_absent() {
        let formats = vec![
            format(120.0, 3840, F420, 30.0),
            format(120.0, 3840, PixelEncoding::BGRA, 60.0),
        ];
        let selected = FormatSelector::default().select(&formats).unwrap();
        assert_eq!(selected, &formats[1]);
    }

    #[test]
    fn test_zero_fps_does_not_filter() {
        let formats = vec![format(120.0, 1920, V420, 0.0), format(120.0, 1920, V420, 0.0)];
        assert_eq!(FormatSelector::default().candidates(&formats).len(), 2);
    }

    #[test]
    fn test_tie_break() {
        let mut a = format(120.0, 1920, V420, 30.0);
        a.supports_stabilization = true;
        let b = format(120.0, 1920, V420, 30.0);
        let formats = vec![a, b];

        let last = FormatSelector::new(V420, TieBreak::Last).select(&formats).unwrap();
        let first = FormatSelector::new(V420, TieBreak::First).select(&formats).unwrap();
        assert!(std::ptr::eq(last, &formats[1]));
        assert!(std::ptr::eq(first, &formats[0]));
    }

    #[test]
    fn test_deterministic() {
        let formats = vec![
            format(108.0, 4032, V420, 30.0),
            format(108.0, 4032, V420, 30.0),
            format(108.0, 1920, V420, 60.0),
        ];
        let selector = FormatSelector::default();
        let a = selector.select(&formats).unwrap();
        let b = selector.select(&formats).unwrap();
        assert!(std::ptr::eq(a, b));
    }
}
