use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MIN_SCALE: f64 = 0.05;
pub const MAX_SCALE: f64 = 1.0;

pub const DEFAULT_X: f64 = 0.5;
pub const DEFAULT_Y: f64 = 0.5;
pub const DEFAULT_SCALE: f64 = 0.3;
pub const DEFAULT_OPACITY: f64 = 1.0;

/// Caller-supplied placement of the art on the interior.
///
/// `x`/`y` are the art's centre in normalized interior coordinates, `scale`
/// is the art width as a fraction of the interior width. Missing or
/// non-finite values fall back to the defaults; all values are clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, ToSchema)]
pub struct PlacementParams {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub scale: Option<f64>,
    pub opacity: Option<f64>,
}

impl PlacementParams {
    pub fn x(&self) -> f64 {
        finite_or(self.x, DEFAULT_X).clamp(0.0, 1.0)
    }

    pub fn y(&self) -> f64 {
        finite_or(self.y, DEFAULT_Y).clamp(0.0, 1.0)
    }

    pub fn scale(&self) -> f64 {
        finite_or(self.scale, DEFAULT_SCALE).clamp(MIN_SCALE, MAX_SCALE)
    }

    pub fn opacity(&self) -> f64 {
        finite_or(self.opacity, DEFAULT_OPACITY).clamp(0.0, 1.0)
    }
}

fn finite_or(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(default)
}

/// Where the resized art lands on the interior, in pixels.
/// `left`/`top` may be negative; overlay clips whatever falls outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Placement {
    pub left: i64,
    pub top: i64,
    pub width: u32,
    pub height: u32,
}

impl Placement {
    pub fn compute(interior: (u32, u32), art: (u32, u32), params: &PlacementParams) -> Self {
        let (interior_w, interior_h) = (interior.0 as f64, interior.1 as f64);
        let (art_w, art_h) = art;

        let width = to_dimension(round_half_up(params.scale() * interior_w));
        let height = if art_w == 0 {
            1
        } else {
            to_dimension(round_half_up(art_h as f64 * width as f64 / art_w as f64))
        };

        let cx = params.x() * interior_w;
        let cy = params.y() * interior_h;

        Placement {
            left: round_half_up(cx - width as f64 / 2.0) as i64,
            top: round_half_up(cy - height as f64 / 2.0) as i64,
            width,
            height,
        }
    }

    /// Pixels the resized art occupies before clipping
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// At least 1 px; values past `u32::MAX` are pinned there and left to the
/// pixel budget to reject
fn to_dimension(value: f64) -> u32 {
    value.clamp(1.0, u32::MAX as f64) as u32
}

/// Halves round toward +inf, so -2.5 becomes -2 rather than -3
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_placement_is_centered() {
        let placement = Placement::compute((1000, 800), (200, 100), &PlacementParams::default());

        assert_eq!(
            placement,
            Placement {
                left: 350,
                top: 325,
                width: 300,
                height: 150,
            }
        );
    }

    #[test]
    fn test_scale_is_clamped() {
        let tiny = PlacementParams {
            scale: Some(0.0),
            ..Default::default()
        };
        assert_eq!(Placement::compute((1000, 1000), (100, 100), &tiny).width, 50);

        let huge = PlacementParams {
            scale: Some(3.0),
            ..Default::default()
        };
        assert_eq!(Placement::compute((1000, 1000), (100, 100), &huge).width, 1000);
    }

    #[test]
    fn test_corner_placement_goes_negative() {
        let params = PlacementParams {
            x: Some(-1.0),
            y: Some(0.0),
            scale: Some(0.5),
            opacity: None,
        };
        let placement = Placement::compute((400, 300), (100, 50), &params);

        assert_eq!(placement.width, 200);
        assert_eq!(placement.height, 100);
        assert_eq!(placement.left, -100);
        assert_eq!(placement.top, -50);
    }

    #[test]
    fn test_bottom_right_corner() {
        let params = PlacementParams {
            x: Some(1.0),
            y: Some(7.0),
            scale: Some(0.1),
            opacity: None,
        };
        let placement = Placement::compute((1000, 500), (10, 10), &params);

        assert_eq!(placement.width, 100);
        assert_eq!(placement.left, 950);
        assert_eq!(placement.top, 450);
    }

    #[test]
    fn test_non_finite_values_use_defaults() {
        let params = PlacementParams {
            x: Some(f64::NAN),
            y: Some(f64::INFINITY),
            scale: Some(f64::NEG_INFINITY),
            opacity: Some(f64::NAN),
        };

        assert_eq!(params.x(), DEFAULT_X);
        assert_eq!(params.y(), DEFAULT_Y);
        assert_eq!(params.scale(), DEFAULT_SCALE);
        assert_eq!(params.opacity(), DEFAULT_OPACITY);
    }

    #[test]
    fn test_opacity_is_clamped() {
        let params = PlacementParams {
            opacity: Some(1.7),
            ..Default::default()
        };
        assert_eq!(params.opacity(), 1.0);

        let params = PlacementParams {
            opacity: Some(-0.2),
            ..Default::default()
        };
        assert_eq!(params.opacity(), 0.0);
    }

    #[test]
    fn test_rounding_matches_half_up() {
        // art 3px wide centred at 0: 0 - 1.5 rounds to -1
        let params = PlacementParams {
            x: Some(0.0),
            y: Some(0.0),
            scale: Some(0.05),
            opacity: None,
        };
        let placement = Placement::compute((60, 60), (3, 3), &params);
        assert_eq!(placement.width, 3);
        assert_eq!(placement.left, -1);
        assert_eq!(placement.top, -1);
    }

    #[test]
    fn test_aspect_ratio_is_preserved() {
        let params = PlacementParams {
            scale: Some(0.25),
            ..Default::default()
        };
        let placement = Placement::compute((1200, 900), (400, 600), &params);
        assert_eq!(placement.width, 300);
        assert_eq!(placement.height, 450);
    }

    #[test]
    fn test_narrow_art_reports_its_full_size() {
        let params = PlacementParams {
            scale: Some(1.0),
            ..Default::default()
        };
        let placement = Placement::compute((4000, 3000), (1, 4000), &params);

        assert_eq!(placement.width, 4000);
        assert_eq!(placement.height, 16_000_000);
        assert_eq!(placement.pixel_count(), 64_000_000_000);
    }

    #[test]
    fn test_height_is_pinned_instead_of_wrapping() {
        let params = PlacementParams {
            scale: Some(1.0),
            ..Default::default()
        };
        let placement = Placement::compute((60000, 100), (1, 100000), &params);

        assert_eq!(placement.height, u32::MAX);
        assert_eq!(placement.pixel_count(), 60000 * u64::from(u32::MAX));
    }
}
