// ============================================================================
// TRANSFORM OPERATIONS: rotate/flip state and resize
// ============================================================================

use std::str::FromStr;

use image::{RgbaImage, imageops};
use serde::{Deserialize, Serialize};

use crate::canvas::Raster;

/// Display-time orientation of the current raster. Owns no pixels; it is
/// applied when the view is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransformState {
    /// Clockwise rotation, kept in [0, 360).
    pub rotation_degrees: i32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl TransformState {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// True for 90° and 270°, where the drawn image swaps width and height.
    pub fn swaps_dimensions(&self) -> bool {
        self.rotation_degrees.rem_euclid(180) == 90
    }
}

/// Rotate by `delta_degrees`, normalising into [0, 360).
/// Callers only pass multiples of 90; other values are kept as given.
pub fn rotate(state: &TransformState, delta_degrees: i32) -> TransformState {
    TransformState {
        rotation_degrees: (state.rotation_degrees + delta_degrees).rem_euclid(360),
        ..*state
    }
}

pub fn flip_horizontal(state: &TransformState) -> TransformState {
    TransformState { flip_horizontal: !state.flip_horizontal, ..*state }
}

pub fn flip_vertical(state: &TransformState) -> TransformState {
    TransformState { flip_vertical: !state.flip_vertical, ..*state }
}

pub fn reset_transform() -> TransformState {
    TransformState::default()
}

/// Size of the drawn image for a `width × height` raster.
pub fn output_dimensions(state: &TransformState, width: u32, height: u32) -> (u32, u32) {
    if state.swaps_dimensions() {
        (height, width)
    } else {
        (width, height)
    }
}

/// Draw `src` under `state`.
///
/// Equivalent to translate-to-centre → rotate → scale(flip) → draw centred:
/// the flip happens in source space, then the result is turned clockwise.
pub fn apply_transform(src: &RgbaImage, state: &TransformState) -> RgbaImage {
    let mut flipped = src.clone();
    if state.flip_horizontal {
        imageops::flip_horizontal_in_place(&mut flipped);
    }
    if state.flip_vertical {
        imageops::flip_vertical_in_place(&mut flipped);
    }

    let quarter = state.rotation_degrees.rem_euclid(360);
    if quarter % 90 != 0 {
        crate::log_warn!(
            "Rotation of {} degrees is not a quarter turn; drawing at {}",
            quarter,
            quarter - quarter % 90
        );
    }
    match quarter / 90 {
        1 => imageops::rotate90(&flipped),
        2 => imageops::rotate180(&flipped),
        3 => imageops::rotate270(&flipped),
        _ => flipped,
    }
}

// ---------------------------------------------------------------------------
//  Resize
// ---------------------------------------------------------------------------

/// Interpolation method for resize operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub fn label(&self) -> &'static str {
        match self {
            Interpolation::Nearest  => "nearest",
            Interpolation::Bilinear => "bilinear",
            Interpolation::Bicubic  => "bicubic",
            Interpolation::Lanczos3 => "lanczos3",
        }
    }

    pub fn all() -> &'static [Interpolation] {
        &[
            Interpolation::Nearest,
            Interpolation::Bilinear,
            Interpolation::Bicubic,
            Interpolation::Lanczos3,
        ]
    }

    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest  => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic  => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

impl FromStr for Interpolation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interpolation::all()
            .iter()
            .copied()
            .find(|i| i.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown interpolation '{}'", s))
    }
}

/// Resample `raster` to exactly `new_w × new_h`. Dimensions must be non-zero;
/// the session validates them before calling.
pub fn resize_raster(raster: &Raster, new_w: u32, new_h: u32, interp: Interpolation) -> Raster {
    let resized = imageops::resize(raster.as_rgba_image(), new_w, new_h, interp.to_filter());
    Raster::from_rgba_image(resized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn rotation_normalises_into_range() {
        let s = TransformState::default();
        assert_eq!(rotate(&s, -90).rotation_degrees, 270);
        assert_eq!(rotate(&rotate(&s, 270), 180).rotation_degrees, 90);
        assert_eq!(rotate(&s, 720).rotation_degrees, 0);
    }

    #[test]
    fn rotate_has_an_inverse() {
        let s = TransformState { rotation_degrees: 180, flip_horizontal: true, flip_vertical: false };
        assert_eq!(rotate(&rotate(&s, 90), -90), s);
        assert_eq!(rotate(&rotate(&s, -90), 90), s);
    }

    #[test]
    fn flips_are_involutions() {
        let s = TransformState { rotation_degrees: 90, ..TransformState::default() };
        assert_eq!(flip_horizontal(&flip_horizontal(&s)), s);
        assert_eq!(flip_vertical(&flip_vertical(&s)), s);
        assert!(flip_horizontal(&s).flip_horizontal);
        assert!(!flip_horizontal(&s).flip_vertical);
    }

    #[test]
    fn output_dimensions_swap_on_odd_quarters() {
        let mut s = TransformState::default();
        assert_eq!(output_dimensions(&s, 30, 10), (30, 10));
        s = rotate(&s, 90);
        assert_eq!(output_dimensions(&s, 30, 10), (10, 30));
        s = rotate(&s, 90);
        assert_eq!(output_dimensions(&s, 30, 10), (30, 10));
        s = rotate(&s, 90);
        assert_eq!(output_dimensions(&s, 30, 10), (10, 30));
    }

    fn marker_image() -> RgbaImage {
        // 3×2, red marker in the top-left corner.
        let mut img = RgbaImage::from_pixel(3, 2, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img
    }

    #[test]
    fn quarter_turn_moves_top_left_to_top_right() {
        let s = rotate(&TransformState::default(), 90);
        let out = apply_transform(&marker_image(), &s);
        assert_eq!(out.dimensions(), (2, 3));
        assert_eq!(out.get_pixel(1, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn flip_is_applied_before_rotation() {
        // Flip then rotate: marker goes top-left → top-right → bottom-right.
        let s = rotate(&flip_horizontal(&TransformState::default()), 90);
        let out = apply_transform(&marker_image(), &s);
        assert_eq!(out.get_pixel(1, 2), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn resize_hits_requested_dimensions() {
        let raster = Raster::filled(10, 6, Rgba([1, 2, 3, 255]));
        for interp in Interpolation::all() {
            let out = resize_raster(&raster, 4, 9, *interp);
            assert_eq!(out.dimensions(), (4, 9));
        }
    }

    #[test]
    fn interpolation_parses_labels() {
        assert_eq!("Lanczos3".parse::<Interpolation>(), Ok(Interpolation::Lanczos3));
        assert!("cubic-ish".parse::<Interpolation>().is_err());
    }
}
