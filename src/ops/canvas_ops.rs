// ============================================================================
// CANVAS-LEVEL OPERATIONS: crop, resize, lossy re-encode
// ============================================================================
//
// These replace the whole raster. Each returns a fresh `Raster` or an error
// and never touches its input, so a failed call leaves the document as it was.
// ============================================================================

use crate::canvas::Raster;
use crate::error::{EditorError, Result};
use crate::io::{self, ExportFormat};
use crate::ops::transform::{self, Interpolation};

/// Upper bound the resize dialog accepts per axis.
pub const MAX_RESIZE_DIM: u32 = 4000;

/// Quality the compress tool starts at.
pub const DEFAULT_COMPRESS_QUALITY: f32 = 0.8;

// ============================================================================
// CROP
// ============================================================================

/// Axis-aligned crop box in raster pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Initial box of the crop tool: up to 200 px (or 80% of the side,
    /// whichever is smaller) per axis, centred on the image.
    pub fn centered_default(image_w: u32, image_h: u32) -> Self {
        let side = |dim: u32| (200.0f32.min(dim as f32 * 0.8)).round().max(1.0).min(dim as f32) as u32;
        let width = side(image_w);
        let height = side(image_h);
        Self {
            x: (image_w - width) / 2,
            y: (image_h - height) / 2,
            width,
            height,
        }
    }

    /// Reject zero-area boxes and boxes reaching outside `image_w × image_h`.
    pub fn validate(&self, image_w: u32, image_h: u32) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EditorError::InvalidGeometry(format!(
                "crop area {}x{} is empty",
                self.width, self.height
            )));
        }
        let right = self.x as u64 + self.width as u64;
        let bottom = self.y as u64 + self.height as u64;
        if right > image_w as u64 || bottom > image_h as u64 {
            return Err(EditorError::InvalidGeometry(format!(
                "crop area {}x{}+{}+{} exceeds image bounds {}x{}",
                self.width, self.height, self.x, self.y, image_w, image_h
            )));
        }
        Ok(())
    }
}

/// Copy the pixels inside `rect` into a new raster of exactly
/// `rect.width × rect.height`.
pub fn crop(raster: &Raster, rect: CropRect) -> Result<Raster> {
    let (w, h) = raster.dimensions();
    rect.validate(w, h)?;
    let cropped = image::imageops::crop_imm(raster.as_rgba_image(), rect.x, rect.y, rect.width, rect.height)
        .to_image();
    Ok(Raster::from_rgba_image(cropped))
}

// ============================================================================
// RESIZE
// ============================================================================

/// Resample to `new_w × new_h`, each side in `1..=MAX_RESIZE_DIM`.
pub fn resize(raster: &Raster, new_w: u32, new_h: u32, interp: Interpolation) -> Result<Raster> {
    if new_w == 0 || new_h == 0 {
        return Err(EditorError::InvalidGeometry(format!(
            "resize target {}x{} has a zero dimension",
            new_w, new_h
        )));
    }
    if new_w > MAX_RESIZE_DIM || new_h > MAX_RESIZE_DIM {
        return Err(EditorError::InvalidGeometry(format!(
            "resize target {}x{} exceeds {} px per side",
            new_w, new_h, MAX_RESIZE_DIM
        )));
    }
    Ok(transform::resize_raster(raster, new_w, new_h, interp))
}

/// Companion dimension when the aspect lock is on. `changed` is the new
/// value of one side; the result is the other side, never below 1.
///
/// `width_changed = true`: returns the height for `changed` as width.
pub fn aspect_locked_size(orig_w: u32, orig_h: u32, changed: u32, width_changed: bool) -> u32 {
    if orig_w == 0 || orig_h == 0 {
        return changed.max(1);
    }
    let aspect = orig_w as f64 / orig_h as f64;
    let other = if width_changed {
        changed as f64 / aspect
    } else {
        changed as f64 * aspect
    };
    (other.round() as u32).max(1)
}

// ============================================================================
// COMPRESS
// ============================================================================

/// Lossy re-encode: JPEG round trip at `quality` in (0, 1]. The result has
/// the input's dimensions; transparency is flattened by the codec.
pub fn compress(raster: &Raster, quality: f32) -> Result<Raster> {
    let bytes = io::encode(raster.as_rgba_image(), ExportFormat::Jpeg, quality)?;
    let decoded = io::decode(&bytes, ExportFormat::Jpeg.mime())?;
    if decoded.dimensions() != raster.dimensions() {
        return Err(EditorError::DecodeFailure(format!(
            "re-encoded image is {}x{}, expected {}x{}",
            decoded.width(),
            decoded.height(),
            raster.width(),
            raster.height()
        )));
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient(w: u32, h: u32) -> Raster {
        Raster::from_rgba_image(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 90, 255])
        }))
    }

    #[test]
    fn crop_yields_requested_size_and_pixels() {
        let src = gradient(20, 10);
        let out = crop(&src, CropRect::new(3, 2, 8, 5)).unwrap();
        assert_eq!(out.dimensions(), (8, 5));
        assert_eq!(out.pixel(0, 0), src.pixel(3, 2));
        assert_eq!(out.pixel(7, 4), src.pixel(10, 6));
    }

    #[test]
    fn crop_rejects_empty_and_out_of_bounds_boxes() {
        let src = gradient(20, 10);
        assert!(matches!(crop(&src, CropRect::new(0, 0, 0, 5)), Err(EditorError::InvalidGeometry(_))));
        assert!(matches!(crop(&src, CropRect::new(15, 0, 6, 5)), Err(EditorError::InvalidGeometry(_))));
        assert!(matches!(crop(&src, CropRect::new(0, 9, 4, 2)), Err(EditorError::InvalidGeometry(_))));
        assert!(crop(&src, CropRect::new(0, 0, 20, 10)).is_ok());
    }

    #[test]
    fn default_crop_box_is_centred() {
        assert_eq!(CropRect::centered_default(1000, 500), CropRect::new(400, 150, 200, 200));
        // Small images get 80% of each side.
        assert_eq!(CropRect::centered_default(100, 50), CropRect::new(10, 5, 80, 40));
        let tiny = CropRect::centered_default(1, 1);
        assert!(tiny.validate(1, 1).is_ok());
    }

    #[test]
    fn resize_rejects_zero_dimensions() {
        let src = gradient(4, 4);
        assert!(matches!(resize(&src, 0, 3, Interpolation::Bilinear), Err(EditorError::InvalidGeometry(_))));
        assert_eq!(resize(&src, 9, 2, Interpolation::Nearest).unwrap().dimensions(), (9, 2));
    }

    #[test]
    fn resize_rejects_oversized_targets() {
        let src = gradient(4, 4);
        assert!(matches!(resize(&src, 100_000, 100_000, Interpolation::Bilinear), Err(EditorError::InvalidGeometry(_))));
        assert!(matches!(resize(&src, 2, MAX_RESIZE_DIM + 1, Interpolation::Nearest), Err(EditorError::InvalidGeometry(_))));
        assert_eq!(resize(&src, MAX_RESIZE_DIM, 1, Interpolation::Nearest).unwrap().dimensions(), (MAX_RESIZE_DIM, 1));
    }

    #[test]
    fn aspect_lock_rounds_the_companion_side() {
        assert_eq!(aspect_locked_size(1600, 900, 800, true), 450);
        assert_eq!(aspect_locked_size(1600, 900, 450, false), 800);
        assert_eq!(aspect_locked_size(3, 1, 1, true), 1);
    }

    #[test]
    fn compress_keeps_dimensions() {
        let src = gradient(33, 17);
        let out = compress(&src, 0.5).unwrap();
        assert_eq!(out.dimensions(), (33, 17));
    }

    #[test]
    fn compress_rejects_out_of_range_quality() {
        let src = gradient(4, 4);
        assert!(matches!(compress(&src, 0.0), Err(EditorError::InvalidParameter(_))));
        assert!(matches!(compress(&src, 1.5), Err(EditorError::InvalidParameter(_))));
    }
}
