use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::ops::filters::{self, FilterSettings};
use crate::ops::transform::{self, TransformState};

// ============================================================================
// RASTER: immutable RGBA pixel grid shared between the session and history
// ============================================================================

/// A decoded bitmap. Once built it is never written to again: every baked
/// operation produces a fresh `Raster`, so any number of history entries can
/// hold the same one through a [`RasterRef`].
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    pixels: RgbaImage,
}

/// Shared, read-only handle to a raster version.
pub type RasterRef = Arc<Raster>;

impl Raster {
    /// Fully transparent raster.
    pub fn new(width: u32, height: u32) -> Self {
        Self { pixels: RgbaImage::new(width, height) }
    }

    pub fn filled(width: u32, height: u32, color: Rgba<u8>) -> Self {
        Self { pixels: RgbaImage::from_pixel(width, height, color) }
    }

    pub fn from_rgba_image(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Build from a raw RGBA8 buffer. Returns `None` if the buffer length does
    /// not match `width * height * 4`.
    pub fn from_raw(width: u32, height: u32, raw: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, raw).map(|pixels| Self { pixels })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    /// Borrow the underlying image for read-only processing.
    pub fn as_rgba_image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    /// Copy of the pixels, for tools that work on a scratch buffer until "Apply".
    pub fn to_rgba_image(&self) -> RgbaImage {
        self.pixels.clone()
    }

    pub fn into_rgba_image(self) -> RgbaImage {
        self.pixels
    }

    pub fn into_ref(self) -> RasterRef {
        Arc::new(self)
    }

    pub fn memory_bytes(&self) -> usize {
        self.pixels.as_raw().len()
    }
}

impl From<RgbaImage> for Raster {
    fn from(pixels: RgbaImage) -> Self {
        Self::from_rgba_image(pixels)
    }
}

// ============================================================================
// VIEW RENDERING: base raster + transform + filters → displayed pixels
// ============================================================================

/// Recompute the visible image: the geometric transform is drawn first, then
/// the parametric filters are applied to the transformed result, the way a
/// CSS `filter` applies to an already-drawn canvas.
///
/// Output dimensions are the raster's, swapped for quarter and three-quarter
/// turns.
pub fn render_view(raster: &Raster, transform: &TransformState, settings: &FilterSettings) -> RgbaImage {
    let drawn = transform::apply_transform(raster.as_rgba_image(), transform);
    if settings.is_identity() {
        return drawn;
    }
    filters::apply_filters(&drawn, settings)
}
