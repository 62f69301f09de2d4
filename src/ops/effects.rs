// ============================================================================
// EFFECTS ENGINE: rayon-parallelized destructive pixel effects
// ============================================================================
//
// Every effect takes the current raster's pixels and returns a new buffer of
// the same size; the source is never written. The session bakes the result
// into history.
//
// Effects are grouped into categories:
//   - Colour: Vintage
//   - Distort: Pixelate
//   - Stylize: Edge Detect, Emboss, Sharpen (3×3 kernels)
// ============================================================================

use std::str::FromStr;

use image::RgbaImage;
use rayon::prelude::*;

/// Default tile size of the pixelate effect.
pub const DEFAULT_PIXELATE_BLOCK: u32 = 10;

// ============================================================================
// EFFECT CATALOGUE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    Vintage,
    Pixelate { block_size: u32 },
    EdgeDetect,
    Emboss,
    Sharpen,
}

impl Effect {
    pub fn label(&self) -> &'static str {
        match self {
            Effect::Vintage       => "vintage",
            Effect::Pixelate { .. } => "pixelate",
            Effect::EdgeDetect    => "edge-detect",
            Effect::Emboss        => "emboss",
            Effect::Sharpen       => "sharpen",
        }
    }

    pub fn apply(&self, flat: &RgbaImage) -> RgbaImage {
        match *self {
            Effect::Vintage => vintage_core(flat),
            Effect::Pixelate { block_size } => pixelate_core(flat, block_size),
            Effect::EdgeDetect => edge_detect_core(flat),
            Effect::Emboss => emboss_core(flat),
            Effect::Sharpen => sharpen_core(flat),
        }
    }
}

impl FromStr for Effect {
    type Err = String;

    /// Accepts `vintage`, `pixelate`, `pixelate:<n>`, `edge-detect` (or
    /// `edges`), `emboss` and `sharpen`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (name, arg) = match s.split_once(':') {
            Some((n, a)) => (n, Some(a)),
            None => (s.as_str(), None),
        };
        let effect = match name {
            "vintage" => Effect::Vintage,
            "pixelate" => {
                let block_size = match arg {
                    Some(a) => a
                        .trim()
                        .parse::<u32>()
                        .map_err(|_| format!("invalid pixelate block size '{}'", a))?,
                    None => DEFAULT_PIXELATE_BLOCK,
                };
                return Ok(Effect::Pixelate { block_size });
            }
            "edge-detect" | "edge_detect" | "edges" => Effect::EdgeDetect,
            "emboss" => Effect::Emboss,
            "sharpen" => Effect::Sharpen,
            other => return Err(format!("unknown effect '{}'", other)),
        };
        if arg.is_some() {
            return Err(format!("effect '{}' takes no parameter", name));
        }
        Ok(effect)
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

fn finish(w: usize, h: usize, dst_raw: Vec<u8>) -> RgbaImage {
    RgbaImage::from_raw(w as u32, h as u32, dst_raw)
        .unwrap_or_else(|| unreachable!("buffer sized from the source dimensions"))
}

/// Run a 3×3 kernel over every interior pixel. The outermost ring of pixels
/// is copied from the source unchanged. `processor` receives the 3×3
/// neighbourhood (row-major, `[dy][dx]`) and returns the output pixel.
fn apply_3x3<F>(flat: &RgbaImage, processor: F) -> RgbaImage
where
    F: Fn(&[[[u8; 4]; 3]; 3]) -> [u8; 4] + Sync,
{
    let w = flat.width() as usize;
    let h = flat.height() as usize;
    if w < 3 || h < 3 {
        return flat.clone();
    }

    let src_raw = flat.as_raw();
    let stride = w * 4;
    let mut dst_raw = src_raw.clone();

    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .filter(|(y, _)| *y > 0 && *y < h - 1)
        .for_each(|(y, row_out)| {
            for x in 1..w - 1 {
                let mut n = [[[0u8; 4]; 3]; 3];
                for (dy, row) in n.iter_mut().enumerate() {
                    let base = (y + dy - 1) * stride;
                    for (dx, px) in row.iter_mut().enumerate() {
                        let si = base + (x + dx - 1) * 4;
                        px.copy_from_slice(&src_raw[si..si + 4]);
                    }
                }
                let pi = x * 4;
                row_out[pi..pi + 4].copy_from_slice(&processor(&n));
            }
        });

    finish(w, h, dst_raw)
}

/// Weighted sum of one channel over a 3×3 neighbourhood.
#[inline]
fn convolve_channel(n: &[[[u8; 4]; 3]; 3], kernel: &[[f32; 3]; 3], c: usize) -> f32 {
    let mut acc = 0.0f32;
    for dy in 0..3 {
        for dx in 0..3 {
            acc += n[dy][dx][c] as f32 * kernel[dy][dx];
        }
    }
    acc
}

// ============================================================================
// COLOUR
// ============================================================================

// --- Vintage (warm colour matrix) ---

pub fn vintage_core(flat: &RgbaImage) -> RgbaImage {
    let w = flat.width() as usize;
    let h = flat.height() as usize;
    if w == 0 || h == 0 {
        return flat.clone();
    }

    let src_raw = flat.as_raw();
    let stride = w * 4;
    let mut dst_raw = vec![0u8; w * h * 4];

    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row_out)| {
            let row_in = &src_raw[y * stride..(y + 1) * stride];
            for x in 0..w {
                let pi = x * 4;
                let r = row_in[pi] as f32;
                let g = row_in[pi + 1] as f32;
                let b = row_in[pi + 2] as f32;
                let nr = 0.9 * r + 0.5 * g + 0.1 * b;
                let ng = 0.3 * r + 0.8 * g + 0.1 * b;
                let nb = 0.2 * r + 0.3 * g + 0.5 * b;
                row_out[pi] = nr.round().clamp(0.0, 255.0) as u8;
                row_out[pi + 1] = ng.round().clamp(0.0, 255.0) as u8;
                row_out[pi + 2] = nb.round().clamp(0.0, 255.0) as u8;
                row_out[pi + 3] = row_in[pi + 3];
            }
        });

    finish(w, h, dst_raw)
}

// ============================================================================
// DISTORT
// ============================================================================

// --- Pixelate ---

/// Flatten each `block_size`-square tile to the colour of its top-left pixel.
/// Tiles along the right and bottom edges may be smaller. A block size of 0
/// or 1 leaves the image unchanged.
pub fn pixelate_core(flat: &RgbaImage, block_size: u32) -> RgbaImage {
    let bs = block_size.max(1) as usize;
    let w = flat.width() as usize;
    let h = flat.height() as usize;
    if w == 0 || h == 0 || bs == 1 {
        return flat.clone();
    }

    let src_raw = flat.as_raw();
    let stride = w * 4;
    let mut dst_raw = vec![0u8; w * h * 4];

    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row_out)| {
            let sy = (y / bs) * bs;
            for x in 0..w {
                let sx = (x / bs) * bs;
                let si = sy * stride + sx * 4;
                let pi = x * 4;
                row_out[pi..pi + 4].copy_from_slice(&src_raw[si..si + 4]);
            }
        });

    finish(w, h, dst_raw)
}

// ============================================================================
// STYLIZE
// ============================================================================

// --- Edge Detect (Sobel, thresholded) ---

const SOBEL_X: [[f32; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: [[f32; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];
const EDGE_THRESHOLD: f32 = 128.0;

pub fn edge_detect_core(flat: &RgbaImage) -> RgbaImage {
    apply_3x3(flat, |n| {
        let mut gx = 0.0f32;
        let mut gy = 0.0f32;
        for dy in 0..3 {
            for dx in 0..3 {
                let p = n[dy][dx];
                let lum = (p[0] as f32 + p[1] as f32 + p[2] as f32) / 3.0;
                gx += lum * SOBEL_X[dy][dx];
                gy += lum * SOBEL_Y[dy][dx];
            }
        }
        let v = if (gx * gx + gy * gy).sqrt() > EDGE_THRESHOLD { 255 } else { 0 };
        [v, v, v, 255]
    })
}

// --- Emboss ---

const EMBOSS: [[f32; 3]; 3] = [[-2.0, -1.0, 0.0], [-1.0, 1.0, 1.0], [0.0, 1.0, 2.0]];

pub fn emboss_core(flat: &RgbaImage) -> RgbaImage {
    apply_3x3(flat, |n| {
        let ch = |c| (convolve_channel(n, &EMBOSS, c) + 128.0).clamp(0.0, 255.0) as u8;
        [ch(0), ch(1), ch(2), 255]
    })
}

// --- Sharpen ---

const SHARPEN: [[f32; 3]; 3] = [[0.0, -1.0, 0.0], [-1.0, 5.0, -1.0], [0.0, -1.0, 0.0]];

pub fn sharpen_core(flat: &RgbaImage) -> RgbaImage {
    apply_3x3(flat, |n| {
        let ch = |c| convolve_channel(n, &SHARPEN, c).clamp(0.0, 255.0) as u8;
        [ch(0), ch(1), ch(2), n[1][1][3]]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, c: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(c))
    }

    /// Left `split` columns black, the rest white.
    fn vertical_edge(w: u32, h: u32, split: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, _| {
            if x < split { Rgba([0, 0, 0, 255]) } else { Rgba([255, 255, 255, 255]) }
        })
    }

    #[test]
    fn vintage_uses_the_warm_matrix_and_keeps_alpha() {
        let out = vintage_core(&solid(2, 2, [100, 50, 20, 90]));
        // 90+25+2, 30+40+2, 20+15+10
        assert_eq!(out.get_pixel(1, 1), &Rgba([117, 72, 45, 90]));
    }

    #[test]
    fn vintage_clamps_bright_pixels() {
        let out = vintage_core(&solid(1, 1, [255, 255, 255, 255]));
        assert_eq!(out.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn pixelate_copies_each_tile_top_left() {
        let img = RgbaImage::from_fn(5, 5, |x, y| Rgba([x as u8 * 10, y as u8 * 10, 0, 255]));
        let out = pixelate_core(&img, 2);
        assert_eq!(out.dimensions(), (5, 5));
        assert_eq!(out.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(3, 2), &Rgba([20, 20, 0, 255]));
        // Ragged last tile still samples its own top-left pixel.
        assert_eq!(out.get_pixel(4, 4), &Rgba([40, 40, 0, 255]));
    }

    #[test]
    fn pixelate_with_block_zero_or_one_is_identity() {
        let img = RgbaImage::from_fn(4, 3, |x, y| Rgba([x as u8, y as u8, 7, 255]));
        assert_eq!(pixelate_core(&img, 0), img);
        assert_eq!(pixelate_core(&img, 1), img);
    }

    #[test]
    fn edge_detect_of_uniform_image_is_black_inside() {
        let out = edge_detect_core(&solid(6, 6, [180, 40, 90, 120]));
        for y in 1..5 {
            for x in 1..5 {
                assert_eq!(out.get_pixel(x, y), &Rgba([0, 0, 0, 255]));
            }
        }
        // Border copied from the source.
        assert_eq!(out.get_pixel(0, 0), &Rgba([180, 40, 90, 120]));
    }

    #[test]
    fn edge_detect_marks_a_vertical_edge() {
        let out = edge_detect_core(&vertical_edge(6, 5, 3));
        for y in 1..4 {
            assert_eq!(out.get_pixel(1, y)[0], 0);
            assert_eq!(out.get_pixel(2, y)[0], 255);
            assert_eq!(out.get_pixel(3, y)[0], 255);
            assert_eq!(out.get_pixel(4, y)[0], 0);
        }
    }

    #[test]
    fn emboss_of_uniform_image_adds_the_centre_weight() {
        // Kernel sums to 1, so a flat colour c becomes c + 128.
        let out = emboss_core(&solid(4, 4, [10, 100, 200, 30]));
        assert_eq!(out.get_pixel(1, 2), &Rgba([138, 228, 255, 255]));
    }

    #[test]
    fn sharpen_leaves_flat_regions_and_alpha_alone() {
        let img = solid(5, 5, [60, 70, 80, 200]);
        assert_eq!(sharpen_core(&img), img);
    }

    #[test]
    fn sharpen_boosts_a_bright_centre() {
        let mut img = solid(3, 3, [50, 50, 50, 255]);
        img.put_pixel(1, 1, Rgba([100, 100, 100, 255]));
        let out = sharpen_core(&img);
        // 5*100 - 4*50 = 300 → 255
        assert_eq!(out.get_pixel(1, 1), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(0, 1), &Rgba([50, 50, 50, 255]));
    }

    #[test]
    fn tiny_images_pass_through_kernels() {
        let img = solid(2, 2, [1, 2, 3, 4]);
        assert_eq!(emboss_core(&img), img);
        assert_eq!(edge_detect_core(&img), img);
    }

    #[test]
    fn effects_parse_from_labels() {
        assert_eq!("Sharpen".parse::<Effect>(), Ok(Effect::Sharpen));
        assert_eq!("pixelate".parse::<Effect>(), Ok(Effect::Pixelate { block_size: 10 }));
        assert_eq!("pixelate:4".parse::<Effect>(), Ok(Effect::Pixelate { block_size: 4 }));
        assert_eq!("edges".parse::<Effect>(), Ok(Effect::EdgeDetect));
        assert!("emboss:3".parse::<Effect>().is_err());
        assert!("posterize".parse::<Effect>().is_err());
        assert_eq!(Effect::EdgeDetect.label(), "edge-detect");
    }

    #[test]
    fn apply_preserves_dimensions() {
        let img = vertical_edge(7, 4, 2);
        for e in [
            Effect::Vintage,
            Effect::Pixelate { block_size: 3 },
            Effect::EdgeDetect,
            Effect::Emboss,
            Effect::Sharpen,
        ] {
            assert_eq!(e.apply(&img).dimensions(), (7, 4), "{}", e.label());
        }
    }
}
