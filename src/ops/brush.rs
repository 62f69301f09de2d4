// ============================================================================
// BRUSH: freehand pen / eraser strokes baked into a raster copy
// ============================================================================
//
// The draw tool collects strokes on a scratch layer and only touches the
// document on "Apply". Here each stroke is rasterised into a coverage mask by
// stamping anti-aliased round dabs every pixel along its path, then the mask
// is composited: source-over for the pen, alpha removal for the eraser.
// ============================================================================

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::canvas::Raster;
use crate::error::{EditorError, Result};

pub const DEFAULT_BRUSH_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const DEFAULT_BRUSH_SIZE: f32 = 5.0;
pub const MAX_BRUSH_SIZE: f32 = 50.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BrushTool {
    #[default]
    Pen,
    Eraser,
}

/// One press-drag-release gesture, in raster pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub tool: BrushTool,
    /// Ignored by the eraser.
    pub color: Rgba<u8>,
    /// Line width (brush diameter) in pixels.
    pub size: f32,
    pub points: Vec<(f32, f32)>,
}

impl Stroke {
    pub fn pen(color: Rgba<u8>, size: f32, points: Vec<(f32, f32)>) -> Self {
        Self { tool: BrushTool::Pen, color, size, points }
    }

    pub fn eraser(size: f32, points: Vec<(f32, f32)>) -> Self {
        Self { tool: BrushTool::Eraser, color: Rgba([0, 0, 0, 0]), size, points }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.size.is_finite() || self.size <= 0.0 {
            return Err(EditorError::InvalidParameter(format!(
                "brush size must be positive, got {}",
                self.size
            )));
        }
        if self.points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(EditorError::InvalidParameter("stroke has a non-finite point".into()));
        }
        Ok(())
    }
}

/// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA` (leading `#` optional).
pub fn parse_hex_color(s: &str) -> std::result::Result<Rgba<u8>, String> {
    let hex = s.trim().trim_start_matches('#');
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
    let bad = |_| format!("invalid colour '{}'", s);
    if !hex.is_ascii() {
        return Err(format!("invalid colour '{}'", s));
    }
    match hex.len() {
        3 => Ok(Rgba([nibble(0).map_err(bad)?, nibble(1).map_err(bad)?, nibble(2).map_err(bad)?, 255])),
        6 => Ok(Rgba([byte(0).map_err(bad)?, byte(2).map_err(bad)?, byte(4).map_err(bad)?, 255])),
        8 => Ok(Rgba([
            byte(0).map_err(bad)?,
            byte(2).map_err(bad)?,
            byte(4).map_err(bad)?,
            byte(6).map_err(bad)?,
        ])),
        _ => Err(format!("invalid colour '{}'", s)),
    }
}

// ============================================================================
// RASTERISATION
// ============================================================================

#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Max-combine one round dab into `mask`. The edge fades over one pixel.
fn stamp(mask: &mut [f32], w: usize, h: usize, cx: f32, cy: f32, radius: f32) {
    let reach = radius + 0.5;
    let x0 = (cx - reach).floor().max(0.0) as usize;
    let y0 = (cy - reach).floor().max(0.0) as usize;
    let x1 = ((cx + reach).ceil().max(0.0) as usize).min(w);
    let y1 = ((cy + reach).ceil().max(0.0) as usize).min(h);

    for y in y0..y1 {
        let py = y as f32 + 0.5 - cy;
        for x in x0..x1 {
            let px = x as f32 + 0.5 - cx;
            let dist = (px * px + py * py).sqrt();
            let a = 1.0 - smoothstep(radius - 0.5, radius + 0.5, dist);
            let slot = &mut mask[y * w + x];
            if a > *slot {
                *slot = a;
            }
        }
    }
}

/// Clip the segment `p0 → p1` to the box `[min, max]` on both axes
/// (Liang-Barsky). `None` when it misses the box entirely.
fn clip_segment(p0: (f32, f32), p1: (f32, f32), min: f64, max_x: f64, max_y: f64) -> Option<((f32, f32), (f32, f32))> {
    let (x0, y0) = (p0.0 as f64, p0.1 as f64);
    let dx = p1.0 as f64 - x0;
    let dy = p1.1 as f64 - y0;
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    for (p, q) in [(-dx, x0 - min), (dx, max_x - x0), (-dy, y0 - min), (dy, max_y - y0)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    let at = |t: f64| ((x0 + dx * t) as f32, (y0 + dy * t) as f32);
    Some((at(t0), at(t1)))
}

/// Coverage of one stroke, 0..1 per pixel. Round caps and joins fall out of
/// stamping circles at 1 px steps.
fn stroke_coverage(stroke: &Stroke, w: usize, h: usize) -> Vec<f32> {
    let mut mask = vec![0.0f32; w * h];
    let radius = stroke.size / 2.0;
    let Some(&first) = stroke.points.first() else { return mask };

    // Dabs centred further out than this cannot reach a pixel.
    let pad = radius as f64 + 1.0;

    stamp(&mut mask, w, h, first.0, first.1, radius);
    for seg in stroke.points.windows(2) {
        let Some(((x0, y0), (x1, y1))) = clip_segment(seg[0], seg[1], -pad, w as f64 + pad, h as f64 + pad) else {
            continue;
        };
        let dx = x1 - x0;
        let dy = y1 - y0;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance < 0.1 {
            stamp(&mut mask, w, h, x1, y1, radius);
            continue;
        }
        let steps = distance.ceil() as usize;
        for i in 1..=steps {
            let t = i as f32 / steps as f32;
            stamp(&mut mask, w, h, x0 + dx * t, y0 + dy * t, radius);
        }
    }
    mask
}

/// Composite one stroke onto `img` in place.
fn composite(img: &mut RgbaImage, stroke: &Stroke) {
    let w = img.width() as usize;
    let h = img.height() as usize;
    if w == 0 || h == 0 || stroke.points.is_empty() {
        return;
    }
    let mask = stroke_coverage(stroke, w, h);
    let stride = w * 4;
    let tool = stroke.tool;
    let color = stroke.color.0;

    let raw: &mut [u8] = img;
    raw.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..w {
                let cov = mask[y * w + x];
                if cov <= 0.0 {
                    continue;
                }
                let pi = x * 4;
                match tool {
                    BrushTool::Eraser => {
                        let da = row[pi + 3] as f32 * (1.0 - cov);
                        row[pi + 3] = da.round().clamp(0.0, 255.0) as u8;
                    }
                    BrushTool::Pen => {
                        let sa = color[3] as f32 / 255.0 * cov;
                        let da = row[pi + 3] as f32 / 255.0;
                        let oa = sa + da * (1.0 - sa);
                        if oa <= 0.0 {
                            continue;
                        }
                        for c in 0..3 {
                            let sc = color[c] as f32;
                            let dc = row[pi + c] as f32;
                            let v = (sc * sa + dc * da * (1.0 - sa)) / oa;
                            row[pi + c] = v.round().clamp(0.0, 255.0) as u8;
                        }
                        row[pi + 3] = (oa * 255.0).round().clamp(0.0, 255.0) as u8;
                    }
                }
            }
        });
}

/// Bake `strokes`, in order, onto a copy of `raster`.
pub fn draw_strokes(raster: &Raster, strokes: &[Stroke]) -> Result<Raster> {
    for s in strokes {
        s.validate()?;
    }
    let mut img = raster.to_rgba_image();
    for s in strokes {
        composite(&mut img, s);
    }
    Ok(Raster::from_rgba_image(img))
}
