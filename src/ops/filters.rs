// ============================================================================
// PARAMETRIC FILTERS: CSS-style render-time adjustments + Gaussian blur
// ============================================================================
//
// Nothing in here mutates stored pixels. `FilterSettings` describes the
// adjustment; `apply_filters` produces a new buffer for display or export.
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Slider values of the filter panel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// 0..2, 1 = unchanged.
    pub brightness: f32,
    /// 0..2, 1 = unchanged.
    pub contrast: f32,
    /// 0..2, 1 = unchanged.
    pub saturation: f32,
    /// 0..1
    pub grayscale: f32,
    /// 0..1
    pub sepia: f32,
    /// 0..1
    pub invert: f32,
    /// Blur radius (standard deviation) in pixels, 0..20.
    pub blur: f32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            grayscale: 0.0,
            sepia: 0.0,
            invert: 0.0,
            blur: 0.0,
        }
    }
}

/// One step of the filter chain, in the order they are applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterOp {
    Brightness(f32),
    Contrast(f32),
    Saturate(f32),
    Grayscale(f32),
    Sepia(f32),
    Invert(f32),
    Blur(f32),
}

impl FilterOp {
    fn css(&self) -> String {
        match self {
            FilterOp::Brightness(v) => format!("brightness({})", v),
            FilterOp::Contrast(v)   => format!("contrast({})", v),
            FilterOp::Saturate(v)   => format!("saturate({})", v),
            FilterOp::Grayscale(v)  => format!("grayscale({})", v),
            FilterOp::Sepia(v)      => format!("sepia({})", v),
            FilterOp::Invert(v)     => format!("invert({})", v),
            FilterOp::Blur(v)       => format!("blur({}px)", v),
        }
    }
}

impl FilterSettings {
    /// Copy with every field forced into its slider range. NaN falls back to
    /// the default value.
    pub fn clamped(&self) -> Self {
        let d = Self::default();
        let fit = |v: f32, lo: f32, hi: f32, dv: f32| if v.is_nan() { dv } else { v.clamp(lo, hi) };
        Self {
            brightness: fit(self.brightness, 0.0, 2.0, d.brightness),
            contrast: fit(self.contrast, 0.0, 2.0, d.contrast),
            saturation: fit(self.saturation, 0.0, 2.0, d.saturation),
            grayscale: fit(self.grayscale, 0.0, 1.0, d.grayscale),
            sepia: fit(self.sepia, 0.0, 1.0, d.sepia),
            invert: fit(self.invert, 0.0, 1.0, d.invert),
            blur: fit(self.blur, 0.0, 20.0, d.blur),
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Full filter chain, identity steps included, in application order.
    pub fn pipeline(&self) -> [FilterOp; 7] {
        [
            FilterOp::Brightness(self.brightness),
            FilterOp::Contrast(self.contrast),
            FilterOp::Saturate(self.saturation),
            FilterOp::Grayscale(self.grayscale),
            FilterOp::Sepia(self.sepia),
            FilterOp::Invert(self.invert),
            FilterOp::Blur(self.blur),
        ]
    }

    /// Value for a CSS `filter:` property describing these settings.
    pub fn css_filter_string(&self) -> String {
        self.pipeline().iter().map(FilterOp::css).collect::<Vec<_>>().join(" ")
    }

    /// Set a single field by its slider name (`brightness`, `contrast`,
    /// `saturation`, `grayscale`, `sepia`, `invert`, `blur`).
    pub fn with_field(mut self, name: &str, value: f32) -> Result<Self, String> {
        match name.trim().to_ascii_lowercase().as_str() {
            "brightness" => self.brightness = value,
            "contrast" => self.contrast = value,
            "saturation" | "saturate" => self.saturation = value,
            "grayscale" | "greyscale" => self.grayscale = value,
            "sepia" => self.sepia = value,
            "invert" => self.invert = value,
            "blur" => self.blur = value,
            other => return Err(format!("unknown filter '{}'", other)),
        }
        Ok(self.clamped())
    }
}

// ---------------------------------------------------------------------------
//  Colour matrices (W3C Filter Effects, linear over 0..255 channels)
// ---------------------------------------------------------------------------

type Matrix3 = [[f32; 3]; 3];

fn saturate_matrix(s: f32) -> Matrix3 {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn grayscale_matrix(amount: f32) -> Matrix3 {
    let a = 1.0 - amount;
    [
        [0.2126 + 0.7874 * a, 0.7152 - 0.7152 * a, 0.0722 - 0.0722 * a],
        [0.2126 - 0.2126 * a, 0.7152 + 0.2848 * a, 0.0722 - 0.0722 * a],
        [0.2126 - 0.2126 * a, 0.7152 - 0.7152 * a, 0.0722 + 0.9278 * a],
    ]
}

fn sepia_matrix(amount: f32) -> Matrix3 {
    let a = 1.0 - amount;
    [
        [0.393 + 0.607 * a, 0.769 - 0.769 * a, 0.189 - 0.189 * a],
        [0.349 - 0.349 * a, 0.686 + 0.314 * a, 0.168 - 0.168 * a],
        [0.272 - 0.272 * a, 0.534 - 0.534 * a, 0.131 + 0.869 * a],
    ]
}

#[inline]
fn mul(m: &Matrix3, c: [f32; 3]) -> [f32; 3] {
    let mut out = [0.0f32; 3];
    for (row, o) in m.iter().zip(out.iter_mut()) {
        *o = (row[0] * c[0] + row[1] * c[1] + row[2] * c[2]).clamp(0.0, 255.0);
    }
    out
}

/// Run the colour steps of the chain on one pixel. Each step clamps, as a
/// browser does between filter functions.
fn colour_pixel(settings: &FilterSettings, sat: &Matrix3, gray: &Matrix3, sep: &Matrix3, c: [f32; 3]) -> [f32; 3] {
    let mut c = c.map(|v| (v * settings.brightness).clamp(0.0, 255.0));
    c = c.map(|v| ((v - 127.5) * settings.contrast + 127.5).clamp(0.0, 255.0));
    if settings.saturation != 1.0 {
        c = mul(sat, c);
    }
    if settings.grayscale > 0.0 {
        c = mul(gray, c);
    }
    if settings.sepia > 0.0 {
        c = mul(sep, c);
    }
    let inv = settings.invert;
    c.map(|v| (255.0 - v) * inv + v * (1.0 - inv))
}

/// Render `settings` onto a copy of `src`. Alpha passes through the colour
/// steps unchanged and is blurred along with the colour channels.
pub fn apply_filters(src: &RgbaImage, settings: &FilterSettings) -> RgbaImage {
    let settings = settings.clamped();
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 {
        return src.clone();
    }

    let sat = saturate_matrix(settings.saturation);
    let gray = grayscale_matrix(settings.grayscale);
    let sep = sepia_matrix(settings.sepia);

    let src_raw = src.as_raw();
    let stride = w * 4;
    let mut dst_raw = vec![0u8; w * h * 4];

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for x in 0..w {
            let pi = x * 4;
            let c = [row_in[pi] as f32, row_in[pi + 1] as f32, row_in[pi + 2] as f32];
            let [r, g, b] = colour_pixel(&settings, &sat, &gray, &sep, c);
            row_out[pi]     = r.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 1] = g.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 2] = b.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 3] = row_in[pi + 3];
        }
    });

    let coloured = RgbaImage::from_raw(w as u32, h as u32, dst_raw)
        .unwrap_or_else(|| unreachable!("buffer sized from the source dimensions"));
    if settings.blur > 0.0 {
        parallel_gaussian_blur(&coloured, settings.blur)
    } else {
        coloured
    }
}

// ---------------------------------------------------------------------------
//  Parallel separable Gaussian blur (rayon)
// ---------------------------------------------------------------------------

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma).
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let mut kernel = vec![0.0f32; len];
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;
    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        let v = (-x * x / s2).exp();
        *k = v;
        sum += v;
    }
    let inv = 1.0 / sum;
    for v in &mut kernel { *v *= inv; }
    kernel
}

/// Rayon-parallelized separable Gaussian blur. Edges are clamped.
pub fn parallel_gaussian_blur(src: &RgbaImage, sigma: f32) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 || sigma <= 0.0 { return src.clone(); }

    let kernel = build_gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    let buf_in: Vec<f32> = src.as_raw().iter().map(|&b| b as f32).collect();
    let pixel_count = w * h * 4;

    // --- Horizontal pass (parallel by row) ---
    let mut buf_h = vec![0.0f32; pixel_count];
    buf_h.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        let row_in_start = y * w * 4;
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius as isize)
                    .clamp(0, w as isize - 1) as usize;
                let idx = row_in_start + sx * 4;
                for c in 0..4 {
                    acc[c] += buf_in[idx + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    // --- Vertical pass (parallel by row) ---
    let mut buf_v = vec![0.0f32; pixel_count];
    buf_v.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius as isize)
                    .clamp(0, h as isize - 1) as usize;
                let idx = sy * w * 4 + x * 4;
                for c in 0..4 {
                    acc[c] += buf_h[idx + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    let dst_raw: Vec<u8> = buf_v.iter().map(|&v| v.round().clamp(0.0, 255.0) as u8).collect();
    RgbaImage::from_raw(w as u32, h as u32, dst_raw)
        .unwrap_or_else(|| unreachable!("buffer sized from the source dimensions"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(c: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba(c))
    }

    #[test]
    fn defaults_render_unchanged_pixels() {
        let img = solid([12, 130, 240, 200]);
        assert_eq!(apply_filters(&img, &FilterSettings::default()), img);
    }

    #[test]
    fn css_string_lists_every_step_in_order() {
        let s = FilterSettings { brightness: 1.5, blur: 3.0, ..FilterSettings::default() };
        assert_eq!(
            s.css_filter_string(),
            "brightness(1.5) contrast(1) saturate(1) grayscale(0) sepia(0) invert(0) blur(3px)"
        );
    }

    #[test]
    fn clamped_forces_slider_ranges() {
        let s = FilterSettings { brightness: 9.0, invert: -1.0, blur: 50.0, sepia: f32::NAN, ..FilterSettings::default() }
            .clamped();
        assert_eq!(s.brightness, 2.0);
        assert_eq!(s.invert, 0.0);
        assert_eq!(s.blur, 20.0);
        assert_eq!(s.sepia, 0.0);
    }

    #[test]
    fn brightness_scales_and_clamps() {
        let img = solid([100, 200, 0, 255]);
        let s = FilterSettings { brightness: 1.5, ..FilterSettings::default() };
        assert_eq!(apply_filters(&img, &s).get_pixel(0, 0), &Rgba([150, 255, 0, 255]));
    }

    #[test]
    fn zero_contrast_is_mid_grey() {
        let img = solid([0, 90, 255, 255]);
        let s = FilterSettings { contrast: 0.0, ..FilterSettings::default() };
        let p = apply_filters(&img, &s);
        assert_eq!(p.get_pixel(2, 2), &Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn full_grayscale_equalises_channels() {
        let img = solid([200, 40, 90, 255]);
        let s = FilterSettings { grayscale: 1.0, ..FilterSettings::default() };
        let p = apply_filters(&img, &s);
        let px = p.get_pixel(0, 0);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn full_invert_flips_channels_and_keeps_alpha() {
        let img = solid([10, 20, 30, 77]);
        let s = FilterSettings { invert: 1.0, ..FilterSettings::default() };
        assert_eq!(apply_filters(&img, &s).get_pixel(3, 3), &Rgba([245, 235, 225, 77]));
    }

    #[test]
    fn blur_of_uniform_image_is_uniform() {
        let img = solid([60, 60, 60, 255]);
        assert_eq!(parallel_gaussian_blur(&img, 2.0), img);
    }

    #[test]
    fn with_field_rejects_unknown_names() {
        let s = FilterSettings::default().with_field("Contrast", 1.4).unwrap();
        assert_eq!(s.contrast, 1.4);
        assert!(FilterSettings::default().with_field("hue", 1.0).is_err());
    }
}
