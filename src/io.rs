use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::canvas::Raster;
use crate::error::{EditorError, Result};

// ============================================================================
// FORMATS
// ============================================================================

/// MIME types the upload path accepts. Anything else is refused before the
/// bytes reach a decoder.
pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/heif",
    "image/heic",
    "image/webp",
    "image/gif",
];

/// Accepted by upload, but there is no decoder for them.
const UNDECODABLE_MIME_TYPES: &[&str] = &["image/heif", "image/heic"];

/// Export target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Webp => "webp",
        }
    }

    /// Short name used in settings files and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpeg",
            ExportFormat::Webp => "webp",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Webp => "image/webp",
        }
    }

    /// PNG ignores the quality argument. WebP accepts it but is always
    /// written losslessly.
    pub fn supports_quality(&self) -> bool {
        matches!(self, ExportFormat::Jpeg | ExportFormat::Webp)
    }

    pub fn all() -> &'static [ExportFormat] {
        &[ExportFormat::Png, ExportFormat::Jpeg, ExportFormat::Webp]
    }

    /// Format implied by a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<ExportFormat> {
        let ext = path.extension()?.to_str()?;
        ext.parse().ok()
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" | "image/png" => Ok(ExportFormat::Png),
            "jpg" | "jpeg" | "image/jpeg" => Ok(ExportFormat::Jpeg),
            "webp" | "image/webp" => Ok(ExportFormat::Webp),
            other => Err(format!("unsupported export format '{}'", other)),
        }
    }
}

/// MIME type for an input file, judged by extension.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" | "jpe" | "jfif" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heif" => Some("image/heif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// Map a 0..1 quality to the encoder's 1..100 scale. Values outside (0, 1]
/// are rejected.
pub fn quality_to_percent(quality: f32) -> Result<u8> {
    if !(quality > 0.0 && quality <= 1.0) {
        return Err(EditorError::InvalidParameter(format!(
            "quality must be in (0, 1], got {}",
            quality
        )));
    }
    Ok((quality * 100.0).round().clamp(1.0, 100.0) as u8)
}

// ============================================================================
// DECODE
// ============================================================================

/// Decode uploaded bytes of the given MIME type into a raster.
pub fn decode(bytes: &[u8], mime: &str) -> Result<Raster> {
    let mime = mime.trim().to_ascii_lowercase();
    if !ACCEPTED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(EditorError::DecodeFailure(format!("unsupported file type '{}'", mime)));
    }
    if UNDECODABLE_MIME_TYPES.contains(&mime.as_str()) {
        return Err(EditorError::DecodeFailure(format!("no decoder available for '{}'", mime)));
    }
    let format = ImageFormat::from_mime_type(&mime)
        .ok_or_else(|| EditorError::DecodeFailure(format!("unsupported file type '{}'", mime)))?;

    let img = image::load_from_memory_with_format(bytes, format).map_err(EditorError::decode)?;
    let rgba = img.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(EditorError::DecodeFailure("image has no pixels".into()));
    }
    Ok(Raster::from_rgba_image(rgba))
}

/// Read and decode an image file. The MIME type comes from the extension.
pub fn load_image_sync(path: &Path) -> Result<Raster> {
    let mime = mime_for_path(path).ok_or_else(|| {
        EditorError::DecodeFailure(format!("unsupported file type '{}'", path.display()))
    })?;
    let bytes = std::fs::read(path)?;
    decode(&bytes, mime)
}

// ============================================================================
// ENCODE
// ============================================================================

/// Encode pixels to an in-memory file of `format`.
pub fn encode(image: &RgbaImage, format: ExportFormat, quality: f32) -> Result<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    write_encoded(&mut buf, image, format, quality)?;
    Ok(buf)
}

fn write_encoded<W: Write>(writer: &mut W, image: &RgbaImage, format: ExportFormat, quality: f32) -> Result<()> {
    match format {
        ExportFormat::Png => {
            let encoder = PngEncoder::new(writer);
            #[allow(deprecated)]
            encoder
                .encode(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)
                .map_err(EditorError::encode)?;
        }
        ExportFormat::Jpeg => {
            let q = quality_to_percent(quality)?;
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(writer, q);
            encoder
                .encode(rgb_image.as_raw(), rgb_image.width(), rgb_image.height(), image::ColorType::Rgb8)
                .map_err(EditorError::encode)?;
        }
        ExportFormat::Webp => {
            quality_to_percent(quality)?;
            let encoder = WebPEncoder::new_lossless(writer);
            encoder
                .encode(image.as_raw(), image.width(), image.height(), image::ColorType::Rgba8)
                .map_err(EditorError::encode)?;
        }
    }
    Ok(())
}

/// Encode and write an image to a file.
/// A standalone function so it can be called from background threads via
/// `rayon::spawn`.
pub fn encode_and_write(image: &RgbaImage, path: &Path, format: ExportFormat, quality: f32) -> Result<()> {
    // Encode first so a codec failure never leaves a truncated file behind.
    let bytes = encode(image, format, quality)?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
