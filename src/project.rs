// ============================================================================
// RTE PROJECT FILE FORMAT: saved editor state (raster + parameters)
// ============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canvas::Raster;
use crate::error::{EditorError, Result};
use crate::ops::filters::FilterSettings;
use crate::ops::transform::TransformState;

/// Magic header of the project format.
const RTE_MAGIC_V1: &str = "RTE1";

/// Maximum supported raster dimension in pixels (per axis).
/// Prevents memory exhaustion from crafted project files.
const MAX_CANVAS_DIM: u32 = 32_768;

/// Serializable editor state: the current base raster plus the parametric
/// edits drawn on top of it. History is not saved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    magic: String,
    /// Document id, stable across saves of the same session.
    pub id: String,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
    pub transform: TransformState,
    pub filters: FilterSettings,
}

impl ProjectFile {
    pub fn new(
        id: Uuid,
        file_name: &str,
        raster: &Raster,
        transform: TransformState,
        filters: FilterSettings,
    ) -> Self {
        Self {
            magic: RTE_MAGIC_V1.to_string(),
            id: id.to_string(),
            file_name: file_name.to_string(),
            width: raster.width(),
            height: raster.height(),
            pixels: raster.as_raw().to_vec(),
            transform,
            filters,
        }
    }

    /// Rebuild the stored raster, checking the header and pixel count.
    pub fn raster(&self) -> Result<Raster> {
        if self.width == 0 || self.height == 0 || self.width > MAX_CANVAS_DIM || self.height > MAX_CANVAS_DIM {
            return Err(EditorError::Project(format!(
                "canvas dimensions {}x{} out of range",
                self.width, self.height
            )));
        }
        Raster::from_raw(self.width, self.height, self.pixels.clone()).ok_or_else(|| {
            EditorError::Project(format!(
                "pixel data is {} bytes, expected {}",
                self.pixels.len(),
                self.width as usize * self.height as usize * 4
            ))
        })
    }

    /// Stored transform with the rotation normalised into [0, 360). A
    /// rotation that is not a quarter turn is rejected.
    pub fn checked_transform(&self) -> Result<TransformState> {
        let deg = self.transform.rotation_degrees;
        if deg % 90 != 0 {
            return Err(EditorError::Project(format!(
                "rotation {} is not a multiple of 90 degrees",
                deg
            )));
        }
        Ok(TransformState { rotation_degrees: deg.rem_euclid(360), ..self.transform })
    }

    pub fn document_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.id).ok()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < 12 {
            return Err(EditorError::Project("File too small".into()));
        }
        // bincode encodes a String as: 8-byte length prefix + UTF-8 data.
        // The magic string is 4 chars, so bytes 8..12 hold it.
        let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
        if magic != RTE_MAGIC_V1 {
            return Err(EditorError::Project(format!("Unknown magic '{}'", magic)));
        }
        let mut project: ProjectFile = bincode::deserialize(raw)?;
        // Validate eagerly so a bad file never reaches a session.
        project.raster()?;
        project.transform = project.checked_transform()?;
        Ok(project)
    }
}

/// Serialize + write a project to disk.
pub fn save_project(project: &ProjectFile, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, project)?;
    Ok(())
}

/// Load a .rte project file.
pub fn load_project(path: &Path) -> Result<ProjectFile> {
    let raw = std::fs::read(path)?;
    ProjectFile::from_bytes(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn sample() -> ProjectFile {
        let raster = Raster::filled(5, 3, Rgba([9, 8, 7, 255]));
        let transform = TransformState { rotation_degrees: 270, flip_horizontal: true, flip_vertical: false };
        let filters = FilterSettings { sepia: 0.4, blur: 2.0, ..FilterSettings::default() };
        ProjectFile::new(Uuid::new_v4(), "cat.png", &raster, transform, filters)
    }

    #[test]
    fn bytes_round_trip() {
        let p = sample();
        let back = ProjectFile::from_bytes(&p.to_bytes().unwrap()).unwrap();
        assert_eq!(back, p);
        assert_eq!(back.raster().unwrap().pixel(4, 2), Rgba([9, 8, 7, 255]));
        assert!(back.document_id().is_some());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut raw = sample().to_bytes().unwrap();
        raw[8] = b'X';
        assert!(matches!(ProjectFile::from_bytes(&raw), Err(EditorError::Project(_))));
        assert!(matches!(ProjectFile::from_bytes(b"short"), Err(EditorError::Project(_))));
    }

    #[test]
    fn truncated_pixels_are_rejected() {
        let mut p = sample();
        p.pixels.truncate(10);
        let raw = p.to_bytes().unwrap();
        assert!(ProjectFile::from_bytes(&raw).is_err());
    }

    #[test]
    fn off_quarter_rotation_is_rejected() {
        let mut p = sample();
        p.transform.rotation_degrees = 405;
        let raw = p.to_bytes().unwrap();
        assert!(matches!(ProjectFile::from_bytes(&raw), Err(EditorError::Project(_))));
        p.transform.rotation_degrees = 45;
        assert!(p.checked_transform().is_err());
    }

    #[test]
    fn rotation_is_normalised_on_load() {
        let mut p = sample();
        p.transform.rotation_degrees = 450;
        let back = ProjectFile::from_bytes(&p.to_bytes().unwrap()).unwrap();
        assert_eq!(back.transform.rotation_degrees, 90);
        p.transform.rotation_degrees = -90;
        assert_eq!(p.checked_transform().unwrap().rotation_degrees, 270);
        assert!(p.checked_transform().unwrap().flip_horizontal);
    }

    #[test]
    fn file_round_trip() {
        let dir = std::env::temp_dir().join(format!("retouch-project-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("doc.rte");
        let p = sample();
        save_project(&p, &path).unwrap();
        assert_eq!(load_project(&path).unwrap(), p);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
