// ============================================================================
// EDITOR ERRORS: every recoverable failure an operation can surface
// ============================================================================

use image::ImageError;

/// Error type for editor operations.
///
/// None of these are fatal: the session is left exactly as it was before the
/// failing call. Undo/redo with nothing to undo/redo is not an error at all,
/// those calls just report `false`.
#[derive(Debug)]
pub enum EditorError {
    /// Corrupt or unsupported image bytes.
    DecodeFailure(String),
    /// The export codec failed.
    EncodeFailure(String),
    /// Degenerate or out-of-bounds crop/resize rectangle.
    InvalidGeometry(String),
    /// A numeric parameter outside its accepted range.
    InvalidParameter(String),
    /// An edit was requested while no image is loaded.
    NoImage,
    /// An edit was requested while a background bake is still running.
    BakeInProgress,
    Io(std::io::Error),
    Project(String),
}

impl std::fmt::Display for EditorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditorError::DecodeFailure(e) => write!(f, "Could not decode image: {}", e),
            EditorError::EncodeFailure(e) => write!(f, "Could not encode image: {}", e),
            EditorError::InvalidGeometry(e) => write!(f, "Invalid geometry: {}", e),
            EditorError::InvalidParameter(e) => write!(f, "Invalid parameter: {}", e),
            EditorError::NoImage => write!(f, "No image loaded"),
            EditorError::BakeInProgress => write!(f, "Another operation is still being applied"),
            EditorError::Io(e) => write!(f, "I/O error: {}", e),
            EditorError::Project(e) => write!(f, "Project file error: {}", e),
        }
    }
}

impl std::error::Error for EditorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EditorError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for EditorError {
    fn from(e: std::io::Error) -> Self {
        EditorError::Io(e)
    }
}

/// Unqualified codec errors come from decoding; encoders go through
/// [`EditorError::encode`].
impl From<ImageError> for EditorError {
    fn from(e: ImageError) -> Self {
        EditorError::decode(e)
    }
}

impl From<Box<bincode::ErrorKind>> for EditorError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        EditorError::Project(e.to_string())
    }
}

impl EditorError {
    /// Wrap a codec error raised while decoding.
    pub fn decode(e: ImageError) -> Self {
        EditorError::DecodeFailure(e.to_string())
    }

    /// Wrap a codec error raised while encoding.
    pub fn encode(e: ImageError) -> Self {
        EditorError::EncodeFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EditorError>;
