// ============================================================================
// Retouch: raster image editor core
// ============================================================================
//
// Layout:
//   canvas      pixel buffer type and the view renderer (transform + filters)
//   components  generic undo/redo history
//   ops         transforms, filters, effects, crop/resize/compress, brush
//   session     one open document, its history and the async bake pipeline
//   io          decode / encode / export
//   project     .rte project save and load
//   settings    persisted preferences
//   cli         headless front end
//   logger      session log file

#![allow(clippy::too_many_arguments)]

pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod io;
pub mod ops;
pub mod project;
pub mod session;
pub mod settings;

pub use error::{EditorError, Result};
pub use session::{EditorSession, EditorSnapshot, SessionConfig};
