// ============================================================================
// EDITOR SESSION: one open document, its history and the edit pipeline
// ============================================================================
//
// Edits come in two kinds:
//   - parametric (rotate, flip, filters): only the transform / filter values
//     change; the raster stays put and a `Parametric` snapshot is recorded.
//   - baked (effects, crop, resize, compress, draw): a new raster replaces the
//     current one, transform and filters go back to identity, and a `Baked`
//     snapshot carrying the new raster is recorded.
//
// A `Parametric` snapshot has no pixels of its own. It renders from the
// nearest older `Baked` entry still in history, or from the history origin
// once that entry has been evicted.
// ============================================================================

use std::path::Path;
use std::sync::{Arc, mpsc};

use image::RgbaImage;
use uuid::Uuid;

use crate::canvas::{self, Raster, RasterRef};
use crate::components::history::{HistoryManager, MemoryFootprint};
use crate::error::{EditorError, Result};
use crate::io::{self, ExportFormat};
use crate::ops::brush::{self, Stroke};
use crate::ops::canvas_ops::{self, CropRect};
use crate::ops::effects::{self, Effect};
use crate::ops::filters::FilterSettings;
use crate::ops::transform::{self, Interpolation, TransformState};
use crate::project::{self, ProjectFile};
use crate::settings::Preferences;

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// One history entry.
#[derive(Clone, Debug)]
pub enum EditorSnapshot {
    Parametric {
        transform: TransformState,
        filters: FilterSettings,
    },
    Baked {
        transform: TransformState,
        filters: FilterSettings,
        raster: RasterRef,
    },
}

impl EditorSnapshot {
    pub fn transform(&self) -> TransformState {
        match self {
            EditorSnapshot::Parametric { transform, .. } | EditorSnapshot::Baked { transform, .. } => *transform,
        }
    }

    pub fn filters(&self) -> FilterSettings {
        match self {
            EditorSnapshot::Parametric { filters, .. } | EditorSnapshot::Baked { filters, .. } => *filters,
        }
    }

    pub fn raster(&self) -> Option<&RasterRef> {
        match self {
            EditorSnapshot::Baked { raster, .. } => Some(raster),
            EditorSnapshot::Parametric { .. } => None,
        }
    }

    pub fn is_baked(&self) -> bool {
        matches!(self, EditorSnapshot::Baked { .. })
    }
}

impl MemoryFootprint for EditorSnapshot {
    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }

    /// Entries holding the same `Arc` share one raster.
    fn shared_buffer(&self) -> Option<(usize, usize)> {
        self.raster().map(|r| (Arc::as_ptr(r) as usize, r.memory_bytes()))
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Per-session knobs, fixed when the session is created.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    /// History depth, current state included.
    pub undo_limit: usize,
    /// Upper bound on raster bytes kept alive by history. `None` disables
    /// the memory cap.
    pub max_history_bytes: Option<usize>,
    pub interpolation: Interpolation,
    pub pixelate_block_size: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            undo_limit: 10,
            max_history_bytes: Some(256 * 1024 * 1024),
            interpolation: Interpolation::Bilinear,
            pixelate_block_size: effects::DEFAULT_PIXELATE_BLOCK,
        }
    }
}

impl SessionConfig {
    pub fn from_preferences(prefs: &Preferences) -> Self {
        Self {
            undo_limit: prefs.clamped().undo_limit,
            ..Self::default()
        }
    }
}

// ============================================================================
// ASYNC BAKE PIPELINE: background raster jobs with channel completion
// ============================================================================

/// Result delivered from a background bake.
struct BakeResult {
    /// Matches `EditorSession::pending_bake` while the job is still wanted.
    token: u64,
    /// Document the job was started for.
    document_id: Uuid,
    /// Human-readable name for the log.
    description: &'static str,
    result: Result<Raster>,
}

// ============================================================================
// DOCUMENT
// ============================================================================

struct Document {
    id: Uuid,
    file_name: String,
    /// Raster as uploaded; "Reset All" returns here.
    original: RasterRef,
    /// Base raster of the current state.
    raster: RasterRef,
    transform: TransformState,
    filters: FilterSettings,
    history: HistoryManager<EditorSnapshot>,
    /// Raster that leading `Parametric` entries render from once their
    /// `Baked` ancestor has been evicted.
    origin: RasterRef,
}

impl Document {
    fn new(id: Uuid, file_name: String, raster: RasterRef, transform: TransformState, filters: FilterSettings, undo_limit: usize) -> Self {
        let initial = EditorSnapshot::Baked { transform, filters, raster: raster.clone() };
        Self {
            id,
            file_name,
            original: raster.clone(),
            raster: raster.clone(),
            transform,
            filters,
            history: HistoryManager::new(initial, undo_limit),
            origin: raster,
        }
    }

    /// Raster the current history entry renders from.
    fn resolve_raster(&self) -> RasterRef {
        self.history
            .past()
            .rev()
            .find_map(|s| s.raster().cloned())
            .unwrap_or_else(|| self.origin.clone())
    }

    /// Load transform, filters and raster from the current history entry.
    fn sync_from_history(&mut self) {
        let current = self.history.current();
        self.transform = current.transform();
        self.filters = current.filters();
        self.raster = self.resolve_raster();
    }

    fn record(&mut self, snapshot: EditorSnapshot, max_history_bytes: Option<usize>) {
        if let Some(evicted) = self.history.push(snapshot) {
            self.note_evicted(evicted);
        }
        if let Some(max) = max_history_bytes {
            for evicted in self.history.prune_to_memory(max) {
                crate::log_info!(doc: self.id; "History over {} bytes; dropped oldest entry", max);
                self.note_evicted(evicted);
            }
        }
    }

    fn note_evicted(&mut self, evicted: EditorSnapshot) {
        if let EditorSnapshot::Baked { raster, .. } = evicted {
            self.origin = raster;
        }
        // A retained `Baked` front entry makes the origin redundant; share its
        // raster so the evicted one can be freed.
        if let Some(front) = self.history.past().next().and_then(|s| s.raster()) {
            self.origin = front.clone();
        }
    }

    fn snapshot_parametric(&self) -> EditorSnapshot {
        EditorSnapshot::Parametric { transform: self.transform, filters: self.filters }
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Editor state machine: `Empty` until an image is loaded, `Loaded` after.
pub struct EditorSession {
    config: SessionConfig,
    doc: Option<Document>,
    bake_sender: mpsc::Sender<BakeResult>,
    bake_receiver: mpsc::Receiver<BakeResult>,
    /// Token of the bake whose result is still wanted.
    pending_bake: Option<u64>,
    bake_token: u64,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl EditorSession {
    pub fn new(config: SessionConfig) -> Self {
        let (bake_sender, bake_receiver) = mpsc::channel();
        Self {
            config: SessionConfig { undo_limit: config.undo_limit.max(1), ..config },
            doc: None,
            bake_sender,
            bake_receiver,
            pending_bake: None,
            bake_token: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // --- Loading ---

    /// Decode `bytes` and make them the current document. On failure the
    /// session is left exactly as it was.
    pub fn load_bytes(&mut self, bytes: &[u8], mime: &str, file_name: &str) -> Result<()> {
        let raster = io::decode(bytes, mime).inspect_err(|e| {
            crate::log_err!("Failed to load '{}': {}", file_name, e);
        })?;
        self.install_document(raster.into_ref(), file_name, None, TransformState::default(), FilterSettings::default());
        Ok(())
    }

    /// Load an image file, or a saved project if the extension is `.rte`.
    pub fn load_path(&mut self, path: &Path) -> Result<()> {
        let is_project = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("rte"));
        if is_project {
            let project = project::load_project(path)?;
            return self.restore_project(&project);
        }
        let raster = io::load_image_sync(path).inspect_err(|e| {
            crate::log_err!("Failed to load {}: {}", path.display(), e);
        })?;
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Untitled".to_string());
        self.install_document(raster.into_ref(), &name, None, TransformState::default(), FilterSettings::default());
        Ok(())
    }

    fn install_document(
        &mut self,
        raster: RasterRef,
        file_name: &str,
        id: Option<Uuid>,
        transform: TransformState,
        filters: FilterSettings,
    ) {
        // Any in-flight bake belongs to the previous document.
        self.pending_bake = None;
        let id = id.unwrap_or_else(Uuid::new_v4);
        crate::log_info!(doc: id; "Loaded '{}' ({}x{})", file_name, raster.width(), raster.height());
        self.doc = Some(Document::new(
            id,
            file_name.to_string(),
            raster,
            transform,
            filters,
            self.config.undo_limit,
        ));
    }

    /// Drop the document and its history.
    pub fn close(&mut self) {
        self.pending_bake = None;
        if let Some(doc) = self.doc.take() {
            crate::log_info!(doc: doc.id; "Document closed");
        }
    }

    // --- Queries ---

    pub fn is_loaded(&self) -> bool {
        self.doc.is_some()
    }

    pub fn raster(&self) -> Option<&Raster> {
        self.doc.as_ref().map(|d| d.raster.as_ref())
    }

    pub fn transform(&self) -> TransformState {
        self.doc.as_ref().map(|d| d.transform).unwrap_or_default()
    }

    pub fn filters(&self) -> FilterSettings {
        self.doc.as_ref().map(|d| d.filters).unwrap_or_default()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.doc.as_ref().map(|d| d.file_name.as_str())
    }

    pub fn document_id(&self) -> Option<Uuid> {
        self.doc.as_ref().map(|d| d.id)
    }

    pub fn can_undo(&self) -> bool {
        self.doc.as_ref().is_some_and(|d| d.history.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.doc.as_ref().is_some_and(|d| d.history.can_redo())
    }

    /// Number of retained history entries, current state included.
    pub fn history_len(&self) -> usize {
        self.doc.as_ref().map_or(0, |d| d.history.len())
    }

    /// Bytes held by history, plus the origin raster when no entry shares it.
    /// The memory cap applies to the history entries only.
    pub fn history_memory(&self) -> usize {
        self.doc.as_ref().map_or(0, |d| {
            let origin_shared = d.history.past().any(|e| e.raster().is_some_and(|r| Arc::ptr_eq(r, &d.origin)));
            let origin = if origin_shared { 0 } else { d.origin.memory_bytes() };
            d.history.memory_usage() + origin
        })
    }

    pub fn is_bake_pending(&self) -> bool {
        self.pending_bake.is_some()
    }

    /// Document to edit, or why editing is refused.
    fn editable(&mut self) -> Result<&mut Document> {
        if self.pending_bake.is_some() {
            return Err(EditorError::BakeInProgress);
        }
        self.doc.as_mut().ok_or(EditorError::NoImage)
    }

    // --- Parametric edits ---

    fn commit_parametric(&mut self, description: &str, transform: TransformState, filters: FilterSettings) -> Result<()> {
        let max_bytes = self.config.max_history_bytes;
        let doc = self.editable()?;
        doc.transform = transform;
        doc.filters = filters;
        let snapshot = doc.snapshot_parametric();
        doc.record(snapshot, max_bytes);
        crate::log_info!(doc: doc.id; "{}", description);
        Ok(())
    }

    /// Rotate by a multiple of 90 degrees (negative is counter-clockwise).
    pub fn rotate(&mut self, delta_degrees: i32) -> Result<()> {
        if delta_degrees % 90 != 0 {
            return Err(EditorError::InvalidParameter(format!(
                "rotation must be a multiple of 90 degrees, got {}",
                delta_degrees
            )));
        }
        let t = transform::rotate(&self.editable()?.transform, delta_degrees);
        let f = self.filters();
        self.commit_parametric(&format!("Rotate to {} degrees", t.rotation_degrees), t, f)
    }

    pub fn rotate_left(&mut self) -> Result<()> {
        self.rotate(-90)
    }

    pub fn rotate_right(&mut self) -> Result<()> {
        self.rotate(90)
    }

    pub fn flip_horizontal(&mut self) -> Result<()> {
        let t = transform::flip_horizontal(&self.editable()?.transform);
        let f = self.filters();
        self.commit_parametric("Flip horizontal", t, f)
    }

    pub fn flip_vertical(&mut self) -> Result<()> {
        let t = transform::flip_vertical(&self.editable()?.transform);
        let f = self.filters();
        self.commit_parametric("Flip vertical", t, f)
    }

    pub fn reset_transform(&mut self) -> Result<()> {
        let f = self.editable()?.filters;
        self.commit_parametric("Reset transform", transform::reset_transform(), f)
    }

    /// Commit the filter panel. Values are clamped into their slider ranges.
    pub fn set_filters(&mut self, settings: FilterSettings) -> Result<()> {
        let t = self.editable()?.transform;
        let f = settings.clamped();
        self.commit_parametric(&format!("Filters: {}", f.css_filter_string()), t, f)
    }

    pub fn reset_filters(&mut self) -> Result<()> {
        let t = self.editable()?.transform;
        self.commit_parametric("Reset filters", t, FilterSettings::default())
    }

    // --- Baked edits ---

    /// Run `op` on the current base raster and, if it succeeds, make its
    /// output the new current raster.
    fn bake<F>(&mut self, description: &str, op: F) -> Result<()>
    where
        F: FnOnce(&Raster) -> Result<Raster>,
    {
        let doc = self.editable()?;
        let id = doc.id;
        let result = op(doc.raster.as_ref()).inspect_err(|e| {
            crate::log_warn!(doc: id; "{} rejected: {}", description, e);
        })?;
        self.install_baked(result, description);
        Ok(())
    }

    fn install_baked(&mut self, raster: Raster, description: &str) {
        let max_bytes = self.config.max_history_bytes;
        let Some(doc) = self.doc.as_mut() else { return };
        let raster = raster.into_ref();
        doc.raster = raster.clone();
        doc.transform = TransformState::default();
        doc.filters = FilterSettings::default();
        doc.record(
            EditorSnapshot::Baked {
                transform: doc.transform,
                filters: doc.filters,
                raster,
            },
            max_bytes,
        );
        crate::log_info!(
            doc: doc.id;
            "{} ({}x{}), history {} / {}",
            description,
            doc.raster.width(),
            doc.raster.height(),
            doc.history.len(),
            doc.history.max_size()
        );
    }

    pub fn apply_effect(&mut self, effect: Effect) -> Result<()> {
        let effect = match effect {
            Effect::Pixelate { block_size: 0 } => Effect::Pixelate { block_size: self.config.pixelate_block_size },
            other => other,
        };
        self.bake(effect.label(), |r| Ok(Raster::from_rgba_image(effect.apply(r.as_rgba_image()))))
    }

    pub fn crop(&mut self, rect: CropRect) -> Result<()> {
        self.bake("Crop", |r| canvas_ops::crop(r, rect))
    }

    /// Resize with the session's interpolation.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let interp = self.config.interpolation;
        self.bake("Resize", |r| canvas_ops::resize(r, width, height, interp))
    }

    /// Lossy re-encode on the calling thread.
    pub fn compress(&mut self, quality: f32) -> Result<()> {
        self.bake("Compress", |r| canvas_ops::compress(r, quality))
    }

    /// Bake freehand strokes. An empty list records nothing.
    pub fn draw(&mut self, strokes: &[Stroke]) -> Result<()> {
        if strokes.is_empty() {
            self.editable()?;
            return Ok(());
        }
        self.bake("Draw", |r| brush::draw_strokes(r, strokes))
    }

    // --- History ---

    /// Step back one entry. `Ok(false)` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        if self.pending_bake.is_some() {
            return Err(EditorError::BakeInProgress);
        }
        let Some(doc) = self.doc.as_mut() else { return Ok(false) };
        if doc.history.undo().is_none() {
            return Ok(false);
        }
        doc.sync_from_history();
        crate::log_info!(doc: doc.id; "Undo ({} left)", doc.history.undo_count());
        Ok(true)
    }

    /// Step forward one entry. `Ok(false)` when there is nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        if self.pending_bake.is_some() {
            return Err(EditorError::BakeInProgress);
        }
        let Some(doc) = self.doc.as_mut() else { return Ok(false) };
        if doc.history.redo().is_none() {
            return Ok(false);
        }
        doc.sync_from_history();
        crate::log_info!(doc: doc.id; "Redo ({} left)", doc.history.redo_count());
        Ok(true)
    }

    /// Change the history depth. Existing history is discarded; the new
    /// history starts from the current state.
    pub fn set_undo_limit(&mut self, limit: usize) -> Result<()> {
        let limit = limit.max(1);
        if self.pending_bake.is_some() {
            return Err(EditorError::BakeInProgress);
        }
        self.config.undo_limit = limit;
        if let Some(doc) = self.doc.as_mut() {
            let seed = EditorSnapshot::Baked {
                transform: doc.transform,
                filters: doc.filters,
                raster: doc.raster.clone(),
            };
            doc.history.reset_with_limit(seed, limit);
            doc.origin = doc.raster.clone();
        }
        crate::log_info!("Undo limit set to {}", limit);
        Ok(())
    }

    /// Back to the uploaded raster with a fresh history.
    pub fn reset_all(&mut self) -> Result<()> {
        let doc = self.editable()?;
        let original = doc.original.clone();
        doc.raster = original.clone();
        doc.transform = TransformState::default();
        doc.filters = FilterSettings::default();
        doc.history.reset(EditorSnapshot::Baked {
            transform: doc.transform,
            filters: doc.filters,
            raster: original.clone(),
        });
        doc.origin = original;
        crate::log_info!(doc: doc.id; "Reset all edits");
        Ok(())
    }

    // --- Output ---

    /// Visible image: base raster drawn under the transform, then filtered.
    pub fn render(&self) -> Result<RgbaImage> {
        let doc = self.doc.as_ref().ok_or(EditorError::NoImage)?;
        Ok(canvas::render_view(&doc.raster, &doc.transform, &doc.filters))
    }

    /// Encode the rendered view. Never touches history.
    pub fn export(&self, format: ExportFormat, quality: f32) -> Result<Vec<u8>> {
        let view = self.render()?;
        let bytes = io::encode(&view, format, quality).inspect_err(|e| {
            crate::log_err!("Export as {} failed: {}", format.name(), e);
        })?;
        crate::log_info!("Exported {} bytes as {}", bytes.len(), format.name());
        Ok(bytes)
    }

    pub fn export_to_path(&self, path: &Path, format: ExportFormat, quality: f32) -> Result<()> {
        let view = self.render()?;
        io::encode_and_write(&view, path, format, quality).inspect_err(|e| {
            crate::log_err!("Export to {} failed: {}", path.display(), e);
        })?;
        crate::log_info!("Exported {}", path.display());
        Ok(())
    }

    /// Suggested export name: the uploaded file's stem plus `format`'s
    /// extension.
    pub fn export_file_name(&self, format: ExportFormat) -> String {
        let stem = self
            .file_name()
            .and_then(|n| Path::new(n).file_stem())
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "edited-image".to_string());
        format!("{}.{}", stem, format.extension())
    }

    // --- Background bakes ---

    /// Start a compress bake on the rayon pool. Until its result is installed
    /// by [`poll_bake`](Self::poll_bake) or [`wait_for_bake`](Self::wait_for_bake),
    /// every edit returns `BakeInProgress`.
    pub fn spawn_compress(&mut self, quality: f32) -> Result<()> {
        io::quality_to_percent(quality)?;
        let doc = self.editable()?;
        let raster = doc.raster.clone();
        let document_id = doc.id;

        self.bake_token = self.bake_token.wrapping_add(1);
        let token = self.bake_token;
        self.pending_bake = Some(token);
        let sender = self.bake_sender.clone();
        let description = "Compress";

        rayon::spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                canvas_ops::compress(&raster, quality)
            }))
            .unwrap_or_else(|panic_info| {
                let msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.to_string()
                } else {
                    "unknown panic payload".to_string()
                };
                Err(EditorError::EncodeFailure(format!("{} panicked: {}", description, msg)))
            });
            let _ = sender.send(BakeResult { token, document_id, description, result });
        });
        crate::log_info!(doc: document_id, job: token; "{} started", description);
        Ok(())
    }

    /// Install a finished bake if one has arrived. `Ok(true)` when a result
    /// was installed, `Ok(false)` when nothing (wanted) has arrived yet, and
    /// the job's error if it failed.
    pub fn poll_bake(&mut self) -> Result<bool> {
        while let Ok(result) = self.bake_receiver.try_recv() {
            if let Some(outcome) = self.accept_bake(result) {
                return outcome.map(|_| true);
            }
        }
        Ok(false)
    }

    /// Block until the pending bake finishes and install it. `Ok(false)`
    /// when no bake is pending.
    pub fn wait_for_bake(&mut self) -> Result<bool> {
        while self.pending_bake.is_some() {
            let Ok(result) = self.bake_receiver.recv() else { break };
            if let Some(outcome) = self.accept_bake(result) {
                return outcome.map(|_| true);
            }
        }
        Ok(false)
    }

    /// `None` for results nobody is waiting for any more.
    fn accept_bake(&mut self, result: BakeResult) -> Option<Result<()>> {
        // Discard stale results (token mismatch = superseded or document changed)
        if self.pending_bake != Some(result.token) || self.document_id() != Some(result.document_id) {
            crate::log_info!(doc: result.document_id, job: result.token; "Discarded stale {} result", result.description);
            return None;
        }
        self.pending_bake = None;
        match result.result {
            Ok(raster) => {
                self.install_baked(raster, result.description);
                Some(Ok(()))
            }
            Err(e) => {
                crate::log_err!(doc: result.document_id, job: result.token; "{} failed: {}", result.description, e);
                Some(Err(e))
            }
        }
    }

    // --- Project files ---

    /// Current raster and parameters as a saveable project.
    pub fn to_project(&self) -> Result<ProjectFile> {
        let doc = self.doc.as_ref().ok_or(EditorError::NoImage)?;
        Ok(ProjectFile::new(doc.id, &doc.file_name, &doc.raster, doc.transform, doc.filters))
    }

    /// Replace the document with a saved project. History starts fresh from
    /// the restored state.
    pub fn restore_project(&mut self, project: &ProjectFile) -> Result<()> {
        let raster = project.raster()?;
        let transform = project.checked_transform()?;
        self.install_document(
            raster.into_ref(),
            &project.file_name,
            project.document_id(),
            transform,
            project.filters.clamped(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 77, 255]));
        io::encode(&img, ExportFormat::Png, 1.0).unwrap()
    }

    fn loaded(w: u32, h: u32) -> EditorSession {
        let mut s = EditorSession::default();
        s.load_bytes(&png_bytes(w, h), "image/png", "test.png").unwrap();
        s
    }

    fn brightness(b: f32) -> FilterSettings {
        FilterSettings { brightness: b, ..FilterSettings::default() }
    }

    #[test]
    fn empty_session_refuses_edits() {
        let mut s = EditorSession::default();
        assert!(!s.is_loaded());
        assert!(matches!(s.rotate_right(), Err(EditorError::NoImage)));
        assert!(matches!(s.apply_effect(Effect::Sharpen), Err(EditorError::NoImage)));
        assert!(matches!(s.render(), Err(EditorError::NoImage)));
        assert!(!s.undo().unwrap());
    }

    #[test]
    fn rotating_twice_keeps_raster_dimensions() {
        let mut s = loaded(100, 100);
        s.rotate(90).unwrap();
        assert_eq!(s.raster().unwrap().dimensions(), (100, 100));
        assert_eq!(s.transform().rotation_degrees, 90);
        s.rotate(90).unwrap();
        assert_eq!(s.transform().rotation_degrees, 180);
    }

    #[test]
    fn rotation_must_be_a_quarter_turn() {
        let mut s = loaded(4, 4);
        assert!(matches!(s.rotate(45), Err(EditorError::InvalidParameter(_))));
        assert_eq!(s.history_len(), 1);
    }

    #[test]
    fn render_swaps_dimensions_for_quarter_turns() {
        let mut s = loaded(30, 10);
        s.rotate_left().unwrap();
        assert_eq!(s.transform().rotation_degrees, 270);
        assert_eq!(s.render().unwrap().dimensions(), (10, 30));
    }

    #[test]
    fn baked_edit_undoes_to_the_exact_previous_raster() {
        let mut s = loaded(8, 8);
        let before = s.raster().unwrap().clone();
        s.apply_effect(Effect::Sharpen).unwrap();
        let sharpened = s.raster().unwrap().clone();
        s.set_filters(brightness(1.2)).unwrap();
        s.set_filters(brightness(1.4)).unwrap();
        assert_eq!(s.filters().brightness, 1.4);

        assert!(s.undo().unwrap());
        assert!(s.undo().unwrap());
        assert_eq!(s.raster().unwrap(), &sharpened);
        assert_eq!(s.filters(), FilterSettings::default());

        assert!(s.undo().unwrap());
        assert_eq!(s.raster().unwrap(), &before);
        assert_eq!(s.filters(), FilterSettings::default());
        assert_eq!(s.transform(), TransformState::default());
    }

    #[test]
    fn baked_edit_resets_parametric_state() {
        let mut s = loaded(6, 4);
        s.rotate_right().unwrap();
        s.set_filters(FilterSettings { sepia: 0.5, ..FilterSettings::default() }).unwrap();
        s.apply_effect(Effect::Vintage).unwrap();
        assert_eq!(s.transform(), TransformState::default());
        assert_eq!(s.filters(), FilterSettings::default());
        // Baked from the stored raster, not the rotated view.
        assert_eq!(s.raster().unwrap().dimensions(), (6, 4));
    }

    #[test]
    fn undo_limit_five_keeps_the_latest_five_states() {
        let mut s = EditorSession::new(SessionConfig { undo_limit: 5, ..SessionConfig::default() });
        s.load_bytes(&png_bytes(4, 4), "image/png", "a.png").unwrap();
        for n in 1..=8 {
            s.set_filters(brightness(n as f32 * 0.1)).unwrap();
        }
        for expected in [7, 6, 5, 4] {
            assert!(s.undo().unwrap());
            assert!((s.filters().brightness - expected as f32 * 0.1).abs() < 1e-6);
        }
        // Fifth and sixth undo are no-ops.
        assert!(!s.undo().unwrap());
        assert!(!s.undo().unwrap());
        assert!((s.filters().brightness - 0.4).abs() < 1e-6);
    }

    #[test]
    fn push_after_undo_drops_redo() {
        let mut s = loaded(4, 4);
        s.flip_horizontal().unwrap();
        s.undo().unwrap();
        assert!(s.can_redo());
        s.flip_vertical().unwrap();
        assert!(!s.can_redo());
        assert!(!s.redo().unwrap());
        assert!(s.transform().flip_vertical);
        assert!(!s.transform().flip_horizontal);
    }

    #[test]
    fn redo_restores_baked_raster() {
        let mut s = loaded(9, 9);
        s.crop(CropRect::new(1, 1, 5, 4)).unwrap();
        s.undo().unwrap();
        assert_eq!(s.raster().unwrap().dimensions(), (9, 9));
        s.redo().unwrap();
        assert_eq!(s.raster().unwrap().dimensions(), (5, 4));
    }

    #[test]
    fn parametric_entries_keep_their_raster_after_baked_eviction() {
        let mut s = EditorSession::new(SessionConfig { undo_limit: 3, ..SessionConfig::default() });
        s.load_bytes(&png_bytes(10, 10), "image/png", "a.png").unwrap();
        s.apply_effect(Effect::Emboss).unwrap();
        let embossed = s.raster().unwrap().clone();
        s.rotate_right().unwrap();
        s.rotate_right().unwrap();
        s.rotate_right().unwrap();
        assert_eq!(s.history_len(), 3);

        assert!(s.undo().unwrap());
        assert!(s.undo().unwrap());
        assert!(!s.undo().unwrap());
        assert_eq!(s.transform().rotation_degrees, 90);
        assert_eq!(s.raster().unwrap(), &embossed);
    }

    #[test]
    fn memory_cap_evicts_old_rasters() {
        let raster_bytes = 20 * 20 * 4;
        let cap = raster_bytes * 2 + 4 * std::mem::size_of::<EditorSnapshot>();
        let mut s = EditorSession::new(SessionConfig { max_history_bytes: Some(cap), ..SessionConfig::default() });
        s.load_bytes(&png_bytes(20, 20), "image/png", "a.png").unwrap();
        s.apply_effect(Effect::Sharpen).unwrap();
        s.apply_effect(Effect::Emboss).unwrap();
        s.apply_effect(Effect::Vintage).unwrap();
        assert!(s.history_memory() <= cap);
        assert_eq!(s.history_len(), 2);
    }

    #[test]
    fn shared_rasters_are_counted_once() {
        let mut s = loaded(4, 4);
        let entry = std::mem::size_of::<EditorSnapshot>();
        assert_eq!(s.history_memory(), 64 + entry);
        s.rotate_right().unwrap();
        s.set_undo_limit(5).unwrap();
        s.flip_vertical().unwrap();
        // Seed entry, origin and the document all hold the same raster.
        assert_eq!(s.history_memory(), 64 + 2 * entry);
    }

    #[test]
    fn failed_load_leaves_session_untouched() {
        let mut s = loaded(5, 5);
        s.rotate_right().unwrap();
        let id = s.document_id();
        assert!(matches!(s.load_bytes(b"garbage", "image/png", "x.png"), Err(EditorError::DecodeFailure(_))));
        assert!(matches!(s.load_bytes(&png_bytes(2, 2), "image/bmp", "x.bmp"), Err(EditorError::DecodeFailure(_))));
        assert_eq!(s.document_id(), id);
        assert_eq!(s.transform().rotation_degrees, 90);
        assert_eq!(s.history_len(), 2);
    }

    #[test]
    fn loading_resets_history() {
        let mut s = loaded(5, 5);
        s.flip_vertical().unwrap();
        s.load_bytes(&png_bytes(3, 7), "image/png", "next.png").unwrap();
        assert!(!s.can_undo());
        assert_eq!(s.file_name(), Some("next.png"));
        assert_eq!(s.raster().unwrap().dimensions(), (3, 7));
    }

    #[test]
    fn invalid_crop_changes_nothing() {
        let mut s = loaded(5, 5);
        assert!(matches!(s.crop(CropRect::new(3, 3, 4, 4)), Err(EditorError::InvalidGeometry(_))));
        assert!(matches!(s.resize(0, 5), Err(EditorError::InvalidGeometry(_))));
        assert_eq!(s.history_len(), 1);
        assert_eq!(s.raster().unwrap().dimensions(), (5, 5));
    }

    #[test]
    fn failed_export_leaves_history_alone() {
        let mut s = loaded(5, 5);
        s.rotate_right().unwrap();
        assert!(s.export(ExportFormat::Jpeg, 0.0).is_err());
        assert_eq!(s.history_len(), 2);
        assert!(s.can_undo());
        let bytes = s.export(ExportFormat::Png, 1.0).unwrap();
        let back = io::decode(&bytes, "image/png").unwrap();
        assert_eq!(back.dimensions(), (5, 5));
    }

    #[test]
    fn export_renders_transform_and_filters() {
        let mut s = loaded(6, 2);
        s.rotate_right().unwrap();
        s.set_filters(FilterSettings { invert: 1.0, ..FilterSettings::default() }).unwrap();
        let bytes = s.export(ExportFormat::Png, 1.0).unwrap();
        let back = io::decode(&bytes, "image/png").unwrap();
        assert_eq!(back.dimensions(), (2, 6));
        assert_eq!(back.as_rgba_image(), &s.render().unwrap());
    }

    #[test]
    fn async_compress_blocks_edits_until_installed() {
        let mut s = loaded(16, 16);
        s.spawn_compress(0.6).unwrap();
        assert!(s.is_bake_pending());
        assert!(matches!(s.rotate_right(), Err(EditorError::BakeInProgress)));
        assert!(matches!(s.undo(), Err(EditorError::BakeInProgress)));
        assert!(matches!(s.spawn_compress(0.6), Err(EditorError::BakeInProgress)));

        assert!(s.wait_for_bake().unwrap());
        assert!(!s.is_bake_pending());
        assert!(s.can_undo());
        assert_eq!(s.raster().unwrap().dimensions(), (16, 16));
        s.rotate_right().unwrap();
    }

    #[test]
    fn spawn_compress_validates_quality_up_front() {
        let mut s = loaded(4, 4);
        assert!(matches!(s.spawn_compress(2.0), Err(EditorError::InvalidParameter(_))));
        assert!(!s.is_bake_pending());
    }

    #[test]
    fn loading_discards_an_in_flight_bake() {
        let mut s = loaded(16, 16);
        s.spawn_compress(0.5).unwrap();
        s.load_bytes(&png_bytes(3, 3), "image/png", "other.png").unwrap();
        assert!(!s.is_bake_pending());
        assert!(!s.wait_for_bake().unwrap());
        // Give the stale job time to land, then make sure polling ignores it.
        std::thread::sleep(std::time::Duration::from_millis(200));
        assert!(!s.poll_bake().unwrap());
        assert_eq!(s.raster().unwrap().dimensions(), (3, 3));
        assert!(!s.can_undo());
    }

    #[test]
    fn set_undo_limit_reseeds_from_the_current_state() {
        let mut s = loaded(4, 4);
        s.apply_effect(Effect::Pixelate { block_size: 2 }).unwrap();
        s.rotate_right().unwrap();
        let raster = s.raster().unwrap().clone();
        s.set_undo_limit(7).unwrap();
        assert_eq!(s.config().undo_limit, 7);
        assert!(!s.can_undo());
        assert_eq!(s.transform().rotation_degrees, 90);
        assert_eq!(s.raster().unwrap(), &raster);
    }

    #[test]
    fn reset_all_returns_to_the_upload() {
        let mut s = loaded(8, 6);
        let original = s.raster().unwrap().clone();
        s.crop(CropRect::new(0, 0, 4, 4)).unwrap();
        s.flip_horizontal().unwrap();
        s.reset_all().unwrap();
        assert_eq!(s.raster().unwrap(), &original);
        assert_eq!(s.transform(), TransformState::default());
        assert!(!s.can_undo());
    }

    #[test]
    fn draw_bakes_and_empty_draw_is_a_no_op() {
        let mut s = loaded(10, 10);
        s.draw(&[]).unwrap();
        assert_eq!(s.history_len(), 1);
        s.draw(&[Stroke::pen(brush::DEFAULT_BRUSH_COLOR, 3.0, vec![(1.0, 1.0), (8.0, 8.0)])]).unwrap();
        assert_eq!(s.history_len(), 2);
        assert_eq!(s.raster().unwrap().pixel(5, 5), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn pixelate_block_zero_uses_the_configured_size() {
        let mut s = EditorSession::new(SessionConfig { pixelate_block_size: 4, ..SessionConfig::default() });
        s.load_bytes(&png_bytes(8, 8), "image/png", "a.png").unwrap();
        let src = s.raster().unwrap().clone();
        s.apply_effect(Effect::Pixelate { block_size: 0 }).unwrap();
        assert_eq!(s.raster().unwrap().pixel(3, 3), src.pixel(0, 0));
        assert_eq!(s.raster().unwrap().pixel(4, 4), src.pixel(4, 4));
    }

    #[test]
    fn project_round_trip_restores_state() {
        let mut s = loaded(7, 5);
        s.rotate_right().unwrap();
        s.set_filters(FilterSettings { grayscale: 1.0, ..FilterSettings::default() }).unwrap();
        let project = s.to_project().unwrap();

        let mut other = EditorSession::default();
        other.restore_project(&project).unwrap();
        assert_eq!(other.raster(), s.raster());
        assert_eq!(other.transform(), s.transform());
        assert_eq!(other.filters(), s.filters());
        assert_eq!(other.document_id(), s.document_id());
        assert_eq!(other.file_name(), Some("test.png"));
    }

    #[test]
    fn restored_project_keeps_rotation_a_quarter_turn() {
        let s = loaded(6, 4);
        let mut project = s.to_project().unwrap();

        let mut other = loaded(3, 3);
        project.transform.rotation_degrees = 405;
        assert!(matches!(other.restore_project(&project), Err(EditorError::Project(_))));
        assert_eq!(other.raster().unwrap().dimensions(), (3, 3));

        project.transform.rotation_degrees = 450;
        other.restore_project(&project).unwrap();
        assert_eq!(other.transform().rotation_degrees, 90);
        assert_eq!(other.render().unwrap().dimensions(), (4, 6));
    }

    #[test]
    fn history_entries_share_rasters() {
        let mut s = loaded(4, 4);
        s.apply_effect(Effect::Sharpen).unwrap();
        s.rotate_right().unwrap();
        let doc = s.doc.as_ref().unwrap();
        let baked = doc.history.past().nth(1).and_then(|e| e.raster()).unwrap();
        assert!(Arc::ptr_eq(baked, &doc.raster));
    }

    #[test]
    fn export_file_name_uses_the_upload_stem() {
        let s = loaded(2, 2);
        assert_eq!(s.export_file_name(ExportFormat::Jpeg), "test.jpg");
        assert_eq!(EditorSession::default().export_file_name(ExportFormat::Png), "edited-image.png");
    }

    #[test]
    fn preferences_drive_the_undo_limit() {
        let prefs = Preferences { undo_limit: 99, ..Preferences::default() };
        assert_eq!(SessionConfig::from_preferences(&prefs).undo_limit, 50);
    }
}
