// ============================================================================
// Retouch CLI: headless editing via command-line arguments
// ============================================================================
//
// Usage examples:
//   retouch -i photo.png -e rotate-right -e filter:sepia=0.6 -o result.png
//   retouch -i photo.jpg -e effect:sharpen -e crop:10,10,400,300 -o out.webp
//   retouch -i "shots/*.jpg" -e resize:800 --output-dir small/ --preset web-optimized
//   retouch -i photo.png -e effect:emboss -e undo -e pen:#00ff00:4:10,10:90,90 -o marked.png
//   retouch -i photo.png -e flip-h -o photo.rte          (save an editable project)
//
// Every action goes through an `EditorSession`, so `undo` / `redo` behave
// exactly as they do interactively, and the saved image is the rendered view
// (transform and filters included).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Instant;

use clap::Parser;

use crate::io::ExportFormat;
use crate::ops::brush::{self, Stroke};
use crate::ops::canvas_ops::{self, CropRect};
use crate::ops::effects::Effect;
use crate::ops::filters::FilterSettings;
use crate::project;
use crate::session::{EditorSession, SessionConfig};
use crate::settings::{ExportPreset, Preferences};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Retouch headless image editor.
///
/// Apply transforms, filters, effects, crops, resizes and drawings to image
/// files and export the result. No GUI required.
#[derive(Parser, Debug)]
#[command(
    name = "retouch",
    about = "Retouch headless image editor",
    long_about = "Apply an ordered list of edits to image files and export the result.\n\
                  Inputs: PNG, JPEG, WEBP, GIF and RTE project files.\n\
                  Outputs: PNG, JPEG, WEBP and RTE project files.\n\n\
                  Example:\n  \
                  retouch -i photo.png -e rotate-right -e filter:brightness=1.2 -o out.jpg\n  \
                  retouch -i \"*.jpg\" -e effect:vintage --output-dir out/ --format webp"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Edit to apply, in order. Repeatable. One of:
    /// rotate:<deg>, rotate-left, rotate-right, flip-h, flip-v, reset-transform,
    /// filter:<name>=<value>[,<name>=<value>...], reset-filters,
    /// effect:<vintage|pixelate[:n]|edge-detect|emboss|sharpen>,
    /// crop:<x>,<y>,<w>,<h>, crop:center, resize:<w>x<h>, resize:<w>,
    /// compress:<quality>, pen:<#rrggbb>:<size>:<x>,<y>[:<x>,<y>...],
    /// erase:<size>:<x>,<y>[:<x>,<y>...], undo, redo, reset-all.
    #[arg(short = 'e', long = "edit", value_name = "ACTION")]
    pub edits: Vec<EditAction>,

    /// Output file path. Only valid for single-file input.
    /// For batch input use --output-dir instead.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    /// Files are written here with the original stem and the target format's extension.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, rte.
    /// When omitted, the format is inferred from --output's extension, then
    /// from the saved export preference.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG / WEBP quality in (0, 1]. Defaults to the saved export preference.
    #[arg(short, long, value_name = "0-1")]
    pub quality: Option<f32>,

    /// Export preset: high-quality, balanced, web-optimized, small-size.
    /// Overrides the saved export preference; --format and --quality still win.
    #[arg(long, value_name = "PRESET")]
    pub preset: Option<String>,

    /// History depth (5–50). Defaults to the saved preference.
    #[arg(long, value_name = "N")]
    pub undo_limit: Option<usize>,

    /// Store --undo-limit, --preset, --format and --quality as the new defaults.
    #[arg(long)]
    pub save_settings: bool,

    /// Print each action and per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Edit actions
// ============================================================================

/// One step of the edit list.
#[derive(Clone, Debug, PartialEq)]
pub enum EditAction {
    Rotate(i32),
    FlipHorizontal,
    FlipVertical,
    ResetTransform,
    /// Field overrides on top of the current filter values.
    Filter(Vec<(String, f32)>),
    ResetFilters,
    Effect(Effect),
    Crop(CropRect),
    CropCenter,
    Resize { width: u32, height: Option<u32> },
    Compress(f32),
    Draw(Stroke),
    Undo,
    Redo,
    ResetAll,
}

fn parse_point(s: &str) -> Result<(f32, f32), String> {
    let (x, y) = s.split_once(',').ok_or_else(|| format!("invalid point '{}'", s))?;
    let x = x.trim().parse::<f32>().map_err(|_| format!("invalid point '{}'", s))?;
    let y = y.trim().parse::<f32>().map_err(|_| format!("invalid point '{}'", s))?;
    Ok((x, y))
}

fn parse_points<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<(f32, f32)>, String> {
    let points = parts.map(parse_point).collect::<Result<Vec<_>, _>>()?;
    if points.is_empty() {
        return Err("a stroke needs at least one point".into());
    }
    Ok(points)
}

fn parse_size(s: &str) -> Result<f32, String> {
    let size = s.trim().parse::<f32>().map_err(|_| format!("invalid brush size '{}'", s))?;
    if !(size > 0.0 && size <= brush::MAX_BRUSH_SIZE) {
        return Err(format!("brush size must be in (0, {}], got {}", brush::MAX_BRUSH_SIZE, size));
    }
    Ok(size)
}

impl FromStr for EditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (head, rest) = match s.split_once(':') {
            Some((h, r)) => (h.to_ascii_lowercase(), Some(r)),
            None => (s.to_ascii_lowercase(), None),
        };
        let need = |what: &str| rest.ok_or_else(|| format!("'{}' needs {}", head, what));

        match head.as_str() {
            "rotate" => {
                let deg = need("an angle")?
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| format!("invalid angle in '{}'", s))?;
                if deg % 90 != 0 {
                    return Err(format!("rotation must be a multiple of 90, got {}", deg));
                }
                Ok(EditAction::Rotate(deg))
            }
            "rotate-left" => Ok(EditAction::Rotate(-90)),
            "rotate-right" => Ok(EditAction::Rotate(90)),
            "flip-h" | "flip-horizontal" => Ok(EditAction::FlipHorizontal),
            "flip-v" | "flip-vertical" => Ok(EditAction::FlipVertical),
            "reset-transform" => Ok(EditAction::ResetTransform),
            "filter" => {
                let mut fields = Vec::new();
                for pair in need("name=value pairs")?.split(',') {
                    let (name, value) = pair
                        .split_once('=')
                        .ok_or_else(|| format!("expected name=value, got '{}'", pair))?;
                    let value = value
                        .trim()
                        .parse::<f32>()
                        .map_err(|_| format!("invalid value in '{}'", pair))?;
                    // Reject unknown names at parse time.
                    FilterSettings::default().with_field(name, value)?;
                    fields.push((name.trim().to_ascii_lowercase(), value));
                }
                Ok(EditAction::Filter(fields))
            }
            "reset-filters" => Ok(EditAction::ResetFilters),
            "effect" => Ok(EditAction::Effect(need("an effect name")?.parse()?)),
            "crop" => {
                let arg = need("x,y,w,h or 'center'")?.trim();
                if arg.eq_ignore_ascii_case("center") {
                    return Ok(EditAction::CropCenter);
                }
                let nums = arg
                    .split(',')
                    .map(|v| v.trim().parse::<u32>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| format!("invalid crop box '{}'", arg))?;
                match nums.as_slice() {
                    [x, y, w, h] => Ok(EditAction::Crop(CropRect::new(*x, *y, *w, *h))),
                    _ => Err(format!("crop needs x,y,w,h, got '{}'", arg)),
                }
            }
            "resize" => {
                let arg = need("<w>x<h> or <w>")?.trim().to_ascii_lowercase();
                let parse_dim = |v: &str| -> Result<u32, String> {
                    let d = v.trim().parse::<u32>().map_err(|_| format!("invalid size '{}'", arg))?;
                    if d == 0 || d > canvas_ops::MAX_RESIZE_DIM {
                        return Err(format!("size must be 1–{}, got {}", canvas_ops::MAX_RESIZE_DIM, d));
                    }
                    Ok(d)
                };
                match arg.split_once('x') {
                    Some((w, h)) => Ok(EditAction::Resize { width: parse_dim(w)?, height: Some(parse_dim(h)?) }),
                    None => Ok(EditAction::Resize { width: parse_dim(&arg)?, height: None }),
                }
            }
            "compress" => {
                let q = match rest {
                    Some(q) => q.trim().parse::<f32>().map_err(|_| format!("invalid quality '{}'", q))?,
                    None => canvas_ops::DEFAULT_COMPRESS_QUALITY,
                };
                crate::io::quality_to_percent(q).map_err(|e| e.to_string())?;
                Ok(EditAction::Compress(q))
            }
            "pen" => {
                let mut parts = need("colour, size and points")?.split(':');
                let color = brush::parse_hex_color(parts.next().unwrap_or(""))?;
                let size = parse_size(parts.next().unwrap_or(""))?;
                Ok(EditAction::Draw(Stroke::pen(color, size, parse_points(parts)?)))
            }
            "erase" | "eraser" => {
                let mut parts = need("size and points")?.split(':');
                let size = parse_size(parts.next().unwrap_or(""))?;
                Ok(EditAction::Draw(Stroke::eraser(size, parse_points(parts)?)))
            }
            "undo" => Ok(EditAction::Undo),
            "redo" => Ok(EditAction::Redo),
            "reset-all" => Ok(EditAction::ResetAll),
            _ => Err(format!("unknown edit '{}'", s)),
        }
    }
}

/// Apply one action to the session. Returns a short note for verbose output.
pub fn apply_action(session: &mut EditorSession, action: &EditAction) -> crate::error::Result<String> {
    match action {
        EditAction::Rotate(deg) => {
            session.rotate(*deg)?;
            Ok(format!("rotation {}°", session.transform().rotation_degrees))
        }
        EditAction::FlipHorizontal => session.flip_horizontal().map(|_| "flipped horizontally".into()),
        EditAction::FlipVertical => session.flip_vertical().map(|_| "flipped vertically".into()),
        EditAction::ResetTransform => session.reset_transform().map(|_| "transform reset".into()),
        EditAction::Filter(fields) => {
            let mut settings = session.filters();
            for (name, value) in fields {
                settings = settings
                    .with_field(name, *value)
                    .map_err(crate::error::EditorError::InvalidParameter)?;
            }
            session.set_filters(settings)?;
            Ok(session.filters().css_filter_string())
        }
        EditAction::ResetFilters => session.reset_filters().map(|_| "filters reset".into()),
        EditAction::Effect(effect) => session.apply_effect(*effect).map(|_| effect.label().to_string()),
        EditAction::Crop(rect) => {
            session.crop(*rect)?;
            Ok(size_note(session))
        }
        EditAction::CropCenter => {
            let (w, h) = session.raster().map(|r| r.dimensions()).unwrap_or((0, 0));
            session.crop(CropRect::centered_default(w, h))?;
            Ok(size_note(session))
        }
        EditAction::Resize { width, height } => {
            let h = match height {
                Some(h) => *h,
                None => {
                    let (ow, oh) = session.raster().map(|r| r.dimensions()).unwrap_or((0, 0));
                    canvas_ops::aspect_locked_size(ow, oh, *width, true)
                }
            };
            session.resize(*width, h)?;
            Ok(size_note(session))
        }
        EditAction::Compress(q) => {
            session.spawn_compress(*q)?;
            session.wait_for_bake()?;
            Ok(format!("compressed at {}", q))
        }
        EditAction::Draw(stroke) => {
            session.draw(std::slice::from_ref(stroke))?;
            Ok(format!("{} points drawn", stroke.points.len()))
        }
        EditAction::Undo => Ok(if session.undo()? { "undone".into() } else { "nothing to undo".into() }),
        EditAction::Redo => Ok(if session.redo()? { "redone".into() } else { "nothing to redo".into() }),
        EditAction::ResetAll => session.reset_all().map(|_| "all edits reset".into()),
    }
}

fn size_note(session: &EditorSession) -> String {
    match session.raster() {
        Some(r) => format!("now {}x{}", r.width(), r.height()),
        None => String::new(),
    }
}

// ============================================================================
// Output target
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OutputKind {
    Image(ExportFormat),
    Project,
}

impl OutputKind {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputKind::Image(f) => f.extension(),
            OutputKind::Project => "rte",
        }
    }

    fn parse(s: &str) -> Option<OutputKind> {
        if s.eq_ignore_ascii_case("rte") {
            return Some(OutputKind::Project);
        }
        s.parse::<ExportFormat>().ok().map(OutputKind::Image)
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing with the user's saved preferences and return an
/// OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let prefs = Preferences::load();
    run_with_preferences(args, prefs)
}

/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run_with_preferences(args: CliArgs, mut prefs: Preferences) -> ExitCode {
    // Resolve glob patterns / literal paths → concrete PathBufs
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    // Multiple inputs require --output-dir, not --output
    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    // Preset, then explicit flags, on top of the saved preferences
    if let Some(name) = &args.preset {
        match ExportPreset::find(name) {
            Some(p) => prefs.export = p.settings(),
            None => {
                eprintln!("error: unknown preset '{}'.", name);
                return ExitCode::FAILURE;
            }
        }
    }
    if let Some(limit) = args.undo_limit {
        prefs.undo_limit = limit;
    }
    let output_kind = match resolve_output_kind(args.format.as_deref(), args.output.as_deref(), prefs.export.format) {
        Ok(kind) => kind,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let OutputKind::Image(f) = output_kind {
        prefs.export.format = f;
    }
    let quality = args.quality.unwrap_or(prefs.export.quality);
    if let Err(e) = crate::io::quality_to_percent(quality) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }
    prefs.export.quality = quality;
    let prefs = prefs.clamped();

    if args.save_settings {
        prefs.save();
    }

    // Create output directory if specified
    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let config = SessionConfig::from_preferences(&prefs);
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            output_kind,
        ) else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &args.edits, config, output_kind, quality, args.verbose) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                crate::log_err!("CLI: {} failed: {}", input_path.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

/// Load `input`, apply `edits` in order, and write the result.
pub fn run_one(
    input: &Path,
    output: &Path,
    edits: &[EditAction],
    config: SessionConfig,
    kind: OutputKind,
    quality: f32,
    verbose: bool,
) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let mut session = EditorSession::new(config);
    session.load_path(input).map_err(|e| format!("load failed: {}", e))?;

    // -- Step 2: Edit ----------------------------------------------------
    for (i, action) in edits.iter().enumerate() {
        let note = apply_action(&mut session, action).map_err(|e| format!("edit {} ({:?}) failed: {}", i + 1, action, e))?;
        if verbose {
            println!("  [{}] {}", i + 1, note);
        }
    }

    // -- Step 3: Save ----------------------------------------------------
    match kind {
        OutputKind::Project => {
            let p = session.to_project().map_err(|e| e.to_string())?;
            project::save_project(&p, output).map_err(|e| format!("project save failed: {}", e))?;
        }
        OutputKind::Image(format) => {
            session
                .export_to_path(output, format, quality)
                .map_err(|e| format!("save failed: {}", e))?;
        }
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
pub fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            // Literal path: use directly
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        // Treat as glob pattern
        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Choose the output kind from the `--format` string, else the output file
/// extension, else the saved default format.
pub fn resolve_output_kind(
    format_arg: Option<&str>,
    output: Option<&Path>,
    default: ExportFormat,
) -> Result<OutputKind, String> {
    if let Some(f) = format_arg {
        return OutputKind::parse(f).ok_or_else(|| format!("unsupported output format '{}'", f));
    }

    if let Some(ext) = output.and_then(|o| o.extension()).and_then(|e| e.to_str())
        && let Some(kind) = OutputKind::parse(ext)
    {
        return Ok(kind);
    }

    Ok(OutputKind::Image(default))
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_out` to stem if it would collide with the input path)
pub fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    kind: OutputKind,
) -> Option<PathBuf> {
    // Explicit output path
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = kind.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    // Write next to the input file
    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    // Avoid silent overwrite of the input
    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}
