//! Per-run log file for the editor.
//!
//! Each line carries a wall-clock time, a level and, for document events,
//! the short id of the document it concerns, so edits of several images in
//! one CLI batch can be told apart:
//!
//! ```text
//! [14:02:51] [INFO ] [doc 3f9a0c12] Rotate to 90 degrees
//! [14:02:52] [WARN ] [doc 3f9a0c12 job 4] Compress rejected: ...
//! ```
//!
//! The file is truncated when `init` runs. Before that every macro is a
//! no-op, which is what library users and unit tests get.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl Level {
    fn tag(&self) -> &'static str {
        match self {
            Level::Info => "INFO ",
            Level::Warn => "WARN ",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        }
    }
}

/// What a line is about. Both parts are optional.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Context {
    pub document: Option<Uuid>,
    pub job: Option<u64>,
}

impl Context {
    pub fn document(id: Uuid) -> Self {
        Self { document: Some(id), job: None }
    }

    pub fn job(id: Uuid, token: u64) -> Self {
        Self { document: Some(id), job: Some(token) }
    }

    fn label(&self) -> Option<String> {
        match (self.document, self.job) {
            (None, None) => None,
            (Some(d), None) => Some(format!("doc {:08x}", d.as_fields().0)),
            (None, Some(j)) => Some(format!("job {}", j)),
            (Some(d), Some(j)) => Some(format!("doc {:08x} job {}", d.as_fields().0, j)),
        }
    }
}

struct Sink {
    path: PathBuf,
    file: Mutex<File>,
}

static SINK: OnceLock<Sink> = OnceLock::new();

/// `[info] message`, `[info] doc: id; message` or `[info] doc: id, job: n; message`.
#[macro_export]
macro_rules! log_info {
    (doc: $doc:expr, job: $job:expr; $($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, $crate::logger::Context::job($doc, $job), &format!($($arg)*))
    };
    (doc: $doc:expr; $($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, $crate::logger::Context::document($doc), &format!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, $crate::logger::Context::default(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    (doc: $doc:expr, job: $job:expr; $($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, $crate::logger::Context::job($doc, $job), &format!($($arg)*))
    };
    (doc: $doc:expr; $($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, $crate::logger::Context::document($doc), &format!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, $crate::logger::Context::default(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    (doc: $doc:expr, job: $job:expr; $($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, $crate::logger::Context::job($doc, $job), &format!($($arg)*))
    };
    (doc: $doc:expr; $($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, $crate::logger::Context::document($doc), &format!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, $crate::logger::Context::default(), &format!($($arg)*))
    };
}

/// Path of the active log file, once `init` has succeeded.
pub fn log_path() -> Option<&'static Path> {
    SINK.get().map(|s| s.path.as_path())
}

pub fn write(level: Level, ctx: Context, msg: &str) {
    let Some(sink) = SINK.get() else { return };
    let line = format_line(&clock(now_secs()), level, ctx, msg);
    if let Ok(mut file) = sink.file.lock() {
        let _ = writeln!(file, "{}", line);
    }
}

fn format_line(clock: &str, level: Level, ctx: Context, msg: &str) -> String {
    match ctx.label() {
        Some(label) => format!("[{}] [{}] [{}] {}", clock, level.tag(), label, msg),
        None => format!("[{}] [{}] {}", clock, level.tag(), msg),
    }
}

/// Open the log at the platform location. A failure is reported on stderr
/// and the run continues without a log.
pub fn init() {
    let path = default_log_path();
    if let Err(e) = init_at(path.clone()) {
        eprintln!("[logger] could not open {}: {}", path.display(), e);
    }
}

/// Open (truncating) the log at `path` and mirror panics into it. Later
/// calls in the same process are ignored.
pub fn init_at(path: PathBuf) -> std::io::Result<()> {
    if SINK.get().is_some() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
    writeln!(
        file,
        "=== Retouch {} log, started at unix {} ===",
        env!("CARGO_PKG_VERSION"),
        now_secs()
    )?;
    if SINK.set(Sink { path, file: Mutex::new(file) }).is_err() {
        return Ok(());
    }

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Panic, Context::default(), &info.to_string());
        prev(info);
    }));
    Ok(())
}

/// `<data dir>/Retouch/retouch.log`, where the data dir is `%APPDATA%`,
/// `~/Library/Application Support` or `$XDG_DATA_HOME` (`~/.local/share`).
fn default_log_path() -> PathBuf {
    let home = || std::env::var_os("HOME").map(PathBuf::from);
    let base = if cfg!(target_os = "windows") {
        std::env::var_os("APPDATA").map(PathBuf::from)
    } else if cfg!(target_os = "macos") {
        home().map(|h| h.join("Library").join("Application Support"))
    } else {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| home().map(|h| h.join(".local").join("share")))
    };
    base.unwrap_or_else(|| PathBuf::from(".")).join("Retouch").join("retouch.log")
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// UTC time of day, `HH:MM:SS`.
fn clock(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", (secs % 86_400) / 3600, (secs % 3600) / 60, secs % 60)
}
