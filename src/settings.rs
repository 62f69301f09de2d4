// ============================================================================
// PREFERENCES: persisted user settings (key=value file)
// ============================================================================

use std::path::{Path, PathBuf};

use crate::io::ExportFormat;

pub const UNDO_LIMIT_RANGE: (usize, usize) = (5, 50);
pub const EXPORT_QUALITY_RANGE: (f32, f32) = (0.5, 1.0);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Theme {
    Light,
    #[default]
    Dark,
    System,
}

impl Theme {
    pub fn name(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::System => "system",
        }
    }

    fn parse(s: &str) -> Option<Theme> {
        match s {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            "system" => Some(Theme::System),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FontSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl FontSize {
    pub fn name(&self) -> &'static str {
        match self {
            FontSize::Small => "small",
            FontSize::Medium => "medium",
            FontSize::Large => "large",
        }
    }

    fn parse(s: &str) -> Option<FontSize> {
        match s {
            "small" => Some(FontSize::Small),
            "medium" => Some(FontSize::Medium),
            "large" => Some(FontSize::Large),
            _ => None,
        }
    }
}

/// Default export target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExportSettings {
    pub format: ExportFormat,
    /// 0.5..=1.0
    pub quality: f32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self { format: ExportFormat::Png, quality: 0.92 }
    }
}

/// Named export presets offered next to the manual format/quality choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportPreset {
    HighQuality,
    Balanced,
    WebOptimized,
    SmallSize,
}

impl ExportPreset {
    pub fn all() -> &'static [ExportPreset] {
        &[
            ExportPreset::HighQuality,
            ExportPreset::Balanced,
            ExportPreset::WebOptimized,
            ExportPreset::SmallSize,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExportPreset::HighQuality => "High Quality",
            ExportPreset::Balanced => "Balanced",
            ExportPreset::WebOptimized => "Web Optimized",
            ExportPreset::SmallSize => "Small Size",
        }
    }

    pub fn settings(&self) -> ExportSettings {
        let (format, quality) = match self {
            ExportPreset::HighQuality => (ExportFormat::Png, 1.0),
            ExportPreset::Balanced => (ExportFormat::Png, 0.92),
            ExportPreset::WebOptimized => (ExportFormat::Jpeg, 0.85),
            ExportPreset::SmallSize => (ExportFormat::Jpeg, 0.7),
        };
        ExportSettings { format, quality }
    }

    /// Match a label or a kebab-case id such as `web-optimized`.
    pub fn find(name: &str) -> Option<ExportPreset> {
        let key: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        ExportPreset::all().iter().copied().find(|p| {
            p.label().chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>().to_ascii_lowercase() == key
        })
    }
}

/// User preferences.
#[derive(Clone, Debug, PartialEq)]
pub struct Preferences {
    /// 5..=50
    pub undo_limit: usize,
    pub theme: Theme,
    pub font_size: FontSize,
    pub export: ExportSettings,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            undo_limit: 10,
            theme: Theme::default(),
            font_size: FontSize::default(),
            export: ExportSettings::default(),
        }
    }
}

impl Preferences {
    /// Path to the settings file.
    /// On Linux:   ~/.config/retouch/retouch_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\Retouch\retouch_settings.cfg
    /// On macOS:   ~/Library/Application Support/Retouch/retouch_settings.cfg
    /// Fallback:   same directory as the executable.
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("retouch");
            return Some(config_dir.join("retouch_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("Retouch").join("retouch_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("Retouch")
                    .join("retouch_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join("retouch_settings.cfg")))
        }
    }

    /// Copy with every numeric value forced into its allowed range.
    pub fn clamped(&self) -> Self {
        let quality = if self.export.quality.is_nan() {
            ExportSettings::default().quality
        } else {
            self.export.quality.clamp(EXPORT_QUALITY_RANGE.0, EXPORT_QUALITY_RANGE.1)
        };
        Self {
            undo_limit: self.undo_limit.clamp(UNDO_LIMIT_RANGE.0, UNDO_LIMIT_RANGE.1),
            export: ExportSettings { quality, ..self.export },
            ..self.clone()
        }
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "undo_limit={}\n\
             theme={}\n\
             font_size={}\n\
             export_format={}\n\
             export_quality={}\n",
            self.undo_limit,
            self.theme.name(),
            self.font_size.name(),
            self.export.format.name(),
            self.export.quality,
        )
    }

    /// Parse a settings file body. Unknown keys and unparsable values are
    /// skipped, leaving the default in place.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "undo_limit" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.undo_limit = v;
                    }
                }
                "theme" => {
                    if let Some(t) = Theme::parse(val) {
                        s.theme = t;
                    }
                }
                "font_size" => {
                    if let Some(f) = FontSize::parse(val) {
                        s.font_size = f;
                    }
                }
                "export_format" => {
                    if let Ok(f) = val.parse::<ExportFormat>() {
                        s.export.format = f;
                    }
                }
                "export_quality" => {
                    if let Ok(q) = val.parse::<f32>() {
                        s.export.quality = q;
                    }
                }
                _ => {}
            }
        }
        s.clamped()
    }

    /// Load settings from `path` (returns default if file missing or corrupt)
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };
        Self::from_config_str(&content)
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.clamped().to_config_string())
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        Self::load_from(&path)
    }

    /// Save settings to disk. Failures are logged, never fatal.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            crate::log_warn!("Could not save settings to {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("retouch-settings-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn defaults_match_the_preferences_page() {
        let p = Preferences::default();
        assert_eq!(p.undo_limit, 10);
        assert_eq!(p.theme, Theme::Dark);
        assert_eq!(p.font_size, FontSize::Medium);
        assert_eq!(p.export, ExportSettings { format: ExportFormat::Png, quality: 0.92 });
    }

    #[test]
    fn save_then_load_round_trips() {
        let path = temp_file("retouch_settings.cfg");
        let p = Preferences {
            undo_limit: 25,
            theme: Theme::System,
            font_size: FontSize::Large,
            export: ExportSettings { format: ExportFormat::Webp, quality: 0.75 },
        };
        p.save_to(&path).unwrap();
        assert_eq!(Preferences::load_from(&path), p);
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn missing_file_gives_defaults() {
        assert_eq!(Preferences::load_from(&temp_file("nope.cfg")), Preferences::default());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let p = Preferences::from_config_str("undo_limit=500\nexport_quality=0.1\n");
        assert_eq!(p.undo_limit, 50);
        assert_eq!(p.export.quality, 0.5);
        let p = Preferences::from_config_str("undo_limit=1\n");
        assert_eq!(p.undo_limit, 5);
    }

    #[test]
    fn garbage_lines_and_values_are_ignored() {
        let p = Preferences::from_config_str("theme=neon\n???\nfont_size=small\nexport_format=tiff\nundo_limit=ten\n");
        assert_eq!(p.theme, Theme::Dark);
        assert_eq!(p.font_size, FontSize::Small);
        assert_eq!(p.export.format, ExportFormat::Png);
        assert_eq!(p.undo_limit, 10);
    }

    #[test]
    fn presets_resolve_by_name() {
        assert_eq!(ExportPreset::find("web-optimized"), Some(ExportPreset::WebOptimized));
        assert_eq!(ExportPreset::find("Small Size"), Some(ExportPreset::SmallSize));
        assert_eq!(ExportPreset::SmallSize.settings(), ExportSettings { format: ExportFormat::Jpeg, quality: 0.7 });
        assert!(ExportPreset::find("huge").is_none());
    }
}
