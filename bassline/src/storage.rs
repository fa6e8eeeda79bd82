//! Preferences persistence and the open-file browser.

use std::path::PathBuf;

use basscore::DspParams;
use serde::{Deserialize, Serialize};

/// Extensions the browser and drag-and-drop accept.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a", "aac"];

pub fn is_audio_file(path: &std::path::Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    AUDIO_EXTENSIONS.contains(&ext.as_str())
}

/// Starting directory for the browser: the user's music folder when one
/// exists, else home, else the working directory.
pub fn music_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| {
            dirs.audio_dir()
                .map(|p| p.to_path_buf())
                .or_else(|| Some(dirs.home_dir().to_path_buf()))
        })
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Persistent app preferences. Loaded and written best-effort: a missing
/// or corrupt file just means defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prefs {
    pub volume: f32,
    pub zoom_level: i32,
    #[serde(default)]
    pub dsp: DspParams,
    #[serde(default)]
    pub last_dir: Option<PathBuf>,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            volume: 0.8,
            zoom_level: basscore::session::DEFAULT_ZOOM,
            dsp: DspParams::default(),
            last_dir: None,
        }
    }
}

impl Prefs {
    fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "bassline")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("prefs.json")
    }

    pub fn load() -> Self {
        let prefs: Self = std::fs::read_to_string(Self::config_path())
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        Self {
            volume: prefs.volume.clamp(0.0, 1.0),
            zoom_level: prefs.zoom_level,
            dsp: prefs.dsp.sanitized(),
            last_dir: prefs.last_dir,
        }
    }

    pub fn save(&self) {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string_pretty(self) {
            let _ = std::fs::write(path, json);
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_directory: bool,
}

/// Directory listing for the open dialog, filtered to audio files.
#[derive(Debug, Clone)]
pub struct FileBrowser {
    pub current_dir: PathBuf,
    pub entries: Vec<FileEntry>,
    pub selected: Option<usize>,
}

impl FileBrowser {
    pub fn new(start_dir: PathBuf) -> Self {
        let mut browser = Self {
            current_dir: start_dir,
            entries: Vec::new(),
            selected: None,
        };
        browser.refresh();
        browser
    }

    pub fn refresh(&mut self) {
        self.entries.clear();
        self.selected = None;

        if let Some(parent) = self.current_dir.parent() {
            self.entries.push(FileEntry {
                name: "..".to_string(),
                path: parent.to_path_buf(),
                is_directory: true,
            });
        }

        let Ok(read_dir) = std::fs::read_dir(&self.current_dir) else { return };

        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in read_dir.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let is_directory = path.is_dir();
            if !is_directory && !is_audio_file(&path) {
                continue;
            }
            let entry = FileEntry { name, path, is_directory };
            if is_directory {
                dirs.push(entry);
            } else {
                files.push(entry);
            }
        }
        dirs.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        files.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        self.entries.extend(dirs);
        self.entries.extend(files);
    }

    pub fn navigate_to(&mut self, path: PathBuf) {
        if path.is_dir() {
            self.current_dir = path;
            self.refresh();
        }
    }

    pub fn selected_entry(&self) -> Option<&FileEntry> {
        self.selected.and_then(|i| self.entries.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_audio_extension_filter() {
        assert!(is_audio_file(Path::new("/a/track.mp3")));
        assert!(is_audio_file(Path::new("/a/TRACK.WAV")));
        assert!(!is_audio_file(Path::new("/a/readme.txt")));
        assert!(!is_audio_file(Path::new("/a/noext")));
    }
}
