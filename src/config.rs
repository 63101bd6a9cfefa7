//! Settings and profile persistence
//!
//! Settings live as one JSON file under the user config dir; profiles are
//! named files next to it. Loads are tolerant: unknown keys are ignored
//! and a missing or unreadable file yields defaults, so a bad config never
//! blocks routing.
//!
//! Profiles store stable matching keys, not node ids — ids change every
//! session, so a saved selection is re-resolved against a fresh source
//! list on load.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::pipewire::ObjectId;
use crate::router::classify::{ClassifiedNode, Role};

/// Application settings with defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Recording application whose capture input receives routed audio
    pub capture_app: String,
    /// Re-detection interval for watch mode, in seconds
    pub poll_interval_secs: u64,
    /// Reconnect the playback sink to the recorder when watch mode exits
    pub restore_default_on_close: bool,
    /// Keep newly detected games routed automatically in watch mode
    pub auto_apply_games: bool,
    /// Source name patterns (glob or substring) hidden from the list
    pub excluded_apps: Vec<String>,
    /// Budget for one graph snapshot, in milliseconds
    pub snapshot_timeout_ms: u64,
    /// Bounded wait for one link mutation to be confirmed, in milliseconds
    pub confirm_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            capture_app: "Steam".to_string(),
            poll_interval_secs: 3,
            restore_default_on_close: true,
            auto_apply_games: true,
            excluded_apps: Vec::new(),
            snapshot_timeout_ms: 1000,
            confirm_timeout_ms: 2000,
        }
    }
}

/// A stable key identifying a source across sessions.
///
/// Matching mirrors the classifier's inputs: application name and binary
/// patterns (globs allowed), with an optional role refinement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceKey {
    pub app_name: String,
    #[serde(default)]
    pub binary: String,
    #[serde(default)]
    pub role: Option<Role>,
}

impl SourceKey {
    pub fn for_source(source: &ClassifiedNode) -> Self {
        Self {
            app_name: source.app_name.clone(),
            binary: source.binary.clone(),
            role: Some(source.role),
        }
    }

    pub fn matches(&self, source: &ClassifiedNode) -> bool {
        if let Some(role) = self.role
            && source.role != role
        {
            return false;
        }
        if !self.app_name.is_empty() && !pattern_matches(&self.app_name, &source.app_name) {
            return false;
        }
        if !self.binary.is_empty() && !pattern_matches(&self.binary, &source.binary) {
            return false;
        }
        !self.app_name.is_empty() || !self.binary.is_empty()
    }
}

/// A saved routing selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub sources: Vec<SourceKey>,
}

impl Profile {
    /// Capture the keys of the given sources under a name.
    pub fn from_sources<'a>(
        name: impl Into<String>,
        sources: impl IntoIterator<Item = &'a ClassifiedNode>,
    ) -> Self {
        Self {
            name: name.into(),
            sources: sources.into_iter().map(SourceKey::for_source).collect(),
        }
    }

    /// Node ids in the fresh source list that this profile selects.
    pub fn resolve(&self, sources: &[ClassifiedNode]) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = Vec::new();
        for source in sources {
            if self.sources.iter().any(|k| k.matches(source)) && !ids.contains(&source.id) {
                ids.push(source.id);
            }
        }
        ids
    }
}

/// Settings and profile files under one config directory.
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Store under the user config dir, or `None` when the platform has
    /// no such notion.
    pub fn open() -> Option<Self> {
        dirs::config_dir().map(|d| Self {
            dir: d.join("capturebay"),
        })
    }

    /// Store under an explicit directory.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn settings_path(&self) -> PathBuf {
        self.dir.join("settings.json")
    }

    fn profiles_dir(&self) -> PathBuf {
        self.dir.join("profiles")
    }

    fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir().join(format!("{name}.json"))
    }

    pub fn has_settings(&self) -> bool {
        self.settings_path().exists()
    }

    pub fn load_settings(&self) -> Settings {
        match fs::read_to_string(self.settings_path()) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(settings) => settings,
                Err(e) => {
                    log::error!("Ignoring malformed settings file: {}", e);
                    Settings::default()
                }
            },
            Err(_) => Settings::default(),
        }
    }

    pub fn save_settings(&self, settings: &Settings) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.settings_path(), json)
    }

    pub fn save_profile(&self, profile: &Profile) -> io::Result<()> {
        fs::create_dir_all(self.profiles_dir())?;
        let json = serde_json::to_string_pretty(profile)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(self.profile_path(&profile.name), json)
    }

    pub fn load_profile(&self, name: &str) -> Option<Profile> {
        let text = fs::read_to_string(self.profile_path(name)).ok()?;
        match serde_json::from_str(&text) {
            Ok(profile) => Some(profile),
            Err(e) => {
                log::error!("Ignoring malformed profile {:?}: {}", name, e);
                None
            }
        }
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.profiles_dir())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| {
                        let path = e.path();
                        if path.extension().is_some_and(|ext| ext == "json") {
                            path.file_stem().map(|s| s.to_string_lossy().into_owned())
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn delete_profile(&self, name: &str) -> bool {
        fs::remove_file(self.profile_path(name)).is_ok()
    }
}

/// Simple pattern matching with wildcards.
/// Supports:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
/// - Plain strings: exact match or substring match
pub fn pattern_matches(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if !pattern.contains('*') && !pattern.contains('?') {
        // Exact match or substring match
        return text == pattern || text.contains(pattern);
    }

    // Simple glob matching using dynamic programming approach
    let pattern_bytes = pattern.as_bytes();
    let text_bytes = text.as_bytes();
    let m = pattern_bytes.len();
    let n = text_bytes.len();

    let mut dp = vec![vec![false; n + 1]; m + 1];
    dp[0][0] = true;

    for i in 1..=m {
        if pattern_bytes[i - 1] == b'*' {
            dp[i][0] = dp[i - 1][0];
        }
    }

    for i in 1..=m {
        for j in 1..=n {
            if pattern_bytes[i - 1] == b'*' {
                dp[i][j] = dp[i - 1][j] || dp[i][j - 1];
            } else if pattern_bytes[i - 1] == b'?' || pattern_bytes[i - 1] == text_bytes[j - 1] {
                dp[i][j] = dp[i - 1][j - 1];
            }
        }
    }

    dp[m][n]
}
