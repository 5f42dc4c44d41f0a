//! Persisted profile: the watch list and notification toggles.
//!
//! The watcher core never persists on its own; callers load the profile at
//! startup and mirror `add_watch`/`remove_watch` back through `save`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Environment variable overriding the profile path.
pub const PROFILE_PATH_ENV: &str = "PETWATCH_PROFILE";

const DEFAULT_PROFILE_FILE: &str = "profile.json";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Profile {
    /// Uids to watch at startup.
    pub watch_list: Vec<String>,
    /// Deliver live-start notifications.
    pub live_notify: bool,
    /// Deliver new-post notifications.
    pub dynamic_notify: bool,
    /// User agent presented alongside harvested cookies.
    pub user_agent: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            watch_list: Vec::new(),
            live_notify: true,
            dynamic_notify: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Profile {
    /// Profile path: `PETWATCH_PROFILE` override, else `./profile.json`.
    pub fn default_path() -> PathBuf {
        std::env::var_os(PROFILE_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROFILE_FILE))
    }

    /// Load the profile, falling back to defaults when the file does not
    /// exist yet. A malformed file is an error rather than silent reset.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let profile = serde_json::from_str(&contents).map_err(|e| {
                    Error::config(format!("malformed profile {}: {e}", path.display()))
                })?;
                debug!(path = %path.display(), "profile loaded");
                Ok(profile)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no profile file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        debug!(path = %path.display(), "profile saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let profile = Profile::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(profile, Profile::default());
        assert!(profile.live_notify);
        assert!(profile.dynamic_notify);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");

        let mut profile = Profile::default();
        profile.watch_list = vec!["475210".to_string(), "672328094".to_string()];
        profile.dynamic_notify = false;
        profile.save(&path).unwrap();

        let loaded = Profile::load(&path).unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, r#"{"watch_list":["123"]}"#).unwrap();

        let loaded = Profile::load(&path).unwrap();
        assert_eq!(loaded.watch_list, vec!["123".to_string()]);
        assert!(loaded.live_notify);
        assert!(!loaded.user_agent.is_empty());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            Profile::load(&path),
            Err(Error::Configuration(_))
        ));
    }
}
