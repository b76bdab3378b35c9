//! Resolver settings.
//!
//! Precedence, lowest first: built-in defaults, a YAML file named by
//! `APPARATUS_CONFIG`, individual `APPARATUS_*` variables, then CLI flags.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What to do with a pointer whose target cannot be located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissPolicy {
    /// Log the miss and remove the pointer from its apparatus.
    Drop,
    /// Abort chunk initialization.
    Fail,
}

/// Miss handling for the two lookup phases.
///
/// The defaults tolerate range misses but treat direct-id misses as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionPolicy {
    /// Applied when a range expression cannot be anchored.
    pub range_miss: MissPolicy,
    /// Applied when an id matches zero or several elements.
    pub dereference_miss: MissPolicy,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self { range_miss: MissPolicy::Drop, dereference_miss: MissPolicy::Fail }
    }
}

/// Settings shared by every chunk resolved in one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory or URL prefix holding `spine_CNN.xml` files.
    pub spine_base_url: String,
    /// Prefix for synthesized anchor ids.
    pub anchor_prefix: String,
    /// Optional edition registry file; the bundled registry otherwise.
    pub editions: Option<PathBuf>,
    /// Miss handling.
    pub policy: ResolutionPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spine_base_url: "spine".to_string(),
            anchor_prefix: "anchor-".to_string(),
            editions: None,
            policy: ResolutionPolicy::default(),
        }
    }
}

impl Settings {
    /// Loads settings from a YAML file. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Ok(serde_yaml::from_str(&yaml)?)
    }

    /// Builds settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `APPARATUS_CONFIG` names an unreadable file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(None, |key| env::var(key).ok())
    }

    /// Like [`Settings::from_env`], but reads `file` instead of `APPARATUS_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns an error if `file` cannot be read or parsed.
    pub fn from_env_with_file(file: &Path) -> Result<Self, ConfigError> {
        Self::from_vars(Some(file), |key| env::var(key).ok())
    }

    fn from_vars(
        file: Option<&Path>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let file = file.map(Path::to_path_buf).or_else(|| var("APPARATUS_CONFIG").map(PathBuf::from));
        let mut settings = match file {
            Some(path) => Self::load(&path)?,
            None => Self::default(),
        };
        if let Some(base) = var("APPARATUS_SPINE_BASE") {
            settings.spine_base_url = base;
        }
        if let Some(prefix) = var("APPARATUS_ANCHOR_PREFIX") {
            settings.anchor_prefix = prefix;
        }
        if let Some(editions) = var("APPARATUS_EDITIONS") {
            settings.editions = Some(PathBuf::from(editions));
        }
        Ok(settings)
    }

    /// URL of a chunk's spine document, e.g. chunk 3 → `<base>/spine_C03.xml`.
    #[must_use]
    pub fn spine_url(&self, chunk: u32) -> String {
        format!("{}/spine_C{chunk:02}.xml", self.spine_base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn spine_url_zero_pads_chunk() {
        let settings = Settings {
            spine_base_url: "https://example.org/variorum/".into(),
            ..Settings::default()
        };
        assert_eq!(settings.spine_url(3), "https://example.org/variorum/spine_C03.xml");
        assert_eq!(settings.spine_url(12), "https://example.org/variorum/spine_C12.xml");
    }

    #[test]
    fn default_policy_keeps_phase_asymmetry() {
        let policy = ResolutionPolicy::default();
        assert_eq!(policy.range_miss, MissPolicy::Drop);
        assert_eq!(policy.dereference_miss, MissPolicy::Fail);
    }

    #[test]
    fn yaml_overrides_only_given_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apparatus.yaml");
        std::fs::write(&path, "anchor_prefix: mock-\npolicy:\n  dereference_miss: drop\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.anchor_prefix, "mock-");
        assert_eq!(settings.spine_base_url, "spine");
        assert_eq!(settings.policy.range_miss, MissPolicy::Drop);
        assert_eq!(settings.policy.dereference_miss, MissPolicy::Drop);
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apparatus.yaml");
        std::fs::write(&path, "spine_base_url: from-file\nanchor_prefix: file-\n").unwrap();

        let vars: HashMap<&str, String> = HashMap::from([
            ("APPARATUS_CONFIG", path.display().to_string()),
            ("APPARATUS_SPINE_BASE", "from-env".to_string()),
            ("APPARATUS_EDITIONS", "editions.yaml".to_string()),
        ]);
        let settings = Settings::from_vars(None, |key| vars.get(key).cloned()).unwrap();

        assert_eq!(settings.spine_base_url, "from-env");
        assert_eq!(settings.anchor_prefix, "file-");
        assert_eq!(settings.editions, Some(PathBuf::from("editions.yaml")));
    }

    #[test]
    fn explicit_file_replaces_config_variable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.yaml");
        std::fs::write(&path, "spine_base_url: from-flag\n").unwrap();

        let vars = HashMap::from([("APPARATUS_CONFIG", "/no/such/apparatus.yaml".to_string())]);
        let settings = Settings::from_vars(Some(&path), |key| vars.get(key).cloned()).unwrap();
        assert_eq!(settings.spine_base_url, "from-flag");
    }

    #[test]
    fn missing_config_file_is_reported() {
        let vars = HashMap::from([("APPARATUS_CONFIG", "/no/such/apparatus.yaml".to_string())]);
        let err = Settings::from_vars(None, |key| vars.get(key).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
