use crate::errors::{AppError, AppResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct MemoConfig {
    pub data_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub canonical_file: String,
    pub legacy_binary_file: String,
    pub legacy_text_file: String,
    pub debounce_ms: u64,
    pub startup_restore_delay_ms: u64,
    pub switch_restore_delay_ms: u64,
    pub default_section_name: String,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            log_dir: None,
            canonical_file: "settings.txt".to_string(),
            legacy_binary_file: "settings.pkl".to_string(),
            legacy_text_file: "settings.json".to_string(),
            debounce_ms: 500,
            startup_restore_delay_ms: 100,
            switch_restore_delay_ms: 50,
            default_section_name: "セクション 1".to_string(),
        }
    }
}

impl MemoConfig {
    /// Reads a YAML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .map_err(|error| AppError::Config(format!("{}: {}", path.to_string_lossy(), error)))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| self.data_dir.join("logs"))
    }

    pub fn timings(&self) -> Timings {
        Timings {
            debounce: Duration::from_millis(self.debounce_ms),
            startup_restore_delay: Duration::from_millis(self.startup_restore_delay_ms),
            switch_restore_delay: Duration::from_millis(self.switch_restore_delay_ms),
        }
    }

    fn validate(&self) -> AppResult<()> {
        for (field, value) in [
            ("canonical_file", &self.canonical_file),
            ("legacy_binary_file", &self.legacy_binary_file),
            ("legacy_text_file", &self.legacy_text_file),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::Config(format!("{} cannot be empty", field)));
            }
        }
        crate::models::validate_section_name(&self.default_section_name)
            .map_err(|error| AppError::Config(format!("default_section_name: {}", error)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub debounce: Duration,
    pub startup_restore_delay: Duration,
    pub switch_restore_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        MemoConfig::default().timings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let root = tempfile::tempdir().expect("temp root");
        let config = MemoConfig::load(&root.path().join("memo.yaml")).expect("defaults");
        assert_eq!(config, MemoConfig::default());
        assert_eq!(config.timings().debounce, Duration::from_millis(500));
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let root = tempfile::tempdir().expect("temp root");
        let path = root.path().join("memo.yaml");
        fs::write(&path, "data_dir: /tmp/memo\ndebounce_ms: 250\n").expect("write config");

        let config = MemoConfig::load(&path).expect("config");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/memo"));
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.canonical_file, "settings.txt");
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/memo/logs"));
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let root = tempfile::tempdir().expect("temp root");
        let path = root.path().join("memo.yaml");
        fs::write(&path, "debounce_ms: [not, a, number]\n").expect("write config");
        assert!(matches!(MemoConfig::load(&path), Err(AppError::Config(_))));
    }

    #[test]
    fn reserved_default_section_name_is_rejected() {
        let root = tempfile::tempdir().expect("temp root");
        let path = root.path().join("memo.yaml");
        fs::write(&path, "default_section_name: _hidden\n").expect("write config");
        assert!(matches!(MemoConfig::load(&path), Err(AppError::Config(_))));
    }
}
