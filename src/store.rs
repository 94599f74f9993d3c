use crate::codec;
use crate::config::MemoConfig;
use crate::errors::{AppError, AppResult};
use crate::legacy;
use crate::models::AppState;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub canonical: PathBuf,
    pub legacy_binary: PathBuf,
    pub legacy_text: PathBuf,
}

impl StorePaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self::from_config(&MemoConfig::in_dir(dir))
    }

    pub fn from_config(config: &MemoConfig) -> Self {
        Self {
            canonical: config.data_dir.join(&config.canonical_file),
            legacy_binary: config.data_dir.join(&config.legacy_binary_file),
            legacy_text: config.data_dir.join(&config.legacy_text_file),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Canonical,
    LegacyBinary,
    LegacyText,
    Empty,
}

impl LoadSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Canonical => "canonical",
            Self::LegacyBinary => "legacy-binary",
            Self::LegacyText => "legacy-text",
            Self::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub state: AppState,
    pub source: LoadSource,
}

#[derive(Debug, Clone)]
pub struct SettingsStore {
    paths: StorePaths,
}

impl SettingsStore {
    pub fn new(paths: StorePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Rewrites the whole canonical file.
    pub fn save(&self, state: &AppState) -> AppResult<()> {
        write_atomic(&self.paths.canonical, codec::encode(state).as_bytes())
    }

    /// Runs the migration chain. Never fails: every tier that cannot be read
    /// is logged and skipped, ending in an empty state.
    pub fn load(&self) -> LoadOutcome {
        if let Some(state) = self.load_canonical() {
            return LoadOutcome {
                state,
                source: LoadSource::Canonical,
            };
        }

        if let Some(state) = self.migrate(&self.paths.legacy_binary, legacy::read_binary) {
            return LoadOutcome {
                state,
                source: LoadSource::LegacyBinary,
            };
        }

        let read_text = |bytes: &[u8]| {
            std::str::from_utf8(bytes)
                .map_err(|error| AppError::LegacyRead(error.to_string()))
                .and_then(legacy::read_text)
        };
        if let Some(state) = self.migrate(&self.paths.legacy_text, read_text) {
            return LoadOutcome {
                state,
                source: LoadSource::LegacyText,
            };
        }

        tracing::info!("no readable settings found; starting empty");
        LoadOutcome {
            state: AppState::default(),
            source: LoadSource::Empty,
        }
    }

    fn load_canonical(&self) -> Option<AppState> {
        let path = &self.paths.canonical;
        if !path.exists() {
            return None;
        }
        let result = fs::read_to_string(path)
            .map_err(AppError::from)
            .and_then(|text| codec::decode(&text));
        match result {
            Ok(state) => {
                tracing::info!(
                    path = %path.to_string_lossy(),
                    sections = state.sections.len(),
                    "loaded settings"
                );
                Some(state)
            }
            Err(error) => {
                tracing::warn!(
                    path = %path.to_string_lossy(),
                    error = %error,
                    "settings file unreadable; trying legacy files"
                );
                None
            }
        }
    }

    fn migrate<F>(&self, path: &Path, read: F) -> Option<AppState>
    where
        F: FnOnce(&[u8]) -> AppResult<AppState>,
    {
        if !path.exists() {
            return None;
        }
        let result = fs::read(path).map_err(AppError::from).and_then(|bytes| read(&bytes));
        let state = match result {
            Ok(state) => state,
            Err(error) => {
                tracing::warn!(path = %path.to_string_lossy(), error = %error, "legacy settings migration failed");
                return None;
            }
        };
        tracing::info!(
            path = %path.to_string_lossy(),
            sections = state.sections.len(),
            "migrated legacy settings"
        );

        if let Err(error) = self.save(&state) {
            tracing::warn!(error = %error, "could not write migrated settings; legacy file left in place");
            return Some(state);
        }

        let backup = backup_path(path);
        match fs::rename(path, &backup) {
            Ok(()) => tracing::info!(backup = %backup.to_string_lossy(), "archived legacy settings"),
            Err(error) => tracing::warn!(error = %error, "could not archive legacy settings"),
        }
        Some(state)
    }
}

/// `settings.pkl` becomes `settings_backup.pkl`.
pub fn backup_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(extension) => format!("{}_backup.{}", stem, extension.to_string_lossy()),
        None => format!("{}_backup", stem),
    };
    path.with_file_name(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| AppError::Io(error.to_string()))?;
    }
    let mut tmp_name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, bytes).map_err(|error| AppError::Io(error.to_string()))?;
    fs::rename(&tmp_path, path).map_err(|error| {
        let _ = fs::remove_file(&tmp_path);
        AppError::Io(error.to_string())
    })
}
