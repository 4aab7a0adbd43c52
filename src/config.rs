//! Engine configuration
//!
//! Loaded from a RON file; every field is optional and falls back to its
//! default.
//!
//! ```ron
//! (
//!     title: "Lantern",
//!     width: 1280,
//!     height: 720,
//!     render: (omni_shadow_resolution: 512, terrain: None),
//!     settings: (show_skybox: false, post: (vignette: (enabled: false))),
//! )
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::renderer::{RenderOptions, RendererSettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}

/// Window, logging and renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    pub vsync: bool,
    /// Seconds between status log lines; 0 disables them
    pub log_interval_secs: f32,
    /// `env_logger` filter; `RUST_LOG` is used when absent
    pub log_filter: Option<String>,
    /// Resources fixed at startup
    pub render: RenderOptions,
    /// Initial renderer settings; the key bindings change them at runtime
    pub settings: RendererSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: String::from("Lantern"),
            width: 1280,
            height: 720,
            vsync: true,
            log_interval_secs: 0.75,
            log_filter: None,
            render: RenderOptions::default(),
            settings: RendererSettings::default(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set window dimensions
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    #[must_use]
    pub fn with_log_interval(mut self, seconds: f32) -> Self {
        self.log_interval_secs = seconds;
        self
    }

    #[must_use]
    pub fn with_render_options(mut self, render: RenderOptions) -> Self {
        self.render = render;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: RendererSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Status line interval; negative or non-finite values disable it
    pub fn log_interval(&self) -> Duration {
        Duration::try_from_secs_f32(self.log_interval_secs).unwrap_or(Duration::ZERO)
    }

    /// Read `path`, or return the defaults when it does not exist
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = ron::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::PostProcessEffect;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::load(dir.path().join("absent.ron")).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.log_interval(), Duration::from_millis(750));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lantern.ron");
        fs::write(
            &path,
            r#"(
                title: "Test",
                width: 800,
                render: (omni_shadow_resolution: 256, terrain: None),
                settings: (show_skybox: false, post: (vignette: (enabled: false))),
            )"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.title, "Test");
        assert_eq!(config.width, 800);
        assert_eq!(config.height, 720);
        assert_eq!(config.render.omni_shadow_resolution, 256);
        assert!(config.render.terrain.is_none());
        assert!(config.render.sky.is_some());
        assert!(!config.settings.show_skybox);
        assert!(!config.settings.post.is_enabled(PostProcessEffect::Vignette));
        assert!(config.settings.post.is_enabled(PostProcessEffect::LogoOverlay));
    }

    #[test]
    fn test_saved_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("saved.ron");
        let config = EngineConfig::default()
            .with_title("Saved")
            .with_size(640, 480)
            .with_log_interval(0.0);
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.log_interval(), Duration::ZERO);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.ron");
        fs::write(&path, "(width: \"wide\")").unwrap();

        let err = EngineConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("bad.ron"));
    }
}
