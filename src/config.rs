// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every tunable of the renderer lives in one immutable `Config` value that is
// handed to initialization. The defaults are the bring-up constants; an
// optional config.toml overrides any subset of them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::ffi::CString;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub device: DeviceConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Triangle".to_string(),
            width: 1024,
            height: 768,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub clear_color: [f32; 4],
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vertex_shader: PathBuf::from("shaders/shader.vert.spv"),
            fragment_shader: PathBuf::from("shaders/shader.frag.spv"),
        }
    }
}

/// Logical device settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Extensions a physical device must support to be considered at all.
    pub required_extensions: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            required_extensions: vec!["VK_KHR_swapchain".to_string()],
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
        }
    }
}

/// Where the active configuration came from. Loading happens before the
/// logger exists, so the outcome is reported afterwards.
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults(PathBuf),
    /// The file exists but could not be used.
    Fallback(anyhow::Error),
}

impl ConfigSource {
    pub fn report(&self) {
        match self {
            ConfigSource::File(path) => log::info!("Loaded configuration from {:?}", path),
            ConfigSource::Defaults(path) => {
                log::info!("Config file not found at {:?}, using defaults", path)
            }
            ConfigSource::Fallback(e) => log::warn!("{:#}. Using defaults.", e),
        }
    }
}

impl Config {
    /// Load config.toml, falling back to defaults if it is missing or broken
    pub fn load() -> (Self, ConfigSource) {
        Self::load_or_default("config.toml")
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, ConfigSource) {
        let path = path.as_ref();
        match Self::load_from_path(path) {
            Ok(Some(config)) => (config, ConfigSource::File(path.to_path_buf())),
            Ok(None) => (Config::default(), ConfigSource::Defaults(path.to_path_buf())),
            Err(e) => (Config::default(), ConfigSource::Fallback(e)),
        }
    }

    /// Load configuration from a specific path; `None` if there is no file
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(Some(config))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Required device extensions as C strings for the Vulkan API
    pub fn required_extensions(&self) -> Result<Vec<CString>> {
        self.device
            .required_extensions
            .iter()
            .map(|name| {
                CString::new(name.as_str())
                    .with_context(|| format!("Invalid extension name {:?}", name))
            })
            .collect()
    }

    /// Validation is only ever enabled in debug builds.
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }
}
