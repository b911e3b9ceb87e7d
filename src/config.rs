//! Application configuration
//!
//! Loaded from TOML. Every field has a default so a missing file, or a file
//! with only a few keys, still yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::ConfigError;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub layout: LayoutConfig,
    pub osc: OscConfig,
    pub render: RenderConfig,
    pub ui: UiConfig,
}

/// Art-Net listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// UDP port, 1-65535. Kept wide so out-of-range values can be reported
    /// and replaced instead of failing deserialization.
    pub port: u32,
    /// Local IPv4 address to bind; all interfaces when absent
    pub bind_address: Option<String>,
    /// SO_RCVBUF size in bytes
    pub receive_buffer_size: usize,
    /// What the ingestion loop does after a socket receive error
    pub on_receive_error: ReceiveErrorPolicy,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_ARTNET_PORT as u32,
            bind_address: None,
            receive_buffer_size: 256 * 1024,
            on_receive_error: ReceiveErrorPolicy::default(),
        }
    }
}

impl NetworkConfig {
    /// Listening port; falls back to the default when out of range
    pub fn port(&self) -> u16 {
        match u16::try_from(self.port) {
            Ok(port) if port != 0 => port,
            _ => DEFAULT_ARTNET_PORT,
        }
    }

    /// Parsed bind address
    pub fn bind_ip(&self) -> Result<Option<Ipv4Addr>, ConfigError> {
        match self.bind_address.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(addr) => addr
                .parse::<Ipv4Addr>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidBindAddress(addr.to_string())),
        }
    }
}

/// Policy applied when `recv_from` fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiveErrorPolicy {
    /// Log the error and stop the ingestion loop
    #[default]
    Terminate,
    /// Log the error and keep listening
    Resume,
}

/// Policy applied when a payload would run past the end of the buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrunPolicy {
    /// Write the part that fits
    #[default]
    Truncate,
    /// Drop the whole payload
    Drop,
}

/// Channel layout preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// 3 universes, 520-byte stride, 1560 channels
    #[default]
    Standard,
    /// Three times the standard channel count, for higher-resolution consumers
    Wide,
}

/// Channel buffer layout settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub mode: LayoutMode,
    /// Overrides the universe count of the preset
    pub universes: Option<u16>,
    /// Overrides the stride of the preset
    pub stride: Option<usize>,
    /// Caps the total channel count below `universes * stride`
    pub channels: Option<usize>,
    pub overrun: OverrunPolicy,
}

impl LayoutConfig {
    /// Resolve the preset and overrides into a concrete layout
    pub fn resolve(&self) -> Result<UniverseLayout, ConfigError> {
        let preset = match self.mode {
            LayoutMode::Standard => UniverseLayout::standard(),
            LayoutMode::Wide => UniverseLayout::wide(),
        };

        let layout = UniverseLayout::new(
            self.universes.unwrap_or(preset.universes),
            self.stride.unwrap_or(preset.stride),
        )?;
        match self.channels {
            Some(channels) => layout.with_channels(channels),
            None => Ok(layout),
        }
    }
}

/// Concrete channel buffer geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseLayout {
    /// Active universes, ids `0..universes`
    pub universes: u16,
    /// Bytes reserved per universe, at least one full DMX universe
    pub stride: usize,
    /// Total channel count `C`
    pub channels: usize,
}

impl UniverseLayout {
    /// Create a validated layout spanning `universes * stride` channels
    pub fn new(universes: u16, stride: usize) -> Result<Self, ConfigError> {
        if universes == 0 || universes as usize > MAX_UNIVERSES {
            return Err(ConfigError::InvalidLayout(format!(
                "universe count {} outside 1..={}",
                universes, MAX_UNIVERSES
            )));
        }
        if stride < DMX_UNIVERSE_SIZE {
            return Err(ConfigError::InvalidLayout(format!(
                "stride {} smaller than a universe ({} channels)",
                stride, DMX_UNIVERSE_SIZE
            )));
        }

        Ok(Self {
            universes,
            stride,
            channels: universes as usize * stride,
        })
    }

    /// Cap the channel count. Universes whose slot starts at or past the cap
    /// cannot be written; the one straddling it is subject to the overrun
    /// policy.
    pub fn with_channels(self, channels: usize) -> Result<Self, ConfigError> {
        let full = self.universes as usize * self.stride;
        if channels == 0 || channels > full {
            return Err(ConfigError::InvalidLayout(format!(
                "channel count {} outside 1..={}",
                channels, full
            )));
        }

        Ok(Self { channels, ..self })
    }

    pub fn standard() -> Self {
        Self {
            universes: DEFAULT_UNIVERSES,
            stride: DEFAULT_UNIVERSE_STRIDE,
            channels: TOTAL_DMX_CHANNELS,
        }
    }

    pub fn wide() -> Self {
        let universes = DEFAULT_UNIVERSES * WIDE_MODE_FACTOR;
        Self {
            universes,
            stride: DEFAULT_UNIVERSE_STRIDE,
            channels: universes as usize * DEFAULT_UNIVERSE_STRIDE,
        }
    }

    /// Total channel count `C`
    pub fn capacity(&self) -> usize {
        self.channels
    }

    /// Byte offset of a universe's slot
    pub fn offset(&self, universe: u16) -> usize {
        universe as usize * self.stride
    }
}

impl Default for UniverseLayout {
    fn default() -> Self {
        Self::standard()
    }
}

/// OSC forwarding settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OscConfig {
    pub enabled: bool,
    pub target: String,
    pub address_prefix: String,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target: DEFAULT_OSC_TARGET.to_string(),
            address_prefix: DEFAULT_OSC_PREFIX.to_string(),
        }
    }
}

impl OscConfig {
    pub fn target_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.target
            .parse()
            .map_err(|_| ConfigError::InvalidTarget(self.target.clone()))
    }
}

/// Consumer loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Maximum frames per second handed to sinks, 0 for unlimited
    pub fps_limit: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps_limit: DEFAULT_FPS_LIMIT,
        }
    }
}

/// Diagnostics API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl AppConfig {
    /// Platform config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "dmx-rasterizer")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or from the platform location when `None`.
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Check the configuration, replacing recoverable values.
    ///
    /// An invalid port is reported and replaced by the default. An
    /// unparseable bind address or layout has no fallback and fails.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let port = self.network.port();
        if port as u32 != self.network.port {
            tracing::warn!(
                "{}; using default port {}",
                ConfigError::InvalidPort(self.network.port),
                port
            );
            self.network.port = port as u32;
        }

        self.network.bind_ip()?;
        self.layout.resolve()?;
        if self.osc.enabled {
            self.osc.target_addr()?;
        }

        Ok(())
    }
}
