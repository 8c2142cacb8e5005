//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (POSECAST_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use posecast_core::ticker::MAX_RATE_HZ;
use posecast_protocol::{PoseSample, WireFormat, POSE_ARITY};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Invalid configuration values. Always fatal at startup.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Update rate must be in (0, {MAX_RATE_HZ}] Hz, got {0}")]
    InvalidRate(f64),

    #[error("Port must be non-zero")]
    InvalidPort,

    #[error("Cannot resolve bind host: {0}")]
    InvalidHost(String),

    #[error("Tracked object id cannot be empty")]
    EmptyTrackedObject,

    #[error("Limit `{0}` must be non-zero")]
    ZeroLimit(&'static str),

    #[error("WebSocket path must start with '/': {0}")]
    InvalidPath(String),

    #[error("Invalid source settings: {0}")]
    InvalidSource(&'static str),
}

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Broadcast tracker poses at a fixed rate.
    #[default]
    Stream,
    /// Forward client messages to all other clients.
    Relay,
}

impl Mode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Stream => "stream",
            Mode::Relay => "relay",
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Operating mode.
    #[serde(default)]
    pub mode: Mode,

    /// Pose stream configuration.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Pose source configuration.
    #[serde(default)]
    pub source: SourceConfig,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Pose stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Samples broadcast per second.
    #[serde(default = "default_rate_hz")]
    pub update_rate_hz: f64,

    /// Device reported by the stream.
    #[serde(default = "default_tracked_object")]
    pub tracked_object_id: String,

    /// Channel id written in JSON messages. Defaults to the tracked object id.
    #[serde(default)]
    pub channel_id: Option<String>,

    /// Wire format.
    #[serde(default)]
    pub wire_format: WireFormat,
}

/// Kind of pose source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Simulated,
    Static,
}

/// Pose source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Radius of the simulated path in meters.
    #[serde(default = "default_radius")]
    pub radius_m: f64,

    /// Seconds per simulated lap.
    #[serde(default = "default_period")]
    pub period_s: f64,

    /// Pose reported by the static source, in source order.
    #[serde(default)]
    pub pose: [f64; POSE_ARITY],
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum relayed message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Outbound messages queued per session.
    #[serde(default = "default_session_queue")]
    pub session_queue: usize,

    /// How long a send may wait on a full session queue, in milliseconds.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("POSECAST_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("POSECAST_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9003)
}

fn default_rate_hz() -> f64 {
    std::env::var("POSECAST_RATE_HZ")
        .ok()
        .and_then(|r| r.parse().ok())
        .unwrap_or(30.0)
}

fn default_tracked_object() -> String {
    "tracker_1".to_string()
}

fn default_radius() -> f64 {
    1.0
}

fn default_period() -> f64 {
    8.0
}

fn default_ws_path() -> String {
    "/".to_string()
}

fn default_max_connections() -> usize {
    1024
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_session_queue() -> usize {
    64
}

fn default_send_timeout() -> u64 {
    250
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mode: Mode::default(),
            stream: StreamConfig::default(),
            source: SourceConfig::default(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            update_rate_hz: default_rate_hz(),
            tracked_object_id: default_tracked_object(),
            channel_id: None,
            wire_format: WireFormat::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            radius_m: default_radius(),
            period_s: default_period(),
            pose: [0.0; POSE_ARITY],
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
            session_queue: default_session_queue(),
            send_timeout_ms: default_send_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// `POSECAST_CONFIG` names an explicit file; otherwise the first
    /// existing default path is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("POSECAST_CONFIG") {
            return Self::from_file(shellexpand::tilde(&path).as_ref());
        }

        let config_paths = [
            "posecast.toml",
            "/etc/posecast/posecast.toml",
            "~/.config/posecast/posecast.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Check every value that would otherwise fail after startup.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rate = self.stream.update_rate_hz;
        if !rate.is_finite() || rate <= 0.0 || rate > MAX_RATE_HZ {
            return Err(ConfigError::InvalidRate(rate));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        self.bind_addr()?;
        if self.stream.tracked_object_id.trim().is_empty() {
            return Err(ConfigError::EmptyTrackedObject);
        }
        if !self.transport.websocket_path.starts_with('/') {
            return Err(ConfigError::InvalidPath(self.transport.websocket_path.clone()));
        }
        if self.limits.max_connections == 0 {
            return Err(ConfigError::ZeroLimit("max_connections"));
        }
        if self.limits.session_queue == 0 {
            return Err(ConfigError::ZeroLimit("session_queue"));
        }
        if self.limits.send_timeout_ms == 0 {
            return Err(ConfigError::ZeroLimit("send_timeout_ms"));
        }
        if self.source.kind == SourceKind::Simulated {
            self.simulated_period()?;
            let radius = self.source.radius_m;
            if !radius.is_finite() || radius < 0.0 {
                return Err(ConfigError::InvalidSource("radius_m must be finite and non-negative"));
            }
        }
        if !self.source.pose.iter().all(|v| v.is_finite()) {
            return Err(ConfigError::InvalidSource("pose values must be finite"));
        }
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not resolve.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConfigError::InvalidHost(self.host.clone()))
    }

    /// Channel id used in JSON messages.
    #[must_use]
    pub fn channel_id(&self) -> &str {
        self.stream
            .channel_id
            .as_deref()
            .unwrap_or(&self.stream.tracked_object_id)
    }

    /// Lap time of the simulated source.
    ///
    /// # Errors
    ///
    /// Returns an error unless `period_s` is a positive, representable
    /// number of seconds.
    pub fn simulated_period(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.source.period_s)
            .ok()
            .filter(|period| !period.is_zero())
            .ok_or(ConfigError::InvalidSource("period_s must be a positive duration"))
    }

    /// Pose reported by the static source.
    #[must_use]
    pub fn static_pose(&self) -> PoseSample {
        PoseSample::from_array(self.source.pose)
    }

    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.limits.send_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            host: "127.0.0.1".into(),
            port: 9003,
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = config();
        assert_eq!(config.mode, Mode::Stream);
        assert_eq!(config.stream.tracked_object_id, "tracker_1");
        assert_eq!(config.stream.wire_format, WireFormat::Text);
        assert_eq!(config.channel_id(), "tracker_1");
        assert_eq!(config.transport.websocket_path, "/");
        assert!(!config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_bind_addr() {
        let addr = config().bind_addr().unwrap();
        assert_eq!(addr.port(), 9003);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9100
            mode = "stream"

            [stream]
            update_rate_hz = 60.0
            tracked_object_id = "tracker_2"
            channel_id = "178376c5ebe-0ed6977d"
            wire_format = "json"

            [source]
            kind = "static"
            pose = [1.0, 2.0, 3.0, 0.0, 90.0, 0.0]

            [limits]
            max_connections = 8
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9100);
        assert_eq!(config.stream.update_rate_hz, 60.0);
        assert_eq!(config.stream.wire_format, WireFormat::Json);
        assert_eq!(config.channel_id(), "178376c5ebe-0ed6977d");
        assert_eq!(config.source.kind, SourceKind::Static);
        assert_eq!(config.static_pose().rotation().y, 90.0);
        assert_eq!(config.limits.max_connections, 8);
        assert_eq!(config.limits.session_queue, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relay_mode_from_toml() {
        let config: Config = toml::from_str("mode = \"relay\"").unwrap();
        assert_eq!(config.mode, Mode::Relay);
    }

    #[test]
    fn test_unknown_wire_format_rejected() {
        let result: Result<Config, _> = toml::from_str("[stream]\nwire_format = \"xml\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values() {
        let mut bad_rate = config();
        bad_rate.stream.update_rate_hz = 0.0;
        assert_eq!(bad_rate.validate(), Err(ConfigError::InvalidRate(0.0)));

        let mut bad_port = config();
        bad_port.port = 0;
        assert_eq!(bad_port.validate(), Err(ConfigError::InvalidPort));

        let mut bad_host = config();
        bad_host.host = "not a host name".into();
        assert!(matches!(bad_host.validate(), Err(ConfigError::InvalidHost(_))));

        let mut bad_object = config();
        bad_object.stream.tracked_object_id = " ".into();
        assert_eq!(bad_object.validate(), Err(ConfigError::EmptyTrackedObject));

        let mut bad_path = config();
        bad_path.transport.websocket_path = "ws".into();
        assert!(matches!(bad_path.validate(), Err(ConfigError::InvalidPath(_))));

        let mut bad_queue = config();
        bad_queue.limits.session_queue = 0;
        assert_eq!(bad_queue.validate(), Err(ConfigError::ZeroLimit("session_queue")));

        let mut bad_period = config();
        bad_period.source.period_s = 0.0;
        assert!(matches!(bad_period.validate(), Err(ConfigError::InvalidSource(_))));

        let mut huge_period = config();
        huge_period.source.period_s = 1e30;
        assert!(matches!(huge_period.validate(), Err(ConfigError::InvalidSource(_))));
        assert!(huge_period.simulated_period().is_err());

        for radius in [f64::NAN, f64::INFINITY, -1.0] {
            let mut bad_radius = config();
            bad_radius.source.radius_m = radius;
            assert!(matches!(bad_radius.validate(), Err(ConfigError::InvalidSource(_))));
        }

        let mut zero_radius = config();
        zero_radius.source.radius_m = 0.0;
        assert!(zero_radius.validate().is_ok());

        let mut bad_pose = config();
        bad_pose.source.pose[4] = f64::NAN;
        assert!(matches!(bad_pose.validate(), Err(ConfigError::InvalidSource(_))));
    }
}
