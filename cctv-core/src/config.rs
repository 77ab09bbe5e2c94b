use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
    pub database: DatabaseConfig,
    pub catalog: CatalogConfig,
    pub proxy: ProxyConfig,
    pub capture: CaptureConfig,
    pub mjpeg: MjpegConfig,
    pub detection: DetectionConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Browser origins allowed to call the relay. `"*"` allows any origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost".to_string(),
                "http://localhost:3001".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// PostgreSQL settings. An empty `url` keeps analytics and zones in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            connect_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON document with a `devices` array
    pub path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "cctv.json".to_string(),
        }
    }
}

/// HLS proxy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Callback path (or absolute URL) that rewritten playlists point at
    pub public_path: String,
    /// Accept self-signed and otherwise invalid upstream certificates
    pub accept_invalid_certs: bool,
    pub max_redirects: usize,
    pub connect_timeout_seconds: u64,
    pub user_agent: String,
    /// Upper bound for a buffered playlist body
    pub max_playlist_bytes: usize,
    /// Forward the client's `Range` header upstream
    pub forward_range: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            public_path: "/proxy".to_string(),
            accept_invalid_certs: true,
            max_redirects: 10,
            connect_timeout_seconds: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string(),
            max_playlist_bytes: 16 * 1024 * 1024,
            forward_range: true,
        }
    }
}

/// Video capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Primary source served on `/video_feed`; `None` disables the MJPEG feed
    pub source_url: Option<String>,
    pub ffmpeg_path: String,
    /// How long the first frame may take before the source counts as unavailable
    pub open_timeout_seconds: u64,
    pub reconnect_initial_backoff_ms: u64,
    pub reconnect_max_backoff_ms: u64,
    /// 0 = retry forever
    pub max_reconnect_attempts: u32,
    /// Frame rate requested from the decoder (0 = source rate)
    pub output_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            ffmpeg_path: "ffmpeg".to_string(),
            open_timeout_seconds: 15,
            reconnect_initial_backoff_ms: 500,
            reconnect_max_backoff_ms: 10_000,
            max_reconnect_attempts: 0,
            output_fps: 0,
        }
    }
}

impl CaptureConfig {
    #[must_use]
    pub const fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MjpegConfig {
    pub jpeg_quality: u8,
    /// Idle delay between polls while no new frame is available
    pub idle_ms: u64,
}

impl Default for MjpegConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            idle_ms: 50,
        }
    }
}

/// Which detector implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorBackend {
    /// Synthetic placeholder detections
    #[default]
    Mock,
    /// HTTP inference service
    Remote,
}

/// How session counters evolve between sampled frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterMode {
    /// Counts reflect only the most recent sampled frame
    #[default]
    Latest,
    /// Counts are summed over the whole session
    Cumulative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub backend: DetectorBackend,
    /// Inference endpoint for the remote backend
    pub endpoint: Option<String>,
    pub request_timeout_seconds: u64,
    pub confidence_threshold: f32,
    /// Run the detector on every Nth frame
    pub sample_every: u32,
    pub frame_interval_ms: u64,
    pub counter_mode: CounterMode,
    pub heartbeat_seconds: u64,
    pub channel_capacity: usize,
    pub jpeg_quality: u8,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::Mock,
            endpoint: None,
            request_timeout_seconds: 10,
            confidence_threshold: 0.5,
            sample_every: 3,
            frame_interval_ms: 33,
            counter_mode: CounterMode::Latest,
            heartbeat_seconds: 15,
            channel_capacity: 32,
            jpeg_quality: 85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Seconds between analytics writes from a live session (0 disables)
    pub report_interval_seconds: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            report_interval_seconds: 5,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // CCTV_SERVER__PORT, CCTV_CAPTURE__SOURCE_URL, ...
        builder = builder.add_source(
            Environment::with_prefix("CCTV")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Check the configuration, collecting every problem instead of stopping
    /// at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        if self.proxy.public_path.trim().is_empty() {
            errors.push("proxy.public_path must not be empty".to_string());
        }
        if self.proxy.max_playlist_bytes == 0 {
            errors.push("proxy.max_playlist_bytes must be non-zero".to_string());
        }
        if self.detection.sample_every == 0 {
            errors.push("detection.sample_every must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            errors.push("detection.confidence_threshold must be within 0.0..=1.0".to_string());
        }
        if self.detection.channel_capacity == 0 {
            errors.push("detection.channel_capacity must be non-zero".to_string());
        }
        if self.detection.backend == DetectorBackend::Remote
            && self.detection.endpoint.as_deref().is_none_or(str::is_empty)
        {
            errors.push("detection.endpoint is required for the remote backend".to_string());
        }
        if !(1..=100).contains(&self.mjpeg.jpeg_quality) {
            errors.push("mjpeg.jpeg_quality must be within 1..=100".to_string());
        }
        if !(1..=100).contains(&self.detection.jpeg_quality) {
            errors.push("detection.jpeg_quality must be within 1..=100".to_string());
        }
        if self.capture.reconnect_initial_backoff_ms > self.capture.reconnect_max_backoff_ms {
            errors.push(
                "capture.reconnect_initial_backoff_ms must not exceed reconnect_max_backoff_ms"
                    .to_string(),
            );
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got \"{}\"",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detection.sample_every, 3);
        assert_eq!(config.detection.counter_mode, CounterMode::Latest);
        assert_eq!(config.proxy.public_path, "/proxy");
        assert!(config.capture.source_url.is_none());
    }

    #[test]
    fn test_http_address() {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 9000,
            },
            ..Config::default()
        };

        assert_eq!(config.http_address(), "127.0.0.1:9000");
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = Config::default();
        config.detection.sample_every = 0;
        config.detection.backend = DetectorBackend::Remote;
        config.mjpeg.jpeg_quality = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("sample_every")));
        assert!(errors.iter().any(|e| e.contains("detection.endpoint")));
        assert!(errors.iter().any(|e| e.contains("jpeg_quality")));
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.yaml");
        std::fs::write(
            &path,
            "server:\n  port: 9100\ndetection:\n  backend: remote\n  endpoint: http://detector:8080/detect\n  counter_mode: cumulative\n",
        )
        .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.detection.backend, DetectorBackend::Remote);
        assert_eq!(config.detection.counter_mode, CounterMode::Cumulative);
        // untouched sections keep their defaults
        assert_eq!(config.proxy.max_redirects, 10);
    }
}
