use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub keyboard: KeyboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the motion-JPEG bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A capture program writing MJPEG to its stdout.
    Process,
    /// An MJPEG-over-HTTP endpoint.
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default = "default_source")]
    pub source: SourceKind,
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_program_args")]
    pub args: Vec<String>,
    #[serde(default = "default_stream_url")]
    pub url: String,
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_secs: u64,
    #[serde(default = "default_verify_decode")]
    pub verify_decode: bool,
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyboardConfig {
    /// Candidate programs, tried in order. Entries may be absolute paths or
    /// bare names resolved through `PATH`.
    #[serde(default = "default_keyboard_programs")]
    pub programs: Vec<String>,
    /// Optional command run on hide, for keyboards that outlive their
    /// launcher process (e.g. `["taskkill", "/IM", "TabTip.exe", "/F"]`).
    #[serde(default)]
    pub hide_command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl CameraConfig {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs.max(1))
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            program: default_program(),
            args: default_program_args(),
            url: default_stream_url(),
            max_buffer_bytes: default_max_buffer_bytes(),
            stall_timeout_secs: default_stall_timeout(),
            verify_decode: default_verify_decode(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            programs: default_keyboard_programs(),
            hide_command: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_source() -> SourceKind {
    SourceKind::Process
}
fn default_program() -> String {
    "libcamera-vid".into()
}
fn default_program_args() -> Vec<String> {
    ["-t", "0", "-n", "--codec", "mjpeg", "--width", "1280", "--height", "720", "-o", "-"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_stream_url() -> String {
    "http://127.0.0.1:8080/stream".into()
}
fn default_max_buffer_bytes() -> usize {
    4 * 1024 * 1024
}
fn default_stall_timeout() -> u64 {
    5
}
fn default_verify_decode() -> bool {
    true
}
fn default_snapshot_path() -> PathBuf {
    PathBuf::from("captured_sample.jpg")
}
fn default_base_url() -> String {
    "http://127.0.0.1:5000".into()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_keyboard_programs() -> Vec<String> {
    [
        r"C:\Program Files\Common Files\Microsoft Shared\Ink\TabTip.exe",
        r"C:\Windows\System32\osk.exe",
        "onboard",
        "wvkbd-mobintl",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_log_level() -> String {
    "info".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.camera.source, SourceKind::Process);
        assert_eq!(config.camera.max_buffer_bytes, 4 * 1024 * 1024);
        assert_eq!(config.camera.stall_timeout(), Duration::from_secs(5));
        assert!(config.camera.verify_decode);
        assert_eq!(config.server.base_url, "http://127.0.0.1:5000");
        assert_eq!(config.logging.level, "info");
        assert!(config.keyboard.hide_command.is_empty());
    }

    #[test]
    fn http_source_with_overrides() {
        let config = Config::parse(
            r#"
            [camera]
            source = "http"
            url = "http://pi.local:8000/stream.mjpg"
            max_buffer_bytes = 1572864
            stall_timeout_secs = 0

            [server]
            base_url = "http://analysis:5000"
            timeout_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.camera.source, SourceKind::Http);
        assert_eq!(config.camera.max_buffer_bytes, 1_572_864);
        // zero would make every read stall immediately
        assert_eq!(config.camera.stall_timeout(), Duration::from_secs(1));
        assert_eq!(config.server.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn unknown_source_is_rejected() {
        let err = Config::parse("[camera]\nsource = \"usb\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::load(Path::new("/nonexistent/preesense.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/preesense.toml"));
    }
}
