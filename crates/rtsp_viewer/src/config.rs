use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Decoder backend selection for the H264 decode stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderBackend {
    /// Software decoding using avdec_h264 (CPU, always available)
    #[default]
    Software,
    /// Hardware decoding using nvh264dec (NVIDIA desktop GPU)
    Nvidia,
}

impl DecoderBackend {
    /// GStreamer factory name of the decoder element
    pub fn element_name(&self) -> &'static str {
        match self {
            DecoderBackend::Software => "avdec_h264",
            DecoderBackend::Nvidia => "nvh264dec",
        }
    }
}

impl FromStr for DecoderBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "software" | "sw" | "cpu" => Ok(DecoderBackend::Software),
            "nvidia" | "nv" | "gpu" => Ok(DecoderBackend::Nvidia),
            other => Err(format!(
                "unknown decoder backend '{other}' (expected 'software' or 'nvidia')"
            )),
        }
    }
}

/// Where decoded frames are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayBackend {
    /// OpenCV HighGUI window (requires the `highgui` feature)
    Highgui,
    /// No window, only periodic frame statistics in the log
    Headless,
}

impl Default for DisplayBackend {
    fn default() -> Self {
        if cfg!(feature = "highgui") {
            DisplayBackend::Highgui
        } else {
            DisplayBackend::Headless
        }
    }
}

/// RTSP source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Jitterbuffer latency in milliseconds (0 favours latency over smoothness)
    #[serde(default)]
    pub latency: u32,
    /// Let rtspsrc reconnect when UDP packets stop arriving
    #[serde(default = "default_true")]
    pub udp_reconnect: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            latency: 0,
            udp_reconnect: true,
        }
    }
}

/// Poll loop timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Maximum time a single frame pull may block
    #[serde(default = "default_pull_timeout_ms")]
    pub pull_timeout_ms: u64,
    /// Sleep after a pull that returned no frame
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
    /// Stop the viewer when no frame arrived for this long (disabled if unset)
    #[serde(default)]
    pub stall_timeout_ms: Option<u64>,
    /// Interval between frame statistics log lines
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            pull_timeout_ms: default_pull_timeout_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
            stall_timeout_ms: None,
            stats_interval_ms: default_stats_interval_ms(),
        }
    }
}

impl PollConfig {
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_ms.map(Duration::from_millis)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

/// Display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub backend: DisplayBackend,
    /// Title of the viewer window
    #[serde(default = "default_window_title")]
    pub window_title: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            backend: DisplayBackend::default(),
            window_title: default_window_title(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_pull_timeout_ms() -> u64 {
    100
}

fn default_idle_backoff_ms() -> u64 {
    10
}

fn default_stats_interval_ms() -> u64 {
    5000
}

fn default_window_title() -> String {
    "RTSP Stream".to_string()
}

/// Root configuration structure
///
/// Every field has a default, so an empty file (or no file at all) yields a
/// working viewer. The stream URL is not part of the file; it is always given
/// on the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub decoder: DecoderBackend,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl ViewerConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.pull_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll.pull_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.poll.stats_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll.stats_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.display.window_title.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "display.window_title must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
}
