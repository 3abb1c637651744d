//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory where finished recordings are written.
    pub output_dir: PathBuf,

    /// Default recording settings.
    pub recording: RecordingDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Video quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Low,
    #[default]
    Medium,
    High,
}

impl VideoQuality {
    /// Target video bitrate in kbps.
    pub fn video_bitrate_kbps(&self) -> u32 {
        match self {
            VideoQuality::Low => 2500,
            VideoQuality::Medium => 5000,
            VideoQuality::High => 10000,
        }
    }

    /// Target audio bitrate in kbps.
    pub fn audio_bitrate_kbps(&self) -> u32 {
        match self {
            VideoQuality::Low => 128,
            VideoQuality::Medium => 192,
            VideoQuality::High => 256,
        }
    }
}

/// Whether hardware encoders should be tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HardwareAcceleration {
    #[default]
    NoPreference,
    PreferHardware,
    PreferSoftware,
}

/// Output resolution presets (16:9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputResolution {
    Hd720,
    #[default]
    Hd1080,
    Qhd1440,
    Uhd2160,
}

impl OutputResolution {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            OutputResolution::Hd720 => (1280, 720),
            OutputResolution::Hd1080 => (1920, 1080),
            OutputResolution::Qhd1440 => (2560, 1440),
            OutputResolution::Uhd2160 => (3840, 2160),
        }
    }
}

/// Default recording parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingDefaults {
    /// Composite output width in pixels.
    pub width: u32,

    /// Composite output height in pixels.
    pub height: u32,

    /// Target frame rate.
    pub fps: u32,

    /// A keyframe is forced every this many encoded frames.
    pub keyframe_interval: u64,

    /// Bitrate preset.
    pub quality: VideoQuality,

    /// Hardware encoder preference used by the capability probe.
    pub hardware_acceleration: HardwareAcceleration,

    /// Audio sample rate the mixer resamples every source to.
    pub audio_sample_rate: u32,

    /// Audio channel count of the mixed track.
    pub audio_channels: u16,

    /// Samples per channel in each raw audio frame handed to the encoder.
    pub audio_frame_size: usize,

    /// Microphone gain applied before summing.
    pub mic_gain: f32,

    /// System audio gain applied before summing.
    pub system_gain: f32,

    /// Capture microphone audio by default.
    pub capture_mic: bool,

    /// Capture system loopback audio by default.
    pub capture_system_audio: bool,

    /// Stall watchdog period in milliseconds.
    pub watchdog_period_ms: u64,

    /// A stall is reported when no frame completed for this many frame intervals.
    pub stall_factor: u32,

    /// How often the continuous-stream fallback hands batched output to the muxer.
    pub stream_timeslice_ms: u64,

    /// Upper bound for encoder flush during stop. `None` waits indefinitely.
    pub flush_timeout_ms: Option<u64>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "mosaic_recorder=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            recording: RecordingDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RecordingDefaults {
    fn default() -> Self {
        let (width, height) = OutputResolution::default().dimensions();
        Self {
            width,
            height,
            fps: 30,
            keyframe_interval: 120,
            quality: VideoQuality::default(),
            hardware_acceleration: HardwareAcceleration::default(),
            audio_sample_rate: 48000,
            audio_channels: 2,
            audio_frame_size: 4096,
            mic_gain: 1.0,
            system_gain: 1.0,
            capture_mic: true,
            capture_system_audio: false,
            watchdog_period_ms: 1000,
            stall_factor: 3,
            stream_timeslice_ms: 1000,
            flush_timeout_ms: None,
        }
    }
}

impl RecordingDefaults {
    pub fn watchdog_period(&self) -> Duration {
        Duration::from_millis(self.watchdog_period_ms.max(1))
    }

    pub fn stream_timeslice(&self) -> Duration {
        Duration::from_millis(self.stream_timeslice_ms.max(1))
    }

    pub fn flush_timeout(&self) -> Option<Duration> {
        self.flush_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<PathBuf, std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(&config_path, json)?;
        Ok(config_path)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("mosaic").join("config.json")
}

/// Default recordings directory.
fn default_output_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join("Videos").join("mosaic")
}
