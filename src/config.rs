use chrono::{DateTime, NaiveDate, Utc};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct LapseConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub ftp: FtpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default)]
    pub auto_timelapse: AutoTimelapseConfig,
    #[serde(default)]
    pub motion_detection: MotionConfig,
    #[serde(default)]
    pub scheduling: ScheduleConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Default capture interval in seconds
    #[serde(default = "default_capture_interval")]
    pub default_interval: u64,

    /// Encoding of stored captures
    #[serde(default)]
    pub image_format: ImageFormat,

    /// JPEG quality (1-100) used when re-encoding watermarked frames
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Requested capture resolution (width, height)
    #[serde(default = "default_resolution")]
    pub resolution: (u32, u32),

    /// Start capturing automatically when the schedule window opens
    #[serde(default)]
    pub auto_start: bool,

    /// Input format passed to the frame grabber (v4l2, x11grab, avfoundation, ...)
    #[serde(default = "default_input_format")]
    pub input_format: String,

    /// Device or display the frame grabber reads from
    #[serde(default = "default_device")]
    pub device: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FtpConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub protocol: UploadProtocol,

    #[serde(default)]
    pub server: String,

    /// Remote port; defaults to 21 for FTP and 22 for SFTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Remote directory uploads are placed in
    #[serde(default = "default_remote_directory")]
    pub directory: String,

    #[serde(default)]
    pub auto_upload_images: bool,

    #[serde(default)]
    pub auto_upload_videos: bool,

    /// Transfer client program
    #[serde(default = "default_upload_program")]
    pub client_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    /// Root directory holding images/ and videos/; empty means not configured
    #[serde(default = "default_storage_location")]
    pub location: String,

    /// Periodically delete images older than cleanup_days
    #[serde(default)]
    pub auto_cleanup: bool,

    #[serde(default = "default_cleanup_days")]
    pub cleanup_days: u32,

    /// Quota over images/ and videos/ in gigabytes
    #[serde(default = "default_max_storage_gb")]
    pub max_storage_gb: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VideoConfig {
    #[serde(default = "default_fps")]
    pub default_fps: u32,

    #[serde(default = "default_quality")]
    pub default_quality: Quality,

    /// Pass -hwaccel auto to the encoder
    #[serde(default = "default_true")]
    pub hardware_acceleration: bool,

    #[serde(default = "default_true")]
    pub preserve_aspect_ratio: bool,

    #[serde(default = "default_resolution")]
    pub default_resolution: (u32, u32),

    /// Apply the deflicker filter before scaling
    #[serde(default = "default_true")]
    pub deflicker: bool,

    /// Encoder program
    #[serde(default = "default_encoder_path")]
    pub encoder_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatermarkConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub kind: WatermarkKind,

    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub position: WatermarkPosition,

    #[serde(default)]
    pub image_path: String,

    #[serde(default)]
    pub image_size: WatermarkSize,

    /// Opacity of image watermarks in percent
    #[serde(default = "default_watermark_opacity")]
    pub image_opacity: u8,

    /// TrueType font used for text watermarks
    #[serde(default = "default_font_path")]
    pub font_path: String,

    #[serde(default = "default_font_size")]
    pub font_size: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AutoTimelapseConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Hours between automatic runs
    #[serde(default = "default_auto_interval_hours")]
    pub interval_hours: u32,

    #[serde(default)]
    pub mode: AutoTimelapseMode,

    #[serde(default = "default_true")]
    pub upload: bool,

    #[serde(default = "default_fps")]
    pub fps: u32,

    #[serde(default = "default_quality")]
    pub quality: Quality,

    /// Completion time of the last successful run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MotionConfig {
    #[serde(default)]
    pub enabled: bool,

    /// 0 (least sensitive) to 100 (most sensitive)
    #[serde(default = "default_sensitivity")]
    pub sensitivity: u8,

    /// Minimum time between two motion detections
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Per-pixel differences below this value are ignored
    #[serde(default = "default_noise_filter")]
    pub noise_filter: u8,

    /// Regions of interest in analysis coordinates; empty means whole frame
    #[serde(default)]
    pub zones: Vec<MotionZone>,

    /// Discard captures that show no motion
    #[serde(default)]
    pub only_capture: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct MotionZone {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl MotionZone {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x
            && y >= self.y
            && x < self.x.saturating_add(self.width)
            && y < self.y.saturating_add(self.height)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_start_time")]
    pub start_time: ClockTime,

    #[serde(default = "default_end_time")]
    pub end_time: ClockTime,

    /// Active weekdays, 0 = Sunday
    #[serde(default = "default_days")]
    pub days: Vec<u8>,

    /// "local" or an IANA zone name
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default)]
    pub cron_patterns: Vec<String>,

    #[serde(default)]
    pub seasonal_rules: Vec<SeasonalRule>,

    #[serde(default)]
    pub exceptions: Vec<ScheduleException>,

    #[serde(default)]
    pub advanced_mode: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SeasonalRule {
    /// Months the rule applies to, 1 = January
    pub months: Vec<u32>,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScheduleException {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,

    /// Inclusive (start, end) range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<(NaiveDate, NaiveDate)>,

    #[serde(default)]
    pub action: ExceptionAction,
}

impl ScheduleException {
    pub fn applies_to(&self, day: NaiveDate) -> bool {
        if self.date == Some(day) {
            return true;
        }
        matches!(self.date_range, Some((start, end)) if day >= start && day <= end)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Period of the schedule checker
    #[serde(default = "default_schedule_check_seconds")]
    pub schedule_check_seconds: u64,

    /// Period of the auto-timelapse poll
    #[serde(default = "default_auto_timelapse_poll_seconds")]
    pub auto_timelapse_poll_seconds: u64,

    /// Period of the old-image cleanup
    #[serde(default = "default_cleanup_period_seconds")]
    pub cleanup_period_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    #[default]
    Medium,
    High,
    Ultra,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
            Quality::Ultra => "ultra",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Quality::Low),
            "medium" => Ok(Quality::Medium),
            "high" => Ok(Quality::High),
            "ultra" => Ok(Quality::Ultra),
            other => Err(format!("unknown quality '{}'", other)),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UploadProtocol {
    #[default]
    Ftp,
    Sftp,
}

impl UploadProtocol {
    pub fn default_port(&self) -> u16 {
        match self {
            UploadProtocol::Ftp => 21,
            UploadProtocol::Sftp => 22,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            UploadProtocol::Ftp => "ftp",
            UploadProtocol::Sftp => "sftp",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkKind {
    #[default]
    Text,
    Image,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkSize {
    Small,
    #[default]
    Medium,
    Large,
}

impl WatermarkSize {
    /// Target width of an image watermark in pixels
    pub fn width(&self) -> u32 {
        match self {
            WatermarkSize::Small => 100,
            WatermarkSize::Medium => 200,
            WatermarkSize::Large => 300,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AutoTimelapseMode {
    #[default]
    Replace,
    Append,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionAction {
    #[default]
    Skip,
    Normal,
}

/// Wall-clock time of day with minute resolution, written as "HH:MM"
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn minutes_of_day(&self) -> u32 {
        self.hour as u32 * 60 + self.minute as u32
    }
}

impl TryFrom<String> for ClockTime {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for ClockTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got '{}'", s))?;
        let hour: u8 = h.parse().map_err(|_| format!("invalid hour in '{}'", s))?;
        let minute: u8 = m.parse().map_err(|_| format!("invalid minute in '{}'", s))?;
        ClockTime::new(hour, minute).ok_or_else(|| format!("time out of range: '{}'", s))
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl LapseConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("lapsecam.toml")
    }

    /// Load configuration from a specific file path. Missing files and keys fall back to defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .add_source(File::with_name(&path_str).required(false))
            // LAPSECAM__SECTION__KEY
            .add_source(
                Environment::with_prefix("LAPSECAM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: LapseConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.default_interval == 0 {
            return Err(ConfigError::Message(
                "Capture interval must be greater than 0".to_string(),
            ));
        }

        if !(1..=100).contains(&self.camera.jpeg_quality) {
            return Err(ConfigError::Message(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }

        if self.video.default_fps == 0 || self.auto_timelapse.fps == 0 {
            return Err(ConfigError::Message(
                "Video fps must be greater than 0".to_string(),
            ));
        }

        if self.video.default_resolution.0 == 0 || self.video.default_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Video resolution must be greater than 0".to_string(),
            ));
        }

        if self.auto_timelapse.interval_hours == 0 {
            return Err(ConfigError::Message(
                "Auto-timelapse interval must be greater than 0".to_string(),
            ));
        }

        if self.motion_detection.sensitivity > 100 {
            return Err(ConfigError::Message(
                "Motion sensitivity must be between 0 and 100".to_string(),
            ));
        }

        if let Some(zone) = self
            .motion_detection
            .zones
            .iter()
            .find(|z| z.width == 0 || z.height == 0)
        {
            return Err(ConfigError::Message(format!(
                "Motion zone '{}' must have a positive size",
                zone.id
            )));
        }

        if self.watermark.image_opacity > 100 {
            return Err(ConfigError::Message(
                "Watermark opacity must be between 0 and 100".to_string(),
            ));
        }

        if self.watermark.font_size <= 0.0 {
            return Err(ConfigError::Message(
                "Watermark font size must be greater than 0".to_string(),
            ));
        }

        if self.storage.max_storage_gb <= 0.0 {
            return Err(ConfigError::Message(
                "Maximum storage must be greater than 0".to_string(),
            ));
        }

        if self.scheduling.days.iter().any(|d| *d > 6) {
            return Err(ConfigError::Message(
                "Schedule days must be between 0 (Sunday) and 6 (Saturday)".to_string(),
            ));
        }

        if self
            .scheduling
            .seasonal_rules
            .iter()
            .flat_map(|r| r.months.iter())
            .any(|m| !(1..=12).contains(m))
        {
            return Err(ConfigError::Message(
                "Seasonal rule months must be between 1 and 12".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.schedule_check_seconds == 0
            || self.system.auto_timelapse_poll_seconds == 0
            || self.system.cleanup_period_seconds == 0
        {
            return Err(ConfigError::Message(
                "Background task periods must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl FtpConfig {
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }
}

impl StorageConfig {
    pub fn is_configured(&self) -> bool {
        !self.location.trim().is_empty()
    }

    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.location)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root().join("images")
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.root().join("videos")
    }

    /// Quota in bytes
    pub fn max_storage_bytes(&self) -> u64 {
        (self.max_storage_gb * 1024.0 * 1024.0 * 1024.0) as u64
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            default_interval: default_capture_interval(),
            image_format: ImageFormat::default(),
            jpeg_quality: default_jpeg_quality(),
            resolution: default_resolution(),
            auto_start: false,
            input_format: default_input_format(),
            device: default_device(),
        }
    }
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            protocol: UploadProtocol::default(),
            server: String::new(),
            port: None,
            username: String::new(),
            password: String::new(),
            directory: default_remote_directory(),
            auto_upload_images: false,
            auto_upload_videos: false,
            client_path: default_upload_program(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            location: default_storage_location(),
            auto_cleanup: false,
            cleanup_days: default_cleanup_days(),
            max_storage_gb: default_max_storage_gb(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            default_fps: default_fps(),
            default_quality: default_quality(),
            hardware_acceleration: true,
            preserve_aspect_ratio: true,
            default_resolution: default_resolution(),
            deflicker: true,
            encoder_path: default_encoder_path(),
        }
    }
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: WatermarkKind::default(),
            text: String::new(),
            position: WatermarkPosition::default(),
            image_path: String::new(),
            image_size: WatermarkSize::default(),
            image_opacity: default_watermark_opacity(),
            font_path: default_font_path(),
            font_size: default_font_size(),
        }
    }
}

impl Default for AutoTimelapseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_auto_interval_hours(),
            mode: AutoTimelapseMode::default(),
            upload: true,
            fps: default_fps(),
            quality: default_quality(),
            last_run: None,
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sensitivity: default_sensitivity(),
            cooldown_ms: default_cooldown_ms(),
            noise_filter: default_noise_filter(),
            zones: Vec::new(),
            only_capture: false,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_time: default_start_time(),
            end_time: default_end_time(),
            days: default_days(),
            timezone: default_timezone(),
            cron_patterns: Vec::new(),
            seasonal_rules: Vec::new(),
            exceptions: Vec::new(),
            advanced_mode: false,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
            schedule_check_seconds: default_schedule_check_seconds(),
            auto_timelapse_poll_seconds: default_auto_timelapse_poll_seconds(),
            cleanup_period_seconds: default_cleanup_period_seconds(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_capture_interval() -> u64 {
    30
}
fn default_jpeg_quality() -> u8 {
    85
}
fn default_resolution() -> (u32, u32) {
    (1920, 1080)
}
fn default_input_format() -> String {
    "v4l2".to_string()
}
fn default_device() -> String {
    "/dev/video0".to_string()
}

fn default_remote_directory() -> String {
    "/timelapse/".to_string()
}
fn default_upload_program() -> String {
    "curl".to_string()
}

fn default_storage_location() -> String {
    std::env::var_os("HOME")
        .map(|home| {
            PathBuf::from(home)
                .join("TimelapseWebcam")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_default()
}
fn default_cleanup_days() -> u32 {
    30
}
fn default_max_storage_gb() -> f64 {
    10.0
}

fn default_fps() -> u32 {
    30
}
fn default_quality() -> Quality {
    Quality::High
}
fn default_encoder_path() -> String {
    "ffmpeg".to_string()
}

fn default_watermark_opacity() -> u8 {
    80
}
fn default_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf".to_string()
}
fn default_font_size() -> f32 {
    20.0
}

fn default_auto_interval_hours() -> u32 {
    24
}

fn default_sensitivity() -> u8 {
    50
}
fn default_cooldown_ms() -> u64 {
    5000
}
fn default_noise_filter() -> u8 {
    15
}

fn default_start_time() -> ClockTime {
    ClockTime { hour: 8, minute: 0 }
}
fn default_end_time() -> ClockTime {
    ClockTime {
        hour: 18,
        minute: 0,
    }
}
fn default_days() -> Vec<u8> {
    vec![1, 2, 3, 4, 5]
}
fn default_timezone() -> String {
    "local".to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_schedule_check_seconds() -> u64 {
    60
}
fn default_auto_timelapse_poll_seconds() -> u64 {
    3600
}
fn default_cleanup_period_seconds() -> u64 {
    86400
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = LapseConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camera.default_interval, 30);
        assert_eq!(config.scheduling.start_time.to_string(), "08:00");
        assert_eq!(config.scheduling.days, vec![1, 2, 3, 4, 5]);
        assert_eq!(config.ftp.effective_port(), 21);
        assert_eq!(config.watermark.image_size.width(), 200);
    }

    #[test]
    fn test_partial_file_is_filled_with_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[camera]
default_interval = 10

[ftp]
protocol = "sftp"

[scheduling]
enabled = true
start_time = "22:30"
end_time = "06:15"

[[scheduling.exceptions]]
date = "2024-12-25"
action = "skip"
"#
        )
        .unwrap();

        let config = LapseConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.camera.default_interval, 10);
        assert_eq!(config.camera.jpeg_quality, 85);
        assert_eq!(config.ftp.effective_port(), 22);
        assert_eq!(config.scheduling.start_time.minutes_of_day(), 22 * 60 + 30);
        assert_eq!(config.scheduling.exceptions.len(), 1);
        assert_eq!(config.video.default_quality, Quality::High);
        assert_eq!(config.system.schedule_check_seconds, 60);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LapseConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.motion_detection.sensitivity, 50);
    }

    #[test]
    fn test_clock_time_parsing() {
        assert_eq!("7:05".parse::<ClockTime>().unwrap().to_string(), "07:05");
        assert!("24:00".parse::<ClockTime>().is_err());
        assert!("12:60".parse::<ClockTime>().is_err());
        assert!("noon".parse::<ClockTime>().is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = LapseConfig::default();
        config.motion_detection.sensitivity = 101;
        assert!(config.validate().is_err());

        config.motion_detection.sensitivity = 100;
        config.scheduling.days = vec![0, 7];
        assert!(config.validate().is_err());

        config.scheduling.days = vec![0, 6];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialized_config_round_trips_through_toml() {
        let mut config = LapseConfig::default();
        config.motion_detection.zones.push(MotionZone {
            x: 0,
            y: 0,
            width: 10,
            height: 10,
            id: "zone-1".to_string(),
            name: "Door".to_string(),
        });
        let text = config.to_toml().unwrap();
        let parsed: LapseConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
