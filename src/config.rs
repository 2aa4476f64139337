//! Configuration management for CrabKYC
//!
//! Provides configuration loading, saving, and validation for precheck
//! thresholds, document detection, device binding and transport settings,
//! plus the runtime threshold store read by the frame-scoring path.

use crate::errors::ConfigError;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrabKycConfig {
    pub precheck: PrecheckThresholds,
    pub window: WindowConfig,
    pub document: DocumentConfig,
    pub device: DeviceConfig,
    pub transport: TransportConfig,
}

/// Gate thresholds for the precheck window. Tunable at runtime through
/// [`ThresholdStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecheckThresholds {
    /// Minimum average Laplacian variance
    pub blur_min: f64,
    /// Lower bound of the average brightness band
    pub exposure_min: f64,
    /// Upper bound of the average brightness band
    pub exposure_max: f64,
    /// Ceiling for the largest per-frame optical-flow magnitude
    pub motion_max: f64,
    /// Average block variance must stay below this
    pub compression_max: f64,
    /// Fraction of frames that must contain exactly one face
    pub face_presence_min_ratio: f64,
    /// Floor for mean face confidence / eye-aspect-ratio
    pub face_stability_min: f64,
    /// Samples required before any gate can pass
    pub min_samples: usize,
}

/// Sliding window and metric-kernel sizing (fixed for the life of an aggregator)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Maximum frames retained in the precheck window
    pub capacity: usize,
    /// Block edge in pixels for the compression-artifact proxy
    pub block_size: u32,
}

/// ID document shape heuristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub aspect_min: f64,
    pub aspect_max: f64,
    /// Mean luma of the bottom third must be below this to count as an MRZ band
    pub mrz_luma_max: f64,
    pub canny_low: f64,
    pub canny_high: f64,
    /// Polygon simplification tolerance as a fraction of contour perimeter
    pub approx_epsilon_ratio: f64,
}

/// Device binding and anti-fraud settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Requests allowed per identifier inside the rate window
    pub max_requests_per_window: usize,
    pub rate_window_secs: u64,
    pub max_time_skew_secs: i64,
    pub attestation_timeout_ms: u64,
}

/// Upload endpoint, signing secret and media sanity bands
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub endpoint: String,
    /// Shared secret for the keyed digest
    pub hmac_secret: String,
    pub request_timeout_ms: u64,
    /// Refuse plain-HTTP endpoints
    pub require_https: bool,
    /// Chunk size for chunked uploads
    pub chunk_size: usize,
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
    pub min_fps: f64,
    pub max_fps: f64,
}

impl Default for PrecheckThresholds {
    fn default() -> Self {
        Self {
            blur_min: 100.0,
            exposure_min: 40.0,
            exposure_max: 220.0,
            motion_max: 2.0,
            compression_max: 100.0,
            face_presence_min_ratio: 0.9,
            face_stability_min: 0.5,
            min_samples: 10,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            capacity: 120,
            block_size: 8,
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            aspect_min: 1.35,
            aspect_max: 1.6,
            mrz_luma_max: 100.0,
            canny_low: 50.0,
            canny_high: 150.0,
            approx_epsilon_ratio: 0.02,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 10,
            rate_window_secs: 60,
            max_time_skew_secs: 120,
            attestation_timeout_ms: 10_000,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://localhost/ingest".to_string(),
            hmac_secret: "shared_secret".to_string(),
            request_timeout_ms: 60_000,
            require_https: true,
            chunk_size: 1024 * 1024,
            min_duration_secs: 5.0,
            max_duration_secs: 30.0,
            min_fps: 15.0,
            max_fps: 60.0,
        }
    }
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("endpoint", &self.endpoint)
            .field("hmac_secret", &"<redacted>")
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("require_https", &self.require_https)
            .field("chunk_size", &self.chunk_size)
            .field("min_duration_secs", &self.min_duration_secs)
            .field("max_duration_secs", &self.max_duration_secs)
            .field("min_fps", &self.min_fps)
            .field("max_fps", &self.max_fps)
            .finish()
    }
}

impl PrecheckThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.blur_min >= 0.0) {
            return Err(invalid("blur_min must be >= 0"));
        }
        if !(self.exposure_min <= self.exposure_max) {
            return Err(invalid("exposure_min must not exceed exposure_max"));
        }
        if !(0.0..=255.0).contains(&self.exposure_min) || !(0.0..=255.0).contains(&self.exposure_max)
        {
            return Err(invalid("exposure band must lie within 0-255"));
        }
        if !(self.motion_max >= 0.0) {
            return Err(invalid("motion_max must be >= 0"));
        }
        if !(self.compression_max > 0.0) {
            return Err(invalid("compression_max must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.face_presence_min_ratio) {
            return Err(invalid("face_presence_min_ratio must be between 0.0 and 1.0"));
        }
        if !(self.face_stability_min >= 0.0) {
            return Err(invalid("face_stability_min must be >= 0"));
        }
        if self.min_samples == 0 {
            return Err(invalid("min_samples must be at least 1"));
        }
        Ok(())
    }
}

impl DeviceConfig {
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    pub fn attestation_timeout(&self) -> Duration {
        Duration::from_millis(self.attestation_timeout_ms)
    }
}

impl TransportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

impl CrabKycConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: CrabKycConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load from an optional TOML file, then apply `CRABKYC__SECTION__FIELD`
    /// environment overrides (e.g. `CRABKYC__TRANSPORT__HMAC_SECRET`).
    pub fn load_layered<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()).required(false))
            .add_source(
                ::config::Environment::with_prefix("CRABKYC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let config: CrabKycConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        fs::write(path, toml_string)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabkyc.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.precheck.validate()?;

        if self.window.capacity == 0 {
            return Err(invalid("window capacity must be at least 1"));
        }
        if self.precheck.min_samples > self.window.capacity {
            return Err(invalid("min_samples cannot exceed window capacity"));
        }
        if self.window.block_size == 0 {
            return Err(invalid("block_size must be at least 1"));
        }

        let doc = &self.document;
        if !(doc.aspect_min >= 1.0 && doc.aspect_min <= doc.aspect_max) {
            return Err(invalid("document aspect band must satisfy 1.0 <= min <= max"));
        }
        if !(doc.canny_low > 0.0 && doc.canny_low <= doc.canny_high) {
            return Err(invalid("canny thresholds must satisfy 0 < low <= high"));
        }
        if !(doc.approx_epsilon_ratio > 0.0 && doc.approx_epsilon_ratio < 1.0) {
            return Err(invalid("approx_epsilon_ratio must be in (0, 1)"));
        }

        if self.device.max_requests_per_window == 0 {
            return Err(invalid("max_requests_per_window must be at least 1"));
        }
        if self.device.rate_window_secs == 0 {
            return Err(invalid("rate_window_secs must be at least 1"));
        }
        if self.device.max_time_skew_secs <= 0 {
            return Err(invalid("max_time_skew_secs must be positive"));
        }

        let t = &self.transport;
        if t.hmac_secret.is_empty() {
            return Err(invalid("hmac_secret must not be empty"));
        }
        if t.chunk_size == 0 {
            return Err(invalid("chunk_size must be at least 1"));
        }
        if !(t.min_duration_secs > 0.0 && t.min_duration_secs <= t.max_duration_secs) {
            return Err(invalid("media duration band must satisfy 0 < min <= max"));
        }
        if !(t.min_fps > 0.0 && t.min_fps <= t.max_fps) {
            return Err(invalid("media frame-rate band must satisfy 0 < min <= max"));
        }

        Ok(())
    }
}

/// Atomically swappable snapshot of the precheck thresholds.
///
/// Readers on the scoring path take a whole-struct snapshot per frame;
/// writers publish a complete replacement, so a half-updated set is never
/// observable. Updates apply to the next scored frame or gate evaluation.
/// `min_samples` is bounded by the capacity of the window it gates.
#[derive(Debug)]
pub struct ThresholdStore {
    current: ArcSwap<PrecheckThresholds>,
    window_capacity: usize,
}

impl ThresholdStore {
    pub fn new(thresholds: PrecheckThresholds) -> Self {
        Self::with_window_capacity(thresholds, WindowConfig::default().capacity)
    }

    pub fn with_window_capacity(thresholds: PrecheckThresholds, window_capacity: usize) -> Self {
        Self {
            current: ArcSwap::from_pointee(thresholds),
            window_capacity,
        }
    }

    pub fn from_config(config: &CrabKycConfig) -> Self {
        Self::with_window_capacity(config.precheck.clone(), config.window.capacity)
    }

    pub fn snapshot(&self) -> Arc<PrecheckThresholds> {
        self.current.load_full()
    }

    pub fn window_capacity(&self) -> usize {
        self.window_capacity
    }

    /// Publish a new threshold set after validating it
    pub fn replace(&self, thresholds: PrecheckThresholds) -> Result<(), ConfigError> {
        thresholds.validate()?;
        if thresholds.min_samples > self.window_capacity {
            return Err(ConfigError::Invalid(format!(
                "min_samples {} cannot exceed window capacity {}",
                thresholds.min_samples, self.window_capacity
            )));
        }
        log::info!("Publishing precheck thresholds: {:?}", thresholds);
        self.current.store(Arc::new(thresholds));
        Ok(())
    }

    /// Copy-modify-publish. The edit is discarded if the result is invalid.
    pub fn update<F>(&self, edit: F) -> Result<Arc<PrecheckThresholds>, ConfigError>
    where
        F: FnOnce(&mut PrecheckThresholds),
    {
        let mut next = (*self.snapshot()).clone();
        edit(&mut next);
        self.replace(next)?;
        Ok(self.snapshot())
    }

    pub fn reset(&self) {
        self.current.store(Arc::new(PrecheckThresholds::default()));
    }
}

impl Default for ThresholdStore {
    fn default() -> Self {
        Self::new(PrecheckThresholds::default())
    }
}
