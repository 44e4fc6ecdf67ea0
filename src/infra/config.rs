//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorMode {
    Gpio,
    Sim,
}

/// Camera source for one zone, resolved at configuration time.
///
/// `Stills` reads the newest image file from a directory populated by an
/// external frame grabber; `Sim` is the scripted in-process camera used
/// by tests and the simulation binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneSource {
    Sim,
    Stills(PathBuf),
}

impl ZoneSource {
    /// Parse a config source string: "sim" or "stills:<dir>"
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        if s == "sim" {
            return Ok(ZoneSource::Sim);
        }
        if let Some(dir) = s.strip_prefix("stills:") {
            if dir.is_empty() {
                anyhow::bail!("empty stills directory in zone source '{}'", s);
            }
            return Ok(ZoneSource::Stills(PathBuf::from(dir)));
        }
        anyhow::bail!("unknown zone source '{}' (expected 'sim' or 'stills:<dir>')", s)
    }
}

/// One configured camera zone. Immutable once loaded; each zone owns
/// exactly one camera source.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSpec {
    pub name: String,
    pub source: ZoneSource,
}

#[derive(Debug, Clone, Deserialize)]
struct ZoneEntry {
    name: String,
    source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Per-zone capture timeout in milliseconds
    #[serde(default = "default_capture_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub snapshot_enabled: bool,
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
}

fn default_capture_timeout_ms() -> u64 {
    2000
}

fn default_snapshot_dir() -> String {
    "snapshots".to_string()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_capture_timeout_ms(),
            snapshot_enabled: false,
            snapshot_dir: default_snapshot_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DifferConfig {
    /// Binary threshold on absolute luminance difference (0-255)
    #[serde(default = "default_diff_threshold")]
    pub diff_threshold: u8,
    /// Box blur radius applied before diffing (0 disables)
    #[serde(default = "default_blur_radius")]
    pub blur_radius: u32,
    /// Morphological closing kernel radius
    #[serde(default = "default_close_radius")]
    pub close_radius: u32,
    /// Minimum connected-component area in pixels
    #[serde(default = "default_min_region_area")]
    pub min_region_area: u64,
    /// Boxes overlapping beyond this ratio are merged into one region
    #[serde(default = "default_merge_overlap_ratio")]
    pub merge_overlap_ratio: f32,
}

fn default_diff_threshold() -> u8 {
    30
}

fn default_blur_radius() -> u32 {
    2
}

fn default_close_radius() -> u32 {
    2
}

fn default_min_region_area() -> u64 {
    500
}

fn default_merge_overlap_ratio() -> f32 {
    0.5
}

impl Default for DifferConfig {
    fn default() -> Self {
        Self {
            diff_threshold: default_diff_threshold(),
            blur_radius: default_blur_radius(),
            close_radius: default_close_radius(),
            min_region_area: default_min_region_area(),
            merge_overlap_ratio: default_merge_overlap_ratio(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Mean brightness delta below which a region is labeled ambiguous
    #[serde(default = "default_brightness_delta")]
    pub brightness_delta: f32,
    /// Confidence weight on normalized pixel-delta magnitude
    #[serde(default = "default_delta_weight")]
    pub delta_weight: f32,
    /// Confidence weight on relative region size
    #[serde(default = "default_size_weight")]
    pub size_weight: f32,
}

fn default_brightness_delta() -> f32 {
    12.0
}

fn default_delta_weight() -> f32 {
    0.75
}

fn default_size_weight() -> f32 {
    0.25
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            brightness_delta: default_brightness_delta(),
            delta_weight: default_delta_weight(),
            size_weight: default_size_weight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CycleConfig {
    /// Maximum time the door may stay open before the cycle aborts
    #[serde(default = "default_max_open_ms")]
    pub max_open_ms: u64,
}

fn default_max_open_ms() -> u64 {
    300_000
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self { max_open_ms: default_max_open_ms() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoorConfig {
    #[serde(default = "default_door_mode")]
    pub mode: DoorMode,
    /// Sysfs value file of the door reed-switch pin (gpio mode)
    #[serde(default = "default_gpio_value_path")]
    pub gpio_value_path: String,
    #[serde(default = "default_door_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Minimum time between accepted door transitions
    #[serde(default = "default_door_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_door_mode() -> DoorMode {
    DoorMode::Sim
}

fn default_gpio_value_path() -> String {
    "/sys/class/gpio/gpio17/value".to_string()
}

fn default_door_poll_interval_ms() -> u64 {
    250
}

fn default_door_debounce_ms() -> u64 {
    500
}

impl Default for DoorConfig {
    fn default() -> Self {
        Self {
            mode: default_door_mode(),
            gpio_value_path: default_gpio_value_path(),
            poll_interval_ms: default_door_poll_interval_ms(),
            debounce_ms: default_door_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for cycle report egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

fn default_egress_file() -> String {
    "cycles.jsonl".to_string()
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    10
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    capture: CaptureConfig,
    #[serde(default)]
    differ: DifferConfig,
    #[serde(default)]
    classifier: ClassifierConfig,
    #[serde(default)]
    cycle: CycleConfig,
    #[serde(default)]
    door: DoorConfig,
    #[serde(default)]
    egress: EgressConfig,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default, rename = "zone")]
    zones: Vec<ZoneEntry>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    capture: CaptureConfig,
    differ: DifferConfig,
    classifier: ClassifierConfig,
    cycle: CycleConfig,
    door: DoorConfig,
    egress: EgressConfig,
    metrics: MetricsConfig,
    zones: Vec<ZoneSpec>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capture: CaptureConfig::default(),
            differ: DifferConfig::default(),
            classifier: ClassifierConfig::default(),
            cycle: CycleConfig::default(),
            door: DoorConfig::default(),
            egress: EgressConfig::default(),
            metrics: MetricsConfig::default(),
            zones: Self::default_zones(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    fn default_zones() -> Vec<ZoneSpec> {
        ["shelf_1_left", "shelf_1_right", "overhead"]
            .iter()
            .map(|name| ZoneSpec { name: name.to_string(), source: ZoneSource::Sim })
            .collect()
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let mut zones = Vec::with_capacity(toml_config.zones.len());
        let mut seen = HashSet::new();
        for entry in toml_config.zones {
            if !seen.insert(entry.name.clone()) {
                anyhow::bail!("duplicate zone name '{}' in {}", entry.name, path.display());
            }
            let source = ZoneSource::parse(&entry.source)
                .with_context(|| format!("invalid source for zone '{}'", entry.name))?;
            zones.push(ZoneSpec { name: entry.name, source });
        }
        if zones.is_empty() {
            zones = Self::default_zones();
        }

        Ok(Self {
            capture: toml_config.capture,
            differ: toml_config.differ,
            classifier: toml_config.classifier,
            cycle: toml_config.cycle,
            door: toml_config.door,
            egress: toml_config.egress,
            metrics: toml_config.metrics,
            zones,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration from a path - falls back to defaults on failure
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn zones(&self) -> &[ZoneSpec] {
        &self.zones
    }

    pub fn capture_timeout_ms(&self) -> u64 {
        self.capture.timeout_ms
    }

    pub fn snapshot_enabled(&self) -> bool {
        self.capture.snapshot_enabled
    }

    pub fn snapshot_dir(&self) -> &str {
        &self.capture.snapshot_dir
    }

    pub fn diff_threshold(&self) -> u8 {
        self.differ.diff_threshold
    }

    pub fn blur_radius(&self) -> u32 {
        self.differ.blur_radius
    }

    pub fn close_radius(&self) -> u32 {
        self.differ.close_radius
    }

    pub fn min_region_area(&self) -> u64 {
        self.differ.min_region_area
    }

    pub fn merge_overlap_ratio(&self) -> f32 {
        self.differ.merge_overlap_ratio
    }

    pub fn brightness_delta(&self) -> f32 {
        self.classifier.brightness_delta
    }

    pub fn delta_weight(&self) -> f32 {
        self.classifier.delta_weight
    }

    pub fn size_weight(&self) -> f32 {
        self.classifier.size_weight
    }

    pub fn max_open_ms(&self) -> u64 {
        self.cycle.max_open_ms
    }

    pub fn door_mode(&self) -> DoorMode {
        self.door.mode
    }

    pub fn gpio_value_path(&self) -> &str {
        &self.door.gpio_value_path
    }

    pub fn door_poll_interval_ms(&self) -> u64 {
        self.door.poll_interval_ms
    }

    pub fn door_debounce_ms(&self) -> u64 {
        self.door.debounce_ms
    }

    pub fn egress_file(&self) -> &str {
        &self.egress.file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics.interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to override the differ thresholds
    #[cfg(test)]
    pub fn with_differ(mut self, differ: DifferConfig) -> Self {
        self.differ = differ;
        self
    }

    /// Builder method for tests to override the cycle bound
    #[cfg(test)]
    pub fn with_max_open_ms(mut self, ms: u64) -> Self {
        self.cycle.max_open_ms = ms;
        self
    }

    /// Builder method for tests to set the zone table
    #[cfg(test)]
    pub fn with_zones(mut self, zones: Vec<ZoneSpec>) -> Self {
        self.zones = zones;
        self
    }

    /// Builder method for tests to redirect egress output
    #[cfg(test)]
    pub fn with_egress_file(mut self, file: &str) -> Self {
        self.egress.file = file.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.capture_timeout_ms(), 2000);
        assert_eq!(config.diff_threshold(), 30);
        assert_eq!(config.min_region_area(), 500);
        assert_eq!(config.merge_overlap_ratio(), 0.5);
        assert_eq!(config.max_open_ms(), 300_000);
        assert_eq!(config.door_mode(), DoorMode::Sim);
        assert_eq!(config.egress_file(), "cycles.jsonl");
        assert_eq!(config.zones().len(), 3);
    }

    #[test]
    fn test_zone_source_parse() {
        assert_eq!(ZoneSource::parse("sim").unwrap(), ZoneSource::Sim);
        assert_eq!(
            ZoneSource::parse("stills:/var/frames/shelf_1_left").unwrap(),
            ZoneSource::Stills(PathBuf::from("/var/frames/shelf_1_left"))
        );
        assert!(ZoneSource::parse("stills:").is_err());
        assert!(ZoneSource::parse("rtsp://whatever").is_err());
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["shelfwatch".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "shelfwatch".to_string(),
            "--config".to_string(),
            "config/fridge.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/fridge.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["shelfwatch".to_string(), "--config=config/garage.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/garage.toml");
    }

    #[test]
    fn test_egress_file_default() {
        let egress = EgressConfig::default();
        assert_eq!(egress.file, "cycles.jsonl");
        assert!(!egress.file.is_empty());
    }
}
