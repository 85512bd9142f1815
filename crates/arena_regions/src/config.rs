//! Engine configuration and persisted region documents.
//!
//! Engine settings live in a TOML file with one table per subsystem. Region
//! definitions are kept per arena as a list of [`RegionDocument`]s, one per
//! region, in TOML (JSON works through the same serde model).

use crate::error::RegionError;
use crate::types::{BlockPos, Bounds};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

fn default_performance_pause_ms() -> u64 {
    50
}

/// Default tick interval for serde deserialization
fn default_tick_interval() -> u64 {
    50 // 20 ticks per second
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Engine configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Build queue settings
    #[serde(default)]
    pub queue: QueueConfig,
    /// Timer settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Build queue configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Pause between chunk sections for performance-speed builds, in milliseconds
    #[serde(default = "default_performance_pause_ms")]
    pub performance_pause_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            performance_pause_ms: default_performance_pause_ms(),
        }
    }
}

/// Timer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Length of one game tick in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl EngineConfig {
    /// Loads the configuration, writing a default file first if none exists.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, RegionError> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: EngineConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = EngineConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default engine configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err("scheduler.tick_interval_ms must be greater than 0".to_string());
        }

        if self.queue.performance_pause_ms > 10_000 {
            return Err(format!(
                "queue.performance_pause_ms is too large: {} (max 10000)",
                self.queue.performance_pause_ms
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

/// Two arbitrary corners of a region volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundsDocument {
    pub p1: [i32; 3],
    pub p2: [i32; 3],
}

impl BoundsDocument {
    pub fn to_bounds(self) -> Bounds {
        Bounds::new(BlockPos::from(self.p1), BlockPos::from(self.p2))
    }
}

impl From<Bounds> for BoundsDocument {
    fn from(bounds: Bounds) -> Self {
        let (min, max) = (bounds.min(), bounds.max());
        Self {
            p1: [min.x, min.y, min.z],
            p2: [max.x, max.y, max.z],
        }
    }
}

/// Persisted definition of one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionDocument {
    pub name: String,
    /// Variant type name, e.g. `"spleeffloor"`
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub bounds: BoundsDocument,
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl RegionDocument {
    pub fn new(name: &str, kind: &str, bounds: Bounds) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            enabled: true,
            bounds: bounds.into(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: &str, value: serde_json::Value) -> Self {
        self.settings.insert(key.to_string(), value);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// All region documents of one arena.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionsFile {
    #[serde(default)]
    pub regions: Vec<RegionDocument>,
}

impl RegionsFile {
    /// Loads the regions file. A missing file means no regions.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, RegionError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Ok(toml::from_str(&content)?)
    }

    pub async fn save_to_file(&self, path: &PathBuf) -> Result<(), RegionError> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, RegionError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;
    use tokio::fs;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();

        assert_eq!(config.queue.performance_pause_ms, 50);
        assert_eq!(config.scheduler.tick_interval_ms, 50);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [scheduler]
            tick_interval_ms = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.tick_interval_ms, 25);
        assert_eq!(config.queue.performance_pause_ms, 50);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.scheduler.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.logging.level = "verbose".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Invalid log level"));

        let mut config = EngineConfig::default();
        config.queue.performance_pause_ms = 60_000;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[queue]
performance_pause_ms = 5

[logging]
level = "debug"
json_format = true
"#;
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = EngineConfig::load_from_file(&temp_file.path().to_path_buf()).await.unwrap();

        assert_eq!(config.queue.performance_pause_ms, 5);
        assert_eq!(config.scheduler.tick_interval_ms, 50);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[tokio::test]
    async fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions-engine.toml");

        let config = EngineConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(path.exists());

        let reloaded = EngineConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_load_invalid_toml_fails() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[queue\nperformance_pause_ms = ").await.unwrap();

        let result = EngineConfig::load_from_file(&temp_file.path().to_path_buf()).await;
        assert!(matches!(result, Err(RegionError::Serialization(_))));
    }

    #[test]
    fn test_region_document_from_toml() {
        let file: RegionsFile = toml::from_str(
            r#"
[[regions]]
name = "spleef"
type = "spleeffloor"
bounds = { p1 = [4, 64, 4], p2 = [0, 64, 0] }

[regions.settings]
affected-blocks = ["SNOW_BLOCK", "wool"]
drop-unsupported = false

[[regions]]
name = "lava"
type = "damageinterval"
enabled = false
bounds = { p1 = [10, 0, 10], p2 = [12, 2, 12] }
"#,
        )
        .unwrap();

        assert_eq!(file.regions.len(), 2);
        let spleef = &file.regions[0];
        assert_eq!(spleef.kind, "spleeffloor");
        assert!(spleef.enabled);
        assert_eq!(spleef.bounds.to_bounds().min(), BlockPos::new(0, 64, 0));
        assert_eq!(spleef.settings["drop-unsupported"], json!(false));
        assert!(!file.regions[1].enabled);
        assert!(file.regions[1].settings.is_empty());
    }

    #[test]
    fn test_regions_file_from_json() {
        let file = RegionsFile::from_json(
            r#"{"regions":[{"name":"music","type":"music","bounds":{"p1":[0,0,0],"p2":[1,1,1]},
               "settings":{"resource-sound":"intro,theme","loop":true}}]}"#,
        )
        .unwrap();

        assert_eq!(file.regions[0].settings["loop"], json!(true));
    }

    #[tokio::test]
    async fn test_regions_file_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.toml");
        let bounds = Bounds::new(BlockPos::new(0, 0, 0), BlockPos::new(3, 3, 3));

        let file = RegionsFile {
            regions: vec![RegionDocument::new("delete", "delete", bounds)
                .with_setting("note", json!("floor"))
                .disabled()],
        };
        file.save_to_file(&path).await.unwrap();

        let reloaded = RegionsFile::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, file);

        let missing = RegionsFile::load_from_file(&dir.path().join("none.toml")).await.unwrap();
        assert!(missing.regions.is_empty());
    }
}
