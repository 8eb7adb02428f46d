use lucent_probes::{ClipmapConfig, IntegratorConfig, TraceServiceConfig, UpdateBudgets};

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Ron(#[from] ron::Error),
}

/// Everything needed to run a [`ProbeField`](crate::ProbeField). Missing sections fall back to their defaults.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub clipmap: ClipmapConfig,
    pub budgets: UpdateBudgets,
    pub integrator: IntegratorConfig,
    pub service: TraceServiceConfig,
    pub field: FieldConfig,
}

impl Config {
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let reader = std::fs::File::open(path)?;

        Ok(ron::de::from_reader(reader)?)
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Primary ray length, in probe spacings of the probe's own level.
    pub max_trace_distance_probes: f32,
    /// Lower the per-frame trace count when measured trace times would exceed `target_trace_time_us` of worker time.
    pub adaptive_trace_budget: bool,
    /// Worker time per frame, per worker, that the adaptive budget aims for.
    pub target_trace_time_us: u32,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            max_trace_distance_probes: 8.0,
            adaptive_trace_budget: false,
            target_trace_time_us: 4000,
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;
    use lucent_probes::ProbeOutputMode;

    #[test]
    fn shipped_config_parses() {
        let config: Config = ron::de::from_str(include_str!("../assets/lucent.ron")).unwrap();
        assert_eq!(config.clipmap.level_count, 4);
        assert_eq!(config.clipmap.resolution, 32);
        assert_eq!(config.budgets.per_level, vec![64, 32, 16, 16]);
        assert_eq!(config.integrator.mode, ProbeOutputMode::Sh);
        assert!(config.field.adaptive_trace_budget);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: Config = ron::de::from_str("(service: (queue_capacity: 8, worker_count: 1))").unwrap();
        assert_eq!(config.service.queue_capacity, 8);
        assert_eq!(config.clipmap.resolution, ClipmapConfig::default().resolution);
        assert_eq!(config.budgets.per_level, UpdateBudgets::default().per_level);
        assert!(!config.field.adaptive_trace_budget);
    }

    #[test]
    fn write_then_read() {
        let path = std::env::temp_dir().join(format!("lucent-config-{}.ron", std::process::id()));
        let mut config = Config::default();
        config.clipmap.base_spacing = 0.5;
        config.field.max_trace_distance_probes = 12.0;
        config.write_file(&path).unwrap();

        let read = Config::read_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(read.clipmap.base_spacing, 0.5);
        assert_eq!(read.field.max_trace_distance_probes, 12.0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = Config::read_file("/nonexistent/lucent.ron");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
