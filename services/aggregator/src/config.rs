//! Service configuration.
//!
//! Layers, lowest to highest precedence:
//! 1. built-in defaults
//! 2. YAML file given with `--config`
//! 3. `CLIMATE_AGG_*` environment variables (a `.env` file is loaded first)
//! 4. directory flags on the command line

use std::path::{Path, PathBuf};

use aggregation::{AggregationConfig, AggregationError};
use data_store::DataPaths;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_POPULATION_DIR: &str = "CLIMATE_AGG_POPULATION_DIR";
pub const ENV_CLIMATE_DIR: &str = "CLIMATE_AGG_CLIMATE_DIR";
pub const ENV_SHAPE_DIR: &str = "CLIMATE_AGG_SHAPE_DIR";
pub const ENV_OUTPUT_DIR: &str = "CLIMATE_AGG_OUTPUT_DIR";
pub const ENV_PIXEL_BUFFER: &str = "CLIMATE_AGG_PIXEL_BUFFER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value '{value}' for {var}")]
    InvalidOverride { var: &'static str, value: String },

    #[error(transparent)]
    Invalid(#[from] AggregationError),
}

/// Directory overrides from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirOverrides {
    pub population_dir: Option<PathBuf>,
    pub climate_dir: Option<PathBuf>,
    pub shape_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

/// Everything a command needs: where data lives and how to aggregate it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub paths: DataPaths,
    pub aggregation: AggregationConfig,
    /// File the configuration was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl ServiceConfig {
    /// Parse a YAML document. Missing sections keep their defaults.
    pub fn from_yaml_str(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&content, path)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Defaults, then the file (if any), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Apply `CLIMATE_AGG_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dirs = [
            (ENV_POPULATION_DIR, &mut self.paths.population_dir),
            (ENV_CLIMATE_DIR, &mut self.paths.climate_dir),
            (ENV_SHAPE_DIR, &mut self.paths.shape_dir),
            (ENV_OUTPUT_DIR, &mut self.paths.output_dir),
        ];
        for (var, dir) in dirs {
            if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
                *dir = PathBuf::from(value);
            }
        }

        if let Some(value) = lookup(ENV_PIXEL_BUFFER) {
            self.aggregation.pixel_buffer =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidOverride {
                        var: ENV_PIXEL_BUFFER,
                        value,
                    })?;
        }
        Ok(())
    }

    pub fn apply_dirs(&mut self, dirs: &DirOverrides) {
        let pairs = [
            (&dirs.population_dir, &mut self.paths.population_dir),
            (&dirs.climate_dir, &mut self.paths.climate_dir),
            (&dirs.shape_dir, &mut self.paths.shape_dir),
            (&dirs.output_dir, &mut self.paths.output_dir),
        ];
        for (value, dir) in pairs {
            if let Some(value) = value {
                *dir = value.clone();
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.aggregation.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
paths:
  output_dir: /scratch/out
aggregation:
  scenarios: [ssp245]
  years: { start: 2020, end: 2030 }
"#;
        let config = ServiceConfig::from_yaml_str(yaml, Path::new("test.yaml")).unwrap();
        assert_eq!(config.paths.output_dir, PathBuf::from("/scratch/out"));
        assert_eq!(config.paths.population_dir, DataPaths::default().population_dir);
        assert_eq!(config.aggregation.scenarios, vec!["ssp245".to_string()]);
        assert_eq!(config.aggregation.years.len(), 11);
        assert_eq!(
            config.aggregation.measures,
            AggregationConfig::default().measures
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = ServiceConfig::from_yaml_str("paths: [", Path::new("broken.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn test_file_is_recorded_as_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("climate.yaml");
        std::fs::write(&path, "aggregation:\n  pixel_buffer: 12\n").unwrap();
        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.source.as_deref(), Some(path.as_path()));
        assert_eq!(config.aggregation.pixel_buffer, 12);
        assert_eq!(ServiceConfig::default().source, None);
    }

    #[test]
    fn test_missing_file() {
        let err = ServiceConfig::from_file(Path::new("/nonexistent/climate.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServiceConfig::default();
        config
            .apply_env(lookup(&[
                (ENV_CLIMATE_DIR, "/mnt/climate"),
                (ENV_OUTPUT_DIR, ""),
                (ENV_PIXEL_BUFFER, " 25 "),
            ]))
            .unwrap();
        assert_eq!(config.paths.climate_dir, PathBuf::from("/mnt/climate"));
        assert_eq!(config.paths.output_dir, DataPaths::default().output_dir);
        assert_eq!(config.aggregation.pixel_buffer, 25);
    }

    #[test]
    fn test_bad_pixel_buffer_override() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_env(lookup(&[(ENV_PIXEL_BUFFER, "-3")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidOverride { var: ENV_PIXEL_BUFFER, .. }
        ));
    }

    #[test]
    fn test_flags_override_env() {
        let mut config = ServiceConfig::default();
        config
            .apply_env(lookup(&[(ENV_SHAPE_DIR, "/env/shapes")]))
            .unwrap();
        config.apply_dirs(&DirOverrides {
            shape_dir: Some(PathBuf::from("/flag/shapes")),
            ..DirOverrides::default()
        });
        assert_eq!(config.paths.shape_dir, PathBuf::from("/flag/shapes"));
    }

    #[test]
    fn test_invalid_aggregation_rejected() {
        let mut config = ServiceConfig::default();
        config.aggregation.draws.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
