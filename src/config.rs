use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuadratureConfig {
    /// Points in the smooth curve returned for plotting.
    pub smooth_points: usize,
    /// Upper bound for the odd-to-even Simpson adjustment.
    pub simpson_cap: usize,
    /// Largest interval count a single request may use.
    pub max_intervals: usize,
}

impl Default for QuadratureConfig {
    fn default() -> Self {
        Self {
            smooth_points: 100,
            simpson_cap: 1000,
            max_intervals: 1_000_000,
        }
    }
}

impl QuadratureConfig {
    pub fn from_reader<P: AsRef<Path>>(path: P) -> Result<QuadratureConfig, ConfigError> {
        let file = File::open(path)?;
        let config: QuadratureConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()
    }

    pub fn from_json(json: &str) -> Result<QuadratureConfig, ConfigError> {
        let config: QuadratureConfig = serde_json::from_str(json)?;
        config.validate()
    }

    pub fn validate(self) -> Result<QuadratureConfig, ConfigError> {
        if self.smooth_points < 2 {
            return Err(ConfigError::Invalid {
                field: "smooth_points",
                reason: format!("need at least 2 points, got {}", self.smooth_points),
            });
        }
        if self.simpson_cap < 2 || self.simpson_cap % 2 != 0 {
            return Err(ConfigError::Invalid {
                field: "simpson_cap",
                reason: format!("must be a positive even number, got {}", self.simpson_cap),
            });
        }
        if self.max_intervals < self.simpson_cap {
            return Err(ConfigError::Invalid {
                field: "max_intervals",
                reason: format!(
                    "must not be below simpson_cap ({}), got {}",
                    self.simpson_cap, self.max_intervals
                ),
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QuadratureConfig::default();
        assert_eq!(config.smooth_points, 100);
        assert_eq!(config.simpson_cap, 1000);
        assert_eq!(config.clone().validate().unwrap(), config);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = QuadratureConfig::from_json(r#"{ "smooth_points": 250 }"#).unwrap();
        assert_eq!(config.smooth_points, 250);
        assert_eq!(config.simpson_cap, 1000);
        assert_eq!(config.max_intervals, 1_000_000);
    }

    #[test]
    fn test_rejects_odd_cap() {
        let error = QuadratureConfig::from_json(r#"{ "simpson_cap": 999 }"#).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { field: "simpson_cap", .. }));
    }

    #[test]
    fn test_rejects_unknown_field() {
        let error = QuadratureConfig::from_json(r#"{ "smooth_point": 10 }"#).unwrap_err();
        assert!(matches!(error, ConfigError::Json(_)));
    }

    #[test]
    fn test_missing_file() {
        let error = QuadratureConfig::from_reader("does/not/exist.json").unwrap_err();
        assert!(matches!(error, ConfigError::Io(_)));
    }
}
