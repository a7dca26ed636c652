//! Batch evaluation settings.  Every field has a default, so an empty
//! TOML document is a valid configuration.
use crate::error::EvaluationError;
use serde::{Deserialize, Serialize};
use tsc_engine::{ExclusivityPolicy, InstantiationOptions};

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Number of timely worker threads.
    pub workers: usize,
    /// Also evaluate every projection found in each tree.
    pub include_projections: bool,
    pub exclusivity: ExclusivityPolicy,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            include_projections: true,
            exclusivity: ExclusivityPolicy::default(),
        }
    }
}

impl EvaluatorConfig {
    /// Parses and validates a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err` on malformed TOML, unknown policies, or invalid
    /// values (see `validate`).
    pub fn from_toml_str(source: &str) -> Result<Self, EvaluationError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `Err` when `workers` is zero.
    pub fn validate(&self) -> Result<(), EvaluationError> {
        if self.workers == 0 {
            return Err(EvaluationError::InvalidConfig(
                "workers must be at least 1".into(),
            ));
        }

        Ok(())
    }

    #[must_use]
    pub fn instantiation_options(&self) -> InstantiationOptions {
        InstantiationOptions {
            exclusivity: self.exclusivity,
        }
    }
}

#[test]
fn test_defaults() {
    let config = EvaluatorConfig::from_toml_str("").expect("ok");

    assert_eq!(config, EvaluatorConfig::default());
    assert_eq!(config.workers, 1);
    assert!(config.include_projections);
    assert_eq!(
        config.instantiation_options().exclusivity,
        ExclusivityPolicy::ReportAll
    );
}

#[test]
fn test_parse() {
    let config = EvaluatorConfig::from_toml_str(
        r#"
workers = 4
include_projections = false
exclusivity = "first_match"
"#,
    )
    .expect("ok");

    assert_eq!(config.workers, 4);
    assert!(!config.include_projections);
    assert_eq!(config.exclusivity, ExclusivityPolicy::FirstMatch);
}

#[test]
fn test_rejects() {
    assert!(matches!(
        EvaluatorConfig::from_toml_str("workers = 0"),
        Err(EvaluationError::InvalidConfig(_))
    ));
    assert!(matches!(
        EvaluatorConfig::from_toml_str("exclusivity = \"sometimes\""),
        Err(EvaluationError::Toml(_))
    ));
    assert!(matches!(
        EvaluatorConfig::from_toml_str("workers = \"many\""),
        Err(EvaluationError::Toml(_))
    ));
}
