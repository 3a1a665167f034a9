//! Connector configuration plumbing
//!
//! Raw manifest configuration is run through an optional per-type config
//! builder, producing an effective configuration value plus an optional
//! validation hook. Validation always runs before the factory is invoked.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{ConnectorError, ConnectorResult};

/// Validation hook attached to a built configuration.
pub type ConfigValidator = Box<dyn Fn(&Value) -> ConnectorResult<()> + Send + Sync>;

/// Builds the effective configuration from the raw manifest value.
pub type ConfigBuilder = Box<dyn Fn(Value) -> ConnectorResult<BuiltConfiguration> + Send + Sync>;

/// The effective configuration of a connector instance.
///
/// The value is opaque to the framework; only the attached validator (if
/// any) interprets it. Absence of a validator means no validation is
/// required.
pub struct BuiltConfiguration {
    /// Effective configuration value handed to the factory.
    pub value: Value,
    validator: Option<ConfigValidator>,
}

impl BuiltConfiguration {
    /// Wrap a configuration value with no validation hook.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            value,
            validator: None,
        }
    }

    /// Attach a validation hook.
    #[must_use]
    pub fn with_validator(mut self, validator: ConfigValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Run the validation hook, if one is attached.
    pub fn validate(&self) -> ConnectorResult<()> {
        match &self.validator {
            Some(validator) => validator(&self.value),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for BuiltConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltConfiguration")
            .field("value", &self.value)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

/// Trait for strongly-typed connector configurations.
///
/// Connector crates implement this on their config struct and register
/// [`typed_builder`] for their type/version; the framework then owns
/// deserialization and validation ordering.
pub trait ConnectorConfig: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Validate the configuration. The default accepts everything.
    fn validate(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

/// Build a [`ConfigBuilder`] for a typed configuration.
///
/// The raw value is deserialized into `C` (normalizing defaults), and the
/// attached validator re-checks the effective value through
/// [`ConnectorConfig::validate`].
pub fn typed_builder<C: ConnectorConfig + 'static>() -> ConfigBuilder {
    Box::new(|raw: Value| {
        let config: C = serde_json::from_value(raw)
            .map_err(|e| ConnectorError::config_invalid("config", e.to_string()))?;
        config.validate()?;

        let value = serde_json::to_value(&config)?;
        let built = BuiltConfiguration::new(value).with_validator(Box::new(|value: &Value| {
            let config: C = serde_json::from_value(value.clone())
                .map_err(|e| ConnectorError::config_invalid("config", e.to_string()))?;
            config.validate()
        }));
        Ok(built)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct LdapConfig {
        host: String,
        #[serde(default = "default_port")]
        port: u16,
    }

    fn default_port() -> u16 {
        636
    }

    impl ConnectorConfig for LdapConfig {
        fn validate(&self) -> ConnectorResult<()> {
            if self.host.is_empty() {
                return Err(ConnectorError::config_invalid("host", "must not be empty"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_built_configuration_without_validator() {
        let built = BuiltConfiguration::new(json!({"anything": true}));
        assert!(built.validate().is_ok());
    }

    #[test]
    fn test_typed_builder_applies_defaults() {
        let builder = typed_builder::<LdapConfig>();
        let built = builder(json!({"host": "ldap.example.com"})).unwrap();

        assert_eq!(built.value["port"], 636);
        assert!(built.validate().is_ok());
    }

    #[test]
    fn test_typed_builder_rejects_invalid() {
        let builder = typed_builder::<LdapConfig>();

        let err = builder(json!({"host": ""})).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_INVALID");

        let err = builder(json!({"port": 1})).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_INVALID");
    }

    #[test]
    fn test_validator_sees_mutated_value() {
        let builder = typed_builder::<LdapConfig>();
        let mut built = builder(json!({"host": "ldap.example.com"})).unwrap();

        built.value["host"] = json!("");
        assert!(built.validate().is_err());
    }
}
