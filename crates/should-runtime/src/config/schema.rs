//! JSON Schema validation for configuration files.
//!
//! Configuration is validated against `schema/config.schema.json`, embedded
//! at compile time, before it is deserialized.

use std::sync::OnceLock;

/// Embedded configuration schema.
const CONFIG_SCHEMA_JSON: &str = include_str!("../../schema/config.schema.json");

/// Compiled validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(CONFIG_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result.as_ref().map_err(Clone::clone)
}

/// Validate a configuration value, collecting every violation.
pub fn validate_config_schema(config: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(config)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_passes() {
        let value = serde_json::json!({
            "provider": {
                "type": "openai",
                "model": "gpt-4o-mini",
                "base_url": "http://localhost:11434/v1",
                "temperature": 0.0
            },
            "capture": {"log_level": "debug", "echo_stdout": true},
            "evaluation": {"timeout": "30s"}
        });
        assert!(validate_config_schema(&value).is_ok());
    }

    #[test]
    fn test_empty_config_passes() {
        assert!(validate_config_schema(&serde_json::json!({})).is_ok());
    }

    #[test]
    fn test_provider_requires_type() {
        let value = serde_json::json!({"provider": {"model": "gpt-4o-mini"}});
        let errors = validate_config_schema(&value).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("type")));
    }

    #[test]
    fn test_unknown_top_level_key_fails() {
        let value = serde_json::json!({"retries": 3});
        assert!(validate_config_schema(&value).is_err());
    }

    #[test]
    fn test_wrong_types_fail_with_path() {
        let value = serde_json::json!({
            "capture": {"echo_stdout": "yes"},
            "provider": {"type": "openai", "base_url": "localhost"}
        });
        let errors = validate_config_schema(&value).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("/capture/echo_stdout")));
        assert!(errors.iter().any(|e| e.contains("/provider/base_url")));
    }
}
