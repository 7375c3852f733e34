//! Configuration validation for deployment specs.
//!
//! Validation runs before any remote call: every problem found here is fatal
//! and the process exits before the control plane is contacted.

use crate::error::{ConfigError, HalldyllError, Result};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::spec::{
    DEFAULT_ENTRY, DeployConfig, FunctionConfig, ProjectConfig, RoutesConfig,
    deployed_function_name, function_logical_id,
};

/// Memory bounds accepted for a function, in MB.
const MEMORY_RANGE_MB: std::ops::RangeInclusive<u32> = 128..=10_240;

/// Timeout bounds accepted for a function, in seconds.
const TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u32> = 1..=900;

/// Validator for deployment configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all problems found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ConfigError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a deployment configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error found if validation fails.
    pub fn validate(&self, config: &DeployConfig) -> Result<ValidationResult> {
        let mut result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            Err(HalldyllError::Config(result.errors.remove(0)))
        }
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &DeployConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_project(&config.project, &mut result);
        Self::validate_functions(config, &mut result);
        Self::validate_routes(&config.routes, config, &mut result);

        result
    }

    /// Validates the project profile.
    fn validate_project(project: &ProjectConfig, result: &mut ValidationResult) {
        if project.name.is_empty() {
            result.errors.push(ConfigError::validation(
                "Project name cannot be empty",
                "project.name",
            ));
        } else if !is_valid_name(&project.name) {
            result.errors.push(ConfigError::validation(
                format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
                "project.name",
            ));
        }

        if project.region.trim().is_empty() {
            result
                .errors
                .push(ConfigError::validation("Region cannot be empty", "project.region"));
        }

        if !is_valid_bucket_name(&project.bucket) {
            result.errors.push(ConfigError::validation(
                format!(
                    "Bucket name '{}' is invalid. Must be 3-63 lowercase characters, digits, dots or hyphens.",
                    project.bucket
                ),
                "project.bucket",
            ));
        }

        if project.stage.is_empty() || !is_valid_name(&project.stage) {
            result.errors.push(ConfigError::validation(
                format!("Stage name '{}' is invalid", project.stage),
                "project.stage",
            ));
        }
    }

    /// Validates the function registry.
    fn validate_functions(config: &DeployConfig, result: &mut ValidationResult) {
        if let Some(defaults) = config.function_defaults() {
            Self::validate_limits(DEFAULT_ENTRY, defaults, result);
            Self::validate_exclude(DEFAULT_ENTRY, defaults, result);
        }

        let mut deployed: HashMap<String, &str> = HashMap::new();
        let mut logical: HashMap<String, &str> = HashMap::new();

        for (name, function) in config.declared_functions() {
            if !is_valid_function_name(name) {
                result.errors.push(ConfigError::InvalidFunctionName { name: name.clone() });
                continue;
            }

            let deployed_name = deployed_function_name(&config.project.name, name);
            if let Some(other) = deployed.insert(deployed_name.clone(), name) {
                result.errors.push(ConfigError::validation(
                    format!("Functions '{other}' and '{name}' both deploy as '{deployed_name}'"),
                    format!("functions.{name}"),
                ));
            } else {
                let logical_id = function_logical_id(name);
                if let Some(other) = logical.insert(logical_id.clone(), name) {
                    result.errors.push(ConfigError::validation(
                        format!(
                            "Functions '{other}' and '{name}' both map to template resource '{logical_id}'"
                        ),
                        format!("functions.{name}"),
                    ));
                }
            }

            if function.handler.as_deref().is_none_or(str::is_empty) {
                result.errors.push(ConfigError::validation(
                    format!("Function '{name}' has no handler"),
                    format!("functions.{name}.handler"),
                ));
            }

            Self::validate_limits(name, function, result);
            Self::validate_exclude(name, function, result);

            for trigger in &function.triggers {
                if let Err(e) = trigger.validate(name) {
                    result.errors.push(e);
                }
            }
        }

        if config.function_names().is_empty() {
            result
                .warnings
                .push(String::from("No functions declared, nothing will be deployed"));
        }
    }

    /// Validates memory and timeout bounds.
    fn validate_limits(name: &str, function: &FunctionConfig, result: &mut ValidationResult) {
        if let Some(memory) = function.memory
            && !MEMORY_RANGE_MB.contains(&memory)
        {
            result.errors.push(ConfigError::validation(
                format!(
                    "Memory {memory} MB must be between {} and {} MB",
                    MEMORY_RANGE_MB.start(),
                    MEMORY_RANGE_MB.end()
                ),
                format!("functions.{name}.memory"),
            ));
        }

        if let Some(timeout) = function.timeout
            && !TIMEOUT_RANGE_SECS.contains(&timeout)
        {
            result.errors.push(ConfigError::validation(
                format!(
                    "Timeout {timeout}s must be between {} and {} seconds",
                    TIMEOUT_RANGE_SECS.start(),
                    TIMEOUT_RANGE_SECS.end()
                ),
                format!("functions.{name}.timeout"),
            ));
        }
    }

    /// Validates the exclude glob.
    fn validate_exclude(name: &str, function: &FunctionConfig, result: &mut ValidationResult) {
        if let Some(pattern) = &function.exclude
            && let Err(e) = glob::Pattern::new(pattern)
        {
            result.errors.push(ConfigError::validation(
                format!("Exclude pattern '{pattern}' is invalid: {e}"),
                format!("functions.{name}.exclude"),
            ));
        }
    }

    /// Validates the route registry.
    fn validate_routes(routes: &RoutesConfig, config: &DeployConfig, result: &mut ValidationResult) {
        let functions: HashSet<&str> = config.function_names().into_iter().collect();
        let mut routed: HashSet<&str> = HashSet::new();

        for (path, methods) in &routes.paths {
            if let Err(e) = check_path(path) {
                result.errors.push(e);
                continue;
            }

            if methods.is_empty() {
                result.errors.push(ConfigError::MalformedPath {
                    path: path.clone(),
                    reason: String::from("no methods declared"),
                });
            }

            for (method, binding) in methods {
                if functions.contains(binding.handler.as_str()) {
                    routed.insert(binding.handler.as_str());
                } else {
                    result.errors.push(ConfigError::validation(
                        format!(
                            "Route {method} {path} references unknown function '{}'",
                            binding.handler
                        ),
                        format!("routes.paths.{path}.{method}.handler"),
                    ));
                }
            }
        }

        for (name, function) in config.declared_functions() {
            if function.triggers.is_empty() && !routed.contains(name.as_str()) {
                result.warnings.push(format!(
                    "Function '{name}' has no route and no trigger; it can only be invoked directly"
                ));
            }
        }
    }
}

/// Checks that a route path is well formed.
///
/// # Errors
///
/// Returns [`ConfigError::MalformedPath`] describing the first problem.
pub fn check_path(path: &str) -> std::result::Result<(), ConfigError> {
    let malformed = |reason: &str| ConfigError::MalformedPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if !path.starts_with('/') {
        return Err(malformed("must start with '/'"));
    }

    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(());
    }

    for token in trimmed.split('/') {
        if token.is_empty() {
            return Err(malformed("contains an empty segment"));
        }
        if token.chars().any(char::is_whitespace) {
            return Err(malformed("contains whitespace"));
        }
        if !token.chars().any(|c| c.is_ascii_alphanumeric()) {
            return Err(malformed("segment has no alphanumeric characters"));
        }
    }

    Ok(())
}

/// Checks if a name is valid (lowercase alphanumeric with hyphens).
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

/// Checks if a function name is valid: a letter followed by letters, digits,
/// `-`, `_` or `/`.
#[must_use]
pub fn is_valid_function_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/'))
        && !name.ends_with('/')
        && !name.contains("//")
}

/// Checks if a bucket name is valid.
fn is_valid_bucket_name(name: &str) -> bool {
    (3..=63).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
        && name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> DeployConfig {
        ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("config should parse")
    }

    const BASE: &str = r"
project:
  name: shop
  region: eu-west-1
  bucket: shop-deploys
";

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("my-project"));
        assert!(is_valid_name("project123"));
        assert!(!is_valid_name("My-Project"));
        assert!(!is_valid_name("-project"));
        assert!(!is_valid_name("project-"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn test_valid_function_name() {
        assert!(is_valid_function_name("users"));
        assert!(is_valid_function_name("users/list_all"));
        assert!(!is_valid_function_name("1users"));
        assert!(!is_valid_function_name("users/"));
        assert!(!is_valid_function_name("users//list"));
        assert!(!is_valid_function_name("users list"));
    }

    #[test]
    fn test_check_path() {
        assert!(check_path("/").is_ok());
        assert!(check_path("/items/{id}").is_ok());
        assert!(check_path("items").is_err());
        assert!(check_path("/items//list").is_err());
        assert!(check_path("/items/ list").is_err());
    }

    #[test]
    fn test_valid_config() {
        let yaml = format!(
            "{BASE}
functions:
  users:
    handler: index.handler
routes:
  paths:
    /users:
      GET:
        handler: users
"
        );
        let result = ConfigValidator::new()
            .validate(&parse(&yaml))
            .expect("config should be valid");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_missing_trigger_field_is_fatal() {
        let yaml = format!(
            "{BASE}
functions:
  ingest:
    handler: index.handler
    triggers:
      - type: stream
        stream: orders
"
        );
        let err = ConfigValidator::new().validate(&parse(&yaml)).unwrap_err();
        assert!(matches!(
            err,
            HalldyllError::Config(ConfigError::MissingTriggerField { ref field, .. })
                if field == "starting_position"
        ));
    }

    #[test]
    fn test_invalid_function_name() {
        let yaml = format!(
            "{BASE}
functions:
  9lives:
    handler: index.handler
"
        );
        let err = ConfigValidator::new().validate(&parse(&yaml)).unwrap_err();
        assert!(matches!(
            err,
            HalldyllError::Config(ConfigError::InvalidFunctionName { .. })
        ));
    }

    #[test]
    fn test_unknown_route_handler() {
        let yaml = format!(
            "{BASE}
routes:
  paths:
    /users:
      GET:
        handler: users
"
        );
        let result = ConfigValidator::new().check(&parse(&yaml));
        assert!(!result.is_valid());
    }

    #[test]
    fn test_colliding_deployed_names() {
        let yaml = format!(
            "{BASE}
functions:
  users/list:
    handler: index.handler
  users-list:
    handler: index.handler
"
        );
        let result = ConfigValidator::new().check(&parse(&yaml));
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_colliding_logical_ids() {
        let yaml = format!(
            "{BASE}
functions:
  a_b:
    handler: index.handler
  a-b:
    handler: index.handler
  users:
    handler: index.handler
  Users:
    handler: index.handler
"
        );
        let result = ConfigValidator::new().check(&parse(&yaml));
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors.iter().any(|e| e.to_string().contains("ABFunction")));
        assert!(result.errors.iter().any(|e| e.to_string().contains("UsersFunction")));

        let err = ConfigValidator::new().validate(&parse(&yaml)).unwrap_err();
        assert!(matches!(
            err,
            HalldyllError::Config(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_unrouted_function_warns() {
        let yaml = format!(
            "{BASE}
functions:
  worker:
    handler: index.handler
"
        );
        let result = ConfigValidator::new().check(&parse(&yaml));
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }
}
