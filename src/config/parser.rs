//! Configuration parser for loading and merging configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, HalldyllError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::DeployConfig;

/// Environment variable holding the control plane endpoint.
pub const CONTROL_PLANE_URL_VAR: &str = "HALLDYLL_CONTROL_PLANE_URL";

/// Environment variable holding the control plane token.
pub const CONTROL_PLANE_TOKEN_VAR: &str = "HALLDYLL_CONTROL_PLANE_TOKEN";

/// Configuration parser for loading deployment configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(HalldyllError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            HalldyllError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeployConfig> {
        debug!("Parsing YAML configuration");

        let config: DeployConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source
                .map(|p| p.display().to_string())
                .or_else(|| self.base_path.as_ref().map(|p| p.display().to_string()));
            HalldyllError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed configuration for project {} ({} functions, {} routes)",
            config.project.name,
            config.function_names().len(),
            config.routes.paths.len()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Environment variables are checked in the format
    /// `HALLDYLL_PROJECT_<KEY>` (e.g., `HALLDYLL_PROJECT_REGION`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut DeployConfig) {
        if let Ok(name) = std::env::var("HALLDYLL_PROJECT_NAME") {
            debug!("Overriding project.name from environment");
            config.project.name = name;
        }

        if let Ok(region) = std::env::var("HALLDYLL_PROJECT_REGION") {
            debug!("Overriding project.region from environment");
            config.project.region = region;
        }

        if let Ok(bucket) = std::env::var("HALLDYLL_PROJECT_BUCKET") {
            debug!("Overriding project.bucket from environment");
            config.project.bucket = bucket;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                HalldyllError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the control plane endpoint from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not set.
    pub fn get_control_plane_url() -> Result<String> {
        std::env::var(CONTROL_PLANE_URL_VAR).map_err(|_| {
            HalldyllError::Config(ConfigError::MissingEnvVar {
                name: String::from(CONTROL_PLANE_URL_VAR),
            })
        })
    }

    /// Gets the control plane token from the environment, falling back to
    /// the `credentials` file in the user configuration directory.
    ///
    /// # Errors
    ///
    /// Returns an error if neither source provides a token.
    pub fn get_control_plane_token() -> Result<String> {
        if let Ok(token) = std::env::var(CONTROL_PLANE_TOKEN_VAR) {
            return Ok(token);
        }

        let credentials = credentials_path();
        if let Some(path) = credentials.as_ref().filter(|p| p.exists()) {
            debug!("Reading control plane token from {}", path.display());
            let token = std::fs::read_to_string(path)?.trim().to_string();
            if !token.is_empty() {
                return Ok(token);
            }
        }

        Err(HalldyllError::Config(ConfigError::MissingEnvVar {
            name: String::from(CONTROL_PLANE_TOKEN_VAR),
        }))
    }
}

/// Path of the optional credentials file.
#[must_use]
pub fn credentials_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("halldyll").join("credentials"))
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["halldyll.functions.yaml", "halldyll.functions.yml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(HalldyllError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpMethod, TriggerSpec};

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
project:
  name: shop
  region: eu-west-1
  bucket: shop-deploys
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).expect("config should parse");

        assert_eq!(config.project.name, "shop");
        assert_eq!(config.project.stage, "api");
        assert_eq!(config.project.functions_dir, "functions");
        assert!(config.functions.is_empty());
        assert!(config.routes.paths.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
project:
  name: shop
  region: eu-west-1
  bucket: shop-deploys
  stage: prod

functions:
  default:
    memory: 256
    timeout: 10
  users:
    handler: index.handler
    exclude: 'tests/**'
  cleanup:
    handler: index.handler
    triggers:
      - type: schedule
        expression: rate(1 hour)

routes:
  default:
    cors: true
  paths:
    /users:
      GET:
        handler: users
      PUT:
        handler: users
        cors: false
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).expect("config should parse");

        assert_eq!(config.function_names(), vec!["users", "cleanup"]);
        assert_eq!(config.routes.default.cors, Some(true));

        let methods = &config.routes.paths["/users"];
        let verbs: Vec<_> = methods.keys().copied().collect();
        assert_eq!(verbs, vec![HttpMethod::Get, HttpMethod::Put]);
        assert_eq!(methods[&HttpMethod::Put].cors, Some(false));

        let cleanup = &config.functions["cleanup"];
        assert!(matches!(cleanup.triggers[0], TriggerSpec::Schedule(_)));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).expect("nested dirs");
        std::fs::write(temp.path().join(DEFAULT_CONFIG_FILES[0]), "").expect("write config");

        let found = find_config_file(&nested).expect("config should be found");
        assert_eq!(found, temp.path().join(DEFAULT_CONFIG_FILES[0]));
    }
}
