//! Project and function skeletons for `new` and `generate`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{ConfigParser, ConfigValidator, DEFAULT_CONFIG_FILES, is_valid_function_name};
use crate::error::{ConfigError, HalldyllError, Result};
use crate::pipeline::DEFAULT_SENTINEL;

/// Function every new project starts with.
pub const STARTER_FUNCTION: &str = "hello";

/// File the handler skeleton is written to.
pub const HANDLER_FILE: &str = "index.js";

const GITIGNORE_ENTRIES: &[&str] = &[".env", "node_modules/"];

const PROJECT_TEMPLATE: &str = "\
project:
  name: __NAME__
  region: __REGION__
  bucket: __BUCKET__

functions:
  default:
    memory: 128
    timeout: 6
  hello:
    handler: index.handler

routes:
  default:
    cors: true
  paths:
    /hello:
      GET:
        handler: hello
";

const HANDLER_TEMPLATE: &str = "\
exports.handler = async (event) => {
  if (event && event.__SENTINEL__) {
    return { test: 'ok' };
  }

  return {
    statusCode: 200,
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ message: 'Hello from __FUNCTION__' }),
  };
};
";

/// Files written by [`generate_function`] and the registry entry to add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFunction {
    /// Handler file written.
    pub handler_path: PathBuf,
    /// YAML to paste under `functions:`.
    pub snippet: String,
}

/// Writes a new project into `parent/name`.
///
/// The bucket defaults to `<name>-deploys`. Returns the files written.
///
/// # Errors
///
/// Returns [`ConfigError::ProjectExists`] if a configuration file is already
/// there and `force` is not set, a validation error if the name, region or
/// bucket would produce an invalid configuration, or an I/O error.
pub fn create_project(
    parent: &Path,
    name: &str,
    region: &str,
    bucket: Option<&str>,
    force: bool,
) -> Result<Vec<PathBuf>> {
    let root = parent.join(name);
    let config_path = root.join(DEFAULT_CONFIG_FILES[0]);

    if !force && config_path.exists() {
        return Err(ConfigError::ProjectExists { path: config_path }.into());
    }

    let bucket = bucket.map_or_else(|| format!("{name}-deploys"), str::to_string);
    let config = PROJECT_TEMPLATE
        .replace("__NAME__", name)
        .replace("__REGION__", region)
        .replace("__BUCKET__", &bucket);

    let parsed = ConfigParser::new().parse_yaml(&config, Some(config_path.as_path()))?;
    ConfigValidator::new().validate(&parsed)?;

    info!("Creating project {name} in {}", root.display());
    fs::create_dir_all(&root)?;
    fs::write(&config_path, config)?;

    let handler_path = write_handler(&root.join(&parsed.project.functions_dir), STARTER_FUNCTION)?;
    let gitignore_path = update_gitignore(&root)?;

    Ok(vec![config_path, handler_path, gitignore_path])
}

/// Writes a handler skeleton for `function` under `functions_dir`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidFunctionName`] for a bad name,
/// [`ConfigError::ProjectExists`] if the handler exists and `force` is not
/// set, or an I/O error.
pub fn generate_function(
    functions_dir: &Path,
    function: &str,
    force: bool,
) -> Result<GeneratedFunction> {
    if !is_valid_function_name(function) {
        return Err(ConfigError::InvalidFunctionName {
            name: function.to_string(),
        }
        .into());
    }

    let existing = functions_dir.join(function).join(HANDLER_FILE);
    if !force && existing.exists() {
        return Err(HalldyllError::Config(ConfigError::ProjectExists { path: existing }));
    }

    let handler_path = write_handler(functions_dir, function)?;
    let snippet = format!("  {function}:\n    handler: index.handler\n");

    Ok(GeneratedFunction {
        handler_path,
        snippet,
    })
}

fn write_handler(functions_dir: &Path, function: &str) -> Result<PathBuf> {
    let dir = functions_dir.join(function);
    fs::create_dir_all(&dir)?;

    let path = dir.join(HANDLER_FILE);
    let body = HANDLER_TEMPLATE
        .replace("__SENTINEL__", DEFAULT_SENTINEL)
        .replace("__FUNCTION__", function);
    fs::write(&path, body)?;

    debug!("Wrote {}", path.display());
    Ok(path)
}

/// Creates `.gitignore` or appends the entries it lacks.
fn update_gitignore(root: &Path) -> Result<PathBuf> {
    let path = root.join(".gitignore");

    if path.exists() {
        let existing = fs::read_to_string(&path)?;
        let missing: Vec<&str> = GITIGNORE_ENTRIES
            .iter()
            .copied()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();

        if !missing.is_empty() {
            let mut file = fs::OpenOptions::new().append(true).open(&path)?;
            writeln!(file, "\n# Halldyll")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
        }
    } else {
        fs::write(&path, GITIGNORE_ENTRIES.join("\n") + "\n")?;
    }

    Ok(path)
}
