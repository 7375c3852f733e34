//! Configuration specification types for the deployment system.
//!
//! This module defines the structs that map to the `halldyll.functions.yaml`
//! file and the resolved views the rest of the crate works with.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::trigger::TriggerSpec;

/// Name of the registry entry that supplies function defaults.
pub const DEFAULT_ENTRY: &str = "default";

/// Memory used when neither the function nor the default entry sets one.
pub const DEFAULT_MEMORY_MB: u32 = 128;

/// Timeout used when neither the function nor the default entry sets one.
pub const DEFAULT_TIMEOUT_SECS: u32 = 6;

/// Exclude pattern applied to every source tree.
pub const DEFAULT_EXCLUDE: &str = "**/.git/**";

/// The root configuration structure for a Halldyll function deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployConfig {
    /// Project profile.
    pub project: ProjectConfig,
    /// Function registry, keyed by function path. The `default` entry only
    /// supplies fallback values.
    #[serde(default)]
    pub functions: IndexMap<String, FunctionConfig>,
    /// Route registry.
    #[serde(default)]
    pub routes: RoutesConfig,
}

/// Project profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Application identifier, also used as the stack name.
    pub name: String,
    /// Provider identifier.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Region to deploy into.
    pub region: String,
    /// Blob-store bucket holding artifacts and the manifest.
    pub bucket: String,
    /// Stage name the API is published under.
    #[serde(default = "default_stage")]
    pub stage: String,
    /// Domain suffix used to build the public base URL.
    #[serde(default = "default_api_domain")]
    pub api_domain: String,
    /// Directory holding one sub-directory per function.
    #[serde(default = "default_functions_dir")]
    pub functions_dir: String,
}

/// A function registry entry as written in the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionConfig {
    /// Handler reference, e.g. `index.handler`.
    #[serde(default)]
    pub handler: Option<String>,
    /// Memory in MB.
    #[serde(default)]
    pub memory: Option<u32>,
    /// Timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u32>,
    /// Glob of files to leave out of the package.
    #[serde(default)]
    pub exclude: Option<String>,
    /// Event sources invoking the function.
    #[serde(default)]
    pub triggers: Vec<TriggerSpec>,
}

/// Route registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutesConfig {
    /// Registry-wide defaults.
    #[serde(default)]
    pub default: RouteDefaults,
    /// URL path to per-method handler map, in declaration order.
    #[serde(default)]
    pub paths: IndexMap<String, IndexMap<HttpMethod, MethodConfig>>,
}

/// Registry-wide route defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteDefaults {
    /// CORS policy for methods that do not set one.
    #[serde(default)]
    pub cors: Option<bool>,
}

/// Handler binding for one HTTP method of a route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodConfig {
    /// Name of the function handling the method.
    pub handler: String,
    /// Explicit CORS flag, `None` inherits the route default.
    #[serde(default)]
    pub cors: Option<bool>,
}

/// HTTP methods accepted in the route registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// PATCH.
    Patch,
    /// DELETE.
    Delete,
    /// HEAD.
    Head,
    /// OPTIONS.
    Options,
}

/// A fully resolved function, defaults applied.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FunctionSpec {
    /// Function path as declared (e.g. `users/list`).
    pub name: String,
    /// Handler reference.
    pub handler: String,
    /// Memory in MB.
    pub memory: u32,
    /// Timeout in seconds.
    pub timeout: u32,
    /// Exclude patterns, default pattern first.
    pub exclude: Vec<String>,
    /// Triggers.
    pub triggers: Vec<TriggerSpec>,
}

fn default_provider() -> String {
    String::from("generic")
}

fn default_stage() -> String {
    String::from("api")
}

fn default_api_domain() -> String {
    String::from("functions.halldyll.dev")
}

fn default_functions_dir() -> String {
    String::from("functions")
}

impl DeployConfig {
    /// Returns the `default` function entry, if declared.
    #[must_use]
    pub fn function_defaults(&self) -> Option<&FunctionConfig> {
        self.functions.get(DEFAULT_ENTRY)
    }

    /// Iterates over declared functions, skipping the `default` entry.
    pub fn declared_functions(&self) -> impl Iterator<Item = (&String, &FunctionConfig)> {
        self.functions
            .iter()
            .filter(|(name, _)| name.as_str() != DEFAULT_ENTRY)
    }

    /// Resolves every declared function against the `default` entry.
    ///
    /// Functions without a handler are skipped; the validator reports them.
    #[must_use]
    pub fn resolved_functions(&self) -> Vec<FunctionSpec> {
        let defaults = self.function_defaults().cloned().unwrap_or_default();

        self.declared_functions()
            .filter_map(|(name, entry)| {
                let handler = entry.handler.clone()?;
                let mut exclude = vec![
                    defaults
                        .exclude
                        .clone()
                        .unwrap_or_else(|| DEFAULT_EXCLUDE.to_string()),
                ];
                if let Some(pattern) = &entry.exclude {
                    exclude.push(pattern.clone());
                }

                Some(FunctionSpec {
                    name: name.clone(),
                    handler,
                    memory: entry.memory.or(defaults.memory).unwrap_or(DEFAULT_MEMORY_MB),
                    timeout: entry
                        .timeout
                        .or(defaults.timeout)
                        .unwrap_or(DEFAULT_TIMEOUT_SECS),
                    exclude,
                    triggers: entry.triggers.clone(),
                })
            })
            .collect()
    }

    /// Returns the names of all declared functions.
    #[must_use]
    pub fn function_names(&self) -> Vec<&str> {
        self.declared_functions().map(|(name, _)| name.as_str()).collect()
    }
}

impl ProjectConfig {
    /// Name of the stack holding this application.
    #[must_use]
    pub fn stack_name(&self) -> String {
        self.name.clone()
    }
}

impl FunctionSpec {
    /// Logical resource id of the function inside the template.
    #[must_use]
    pub fn logical_id(&self) -> String {
        function_logical_id(&self.name)
    }

    /// Name the function is deployed under.
    #[must_use]
    pub fn deployed_name(&self, project: &ProjectConfig) -> String {
        deployed_function_name(&project.name, &self.name)
    }
}

/// Name a function is deployed under for a given project.
#[must_use]
pub fn deployed_function_name(project: &str, function: &str) -> String {
    format!("{project}-{}", function.trim_matches('/').replace('/', "-"))
}

/// Logical resource id of a function inside the template.
///
/// Separators are dropped, so `a_b` and `a-b` share the id `ABFunction`.
#[must_use]
pub fn function_logical_id(function: &str) -> String {
    format!("{}Function", titlecase_path(function))
}

/// Log group a deployed function writes to.
#[must_use]
pub fn log_group_name(deployed_name: &str) -> String {
    format!("/functions/{deployed_name}")
}

/// Titlecases a single path token, dropping characters that cannot appear in
/// a logical resource name.
///
/// `user-profile` becomes `UserProfile`, `{id}` becomes `Id`.
#[must_use]
pub fn titlecase(token: &str) -> String {
    token
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|piece| !piece.is_empty())
        .map(|piece| {
            let mut chars = piece.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + chars.as_str()
            })
        })
        .collect()
}

/// Titlecases every `/`-separated token of a path and concatenates them.
#[must_use]
pub fn titlecase_path(path: &str) -> String {
    path.split('/').map(titlecase).collect()
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let method = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        };
        write!(f, "{method}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ProjectConfig {
        ProjectConfig {
            name: String::from("shop"),
            provider: default_provider(),
            region: String::from("eu-west-1"),
            bucket: String::from("shop-deploys"),
            stage: default_stage(),
            api_domain: default_api_domain(),
            functions_dir: default_functions_dir(),
        }
    }

    #[test]
    fn test_titlecase() {
        assert_eq!(titlecase("items"), "Items");
        assert_eq!(titlecase("user-profile"), "UserProfile");
        assert_eq!(titlecase("{id}"), "Id");
        assert_eq!(titlecase(""), "");
        assert_eq!(titlecase_path("users/list"), "UsersList");
    }

    #[test]
    fn test_defaults_are_inherited() {
        let mut functions = IndexMap::new();
        functions.insert(
            String::from(DEFAULT_ENTRY),
            FunctionConfig {
                memory: Some(512),
                exclude: Some(String::from("**/*.md")),
                ..FunctionConfig::default()
            },
        );
        functions.insert(
            String::from("users"),
            FunctionConfig {
                handler: Some(String::from("index.handler")),
                timeout: Some(30),
                exclude: Some(String::from("tests/**")),
                ..FunctionConfig::default()
            },
        );

        let config = DeployConfig {
            project: project(),
            functions,
            routes: RoutesConfig::default(),
        };

        let resolved = config.resolved_functions();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].memory, 512);
        assert_eq!(resolved[0].timeout, 30);
        assert_eq!(resolved[0].exclude, vec!["**/*.md", "tests/**"]);
    }

    #[test]
    fn test_builtin_defaults() {
        let mut functions = IndexMap::new();
        functions.insert(
            String::from("ping"),
            FunctionConfig {
                handler: Some(String::from("index.handler")),
                ..FunctionConfig::default()
            },
        );
        let config = DeployConfig {
            project: project(),
            functions,
            routes: RoutesConfig::default(),
        };

        let resolved = config.resolved_functions();
        assert_eq!(resolved[0].memory, DEFAULT_MEMORY_MB);
        assert_eq!(resolved[0].timeout, DEFAULT_TIMEOUT_SECS);
        assert_eq!(resolved[0].exclude, vec![DEFAULT_EXCLUDE]);
    }

    #[test]
    fn test_names() {
        let spec = FunctionSpec {
            name: String::from("users/list"),
            handler: String::from("index.handler"),
            memory: 128,
            timeout: 6,
            exclude: vec![],
            triggers: vec![],
        };
        assert_eq!(spec.logical_id(), "UsersListFunction");
        assert_eq!(spec.deployed_name(&project()), "shop-users-list");
    }
}
