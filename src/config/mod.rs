//! Configuration module for the Halldyll function deployment system.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `halldyll.functions.yaml`
//! - Resolving function defaults
//! - Validation of functions, triggers and routes

mod parser;
mod spec;
mod trigger;
mod validator;

pub use parser::{
    CONTROL_PLANE_TOKEN_VAR, CONTROL_PLANE_URL_VAR, ConfigParser, DEFAULT_CONFIG_FILES,
    credentials_path, find_config_file,
};
pub use spec::{
    DEFAULT_ENTRY, DEFAULT_EXCLUDE, DEFAULT_MEMORY_MB, DEFAULT_TIMEOUT_SECS, DeployConfig,
    FunctionConfig, FunctionSpec, HttpMethod, MethodConfig, ProjectConfig, RouteDefaults,
    RoutesConfig, deployed_function_name, function_logical_id, log_group_name, titlecase, titlecase_path,
};
pub use trigger::{
    LogFilterTrigger, ObjectStoreTrigger, ScheduleTrigger, StreamTrigger, TopicTrigger,
    TriggerSpec,
};
pub use validator::{ConfigValidator, ValidationResult, check_path, is_valid_function_name};
