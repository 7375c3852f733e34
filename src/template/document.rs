//! Typed infrastructure template.
//!
//! Templates are assembled as values and serialized exactly once when they
//! are sent to the control plane or stored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{HalldyllError, Result, StateError};

/// Template format version understood by the control plane.
pub const FORMAT_VERSION: &str = "2026-01-01";

/// Resource type names.
pub mod kinds {
    /// Execution role shared by all functions.
    pub const ROLE: &str = "Access::Role";
    /// Permission for a principal to invoke a function.
    pub const PERMISSION: &str = "Compute::Permission";
    /// Compute function.
    pub const FUNCTION: &str = "Compute::Function";
    /// Stream consumer binding.
    pub const EVENT_SOURCE_MAPPING: &str = "Compute::EventSourceMapping";
    /// Log group of a function.
    pub const LOG_GROUP: &str = "Logs::LogGroup";
    /// Log subscription filter.
    pub const LOG_SUBSCRIPTION: &str = "Logs::SubscriptionFilter";
    /// Scheduled rule.
    pub const SCHEDULE_RULE: &str = "Events::Rule";
    /// Bucket notification.
    pub const BUCKET_NOTIFICATION: &str = "Storage::BucketNotification";
    /// Topic subscription.
    pub const TOPIC_SUBSCRIPTION: &str = "Messaging::Subscription";
    /// HTTP API.
    pub const HTTP_API: &str = "Http::Api";
    /// Path resource of the HTTP API.
    pub const HTTP_RESOURCE: &str = "Http::Resource";
    /// Method of a path resource.
    pub const HTTP_METHOD: &str = "Http::Method";
    /// Immutable snapshot of the API.
    pub const HTTP_DEPLOYMENT: &str = "Http::Deployment";
    /// Stage serving a deployment.
    pub const HTTP_STAGE: &str = "Http::Stage";
}

/// An infrastructure template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    /// Format version.
    pub format_version: String,
    /// Free-form description.
    pub description: String,
    /// Resources keyed by logical id.
    pub resources: BTreeMap<String, Resource>,
    /// Named outputs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Value>,
}

/// A resource of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    /// Resource type.
    #[serde(rename = "Type")]
    pub kind: String,
    /// Type-specific properties.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Logical ids that must exist first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// Reference to another resource's primary id.
#[must_use]
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// Reference to an attribute of another resource.
#[must_use]
pub fn attribute(logical_id: &str, name: &str) -> Value {
    json!({ "GetAtt": [logical_id, name] })
}

impl Resource {
    /// Creates a resource without properties.
    #[must_use]
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            properties: Map::new(),
            depends_on: Vec::new(),
        }
    }

    /// Sets a property.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    /// Reads a string property.
    #[must_use]
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }
}

impl Template {
    /// Creates an empty template.
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description: description.into(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Adds a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the logical id is already taken.
    pub fn add(&mut self, logical_id: impl Into<String>, resource: Resource) -> Result<()> {
        let logical_id = logical_id.into();
        if self.resources.contains_key(&logical_id) {
            return Err(HalldyllError::internal(format!(
                "duplicate logical id {logical_id} in template"
            )));
        }
        self.resources.insert(logical_id, resource);
        Ok(())
    }

    /// Adds an output.
    pub fn output(&mut self, name: impl Into<String>, value: Value) {
        self.outputs.insert(name.into(), value);
    }

    /// Looks up a resource.
    #[must_use]
    pub fn get(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    /// Logical ids of every resource of a given type.
    #[must_use]
    pub fn ids_of_kind(&self, kind: &str) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|(_, r)| r.kind == kind)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Serializes the template.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            HalldyllError::State(StateError::serialization(format!(
                "Failed to serialize template: {e}"
            )))
        })
    }
}
