//! Template synthesis.
//!
//! Three templates are produced per deployment:
//! - the base template, applied once when the stack is created, holds the
//!   execution role and the HTTP API;
//! - the full template adds functions, triggers, route resources and invoke
//!   permissions;
//! - the staged template adds a version-named deployment and the stage that
//!   serves it.

use std::collections::BTreeSet;

use serde_json::{Value, json};

use crate::config::{FunctionSpec, ProjectConfig, log_group_name, titlecase};
use crate::error::{HalldyllError, Result};
use crate::package::Artifact;
use crate::state::VersionLabel;

use super::document::{Resource, Template, attribute, kinds, reference};
use super::routes::{CORS_ALLOWED_HEADERS, MethodTarget, ROOT, ResourceGraph};

/// Logical id of the execution role.
pub const ROLE_ID: &str = "ExecutionRole";

/// Logical id of the HTTP API.
pub const API_ID: &str = "Api";

/// Logical id of the stage.
pub const STAGE_ID: &str = "ApiStage";

/// Days function logs are kept.
const LOG_RETENTION_DAYS: u32 = 14;

/// Builds the templates of a project.
#[derive(Debug, Clone, Copy)]
pub struct TemplateSynthesizer<'a> {
    project: &'a ProjectConfig,
}

impl<'a> TemplateSynthesizer<'a> {
    /// Creates a synthesizer for a project.
    #[must_use]
    pub const fn new(project: &'a ProjectConfig) -> Self {
        Self { project }
    }

    /// Template used to create the stack.
    ///
    /// # Errors
    ///
    /// Returns an error if two resources share a logical id.
    pub fn base(&self) -> Result<Template> {
        let mut template = Template::new(format!("{} functions", self.project.name));
        template.add(ROLE_ID, self.role(&[]))?;
        template.add(
            API_ID,
            Resource::new(kinds::HTTP_API).with("Name", self.project.name.as_str()),
        )?;
        template.output("ApiId", reference(API_ID));
        Ok(template)
    }

    /// Template with every function, trigger and route.
    ///
    /// # Errors
    ///
    /// Returns an error if a function has no artifact, a route names an
    /// unknown function, or two resources share a logical id.
    pub fn full(
        &self,
        functions: &[FunctionSpec],
        artifacts: &[Artifact],
        routes: &ResourceGraph,
        version: VersionLabel,
    ) -> Result<Template> {
        let mut template = self.base()?;

        let streams: Vec<&str> = functions
            .iter()
            .flat_map(|f| f.triggers.iter().filter_map(|t| t.readable_source()))
            .collect();
        template.resources.insert(ROLE_ID.to_string(), self.role(&streams));

        for function in functions {
            let artifact = artifacts
                .iter()
                .find(|a| a.function == function.name)
                .ok_or_else(|| {
                    HalldyllError::internal(format!("no artifact for function {}", function.name))
                })?;
            self.add_function(&mut template, function, artifact, version)?;
        }

        self.add_routes(&mut template, functions, routes)?;
        template.output("Version", json!(version.to_string()));
        Ok(template)
    }

    /// The full template plus the deployment and stage of `version`.
    ///
    /// Without any route method the API cannot be deployed, so the full
    /// template is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if two resources share a logical id.
    pub fn staged(&self, full: &Template, version: VersionLabel) -> Result<Template> {
        let mut template = full.clone();
        let methods: Vec<String> = full
            .ids_of_kind(kinds::HTTP_METHOD)
            .into_iter()
            .map(String::from)
            .collect();
        if methods.is_empty() {
            return Ok(template);
        }

        let deployment_id = format!("{API_ID}Deployment{}", titlecase(&version.to_string()));
        let mut deployment = Resource::new(kinds::HTTP_DEPLOYMENT)
            .with("ApiId", reference(API_ID))
            .with("Description", version.to_string());
        deployment.depends_on = methods;
        template.add(deployment_id.clone(), deployment)?;

        template.add(
            STAGE_ID,
            Resource::new(kinds::HTTP_STAGE)
                .with("ApiId", reference(API_ID))
                .with("StageName", self.project.stage.as_str())
                .with("DeploymentId", reference(&deployment_id))
                .with("Variables", json!({ "version": version.to_string() })),
        )?;
        template.output("Stage", json!(self.project.stage));
        Ok(template)
    }

    /// Public base URL for an API physical id.
    #[must_use]
    pub fn base_url(&self, api_physical_id: &str) -> String {
        format!(
            "https://{api_physical_id}.{}.{}/{}",
            self.project.region, self.project.api_domain, self.project.stage
        )
    }

    fn role(&self, streams: &[&str]) -> Resource {
        let mut statements = vec![
            json!({
                "Effect": "Allow",
                "Action": ["logs:CreateStream", "logs:PutEvents"],
                "Resource": log_group_name(&format!("{}-*", self.project.name)),
            }),
            json!({
                "Effect": "Allow",
                "Action": ["blob:Get"],
                "Resource": self.project.bucket,
            }),
        ];

        let streams: BTreeSet<&str> = streams.iter().copied().collect();
        if !streams.is_empty() {
            statements.push(json!({
                "Effect": "Allow",
                "Action": ["stream:Read"],
                "Resource": streams,
            }));
        }

        Resource::new(kinds::ROLE)
            .with("AssumedBy", "functions")
            .with("Statements", Value::Array(statements))
    }

    fn add_function(
        &self,
        template: &mut Template,
        function: &FunctionSpec,
        artifact: &Artifact,
        version: VersionLabel,
    ) -> Result<()> {
        let function_id = function.logical_id();
        let deployed = function.deployed_name(self.project);
        let log_group_id = format!("{function_id}LogGroup");

        template.add(
            log_group_id.clone(),
            Resource::new(kinds::LOG_GROUP)
                .with("LogGroupName", log_group_name(&deployed))
                .with("RetentionInDays", LOG_RETENTION_DAYS),
        )?;

        template.add(
            function_id.clone(),
            Resource::new(kinds::FUNCTION)
                .with("FunctionName", deployed)
                .with("Handler", function.handler.as_str())
                .with("MemorySize", function.memory)
                .with("Timeout", function.timeout)
                .with("Role", attribute(ROLE_ID, "Arn"))
                .with(
                    "Code",
                    json!({ "Bucket": self.project.bucket, "Key": artifact.key }),
                )
                .with(
                    "Environment",
                    json!({
                        "HALLDYLL_FUNCTION": function.name,
                        "HALLDYLL_VERSION": version.to_string(),
                        "HALLDYLL_STAGE": self.project.stage,
                    }),
                )
                .depends_on(ROLE_ID)
                .depends_on(log_group_id),
        )?;

        for (index, trigger) in function.triggers.iter().enumerate() {
            for (id, resource) in trigger.emit(&function_id, index) {
                template.add(id, resource)?;
            }
        }

        Ok(())
    }

    fn add_routes(
        &self,
        template: &mut Template,
        functions: &[FunctionSpec],
        routes: &ResourceGraph,
    ) -> Result<()> {
        let mut invoked: BTreeSet<String> = BTreeSet::new();

        for (id, node) in routes.nodes() {
            let resource_ref = if id == ROOT {
                attribute(API_ID, "RootResourceId")
            } else {
                let parent_ref = node
                    .parent
                    .and_then(|parent| routes.resource_logical_id(parent))
                    .map_or_else(|| attribute(API_ID, "RootResourceId"), |p| reference(&p));
                let logical_id = routes.resource_logical_id(id).ok_or_else(|| {
                    HalldyllError::internal(format!("route node {id} has no logical id"))
                })?;

                template.add(
                    logical_id.clone(),
                    Resource::new(kinds::HTTP_RESOURCE)
                        .with("ApiId", reference(API_ID))
                        .with("ParentId", parent_ref)
                        .with("PathPart", node.token.as_str()),
                )?;
                reference(&logical_id)
            };

            for method in &node.methods {
                let integration = match &method.target {
                    MethodTarget::Handler { function, cors } => {
                        let spec = functions.iter().find(|f| &f.name == function).ok_or_else(|| {
                            HalldyllError::internal(format!(
                                "route {} {} names unknown function {function}",
                                method.verb,
                                routes.path_of(id)
                            ))
                        })?;
                        let function_id = spec.logical_id();
                        invoked.insert(function_id.clone());
                        json!({
                            "Type": "PROXY",
                            "Uri": attribute(&function_id, "Arn"),
                            "Cors": cors,
                        })
                    }
                    MethodTarget::Preflight { allowed_methods } => json!({
                        "Type": "MOCK",
                        "ResponseHeaders": {
                            "Access-Control-Allow-Origin": "*",
                            "Access-Control-Allow-Methods": allowed_methods,
                            "Access-Control-Allow-Headers": CORS_ALLOWED_HEADERS,
                        },
                    }),
                };

                template.add(
                    routes.method_logical_id(id, method.verb),
                    Resource::new(kinds::HTTP_METHOD)
                        .with("ApiId", reference(API_ID))
                        .with("ResourceId", resource_ref.clone())
                        .with("HttpMethod", method.verb.to_string())
                        .with("AuthorizationType", "NONE")
                        .with("Integration", integration),
                )?;
            }
        }

        for function_id in invoked {
            template.add(
                format!("{function_id}ApiPermission"),
                Resource::new(kinds::PERMISSION)
                    .with("FunctionName", reference(&function_id))
                    .with("Action", "invoke")
                    .with("Principal", "http")
                    .with("Source", attribute(API_ID, "ExecutionArn")),
            )?;
        }

        Ok(())
    }
}
