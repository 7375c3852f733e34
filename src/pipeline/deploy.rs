//! The deployment pipeline.
//!
//! A run goes through these stages, each a `Result` that stops the run on
//! failure:
//!
//! 1. ensure the bucket exists and the manifest belongs to this application
//! 2. ensure the stack exists, creating it from the base template
//! 3. read the active version
//! 4. hash sources and configuration, stopping early when nothing changed
//! 5. package every function
//! 6. apply the full template
//! 7. upload the archives
//! 8. smoke-test every function
//! 9. apply the stage template and resolve the base URL
//! 10. persist the template copy, configuration copy and manifest

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{HalldyllError, PipelineError, RemoteError, Result};
use crate::package::{PackageContext, package_all};
use crate::remote::{ControlPlane, StackWaiter};
use crate::state::{
    BlobStore, DeploymentRepository, Manifest, Operation, VersionDecision, VersionLabel,
    ZIP_CONTENT_TYPE,
};
use crate::template::{API_ID, TemplateSynthesizer};

use super::apply::{ApplyOutcome, StackApplier};
use super::session::{DeploymentSession, project_digest};
use super::smoke::{DEFAULT_SENTINEL, SmokeTest};
use super::state::PipelineState;

/// A function shipped by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedFunction {
    /// Function name as declared.
    pub name: String,
    /// Name it is deployed under.
    pub deployed_name: String,
    /// Upload key of its archive.
    pub key: String,
    /// Archive size.
    pub size_bytes: u64,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeployOutcome {
    /// Sources and configuration match the active version.
    NoChanges {
        /// The active version.
        version: VersionLabel,
    },
    /// A new version is live.
    Deployed {
        /// The new version.
        version: VersionLabel,
        /// Version it replaced.
        previous_version: Option<VersionLabel>,
        /// Public base URL, when the application has routes.
        base_url: Option<String>,
        /// Shipped functions.
        functions: Vec<DeployedFunction>,
    },
}

/// Runs deployments against one control plane and bucket.
#[derive(Debug, Clone)]
pub struct Pipeline {
    repository: DeploymentRepository,
    applier: StackApplier,
    smoke: SmokeTest,
}

impl Pipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(
        control: Arc<dyn ControlPlane>,
        store: Arc<dyn BlobStore>,
        waiter: StackWaiter,
    ) -> Self {
        Self {
            repository: DeploymentRepository::new(store),
            applier: StackApplier::new(control.clone(), waiter),
            smoke: SmokeTest::new(control, DEFAULT_SENTINEL),
        }
    }

    /// Applier shared with the interrupt controller.
    #[must_use]
    pub const fn applier(&self) -> &StackApplier {
        &self.applier
    }

    /// Repository of the deployment bucket.
    #[must_use]
    pub const fn repository(&self) -> &DeploymentRepository {
        &self.repository
    }

    /// Runs every stage.
    ///
    /// On failure the run's archives are removed. The session keeps the
    /// state the run failed in.
    ///
    /// # Errors
    ///
    /// Returns the first stage error.
    pub async fn run(&self, session: &mut DeploymentSession) -> Result<DeployOutcome> {
        info!(
            "Deploying {} to {} (run {})",
            session.stack, session.config.project.region, session.run_id
        );

        let result = self.run_stages(session).await;
        if let Err(e) = &result {
            warn!("Deployment failed in {}: {e}", session.state());
            session.cleanup();
        }
        result
    }

    async fn run_stages(&self, session: &mut DeploymentSession) -> Result<DeployOutcome> {
        self.ensure_bucket(session).await?;
        self.ensure_stack(session).await?;
        Self::fetch_version(session);

        if let Some(version) = self.verify(session).await? {
            session.discard_artifacts();
            info!("No changes since {version}");
            return Ok(DeployOutcome::NoChanges { version });
        }

        self.compress(session).await?;
        self.update(session).await?;
        self.upload(session).await?;
        self.ping(session).await?;
        self.deploy(session).await?;
        self.persist(session).await?;

        let functions = session
            .functions
            .iter()
            .zip(&session.artifacts)
            .map(|(function, artifact)| DeployedFunction {
                name: function.name.clone(),
                deployed_name: function.deployed_name(&session.config.project),
                key: artifact.key.clone(),
                size_bytes: artifact.size_bytes,
            })
            .collect();

        Ok(DeployOutcome::Deployed {
            version: session.require_version()?,
            previous_version: session.previous_version(),
            base_url: session.base_url.clone(),
            functions,
        })
    }

    /// Creates the bucket if needed and loads the manifest.
    ///
    /// The manifest's identity is checked here so a foreign bucket is
    /// refused before the stack is touched.
    async fn ensure_bucket(&self, session: &mut DeploymentSession) -> Result<()> {
        session.transition(PipelineState::FetchingBucket);
        let store = self.repository.store();

        if store.bucket_exists().await? {
            session.transition(PipelineState::FetchedBucket);
            let owned = self
                .repository
                .load_owned_manifest(session.identifier())
                .await?;
            if let Some(manifest) = owned {
                session.manifest = manifest;
            }
        } else {
            session.transition(PipelineState::CreatingBucket);
            store.create_bucket(&session.config.project.region).await?;
            session.transition(PipelineState::CreatedBucket);
            session.manifest = Manifest::new(session.identifier());
        }

        Ok(())
    }

    async fn ensure_stack(&self, session: &mut DeploymentSession) -> Result<()> {
        session.transition(PipelineState::FetchingStack);

        let existing = self.applier.control().describe_stack(&session.stack).await?;
        match existing {
            Some(description) if description.status.is_updatable() => {
                debug!("Stack {} is {}", session.stack, description.status);
                session.transition(PipelineState::FetchedStack);
            }
            Some(description) => {
                return Err(RemoteError::StackFailed {
                    stack: session.stack.clone(),
                    status: description.status.to_string(),
                    reason: String::from("stack cannot be updated from its current status"),
                }
                .into());
            }
            None => {
                session.transition(PipelineState::Creating);
                let base = TemplateSynthesizer::new(&session.config.project).base()?;
                self.applier.create(&session.stack, &base.to_json()?).await?;
                session.template = Some(base);
                session.transition(PipelineState::Created);
            }
        }

        Ok(())
    }

    fn fetch_version(session: &DeploymentSession) {
        session.transition(PipelineState::FetchingVersion);
        let active = session.manifest.active_version;
        session.set_versions(active, None);
        match active {
            Some(version) => info!("Active version is {version}"),
            None => info!("Nothing deployed yet"),
        }
        session.transition(PipelineState::FetchedVersion);
    }

    /// Returns the active version when nothing changed.
    async fn verify(&self, session: &mut DeploymentSession) -> Result<Option<VersionLabel>> {
        session.transition(PipelineState::Verifying);

        let (trees, snapshot) = session.digest_inputs()?;
        let digest = tokio::task::spawn_blocking(move || project_digest(&trees, &snapshot))
            .await
            .map_err(|e| PipelineError::TaskFailed {
                message: format!("checksum task: {e}"),
            })??;
        debug!("Project digest {digest}");

        match session.manifest.diff(&digest) {
            VersionDecision::Unchanged { version } => Ok(Some(version)),
            VersionDecision::NewVersion { version } => {
                info!("Deploying new version {version}");
                session.manifest.record_version(version, digest.clone())?;
                session.digest = Some(digest);
                session.set_versions(session.previous_version(), Some(version));
                Ok(None)
            }
        }
    }

    async fn compress(&self, session: &mut DeploymentSession) -> Result<()> {
        session.transition(PipelineState::Compressing);

        let context = PackageContext {
            source_root: session.source_root.clone(),
            work_dir: session.work_dir()?,
            version: session.require_version()?,
            sentinel: DEFAULT_SENTINEL.to_string(),
        };
        session.artifacts = package_all(&session.functions, &context).await?;

        session.transition(PipelineState::Compressed);
        Ok(())
    }

    async fn update(&self, session: &mut DeploymentSession) -> Result<()> {
        session.transition(PipelineState::Updating);

        let template = TemplateSynthesizer::new(&session.config.project).full(
            &session.functions,
            &session.artifacts,
            &session.routes,
            session.require_version()?,
        )?;
        self.apply(session, &template.to_json()?).await?;
        session.template = Some(template);

        session.transition(PipelineState::Updated);
        Ok(())
    }

    async fn upload(&self, session: &mut DeploymentSession) -> Result<()> {
        session.transition(PipelineState::Uploading);

        let mut tasks = JoinSet::new();
        for artifact in &session.artifacts {
            let store = Arc::clone(self.repository.store());
            let path = artifact.archive_path.clone();
            let key = artifact.key.clone();
            tasks.spawn(async move {
                let body = tokio::fs::read(&path).await?;
                store.put_object(&key, body, ZIP_CONTENT_TYPE).await?;
                Ok::<_, HalldyllError>(key)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let uploaded = joined.map_err(|e| PipelineError::TaskFailed {
                message: format!("upload task: {e}"),
            })?;
            match uploaded {
                Ok(key) => debug!("Uploaded {key}"),
                Err(e) => {
                    tasks.abort_all();
                    return Err(e);
                }
            }
        }

        info!("Uploaded {} artifacts", session.artifacts.len());
        session.transition(PipelineState::Uploaded);
        Ok(())
    }

    async fn ping(&self, session: &mut DeploymentSession) -> Result<()> {
        session.transition(PipelineState::Pinging);

        let names: Vec<String> = session
            .functions
            .iter()
            .map(|f| f.deployed_name(&session.config.project))
            .collect();
        self.smoke.ping_all(&names).await?;

        session.transition(PipelineState::Pinged);
        Ok(())
    }

    async fn deploy(&self, session: &mut DeploymentSession) -> Result<()> {
        session.transition(PipelineState::Deploying);

        let version = session.require_version()?;
        let synth = TemplateSynthesizer::new(&session.config.project);
        let full = session
            .template
            .as_ref()
            .ok_or_else(|| HalldyllError::internal("no template applied before staging"))?;
        let staged = synth.staged(full, version)?;
        self.apply(session, &staged.to_json()?).await?;

        if session.routes.has_methods() {
            let api_id = self
                .applier
                .control()
                .describe_resource(&session.stack, API_ID)
                .await?;
            let base_url = synth.base_url(&api_id);
            info!("API available at {base_url}");
            session.base_url = Some(base_url);
        }
        session.template = Some(staged);

        session.transition(PipelineState::Deployed);
        Ok(())
    }

    async fn persist(&self, session: &mut DeploymentSession) -> Result<()> {
        let version = session.require_version()?;
        let template = session
            .template
            .as_ref()
            .ok_or_else(|| HalldyllError::internal("no template to persist"))?;

        self.repository
            .save_template(version, &template.to_json()?)
            .await?;
        self.repository
            .save_config(version, &session.config_snapshot()?)
            .await?;

        session.manifest.activate(version, Operation::Deploy)?;
        session.manifest.base_url.clone_from(&session.base_url);
        self.repository.save_manifest(&session.manifest).await?;

        info!("Version {version} is live");
        Ok(())
    }

    async fn apply(&self, session: &DeploymentSession, template: &str) -> Result<()> {
        if self.applier.apply(&session.stack, template).await? == ApplyOutcome::NoChanges {
            debug!("Nothing to apply in {}", session.state());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::pipeline::Destroy;
    use crate::remote::fake::{FAKE_PHYSICAL_ID, FakeControlPlane};
    use crate::remote::{InvokeResult, ManualClock, PollPolicy};
    use crate::state::FsBlobStore;
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    const CONFIG: &str = r"
project:
  name: shop
  region: eu-west-1
  bucket: shop-deploys

functions:
  default:
    memory: 256
  users:
    handler: index.handler
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
";

    struct Harness {
        control: Arc<FakeControlPlane>,
        store: Arc<FsBlobStore>,
        pipeline: Pipeline,
        sources: TempDir,
        _bucket: TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let sources = tempfile::tempdir().expect("sources");
            write(sources.path(), "users/index.js", "exports.handler = () => 1;");
            write(sources.path(), "cleanup/index.js", "exports.handler = () => 2;");

            let bucket = tempfile::tempdir().expect("bucket");
            let store = Arc::new(FsBlobStore::new(bucket.path(), "shop-deploys"));
            let control = Arc::new(FakeControlPlane::new());
            let waiter = StackWaiter::with_clock(
                control.clone(),
                Arc::new(ManualClock::new()),
                PollPolicy::default(),
            );
            let pipeline = Pipeline::new(control.clone(), store.clone(), waiter);

            Self {
                control,
                store,
                pipeline,
                sources,
                _bucket: bucket,
            }
        }

        fn session(&self) -> DeploymentSession {
            let config = ConfigParser::new().parse_yaml(CONFIG, None).expect("config");
            DeploymentSession::new(config, self.sources.path()).expect("session")
        }

        async fn deploy(&self) -> Result<DeployOutcome> {
            let mut session = self.session();
            self.pipeline.run(&mut session).await
        }

        fn count(&self, call: &str) -> usize {
            self.control.calls().iter().filter(|c| *c == call).count()
        }
    }

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, content).expect("write");
    }

    #[tokio::test]
    async fn test_first_deploy() {
        let harness = Harness::new();
        let outcome = harness.deploy().await.expect("deploy");

        let DeployOutcome::Deployed {
            version,
            previous_version,
            base_url,
            functions,
        } = outcome
        else {
            panic!("expected a deployment");
        };
        assert_eq!(version, VersionLabel::FIRST);
        assert_eq!(previous_version, None);
        assert_eq!(
            base_url.as_deref(),
            Some(format!("https://{FAKE_PHYSICAL_ID}.eu-west-1.functions.halldyll.dev/api").as_str())
        );
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].deployed_name, "shop-users");

        let calls = harness.control.calls();
        assert_eq!(calls[0], "describe_stack");
        assert_eq!(calls[1], "create_stack");
        assert!(calls.contains(&String::from("invoke:shop-users")));
        assert!(calls.contains(&String::from("invoke:shop-cleanup")));

        let repository = harness.pipeline.repository();
        let manifest = repository
            .load_manifest()
            .await
            .expect("load")
            .expect("manifest");
        assert_eq!(manifest.active_version, Some(VersionLabel::FIRST));
        assert_eq!(manifest.base_url, base_url);
        assert_eq!(manifest.history.len(), 1);

        let stored = repository
            .load_template(VersionLabel::FIRST)
            .await
            .expect("template");
        assert_eq!(Some(stored), harness.control.current_template("shop"));
        for function in &functions {
            assert!(
                harness
                    .store
                    .get_object(&function.key)
                    .await
                    .expect("get")
                    .is_some()
            );
        }
    }

    #[tokio::test]
    async fn test_redeploy_without_changes_is_a_no_op() {
        let harness = Harness::new();
        harness.deploy().await.expect("first deploy");
        let calls_before = harness.control.calls().len();

        let outcome = harness.deploy().await.expect("second deploy");
        assert_eq!(
            outcome,
            DeployOutcome::NoChanges {
                version: VersionLabel::FIRST
            }
        );

        let new_calls = &harness.control.calls()[calls_before..];
        assert_eq!(new_calls, ["describe_stack"]);
    }

    #[tokio::test]
    async fn test_changed_source_increments_version() {
        let harness = Harness::new();
        harness.deploy().await.expect("first deploy");

        write(harness.sources.path(), "users/index.js", "exports.handler = () => 3;");
        let outcome = harness.deploy().await.expect("second deploy");

        let DeployOutcome::Deployed {
            version,
            previous_version,
            ..
        } = outcome
        else {
            panic!("expected a deployment");
        };
        assert_eq!(version, VersionLabel::new(2));
        assert_eq!(previous_version, Some(VersionLabel::FIRST));

        let manifest = harness
            .pipeline
            .repository()
            .load_manifest()
            .await
            .expect("load")
            .expect("manifest");
        assert_eq!(manifest.version_hashes.len(), 2);
        assert_eq!(manifest.active_version, Some(VersionLabel::new(2)));
    }

    #[tokio::test]
    async fn test_redeploy_after_destroy_continues_numbering() {
        let harness = Harness::new();
        harness.deploy().await.expect("first deploy");
        write(harness.sources.path(), "users/index.js", "exports.handler = () => 3;");
        harness.deploy().await.expect("second deploy");

        let repository = harness.pipeline.repository();
        let first_template = repository
            .load_template(VersionLabel::FIRST)
            .await
            .expect("v1 template");

        Destroy::new(harness.pipeline.applier().clone(), repository.clone())
            .run("shop")
            .await
            .expect("destroy");
        assert_eq!(harness.control.current_template("shop"), None);

        let outcome = harness.deploy().await.expect("deploy after destroy");
        let DeployOutcome::Deployed {
            version,
            previous_version,
            ..
        } = outcome
        else {
            panic!("expected a deployment");
        };
        assert_eq!(version, VersionLabel::new(3));
        assert_eq!(previous_version, None);

        assert_eq!(
            repository
                .load_template(VersionLabel::FIRST)
                .await
                .expect("v1 template"),
            first_template
        );
        let manifest = repository
            .load_manifest()
            .await
            .expect("load")
            .expect("manifest");
        assert_eq!(manifest.active_version, Some(VersionLabel::new(3)));
        assert_eq!(manifest.version_hashes.len(), 3);
    }

    #[tokio::test]
    async fn test_no_changes_answer_skips_waiting() {
        let harness = Harness::new();
        harness.control.force_no_changes();

        harness.deploy().await.expect("deploy");

        let calls = harness.control.calls();
        let first_update = calls
            .iter()
            .position(|c| c == "update_stack")
            .expect("update issued");
        assert!(!calls[first_update..].contains(&String::from("describe_stack")));
        assert_eq!(harness.control.applied_templates().len(), 2);
    }

    #[tokio::test]
    async fn test_smoke_test_mismatch_fails_and_cleans_up() {
        let harness = Harness::new();
        harness.control.set_invoke_response(InvokeResult {
            status_code: 200,
            payload: json!({"test": "broken"}),
            function_error: None,
        });

        let mut session = harness.session();
        let err = harness
            .pipeline
            .run(&mut session)
            .await
            .expect_err("must fail");

        assert!(err.is_verification());
        assert_eq!(session.state(), PipelineState::Pinging);
        assert!(session.artifacts.is_empty());
        assert!(
            harness
                .pipeline
                .repository()
                .load_manifest()
                .await
                .expect("load")
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_smoke_test_failure_keeps_previous_version_active() {
        let harness = Harness::new();
        harness.deploy().await.expect("first deploy");

        write(harness.sources.path(), "users/index.js", "exports.handler = () => 4;");
        harness.control.set_invoke_response(InvokeResult {
            status_code: 500,
            payload: json!(null),
            function_error: Some(String::from("Unhandled")),
        });

        let mut session = harness.session();
        let err = harness
            .pipeline
            .run(&mut session)
            .await
            .expect_err("must fail");

        assert!(err.is_verification());
        assert_eq!(session.previous_version(), Some(VersionLabel::FIRST));
        assert_eq!(session.version(), Some(VersionLabel::new(2)));

        let manifest = harness
            .pipeline
            .repository()
            .load_manifest()
            .await
            .expect("load")
            .expect("manifest");
        assert_eq!(manifest.active_version, Some(VersionLabel::FIRST));
    }

    #[tokio::test]
    async fn test_missing_source_directory_fails_before_packaging() {
        let harness = Harness::new();
        std::fs::remove_dir_all(harness.sources.path().join("cleanup")).expect("remove");

        let mut session = harness.session();
        let err = harness
            .pipeline
            .run(&mut session)
            .await
            .expect_err("must fail");

        assert!(matches!(err, HalldyllError::Package(_)));
        assert_eq!(session.state(), PipelineState::Verifying);
        assert_eq!(harness.count("update_stack"), 0);
    }

    #[tokio::test]
    async fn test_foreign_manifest_is_refused() {
        let harness = Harness::new();
        harness.store.create_bucket("eu-west-1").await.expect("bucket");
        harness
            .pipeline
            .repository()
            .save_manifest(&Manifest::new("someone-else"))
            .await
            .expect("save");

        let err = harness.deploy().await.expect_err("must fail");
        assert!(matches!(
            err,
            HalldyllError::State(crate::error::StateError::IdentityMismatch { .. })
        ));
        assert!(harness.control.calls().is_empty());
    }
}
