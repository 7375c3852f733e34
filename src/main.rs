//! Halldyll CLI entrypoint.
//!
//! This is the main entrypoint for the halldyll-fn command-line tool.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use halldyll_deploy_functions::cli::{
    Cli, Commands, OutputFormatter, create_project, generate_function,
};
use halldyll_deploy_functions::config::{
    ConfigParser, ConfigValidator, DeployConfig, deployed_function_name, find_config_file,
    log_group_name,
};
use halldyll_deploy_functions::error::{ConfigError, HalldyllError, Result};
use halldyll_deploy_functions::pipeline::{
    Destroy, DeploymentSession, InterruptController, Pipeline, Rollback, StackApplier, Supervised,
};
use halldyll_deploy_functions::remote::{
    ControlPlane, HttpControlPlane, LogCursor, LogReader, PollPolicy, StackWaiter,
};
use halldyll_deploy_functions::state::{
    BlobStore, DeploymentRepository, FsBlobStore, S3BlobStore, VersionLabel,
};

use chrono::Utc;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Provider value that keeps the bucket on the local filesystem.
const LOCAL_PROVIDER: &str = "local";

/// Delay between two log queries with `--follow`.
const FOLLOW_INTERVAL: Duration = Duration::from_secs(2);

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if e.is_retryable() {
                eprintln!("The failure looks transient; running the command again may succeed.");
            }
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Deploy => cmd_deploy(config_path, &formatter).await,
        Commands::Rollback { version } => cmd_rollback(config_path, version, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config_path, yes, &formatter).await,
        Commands::History { limit } => cmd_history(config_path, limit, &formatter).await,
        Commands::New {
            name,
            region,
            bucket_name,
            force,
        } => cmd_new(&name, &region, bucket_name.as_deref(), force, &formatter),
        Commands::Generate { function, force } => {
            cmd_generate(config_path, &function, force, &formatter)
        }
        Commands::Logs {
            function,
            follow,
            since,
        } => cmd_logs(config_path, function.as_deref(), follow, since, &formatter).await,
    }
}

/// Deploy a new version.
async fn cmd_deploy(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let project = load_project(config_path)?;
    let control = create_control_plane()?;
    let store = create_blob_store(&project).await?;

    let pipeline = Pipeline::new(
        control.clone(),
        store,
        StackWaiter::new(control, PollPolicy::default()),
    );
    let controller = InterruptController::new(
        pipeline.applier().clone(),
        pipeline.repository().clone(),
    );

    let mut session = DeploymentSession::new(project.config, project.source_root)?;
    let tracker = session.tracker();
    let stack = session.stack.clone();

    let (tx, mut interrupts) = mpsc::channel(4);
    let forwarder = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    });

    let supervised = controller
        .supervise(pipeline.run(&mut session), &tracker, &stack, &mut interrupts)
        .await;
    forwarder.abort();

    let supervised = match supervised {
        Err(e) if e.is_verification() => {
            println!(
                "{}",
                formatter.format_verification_failure(&e, session.previous_version())
            );
            return Err(e);
        }
        other => other?,
    };

    match supervised {
        Supervised::Finished(outcome) => {
            println!("{}", formatter.format_deploy(&outcome));
            Ok(())
        }
        Supervised::Interrupted(outcome) => {
            session.cleanup();
            println!("{}", formatter.format_interrupt(&outcome));
            Err(outcome.into_error(&stack))
        }
    }
}

/// Roll back to a stored version.
async fn cmd_rollback(
    config_path: Option<&PathBuf>,
    version: VersionLabel,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = load_project(config_path)?;
    let (applier, repository) = create_applier(&project).await?;

    let outcome = Rollback::new(applier, repository)
        .run(&project.config.project.stack_name(), version)
        .await?;

    println!("{}", formatter.format_rollback(&outcome));
    Ok(())
}

/// Destroy the deployed stack.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = load_project(config_path)?;
    let stack = project.config.project.stack_name();

    // Confirm
    if !auto_approve {
        eprint!("This deletes stack '{stack}' and every function in it. Type 'destroy' to confirm: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim() != "destroy" {
            eprintln!("Destruction cancelled.");
            return Ok(());
        }
    }

    let (applier, repository) = create_applier(&project).await?;
    Destroy::new(applier, repository).run(&stack).await?;

    println!("{}", formatter.success(&format!("Stack {stack} destroyed")));
    Ok(())
}

/// Show recorded versions.
async fn cmd_history(
    config_path: Option<&PathBuf>,
    limit: usize,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = load_project(config_path)?;
    let repository = DeploymentRepository::new(create_blob_store(&project).await?);

    match repository
        .load_owned_manifest(&project.config.project.stack_name())
        .await?
    {
        Some(manifest) => println!("{}", formatter.format_history(&manifest, limit)),
        None => println!("{}", formatter.warning("No deployments recorded.")),
    }
    Ok(())
}

/// Create a new project.
fn cmd_new(
    name: &str,
    region: &str,
    bucket: Option<&str>,
    force: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let written = create_project(Path::new("."), name, region, bucket, force)?;
    for path in &written {
        eprintln!("Created: {}", path.display());
    }

    println!("{}", formatter.success(&format!("Project {name} created")));
    if !formatter.is_json() {
        eprintln!("\nNext steps:");
        eprintln!("  1. cd {name}");
        eprintln!("  2. Set HALLDYLL_CONTROL_PLANE_URL and HALLDYLL_CONTROL_PLANE_TOKEN in .env");
        eprintln!("  3. Run 'halldyll-fn deploy'");
    }
    Ok(())
}

/// Write a handler skeleton.
fn cmd_generate(
    config_path: Option<&PathBuf>,
    function: &str,
    force: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let functions_dir = match resolve_config_path(config_path) {
        Ok(config_file) => {
            let config = ConfigParser::new().load_file(&config_file)?;
            config_dir(&config_file).join(config.project.functions_dir)
        }
        Err(e) => {
            debug!("No project found ({e}), writing under ./functions");
            PathBuf::from("functions")
        }
    };

    let generated = generate_function(&functions_dir, function, force)?;
    eprintln!("Created: {}", generated.handler_path.display());

    println!("{}", formatter.success(&format!("Function {function} generated")));
    if !formatter.is_json() {
        eprintln!("\nAdd it to the functions registry:\n\nfunctions:\n{}", generated.snippet);
    }
    Ok(())
}

/// Show function logs.
async fn cmd_logs(
    config_path: Option<&PathBuf>,
    function: Option<&str>,
    follow: bool,
    since: Option<Duration>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let project = load_project(config_path)?;
    let config = &project.config;

    let functions: Vec<String> = match function {
        Some(name) if config.function_names().contains(&name) => vec![name.to_string()],
        Some(name) => {
            return Err(ConfigError::validation(
                format!("Function '{name}' is not declared"),
                format!("functions.{name}"),
            )
            .into());
        }
        None => config
            .function_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };

    let start = match since {
        Some(age) => {
            let age = chrono::Duration::from_std(age)
                .map_err(|e| HalldyllError::internal(format!("Invalid --since value: {e}")))?;
            Some(Utc::now() - age)
        }
        None => None,
    };

    let reader = LogReader::new(create_control_plane()?);
    let mut cursors: HashMap<&str, LogCursor> = HashMap::new();

    loop {
        for name in &functions {
            let group = log_group_name(&deployed_function_name(&config.project.name, name));
            let cursor = cursors.entry(name.as_str()).or_default();

            let events = reader.fetch(&group, cursor.since().or(start)).await?;
            for event in cursor.advance(events) {
                println!("{}", formatter.format_log_event(name, &event));
            }
        }

        if !follow {
            return Ok(());
        }

        tokio::select! {
            () = tokio::time::sleep(FOLLOW_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Stopped following logs");
                return Ok(());
            }
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// A loaded and validated project.
struct Project {
    config: DeployConfig,
    config_dir: PathBuf,
    source_root: PathBuf,
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Directory holding the configuration file.
fn config_dir(config_file: &Path) -> PathBuf {
    config_file
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Loads and validates the configuration.
fn load_project(config_path: Option<&PathBuf>) -> Result<Project> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let config_dir = config_dir(&config_file);
    let parser = ConfigParser::new().with_base_path(&config_dir);
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;

    // Validate
    let validator = ConfigValidator::new();
    let result = validator.validate(&config)?;
    for warning in &result.warnings {
        warn!("{warning}");
    }

    let source_root = config_dir.join(&config.project.functions_dir);
    Ok(Project {
        config,
        config_dir,
        source_root,
    })
}

/// Creates the control plane client.
fn create_control_plane() -> Result<Arc<dyn ControlPlane>> {
    let url = ConfigParser::get_control_plane_url()?;
    let token = ConfigParser::get_control_plane_token()?;
    Ok(Arc::new(HttpControlPlane::new(&url, &token)?))
}

/// Creates the blob store named by the project profile.
async fn create_blob_store(project: &Project) -> Result<Arc<dyn BlobStore>> {
    let profile = &project.config.project;

    if profile.provider == LOCAL_PROVIDER {
        let base = project.config_dir.join(".halldyll").join("buckets");
        debug!("Using local bucket directory {}", base.display());
        return Ok(Arc::new(FsBlobStore::new(base, &profile.bucket)));
    }

    Ok(Arc::new(
        S3BlobStore::new(&profile.bucket, None, Some(&profile.region)).await?,
    ))
}

/// Creates the applier and repository used by rollback and destroy.
async fn create_applier(project: &Project) -> Result<(StackApplier, DeploymentRepository)> {
    let control = create_control_plane()?;
    let store = create_blob_store(project).await?;

    let waiter = StackWaiter::new(control.clone(), PollPolicy::default());
    Ok((
        StackApplier::new(control, waiter),
        DeploymentRepository::new(store),
    ))
}
