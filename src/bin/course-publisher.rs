//! Course Publisher CLI
//!
//! Publish, withdraw and batch-publish courses against local storage

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use course_publisher::adapters::{
    FsArtifactStore, HttpContentSource, JsonCourseRepository, JsonlAuditLog, LogNotifier,
    MemoryContentSource, sample_content,
};
use course_publisher::{
    AdapterError, ConfigLoadOptions, ConfigLoader, ContentSource, Course, CourseRepository,
    PublishOutcome, Publisher, PublisherConfig, RuleRunner, SourceCredentials, format_history,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_BUSY: i32 = 2;

/// Course publishing pipeline
#[derive(Parser)]
#[command(name = "course-publisher")]
#[command(version)]
#[command(about = "Publish course content as versioned artifacts", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./course-publisher.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish the current content of a course
    Publish {
        #[arg(value_name = "APP")]
        app_name: String,
    },

    /// Withdraw a course from the live catalog
    Unpublish {
        #[arg(value_name = "APP")]
        app_name: String,
    },

    /// Publish several courses and send a summary
    Rules {
        #[arg(value_name = "APP", required = true)]
        app_names: Vec<String>,
    },

    /// Register a course in the course repository
    Seed {
        #[arg(value_name = "APP")]
        app_name: String,

        /// Content-source token (falls back to $COURSE_SOURCE_TOKEN)
        #[arg(long)]
        token: Option<String>,

        /// Content space on the source side
        #[arg(long)]
        space: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(EXIT_FAILURE);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = ConfigLoader::load(ConfigLoadOptions::from_process(cli.config.clone()))
        .await
        .context("failed to load configuration")?;

    match cli.command {
        Commands::Publish { app_name } => {
            let publisher = build_publisher(&config)?;
            let outcome = publisher.publish(&app_name).await;
            report(&publisher, &app_name, &outcome)
        }
        Commands::Unpublish { app_name } => {
            let publisher = build_publisher(&config)?;
            let outcome = publisher.unpublish(&app_name).await;
            report(&publisher, &app_name, &outcome)
        }
        Commands::Rules { app_names } => rules_command(&config, app_names).await,
        Commands::Seed {
            app_name,
            token,
            space,
        } => seed_command(&config, app_name, token, space).await,
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn build_publisher(config: &PublisherConfig) -> Result<Publisher> {
    let source: Arc<dyn ContentSource> = match &config.content_source.base_url {
        Some(base_url) => Arc::new(
            HttpContentSource::new(base_url.as_str())
                .context("failed to build content source client")?,
        ),
        None => {
            warn!("no contentSource.baseUrl configured; serving the built-in sample course");
            Arc::new(MemoryContentSource::new(sample_content()))
        }
    };

    Ok(Publisher::new(
        source,
        Arc::new(FsArtifactStore::new(&config.storage.artifact_dir)),
        Arc::new(JsonCourseRepository::new(&config.storage.courses_file)),
        Arc::new(JsonlAuditLog::new(&config.storage.audit_file)),
        config,
    ))
}

/// Print the outcome and map it to an exit code
///
/// The JSON outcome goes to stdout; the phase history and any suggested
/// actions go to stderr.
fn report(publisher: &Publisher, app_name: &str, outcome: &PublishOutcome) -> Result<i32> {
    println!("{}", serde_json::to_string_pretty(outcome)?);

    let history = publisher.history(app_name);
    if !history.is_empty() {
        eprintln!("{}", format_history(&history));
    }

    Ok(match outcome {
        PublishOutcome::Busy { .. } => EXIT_BUSY,
        PublishOutcome::Completed { result } if result.succeeded => EXIT_SUCCESS,
        PublishOutcome::Completed { result } => {
            for error in &result.errors {
                eprintln!("\n{} ({})", error.code, error.phase);
                for action in &error.suggested_actions {
                    eprintln!("  - {action}");
                }
            }
            EXIT_FAILURE
        }
    })
}

async fn rules_command(config: &PublisherConfig, app_names: Vec<String>) -> Result<i32> {
    let publisher = build_publisher(config)?;
    let runner = RuleRunner::new(publisher, Arc::new(LogNotifier), config.rules.clone());

    let summary = runner.run(app_names).await;
    println!("{}", summary.log());

    Ok(if summary.failed_count == 0 {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

async fn seed_command(
    config: &PublisherConfig,
    app_name: String,
    token: Option<String>,
    space: Option<String>,
) -> Result<i32> {
    let credentials = match token {
        Some(token) => SourceCredentials::new(space, token),
        None => SourceCredentials::from_env(space, None)
            .context("no --token given and COURSE_SOURCE_TOKEN is not set")?,
    };

    let repository = JsonCourseRepository::new(&config.storage.courses_file);
    let course = match repository.load(&app_name).await {
        Ok(mut existing) => {
            existing.credentials = credentials;
            existing
        }
        Err(AdapterError::NotFound(_)) => Course::new(&app_name, credentials),
        Err(e) => return Err(e).context("failed to read the course repository"),
    };

    repository
        .save(&course)
        .await
        .with_context(|| format!("failed to save {app_name}"))?;

    info!(
        app_name = %course.app_name,
        token = %course.credentials.masked(),
        file = %repository.path().display(),
        "course registered"
    );
    Ok(EXIT_SUCCESS)
}
