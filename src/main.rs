//! uplift - request uplifts of reviewed Phabricator stacks
//!
//! CLI binary for replicating revisions onto approval-gated release
//! repositories and tracking the resulting uplift requests.

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use phab_uplift::config::Settings;
use phab_uplift::validation::{RevisionInput, UpliftPayload};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli;

#[derive(Parser)]
#[command(name = "uplift")]
#[command(about = "Uplift reviewed Phabricator revision stacks to release repositories")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request an uplift of a revision and its dependencies
    Request {
        /// Revision to uplift (123, D123 or revision URL)
        revision: String,

        /// Target repository (repeatable)
        #[arg(long = "repo", required = true)]
        repositories: Vec<String>,

        /// Risk of the change: low, medium or high
        #[arg(long)]
        risk: String,

        /// Who is affected and how
        #[arg(long)]
        user_impact: String,

        /// How to reproduce the problem
        #[arg(long, default_value = "")]
        steps_to_reproduce: String,

        /// Why the change is or is not risky
        #[arg(long, default_value = "")]
        risky: String,

        /// Localized string changes
        #[arg(long, default_value = "")]
        string_changes: String,

        /// The change is covered by automated tests
        #[arg(long)]
        automated_tests: bool,

        /// The change was verified on nightly
        #[arg(long)]
        nightly: bool,

        /// Bug fixed by the change (repeatable)
        #[arg(long = "bug", allow_negative_numbers = true)]
        bug_ids: Vec<i64>,

        /// Continue when some stack members cannot be resolved
        #[arg(long)]
        partial: bool,

        /// Only uplift the revision and its dependencies, not revisions stacked on top
        #[arg(long)]
        dependencies_only: bool,

        /// Dry run - show what would be done without making changes
        #[arg(long)]
        dry_run: bool,

        /// Preview plan and prompt for confirmation before executing
        #[arg(long, short = 'c')]
        confirm: bool,
    },

    /// Show what an uplift would replicate
    Plan {
        /// Revision to uplift
        revision: String,

        /// Target repository
        #[arg(long = "repo")]
        repository: String,

        /// Continue when some stack members cannot be resolved
        #[arg(long)]
        partial: bool,

        /// Only uplift the revision and its dependencies, not revisions stacked on top
        #[arg(long)]
        dependencies_only: bool,
    },

    /// List stored uplift requests
    Status {
        /// Only requests for this revision
        #[arg(long)]
        revision: Option<String>,

        /// Only requests for this repository
        #[arg(long = "repo")]
        repository: Option<String>,

        /// Only requests in this status
        #[arg(long)]
        status: Option<String>,
    },

    /// Move an uplift request to a new status
    Transition {
        /// Request id
        id: u64,

        /// New status: approved, rejected, landed, failed or created
        status: String,
    },

    /// Authentication management
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Test authentication
    Test,
    /// Show authentication setup instructions
    Setup,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Request {
            revision,
            repositories,
            risk,
            user_impact,
            steps_to_reproduce,
            risky,
            string_changes,
            automated_tests,
            nightly,
            bug_ids,
            partial,
            dependencies_only,
            dry_run,
            confirm,
        } => {
            let payload = UpliftPayload {
                revision_id: RevisionInput::Text(revision),
                repositories,
                risk,
                user_impact,
                steps_to_reproduce,
                risky,
                string_changes,
                automated_tests,
                nightly,
                bug_ids,
            };
            let failed = cli::run_request(
                &settings,
                &payload,
                cli::RequestOptions {
                    dry_run,
                    confirm,
                    partial,
                    dependencies_only,
                },
            )
            .await?;
            if failed > 0 {
                bail!("{failed} revision(s) failed to replicate");
            }
        }
        Commands::Plan {
            revision,
            repository,
            partial,
            dependencies_only,
        } => {
            cli::run_plan(&settings, &revision, &repository, partial, dependencies_only).await?;
        }
        Commands::Status {
            revision,
            repository,
            status,
        } => {
            cli::run_status(
                &settings,
                revision.as_deref(),
                repository.as_deref(),
                status.as_deref(),
            )
            .await?;
        }
        Commands::Transition { id, status } => {
            cli::run_transition(&settings, id, &status).await?;
        }
        Commands::Auth { action } => {
            let action_str = match action {
                AuthAction::Test => "test",
                AuthAction::Setup => "setup",
            };
            cli::run_auth(&settings, action_str).await?;
        }
    }

    Ok(())
}
