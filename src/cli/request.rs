//! Request command - uplift a revision stack to release repositories

use crate::cli::CliProgress;
use crate::cli::plan::print_plan;
use crate::cli::style::{Stylize, check, cross, link, spinner_style};
use anstream::{eprintln, println};
use dialoguer::Confirm;
use indicatif::ProgressBar;
use phab_uplift::auth::authenticate;
use phab_uplift::config::Settings;
use phab_uplift::error::{Error, Result};
use phab_uplift::graph::UnresolvedPolicy;
use phab_uplift::platform::{ReviewService, create_review_service};
use phab_uplift::store::SqliteStore;
use phab_uplift::uplift::{
    NoopProgress, RevisionOutcome, UpliftContext, UpliftOptions, UpliftOutcome,
    create_uplift_requests,
};
use phab_uplift::validation::{UpliftPayload, validate_payload};
use std::time::Duration;

/// Options for the request command
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOptions {
    /// Dry run - show what would be done without making changes
    pub dry_run: bool,
    /// Preview plan and prompt for confirmation before executing
    pub confirm: bool,
    /// Continue when some stack members cannot be resolved
    pub partial: bool,
    /// Leave revisions stacked on top of the source behind
    pub dependencies_only: bool,
}

/// Run the request command
///
/// Returns the number of revisions that failed to replicate.
pub async fn run_request(
    settings: &Settings,
    payload: &UpliftPayload,
    options: RequestOptions,
) -> Result<usize> {
    let repos = settings.repo_config();
    let uplift = validate_payload(payload, &repos)?;

    let service = create_review_service(settings).await?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message("Checking credentials...");
    spinner.enable_steady_tick(Duration::from_millis(80));
    let requester = authenticate(service.as_ref()).await;
    spinner.finish_and_clear();
    let requester = requester?;

    let store = SqliteStore::open(settings.store_path()?).await?;

    let mut ctx = UpliftContext {
        service: service.as_ref(),
        store: &store,
        repos: &repos,
        options: UpliftOptions {
            unresolved_policy: if options.partial {
                UnresolvedPolicy::Partial
            } else {
                UnresolvedPolicy::Fail
            },
            dry_run: true,
            dependencies_only: options.dependencies_only,
        },
    };

    // Show confirmation if requested
    if options.confirm && !options.dry_run {
        let preview = create_uplift_requests(&ctx, &uplift, &requester, &NoopProgress).await?;
        for outcome in &preview {
            print_plan(&outcome.plan, service.as_ref());
        }
        if !Confirm::new()
            .with_prompt("Proceed with uplift?")
            .default(true)
            .interact()
            .map_err(|e| Error::Internal(format!("Failed to read confirmation: {e}")))?
        {
            println!("Aborted");
            return Ok(0);
        }
        println!();
    }

    ctx.options.dry_run = options.dry_run;
    let progress = if uplift.repositories.len() == 1 {
        CliProgress::verbose()
    } else {
        CliProgress::compact()
    };
    let outcomes = create_uplift_requests(&ctx, &uplift, &requester, &progress).await?;

    let mut failed = 0;
    for outcome in &outcomes {
        if outcome.dry_run {
            print_plan(&outcome.plan, service.as_ref());
        } else {
            print_outcome(outcome, service.as_ref());
            failed += outcome.failed_count();
        }
    }
    Ok(failed)
}

fn print_outcome(outcome: &UpliftOutcome, service: &dyn ReviewService) {
    println!();
    println!("{}", format!("Uplift to {}", outcome.repository).emphasis());
    for revision in &outcome.revisions {
        let id = revision.revision_id();
        let source = link(&id.to_string(), &service.revision_url(id));
        match revision {
            RevisionOutcome::Replicated(request) => {
                let target = request.target_revision_id.map_or_else(String::new, |t| {
                    link(&t.to_string(), &service.revision_url(t))
                });
                println!(
                    "  {} {} -> {} {}",
                    check(),
                    source.accent(),
                    target.accent(),
                    format!("(request #{})", request.id).muted()
                );
            }
            RevisionOutcome::Skipped { reason, .. } => {
                println!("  - {} {}", source.accent(), reason.muted());
            }
            RevisionOutcome::Failed { request, error } => {
                println!(
                    "  {} {} {} {}",
                    cross(),
                    source.accent(),
                    error.failure(),
                    format!("(request #{})", request.id).muted()
                );
            }
        }
    }

    let replicated = outcome.replicated_count();
    let failed = outcome.failed_count();
    if failed == 0 {
        println!(
            "Replicated {replicated} revision{}, skipped {}",
            if replicated == 1 { "" } else { "s" },
            outcome.skipped_count()
        );
    } else {
        eprintln!(
            "{}",
            format!(
                "{failed} revision{} failed; rerun the request to retry",
                if failed == 1 { "" } else { "s" }
            )
            .failure()
        );
    }
}
