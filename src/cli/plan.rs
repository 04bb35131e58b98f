//! Plan command - show what an uplift would do

use crate::cli::style::{Stylize, link};
use anstream::println;
use phab_uplift::config::Settings;
use phab_uplift::error::Result;
use phab_uplift::graph::UnresolvedPolicy;
use phab_uplift::platform::{ReviewService, create_review_service};
use phab_uplift::store::SqliteStore;
use phab_uplift::types::Revision;
use phab_uplift::uplift::{NoopProgress, UpliftContext, UpliftOptions, UpliftPlan, analyze_uplift};
use phab_uplift::validation::{RevisionInput, parse_revision};

/// Run the plan command
pub async fn run_plan(
    settings: &Settings,
    revision: &str,
    repository: &str,
    partial: bool,
    dependencies_only: bool,
) -> Result<()> {
    let revision_id = parse_revision(&RevisionInput::from(revision))?;
    let repos = settings.repo_config();
    let service = create_review_service(settings).await?;
    let store = SqliteStore::open(settings.store_path()?).await?;

    let ctx = UpliftContext {
        service: service.as_ref(),
        store: &store,
        repos: &repos,
        options: UpliftOptions {
            unresolved_policy: if partial {
                UnresolvedPolicy::Partial
            } else {
                UnresolvedPolicy::Fail
            },
            dry_run: true,
            dependencies_only,
        },
    };
    let plan = analyze_uplift(&ctx, revision_id, repository, &NoopProgress).await?;
    print_plan(&plan, service.as_ref());
    Ok(())
}

fn revision_line(revision: &Revision, service: &dyn ReviewService) -> String {
    format!(
        "{} {}",
        link(&revision.id.to_string(), &service.revision_url(revision.id)).accent(),
        revision.title
    )
}

/// Print the stack, the uplift order and everything that is blocked
pub fn print_plan(plan: &UpliftPlan, service: &dyn ReviewService) {
    println!(
        "{}",
        format!(
            "Uplift of {} to {}",
            plan.source.id, plan.target.short_name
        )
        .emphasis()
    );
    println!();

    println!("{}", "Uplift order:".emphasis());
    for (i, revision) in plan.selected_revisions().into_iter().enumerate() {
        println!("  {}. {}", i + 1, revision_line(revision, service));
    }

    let mut others: Vec<&Revision> = plan
        .graph
        .revisions
        .values()
        .filter(|r| !plan.selected.contains(&r.phid))
        .collect();
    others.sort_by_key(|r| r.id);

    if !others.is_empty() {
        println!();
        println!("{}", "Not included:".emphasis());
        for revision in others {
            let note = if let Some(reason) = plan.landability.blocked.get(&revision.phid) {
                reason.to_string().warning()
            } else if plan.landability.landed.contains(&revision.phid) {
                format!("already landed on {}", plan.target.short_name).muted()
            } else {
                "does not depend on this revision".muted()
            };
            println!("  {} {}", revision_line(revision, service), note);
        }
    }

    if !plan.graph.unresolved.is_empty() {
        println!();
        println!("{}", "Unresolved:".emphasis());
        for phid in &plan.graph.unresolved {
            println!("  {}", phid.warning());
        }
    }
}
