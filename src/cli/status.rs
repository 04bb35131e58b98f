//! Status and transition commands - inspect and move uplift requests

use crate::cli::style::{Stylize, check};
use anstream::println;
use phab_uplift::config::Settings;
use phab_uplift::error::{Error, Result};
use phab_uplift::request::UpliftRequest;
use phab_uplift::store::{SqliteStore, RequestFilter, UpliftStore};
use phab_uplift::types::UpliftStatus;
use phab_uplift::validation::{RevisionInput, parse_revision};

fn status_label(status: UpliftStatus) -> String {
    let text = format!("{status:<8}");
    match status {
        UpliftStatus::Created => text.accent(),
        UpliftStatus::Approved | UpliftStatus::Landed => text.success(),
        UpliftStatus::Rejected => text.warning(),
        UpliftStatus::Failed => text.failure(),
    }
}

fn print_request(request: &UpliftRequest) {
    let target = request
        .target_revision_id
        .map_or_else(|| "-".to_string(), |t| t.to_string());
    println!(
        "#{:<5} {:<8} {:<18} {} -> {:<8} {}",
        request.id,
        request.revision_id.to_string(),
        request.repository,
        status_label(request.status),
        target,
        request
            .updated_at
            .format("%Y-%m-%d %H:%M")
            .to_string()
            .muted()
    );
    if let Some(error) = &request.last_error {
        println!("       {}", error.failure());
    }
}

/// Run the status command
pub async fn run_status(
    settings: &Settings,
    revision: Option<&str>,
    repository: Option<&str>,
    status: Option<&str>,
) -> Result<()> {
    let filter = RequestFilter {
        revision_id: revision
            .map(|r| parse_revision(&RevisionInput::from(r)))
            .transpose()?,
        repository: repository.map(str::to_string),
        status: status.map(str::parse::<UpliftStatus>).transpose()?,
    };

    let store = SqliteStore::open(settings.store_path()?).await?;
    let requests = store.list(&filter).await?;

    if requests.is_empty() {
        println!("No uplift requests");
        return Ok(());
    }
    for request in &requests {
        print_request(request);
    }
    Ok(())
}

/// Run the transition command
pub async fn run_transition(settings: &Settings, id: u64, status: &str) -> Result<()> {
    let next: UpliftStatus = status.parse()?;
    let store = SqliteStore::open(settings.store_path()?).await?;
    let current = store.get(id).await?.ok_or(Error::RequestNotFound(id))?;
    let updated = store.transition(id, current.status, next).await?;
    println!(
        "{} Request #{} is now {}",
        check(),
        updated.id,
        updated.status.accent()
    );
    Ok(())
}
