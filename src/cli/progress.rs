//! Shared CLI progress callback

use crate::cli::style::{Stylize, check, cross};
use anstream::{eprintln, println};
use async_trait::async_trait;
use phab_uplift::error::Error;
use phab_uplift::types::RevisionId;
use phab_uplift::uplift::{Phase, ProgressCallback, ReplicationStatus};

/// CLI progress callback that prints to stdout
///
/// Two modes:
/// - verbose (single repository): shows all phases, detailed messages
/// - compact (several repositories): replication lines only, indented
pub struct CliProgress {
    /// Verbose mode shows all phases and detailed output
    pub verbose: bool,
}

impl CliProgress {
    /// Create verbose progress
    pub const fn verbose() -> Self {
        Self { verbose: true }
    }

    /// Create compact progress
    pub const fn compact() -> Self {
        Self { verbose: false }
    }
}

#[async_trait]
impl ProgressCallback for CliProgress {
    async fn on_phase(&self, phase: Phase) {
        if self.verbose {
            println!("{}", format!("{phase}...").muted());
        } else if phase == Phase::Replicating {
            println!("  {phase}...");
        }
    }

    async fn on_revision(&self, revision: RevisionId, status: ReplicationStatus) {
        let indent = if self.verbose { "  " } else { "    " };
        match &status {
            ReplicationStatus::Started => {
                if self.verbose {
                    println!("{indent}Replicating {}...", revision.accent());
                }
            }
            ReplicationStatus::Replicated(target) => {
                println!("{indent}{} {} -> {}", check(), revision.accent(), target.id.accent());
            }
            ReplicationStatus::Skipped(_) => {
                println!("{indent}- {} {}", revision.accent(), status.muted());
            }
            ReplicationStatus::Failed(_) => {
                println!("{indent}{} {} {}", cross(), revision.accent(), status.failure());
            }
        }
    }

    async fn on_error(&self, error: &Error) {
        if self.verbose {
            eprintln!("{} {error}", "Error:".failure());
        }
    }

    async fn on_message(&self, message: &str) {
        if self.verbose {
            println!("{message}");
        } else {
            println!("  {message}");
        }
    }
}
