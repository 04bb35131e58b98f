//! Auth command - test and manage authentication

use crate::cli::style::{Stylize, check, spinner_style};
use anstream::println;
use indicatif::ProgressBar;
use phab_uplift::auth::{authenticate, get_phabricator_auth};
use phab_uplift::config::{Settings, default_config_path};
use phab_uplift::error::Result;
use phab_uplift::platform::create_review_service;
use std::time::Duration;

/// Run the auth test command
pub async fn run_auth_test(settings: &Settings) -> Result<()> {
    let url = settings.phabricator_url()?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message("Testing Phabricator authentication...");
    spinner.enable_steady_tick(Duration::from_millis(80));

    let config = get_phabricator_auth(url).await?;
    let service = create_review_service(settings).await?;
    let requester = authenticate(service.as_ref()).await;

    spinner.finish_and_clear();
    let requester = requester?;
    println!("{} Authenticated as: {}", check(), requester.username.accent());
    println!("  {} {}", "Email:".muted(), requester.email);
    println!("  {} {:?}", "Token source:".muted(), config.source);
    println!("  {} {}", "Host:".muted(), config.host);
    Ok(())
}

/// Run the auth setup command (show instructions)
pub fn run_auth_setup() {
    println!("{}", "Phabricator Authentication Setup".emphasis());
    println!();
    println!("{}", "Step 1: Create an API token".emphasis());
    println!("  Open {} on your Phabricator instance", "Settings > Conduit API Tokens".accent());
    println!("  and generate a new token ({}...)", "api-".accent());
    println!();
    println!("{}", "Step 2: Make the token available".emphasis());
    println!("  Option 1: export {}=<your-token>", "PHABRICATOR_API_TOKEN".accent());
    println!("  Option 2: run {}", "arc install-certificate".accent());
    println!("            (stores the token in {})", "~/.arcrc".accent());
    println!();
    println!("{}", "Step 3: Point uplift at the instance".emphasis());
    println!("  export {}=https://phabricator.example.com/", "PHABRICATOR_URL".accent());
    if let Some(path) = default_config_path() {
        println!(
            "  {}",
            format!("or set phabricator_url in {}", path.display()).muted()
        );
    }
}

/// Wrapper for auth commands
pub async fn run_auth(settings: &Settings, action: &str) -> Result<()> {
    match action {
        "test" => run_auth_test(settings).await,
        "setup" => {
            run_auth_setup();
            Ok(())
        }
        _ => {
            println!(
                "{}",
                format!("Unknown action: {action}. Use 'test' or 'setup'.").muted()
            );
            Ok(())
        }
    }
}
