//! CLI command implementations

mod auth;
mod plan;
mod progress;
mod request;
mod status;
pub mod style;

pub use auth::run_auth;
pub use plan::run_plan;
pub use progress::CliProgress;
pub use request::{RequestOptions, run_request};
pub use status::{run_status, run_transition};
