//! Terminal output helpers
//!
//! Fancy output (cliclack) in interactive terminals, plain lines in CI.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{intro, outro_error, outro_success, step_info, step_ok_detail, step_warn_hint};
pub use progress::TaskSpinner;
