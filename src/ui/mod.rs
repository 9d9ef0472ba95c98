//! Terminal output
//!
//! Uses `cliclack` for framing and prompts, with plain-text fallback in CI
//! and other non-interactive environments.

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, outro_error, outro_success, remark, step_blocked, step_error_detail, step_info,
    step_ok, step_ok_detail, step_warn_hint,
};
pub use progress::{CompileProgress, TaskSpinner};
pub use prompts::confirm;
pub use theme::init_theme;
