//! Spinners and the compile progress bar

use super::context::UiContext;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner for a single long step
///
/// Without fancy output the start and stop messages become tagged lines.
pub struct TaskSpinner {
    fancy: bool,
    spinner: Option<cliclack::ProgressBar>,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            fancy: ctx.use_fancy_output(),
            spinner: None,
        }
    }

    pub fn start(&mut self, message: &str) {
        if !self.fancy {
            println!("{} {}", style("...").dim(), message);
            return;
        }
        let spinner = cliclack::spinner();
        spinner.start(message);
        self.spinner = Some(spinner);
    }

    pub fn stop(&mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) => spinner.stop(message),
            None => println!("{} {}", style("[OK]").green(), message),
        }
    }

    pub fn stop_error(&mut self, message: &str) {
        match self.spinner.take() {
            Some(spinner) => spinner.error(message),
            None => println!("{} {}", style("[FAIL]").red(), message),
        }
    }
}

/// Bar counting finished compile units
///
/// Interactive sessions get an indicatif bar; CI gets nothing until the
/// per-unit summary is printed.
pub struct CompileProgress {
    bar: Option<ProgressBar>,
}

impl CompileProgress {
    pub fn new(ctx: &UiContext, units: usize) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(units as u64);
            let template = ProgressStyle::default_bar()
                .template("  {spinner:.yellow} Compiling  {bar:20.yellow/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}")
                .map(|style| style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ").progress_chars("━╸─"));
            if let Ok(template) = template {
                bar.set_style(template);
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            None
        };
        Self { bar }
    }

    /// Record one finished unit
    pub fn unit_done(&self, unit: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_message(truncate(unit, 40));
            bar.inc(1);
        }
    }

    /// Finish and clear the bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
