//! Banner and step lines
//!
//! Interactive runs go through cliclack's log framing; everything else gets a
//! bracketed tag per line so CI logs stay greppable.

use super::context::UiContext;
use console::{style, StyledObject};

#[derive(Debug, Clone, Copy)]
enum Tag {
    Ok,
    Warn,
    Fail,
    Info,
    Blocked,
}

impl Tag {
    fn label(self) -> StyledObject<&'static str> {
        match self {
            Self::Ok => style("[OK]").green(),
            Self::Warn => style("[WARN]").yellow(),
            Self::Fail => style("[FAIL]").red(),
            Self::Info => style("[INFO]").cyan(),
            Self::Blocked => style("[-]").dim(),
        }
    }
}

fn step(ctx: &UiContext, tag: Tag, line: String) {
    if !ctx.use_fancy_output() {
        println!("  {} {}", tag.label(), line);
        return;
    }
    let written = match tag {
        Tag::Ok => cliclack::log::success(line),
        Tag::Warn => cliclack::log::warning(line),
        Tag::Fail => cliclack::log::error(line),
        Tag::Info | Tag::Blocked => cliclack::log::info(line),
    };
    written.ok();
}

/// Title line opening a command's output
pub fn intro(ctx: &UiContext, title: &str) {
    let title = style(title).yellow().bold();
    if ctx.use_fancy_output() {
        cliclack::intro(title).ok();
    } else {
        println!("{}\n", title);
    }
}

fn outro(ctx: &UiContext, message: StyledObject<&str>, tag: Tag) {
    if ctx.use_fancy_output() {
        cliclack::outro(message.bold()).ok();
    } else {
        println!("\n{} {}", tag.label(), message);
    }
}

pub fn outro_success(ctx: &UiContext, message: &str) {
    outro(ctx, style(message).green(), Tag::Ok);
}

pub fn outro_error(ctx: &UiContext, message: &str) {
    outro(ctx, style(message).red(), Tag::Fail);
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    step(ctx, Tag::Ok, message.to_string());
}

/// `message (detail)`, detail dimmed
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    step(ctx, Tag::Ok, format!("{} ({})", message, style(detail).dim()));
}

pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    step(ctx, Tag::Warn, format!("{} - {}", message, style(hint).dim()));
}

pub fn step_error_detail(ctx: &UiContext, message: &str, detail: &str) {
    step(ctx, Tag::Fail, format!("{}: {}", message, style(detail).red()));
}

pub fn step_info(ctx: &UiContext, message: &str) {
    step(ctx, Tag::Info, message.to_string());
}

/// A unit that never ran because `dependency` failed
pub fn step_blocked(ctx: &UiContext, name: &str, dependency: &str) {
    step(
        ctx,
        Tag::Blocked,
        format!("{} {}", style(name).dim(), style(format!("(requires {})", dependency)).dim()),
    );
}

/// Dimmed follow-up line under a step, usually an error hint
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::remark(message).ok();
    } else {
        println!("      {}", style(message).dim());
    }
}
