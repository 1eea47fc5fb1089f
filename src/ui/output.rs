//! Output functions for consistent CLI formatting

use super::context::UiContext;
use console::style;

/// Display intro banner
pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::intro(style(title).cyan().bold()).ok();
    } else {
        println!("{}", style(title).cyan().bold());
        println!();
    }
}

/// Display success outro
pub fn outro_success(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).green().bold()).ok();
    } else {
        println!();
        println!("{} {}", style("[OK]").green(), message);
    }
}

/// Display error outro
pub fn outro_error(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).red().bold()).ok();
    } else {
        println!();
        println!("{} {}", style("[ERROR]").red(), message);
    }
}

/// Display an informational step line
pub fn step_info(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::info(message).ok();
    } else {
        println!("{} {}", style("i").blue(), message);
    }
}

/// Display a successful step with a dim detail suffix
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    let line = format!("{} {}", message, style(detail).dim());
    if ctx.use_fancy_output() {
        cliclack::log::success(line).ok();
    } else {
        println!("{} {}", style("[OK]").green(), line);
    }
}

/// Display a warning step with a hint
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    let line = format!("{} ({})", message, hint);
    if ctx.use_fancy_output() {
        cliclack::log::warning(line).ok();
    } else {
        println!("{} {}", style("[WARN]").yellow(), line);
    }
}
