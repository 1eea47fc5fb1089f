//! List command - show libraries visible from the current scope chain

use crate::cli::args::{ListArgs, OutputFormat};
use crate::cli::commands::build_engine;
use crate::cli::LocalScope;
use crate::config::Config;
use crate::error::ShelfResult;
use crate::registry::ResolvedConfig;
use crate::retrieve::Retriever;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config, local: Option<&LocalScope>) -> ShelfResult<()> {
    let engine = build_engine(config, local)?;
    let visible = engine.registry.visible(&engine.chain);

    if visible.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_info(&ctx, "No libraries configured");
            }
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&visible),
        OutputFormat::Json => print_json(&visible)?,
        OutputFormat::Plain => print_plain(&visible),
    }

    Ok(())
}

fn print_table(visible: &[ResolvedConfig]) {
    let ctx = UiContext::detect();
    ui::intro(&ctx, "Libraries");

    println!(
        "{:<20} {:<16} {:<10} {:<8} {:<10} {:<8}",
        style("NAME").bold(),
        style("DEFAULT").bold(),
        style("SOURCE").bold(),
        style("TRUSTED").bold(),
        style("SCOPE").bold(),
        style("IMPLICIT").bold()
    );
    println!("{}", "-".repeat(74));

    for resolved in visible {
        let config = &resolved.config;
        let trusted = if resolved.trusted {
            style("yes").green()
        } else {
            style("no").yellow()
        };
        println!(
            "{:<20} {:<16} {:<10} {:<8} {:<10} {:<8}",
            config.name,
            config.default_version.as_deref().unwrap_or("-"),
            config.retriever.kind(),
            trusted,
            resolved.scope,
            if config.implicit { "yes" } else { "no" }
        );
    }

    println!();
    println!("{} library(ies)", visible.len());
}

fn print_json(visible: &[ResolvedConfig]) -> ShelfResult<()> {
    let entries: Vec<_> = visible
        .iter()
        .map(|r| {
            serde_json::json!({
                "name": r.config.name,
                "default_version": r.config.default_version,
                "source": r.config.retriever.kind(),
                "allow_version_override": r.config.allow_version_override,
                "implicit": r.config.implicit,
                "scope": r.scope.to_string(),
                "trusted": r.trusted,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn print_plain(visible: &[ResolvedConfig]) {
    for resolved in visible {
        println!("{}", resolved.config.name);
    }
}
