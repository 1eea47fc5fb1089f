//! Cache command - inspect and prune materialized source trees

use crate::cache::{CacheEntry, CacheManager};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::ShelfResult;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> ShelfResult<()> {
    let cache = CacheManager::new(ConfigManager::cache_dir(), &config.cache);

    match args.action {
        CacheAction::List { format } => list(&cache, format).await,
        CacheAction::Gc { days } => gc(&cache, days.unwrap_or(config.cache.gc_days)).await,
        CacheAction::Clear { yes } => clear(&cache, yes).await,
    }
}

async fn list(cache: &CacheManager, format: OutputFormat) -> ShelfResult<()> {
    let entries = cache.list().await?;

    if entries.is_empty() {
        match format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_info(&ctx, "Cache is empty");
            }
        }
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_table(&entries),
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}@{}", entry.name, entry.version);
            }
        }
    }

    Ok(())
}

fn print_table(entries: &[CacheEntry]) {
    let ctx = UiContext::detect();
    ui::intro(&ctx, "Cache");

    println!(
        "{:<20} {:<20} {:<20}",
        style("NAME").bold(),
        style("VERSION").bold(),
        style("REFRESHED").bold()
    );
    println!("{}", "-".repeat(60));

    for entry in entries {
        println!(
            "{:<20} {:<20} {:<20}",
            entry.name,
            entry.version,
            entry.last_refreshed.format("%Y-%m-%d %H:%M")
        );
    }

    println!();
    println!("{} entry(ies)", entries.len());
}

async fn gc(cache: &CacheManager, days: u32) -> ShelfResult<()> {
    let ctx = UiContext::detect();

    if days == 0 {
        ui::step_warn_hint(
            &ctx,
            "Cache gc is disabled",
            "set cache.gc_days or pass --days",
        );
        return Ok(());
    }

    let removed = cache.gc(days).await?;
    ui::outro_success(&ctx, &format!("Removed {removed} stale entry(ies)"));
    Ok(())
}

async fn clear(cache: &CacheManager, yes: bool) -> ShelfResult<()> {
    let ctx = UiContext::detect();

    if !yes {
        ui::step_warn_hint(
            &ctx,
            &format!(
                "This removes every cached source tree under {}",
                cache.root().display()
            ),
            "re-run with --yes to confirm",
        );
        return Ok(());
    }

    let removed = cache.clear().await?;
    ui::outro_success(&ctx, &format!("Removed {removed} entry(ies)"));
    Ok(())
}
