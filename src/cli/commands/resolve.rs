//! Resolve command - run a one-shot session over library references

use crate::cli::args::{OutputFormat, ResolveArgs};
use crate::cli::commands::build_engine;
use crate::cli::LocalScope;
use crate::config::{Config, ConfigManager};
use crate::error::{ShelfError, ShelfResult};
use crate::resolver::LibraryReference;
use crate::retrieve::RetrieverSpec;
use crate::session::{LoadedLibrary, SessionId};
use crate::ui::{self, TaskSpinner, UiContext};
use console::style;
use std::sync::Arc;

/// Execute the resolve command
pub async fn execute(
    args: ResolveArgs,
    config: &Config,
    local: Option<&LocalScope>,
) -> ShelfResult<()> {
    let ctx = UiContext::detect();
    let engine = build_engine(config, local)?;

    let session = match args.session {
        Some(ref name) => SessionId::named(name),
        None => SessionId::new(),
    };

    let references = parse_references(&args)?;

    if matches!(args.format, OutputFormat::Table) {
        ui::intro(&ctx, &format!("Session {session}"));
    }

    if !args.no_implicit && config.resolver.load_implicit {
        engine
            .resolver
            .load_implicit(&session, &engine.chain)
            .await?;
    }

    for reference in &references {
        let mut spinner = TaskSpinner::new(&ctx);
        if matches!(args.format, OutputFormat::Table) {
            spinner.start(&format!("Resolving {reference}"));
        }

        match engine.resolver.resolve(&session, &engine.chain, reference).await {
            Ok(library) => {
                if matches!(args.format, OutputFormat::Table) {
                    spinner.stop(&format!(
                        "{} {}",
                        reference.name,
                        style(format!("@{}", library.record.version)).dim()
                    ));
                }
            }
            Err(e) => {
                if matches!(args.format, OutputFormat::Table) {
                    spinner.stop_error(&format!("Failed to resolve {reference}"));
                }
                return Err(e);
            }
        }
    }

    // The session ledger is the authoritative trace: first-reference
    // order, duplicates collapsed.
    let loaded = engine.resolver.store().list(&session).await;

    match args.format {
        OutputFormat::Table => print_table(&loaded),
        OutputFormat::Json => print_json(&loaded)?,
        OutputFormat::Plain => print_plain(&loaded),
    }

    if !args.no_trace {
        let path = engine
            .resolver
            .store()
            .persist_trace(&session, &ConfigManager::sessions_dir())
            .await?;
        if matches!(args.format, OutputFormat::Table) {
            ui::step_ok_detail(&ctx, "Record trace written", &path.display().to_string());
        }
    }

    if matches!(args.format, OutputFormat::Table) {
        ui::outro_success(&ctx, &format!("{} library(ies) loaded", loaded.len()));
    }

    Ok(())
}

fn parse_references(args: &ResolveArgs) -> ShelfResult<Vec<LibraryReference>> {
    if let Some(ref retriever_json) = args.retriever {
        // Ad-hoc source: applies to exactly one reference.
        if args.references.len() != 1 {
            return Err(ShelfError::User(
                "--retriever applies to exactly one reference".to_string(),
            ));
        }
        let spec: RetrieverSpec =
            serde_json::from_str(retriever_json).map_err(|e| ShelfError::InvalidReference {
                reference: retriever_json.clone(),
                reason: format!("invalid retriever spec: {e}"),
            })?;
        return Ok(vec![LibraryReference::with_retriever(
            &args.references[0],
            spec,
        )?]);
    }

    args.references
        .iter()
        .map(|r| LibraryReference::parse(r))
        .collect()
}

fn print_table(loaded: &[Arc<LoadedLibrary>]) {
    if loaded.is_empty() {
        return;
    }

    println!();
    println!(
        "{:<20} {:<16} {:<8} {:<30}",
        style("NAME").bold(),
        style("VERSION").bold(),
        style("TRUSTED").bold(),
        style("VARIABLES").bold()
    );
    println!("{}", "-".repeat(76));

    for library in loaded {
        let record = &library.record;
        let trusted = if record.trusted {
            style("yes").green()
        } else {
            style("no").yellow()
        };
        println!(
            "{:<20} {:<16} {:<8} {:<30}",
            record.name,
            record.version,
            trusted,
            record.variables.join(", ")
        );
    }
}

fn print_json(loaded: &[Arc<LoadedLibrary>]) -> ShelfResult<()> {
    let records: Vec<_> = loaded.iter().map(|l| &l.record).collect();
    let json = serde_json::to_string_pretty(&records)?;
    println!("{}", json);
    Ok(())
}

fn print_plain(loaded: &[Arc<LoadedLibrary>]) {
    for library in loaded {
        println!("{}", library.record);
    }
}
