//! Completions command - emit shell completion scripts

use crate::cli::args::{Cli, CompletionsArgs};
use crate::error::ShelfResult;
use clap::CommandFactory;
use clap_complete::generate;

/// Execute the completions command
pub fn execute(args: CompletionsArgs) -> ShelfResult<()> {
    let mut command = Cli::command();
    generate(args.shell, &mut command, "shelf", &mut std::io::stdout());
    Ok(())
}
