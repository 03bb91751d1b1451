use clap::Parser;
use miette::{IntoDiagnostic, Result};

mod common;
mod daemon;

#[derive(Debug, Parser)]
#[clap(name = "granola")]
#[clap(bin_name = "granola")]
#[clap(author, version, about, long_about = None)]
pub struct Cli {}

fn main() -> Result<()> {
    Cli::parse();

    daemon::run().into_diagnostic()?;

    Ok(())
}
