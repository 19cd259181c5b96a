//! Merge a set of execution data files into a single file.
//!
//! ```bash
//! execmerge --destfile merged.exec part1.exec part2.exec part3.exec
//! ```
//!
//! Directories among the inputs are skipped (not recursed). Any read or
//! parse error aborts the whole merge - partial output is never written.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use classcov::merge::merge_files;

#[derive(Parser, Debug)]
#[command(name = "execmerge", version)]
struct Args {
    /// Location of the merged data store
    #[arg(long)]
    destfile: PathBuf,

    /// Execution data files to merge
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    merge_files(&args.destfile, &args.files)?;
    Ok(())
}
