//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a session configuration file and print the effective settings
    Config {
        /// TOML configuration file; defaults are shown when omitted
        file: Option<PathBuf>,
    },
    /// Inspect a local contact cache snapshot
    Cache {
        #[command(subcommand)]
        kind: CacheKind,
    },
}

#[derive(Subcommand)]
pub enum CacheKind {
    /// Friend list snapshot
    Friends(SnapshotArgs),
    /// Group member list snapshot
    Group(SnapshotArgs),
}

#[derive(clap::Args)]
pub struct SnapshotArgs {
    /// Snapshot file
    pub file: PathBuf,

    /// Print the full snapshot as JSON instead of a summary
    #[arg(long)]
    pub json: bool,

    /// Rewrite the snapshot in canonical form
    #[arg(long)]
    pub compact: bool,
}
