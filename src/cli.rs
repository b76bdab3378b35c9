//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI parser for `apparatus`.
#[derive(Debug, Parser)]
#[command(name = "apparatus", version, about = "Resolve critical-apparatus pointers into witness documents")]
pub struct Cli {
    /// Directory or URL prefix holding the `spine_CNN.xml` files.
    #[arg(long, global = true, value_name = "URL")]
    pub base: Option<String>,

    /// YAML settings file; overrides `APPARATUS_CONFIG`.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Initialize a chunk and report its resolved apparatus.
    Resolve {
        /// Chunk number, e.g. 1 for `spine_C01.xml`.
        chunk: u32,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
        /// Write the rewritten spine and witness documents into this directory.
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// List known editions.
    Editions {
        /// Only editions providing this chunk.
        #[arg(long)]
        chunk: Option<u32>,
    },
}
