//! Core library for the `apparatus` CLI.
//!
//! Resolves the pointers of a TEI critical apparatus into elements of the
//! witness documents they cite. See [`spine::SpineResolver`] for the
//! pipeline and [`context::ResolverContext`] for wiring.

pub mod adapters;
pub mod cache;
pub mod cassette;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod parser;
pub mod ports;
pub mod registry;
pub mod spine;
pub mod xml;

#[cfg(test)]
mod test_support;

use clap::Parser;

/// Run the CLI with the provided arguments.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command execution fails.
pub fn run<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Cli::try_parse_from(args).map_err(|err| err.to_string())?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {e}"))?;
    runtime.block_on(commands::dispatch(&cli))
}
