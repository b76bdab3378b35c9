//! Command dispatch and handlers.

pub mod editions;
pub mod resolve;

use std::env;
use std::path::Path;

use crate::cassette::config::CassetteConfig;
use crate::cassette::session::RecordingSession;
use crate::cli::{Cli, Command};
use crate::config::Settings;
use crate::context::ResolverContext;
use crate::registry::EditionRegistry;

/// Dispatch a parsed command line to its handler.
///
/// When `APPARATUS_RECORD` is set to a directory path, all port interactions
/// are recorded to per-port cassette files under that directory. When
/// `APPARATUS_REPLAY` names a directory of cassettes, ports are served from
/// them instead of the network and filesystem.
///
/// # Errors
///
/// Returns an error string if configuration cannot be loaded or the selected
/// command handler fails.
pub async fn dispatch(cli: &Cli) -> Result<(), String> {
    let settings = load_settings(cli)?;
    let registry = load_registry(&settings)?;

    match &cli.command {
        Command::Editions { chunk } => {
            editions::run(&registry, *chunk);
            Ok(())
        }
        Command::Resolve { chunk, json, out } => {
            let options = resolve::Options { chunk: *chunk, json: *json, out: out.as_deref() };

            if let Ok(dir) = env::var("APPARATUS_REPLAY") {
                let config = CassetteConfig::from_dir(Path::new(&dir));
                let ctx = ResolverContext::replaying_from(settings, registry, &config)?;
                return resolve::run(&ctx, &options).await;
            }

            if let Ok(dir) = env::var("APPARATUS_RECORD") {
                let session = RecordingSession::new(Path::new(&dir), &settings.spine_base_url)?;
                let ctx = ResolverContext::recording(settings, registry, &session);
                let result = resolve::run(&ctx, &options).await;

                // Drop context first to release Arc references
                drop(ctx);
                finish_recording(session)?;
                return result;
            }

            let ctx = ResolverContext::live(settings, registry);
            resolve::run(&ctx, &options).await
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, String> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_env_with_file(path),
        None => Settings::from_env(),
    }
    .map_err(|e| e.to_string())?;

    if let Some(base) = &cli.base {
        settings.spine_base_url.clone_from(base);
    }
    tracing::debug!(?settings, "settings loaded");
    Ok(settings)
}

fn load_registry(settings: &Settings) -> Result<EditionRegistry, String> {
    match &settings.editions {
        Some(path) => EditionRegistry::load(path).map_err(|e| e.to_string()),
        None => Ok(EditionRegistry::builtin()),
    }
}

/// Finish a recording session and print the output directory.
fn finish_recording(session: RecordingSession) -> Result<(), String> {
    let output_dir = session.finish()?;
    eprintln!("Recording saved to: {}", output_dir.display());
    Ok(())
}
