//!
//! src/main.rs
//!
//! Command surface of sptools. Parses the command, wires configuration,
//! logging, the snapshot store and the Spotify client together and
//! dispatches to the requested operation
//!

mod config;
mod errors;
mod logging;

mod fetch;
mod gateway;
mod persistent;
mod sink;
mod types;

mod backup;
mod library;
mod reconcile;

#[cfg(test)]
mod testing;

use std::{fmt, path::PathBuf, str::FromStr};

use clap::Parser;
use serde_json::Value;

use crate::errors::SptoolsError;
use crate::gateway::Gateway;
use crate::persistent::Persistent;
use crate::sink::JsonFileSink;

#[derive(Parser, Debug)]
#[command(author, version, about = "Back up and tidy a Spotify library", long_about = None)]
struct Args {
    /// backup, now_playing, compile_unplaylisted or saved_tracks
    command: String,

    /// Write the result as json to this file
    #[arg(long)]
    json_file: Option<PathBuf>,

    /// Print the result to the console
    #[arg(long)]
    print: bool,

    /// Full output (default)
    #[arg(long, overrides_with = "short")]
    full: bool,

    /// Compact output
    #[arg(long, overrides_with = "full")]
    short: bool,

    /// Replace an existing json file
    #[arg(long)]
    overwrite: bool,

    /// Back up only playlists owned by the current user
    #[arg(long)]
    only_owned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Backup,
    NowPlaying,
    CompileUnplaylisted,
    SavedTracks,
}

impl FromStr for Command {
    type Err = SptoolsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backup"               => Ok(Command::Backup),
            "now_playing"          => Ok(Command::NowPlaying),
            "compile_unplaylisted" => Ok(Command::CompileUnplaylisted),
            "saved_tracks"         => Ok(Command::SavedTracks),
            other => Err(SptoolsError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Command::Backup              => "backup",
            Command::NowPlaying          => "now_playing",
            Command::CompileUnplaylisted => "compile_unplaylisted",
            Command::SavedTracks         => "saved_tracks",
        })
    }
}

/// Runs one command and returns its result as json
async fn execute<G>(
    command: Command,
    gateway: &G,
    db: &Persistent,
    full: bool,
    only_owned: bool
) -> Result<Value, SptoolsError>
where
    G: Gateway + ?Sized,
{
    let value = match command {
        Command::Backup => serde_json::to_value(
            backup::backup(gateway, db, only_owned).await?
        )?,
        Command::NowPlaying => serde_json::to_value(
            library::now_playing(gateway, full).await?
        )?,
        Command::CompileUnplaylisted => serde_json::to_value(
            reconcile::compile_unplaylisted(gateway, db).await?
        )?,
        Command::SavedTracks => serde_json::to_value(
            library::saved_tracks(gateway, full).await?
        )?,
    };
    Ok(value)
}

#[tokio::main]
async fn main() -> Result<(), SptoolsError> {
    let args = Args::parse();
    let command: Command = args.command.parse()?;

    let cfgs = config::load_config()?;
    let _guard = logging::init_logging(&cfgs.logging)?;

    tracing::info!(
        service = "sptools",
        version = %env!("CARGO_PKG_VERSION"),
        command = %command,
        "starting"
    );

    let sink = JsonFileSink::new(args.overwrite);
    if let Some(path) = args.json_file.as_deref() {
        sink.check(path)?;
    }

    let db = Persistent::init(&cfgs.persistence.db_url).await?;
    let mut spotify = fetch::SpotifyClient::new(&cfgs.http, &cfgs.spotify)?;
    spotify.authorize().await?;

    let only_owned = args.only_owned || cfgs.persistence.only_owned_playlists;
    let full = args.full || !args.short;
    let result = execute(command, &spotify, &db, full, only_owned).await?;

    if args.print {
        sink::print_json(&result)?;
    }
    if let Some(path) = args.json_file.as_deref() {
        sink.write_json(path, &result)?;
    }

    tracing::info!(command = %command, "done");
    Ok(())
}
