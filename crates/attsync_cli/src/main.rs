//! attsync CLI
//!
//! Command-line tools for attsync replicas backed by JSON fact files.
//!
//! # Commands
//!
//! - `status` - Display the root digest and group layout of a fact file
//! - `serve` - Accept sync cycles from peers over WebSocket
//! - `sync` - Reconcile a fact file with a peer, once or on an interval

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// attsync command-line replica tools.
#[derive(Parser)]
#[command(name = "attsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the root digest and group layout of a fact file
    Status {
        /// Path to the JSON fact file
        #[arg(short, long)]
        facts: PathBuf,

        /// List every group digest
        #[arg(short, long)]
        groups: bool,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Accept sync cycles from peers; the fact file is saved on Ctrl-C
    Serve {
        /// Path to the JSON fact file
        #[arg(short, long)]
        facts: PathBuf,

        /// Address to listen on
        #[arg(short, long, default_value = attsync_server::DEFAULT_BIND_ADDR)]
        bind: SocketAddr,

        /// Name announced to peers
        #[arg(short, long, default_value = "attsync-server")]
        name: String,
    },

    /// Reconcile a fact file with a peer
    Sync {
        /// Path to the JSON fact file
        #[arg(short, long)]
        facts: PathBuf,

        /// Peer WebSocket URL, e.g. ws://127.0.0.1:8771
        #[arg(short, long)]
        peer: String,

        /// Name announced to the peer
        #[arg(short, long, default_value = "attsync")]
        name: String,

        /// Keep syncing every N seconds until Ctrl-C
        #[arg(short, long)]
        interval: Option<u64>,

        /// Base URL of the embedding service
        #[arg(long, requires = "embeddings_file")]
        embeddings_url: Option<String>,

        /// JSON file holding stored embeddings
        #[arg(long, requires = "embeddings_url")]
        embeddings_file: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Status {
            facts,
            groups,
            format,
        } => {
            commands::status::run(&facts, groups, &format)?;
        }
        Commands::Serve { facts, bind, name } => {
            commands::serve::run(&facts, bind, &name)?;
        }
        Commands::Sync {
            facts,
            peer,
            name,
            interval,
            embeddings_url,
            embeddings_file,
        } => {
            let embeddings = embeddings_url.zip(embeddings_file);
            let options = commands::sync::SyncOptions {
                peer,
                name,
                interval: interval.map(std::time::Duration::from_secs),
                embeddings,
            };
            commands::sync::run(&facts, options)?;
        }
        Commands::Version => {
            println!("attsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("attsync core v{}", attsync_core::VERSION);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn embeddings_flags_come_together() {
        let partial = Cli::try_parse_from([
            "attsync",
            "sync",
            "--facts",
            "f.json",
            "--peer",
            "ws://localhost:8771",
            "--embeddings-url",
            "http://localhost:8000",
        ]);
        assert!(partial.is_err());

        let full = Cli::try_parse_from([
            "attsync",
            "sync",
            "--facts",
            "f.json",
            "--peer",
            "ws://localhost:8771",
            "--embeddings-url",
            "http://localhost:8000",
            "--embeddings-file",
            "e.json",
        ]);
        assert!(full.is_ok());
    }

    #[test]
    fn serve_defaults_to_local_port() {
        let cli = Cli::try_parse_from(["attsync", "serve", "--facts", "f.json"]).unwrap();
        match cli.command {
            Commands::Serve { bind, .. } => assert_eq!(bind.port(), 8771),
            _ => panic!("expected serve"),
        }
    }
}
