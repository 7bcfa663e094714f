use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hivecast")]
#[command(author, version, about = "Live streaming backend for Hive broadcasters")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the coordinator, liveness monitor, and HTTP API
    Start {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Issue (or rotate) a stream key for a Hive account
    GenerateKey {
        /// Hive account the key authorizes
        #[arg(required = true)]
        account: String,
    },

    /// Revoke the stream key for a Hive account
    RevokeKey {
        /// Hive account whose key is revoked
        #[arg(required = true)]
        account: String,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
