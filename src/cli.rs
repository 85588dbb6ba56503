use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fetchgate")]
#[command(about = "Deny-by-default gateway for outbound HTTP requests")]
#[command(version)]
pub struct Cli {
    /// Directory containing policy files and the fetchgate.json manifest
    #[arg(long, env = "FETCHGATE_POLICIES")]
    pub policies: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(long, env = "FETCHGATE_PORT", default_value_t = 3000)]
        port: u16,
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Bearer token required on every API request (open when unset)
        #[arg(long, env = "FETCHGATE_TOKEN")]
        auth_token: Option<String>,
        /// Upstream request timeout in seconds (no timeout when unset)
        #[arg(long, env = "FETCHGATE_TIMEOUT_SECS")]
        timeout_secs: Option<u64>,
    },
    /// List the configured policies
    Policies,
    /// Evaluate a URL against the policies without sending anything
    Check {
        /// URL to evaluate
        #[arg(long)]
        url: String,
        /// Method to evaluate with
        #[arg(long, default_value = "GET")]
        method: String,
    },
    /// Create a starter policy directory
    Init,
}
