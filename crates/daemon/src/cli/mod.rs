pub mod ops;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "plume",
    version,
    about = "Serve static sites published as content-addressed blobs in AT repositories"
)]
pub struct Cli {
    /// Path to a config file
    #[arg(long, global = true, env = "PLUME_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the gateway daemon
    Serve(ops::Serve),
    /// Resolve a handle or DID to its hosting endpoint
    Resolve(ops::Resolve),
    /// Fetch a site's manifest and print its tree
    Fetch(ops::Fetch),
    /// Print version information
    Version(ops::Version),
}
