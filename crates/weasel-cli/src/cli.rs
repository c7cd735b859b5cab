use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "weasel",
    about = "Cache-aside asset server for object store buckets",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve bucket objects over HTTP
    Serve(ServeArgs),
    /// Validate a configuration file
    CheckConfig(CheckConfigArgs),
    /// Print the default configuration as TOML
    DefaultConfig,
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the configured listen address
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct CheckConfigArgs {
    #[arg(short, long)]
    pub config: PathBuf,
}
