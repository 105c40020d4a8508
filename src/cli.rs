use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "swapr")]
#[command(version)]
#[command(about = "Swap order execution service with simulated liquidity venues", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory path
    #[arg(short, long, default_value = "config")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the order execution service (default)
    Serve {
        /// Override the configured listen port
        #[arg(short, long)]
        port: Option<u16>,
        /// Force the in-memory store even when a database is configured
        #[arg(long)]
        memory: bool,
    },
    /// Run database migrations and exit
    Migrate,
    /// Load and validate configuration, then exit
    CheckConfig,
}
