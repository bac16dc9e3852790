//! Command-line flags, grounded in `agent.py`'s `OptionParser` setup.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ha-agent", about = "Hosted-engine HA whiteboard agent")]
pub struct Cli {
    /// Purge the metadata block and exit.
    #[arg(long)]
    pub cleanup: bool,

    /// Purge the metadata block even when it doesn't look clean.
    #[arg(long)]
    pub force_cleanup: bool,

    /// Override the host id normally read from configuration.
    #[arg(long)]
    pub host_id: Option<u64>,

    /// Drop into a debugger on crash. Accepted for CLI compatibility;
    /// this build has no debugger integration, so it is a no-op.
    #[arg(long)]
    pub pdb: bool,
}
