//! Agent binary entry point: parses CLI flags, reads environment
//! configuration, installs signal handlers, and either purges the
//! metadata region or drives the bounded heartbeat loop.

mod agent;
mod cli;
mod constants;
mod heartbeat;
mod shutdown;

use clap::Parser;
use whiteboard_broker::Config;

use crate::cli::Cli;
use crate::heartbeat::AlivePayload;

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("failed to read configuration: {e}");
            std::process::exit(1);
        }
    };

    let host_id = cli.host_id.unwrap_or(config.host_id);

    if cli.pdb {
        log::warn!("--pdb was requested but this build has no debugger integration; ignoring");
    }

    if cli.cleanup || cli.force_cleanup {
        if let Err(e) = agent::cleanup(&config.sd_uuid, cli.force_cleanup) {
            log::error!("cleanup failed: {e}");
            std::process::exit(1);
        }
        return;
    }

    shutdown::install_handlers();

    let payload = AlivePayload { host_id };
    if let Err(e) = agent::run_agent(&config.sd_uuid, host_id, &payload) {
        log::error!("agent terminated: {e}");
        std::process::exit(1);
    }
}
