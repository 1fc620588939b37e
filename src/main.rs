use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*, reload};

use lsnp_cli::{Cli, VerbosityToggle};
use lsnp_core::{Display, StdoutDisplay};
use lsnp_dispatcher::{Coordinator, Dispatcher};

struct ReloadToggle(reload::Handle<EnvFilter, tracing_subscriber::Registry>);

impl VerbosityToggle for ReloadToggle {
    fn set_verbose(&self, on: bool) {
        let level = if on { "debug" } else { "warn" };
        let _ = self.0.modify(|filter| *filter = EnvFilter::new(level));
    }
}

fn init_logging(verbose: bool) -> ReloadToggle {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let (filter, handle) = reload::Layer::new(filter);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();

    ReloadToggle(handle)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Some(shell) = cli.completions {
        lsnp_cli::print_completions(shell);
        return Ok(());
    }

    let mut config = lsnp_config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(name) = &cli.name {
        config.display_name = name.clone();
    }
    if let Some(ttl) = cli.ttl {
        config.token_ttl_secs = ttl;
    }
    if let Some(loss) = cli.loss {
        config.loss_probability = loss;
    }
    if cli.loopback {
        config.loopback = true;
    }
    if cli.verbose {
        config.verbose = true;
    }

    let toggle = init_logging(config.verbose);

    let display: Arc<dyn Display> = Arc::new(StdoutDisplay);
    let coord = Coordinator::new(&config, display).await?;

    let (tx, rx) = tokio::sync::mpsc::channel(256);
    let _recv_handles = coord.transport.clone().spawn_recv_loops(tx);
    let dispatcher = Arc::new(Dispatcher::new(coord.clone()));
    let _dispatch_handle = dispatcher.spawn(rx);
    let _sweeper_handle = coord.ack.spawn_sweeper();
    let _beacon_handle = coord.beacon.clone().spawn_periodic();

    coord.beacon.announce().await;

    lsnp_cli::run(coord, Some(Arc::new(toggle))).await;
    Ok(())
}
