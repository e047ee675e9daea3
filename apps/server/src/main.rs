use anyhow::Context;
use clap::Parser;
use keeper_domain::config::ApiConfig;
use keeper_kernel::config::load_config;
use keeper_logger::{Logger, parse_level};
use keeper_server::Server;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about = "Keeper secrets server")]
struct Cli {
    /// Configuration file. Without it `./keeper.*` is used when present.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg: ApiConfig = load_config(cli.config.as_ref()).context("Critical: Configuration is malformed")?;
    let _log = init_logger(&cfg)?;

    let mut runtime = tokio::runtime::Builder::new_multi_thread();
    runtime.enable_all().thread_name("keeper-worker");
    if let Some(threads) = cfg.server.worker_threads {
        runtime.worker_threads(threads.max(1));
    }
    let runtime = runtime.build().context("Failed to build the async runtime")?;

    runtime.block_on(async { Server::builder().config(cfg).build().await?.run().await })
}

fn init_logger(cfg: &ApiConfig) -> anyhow::Result<Logger> {
    let logging = &cfg.logging;
    let builder = Logger::builder().name(env!("CARGO_PKG_NAME")).level(parse_level(&logging.level)?);

    let logger = match &logging.directory {
        Some(directory) if logging.json => builder.path(directory).json().init(),
        Some(directory) => builder.path(directory).init(),
        None => builder.init(),
    };
    logger.context("Failed to initialize logging")
}
