use anyhow::Context;
use clap::Parser;
use keeper_client::{ApiClient, Session, shell};
use keeper_logger::{Logger, parse_level};

#[derive(Debug, Parser)]
#[command(version, about = "Keeper interactive client")]
struct Cli {
    /// Server address, `host:port` or a full URL.
    #[arg(short, long, default_value = "localhost:8080")]
    address: String,
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log = Logger::builder()
        .name(env!("CARGO_PKG_NAME"))
        .level(parse_level(&cli.log_level)?)
        .init()
        .context("Failed to initialize logging")?;

    let session = Session::new(&cli.address)?;
    let api = ApiClient::new(session)?;
    println!("keeper client {}; type `help` for commands", env!("CARGO_PKG_VERSION"));
    shell::run(api).await?;
    Ok(())
}
