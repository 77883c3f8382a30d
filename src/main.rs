use anyhow::Result;
use clap::Parser;
use dropzone::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dropzone::telemetry::init_tracing(cli.verbose);
    cli.run().await
}
