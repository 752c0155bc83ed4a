use anyhow::Result;
use clap::Parser;

use kv3600::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.execute().await
}
