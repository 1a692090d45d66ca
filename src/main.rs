use cache_observer::cli::{self, Cli, Command};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Fetch(args) => cli::fetch::run(args).await,
        Command::Strategies => cli::strategies::run(),
    }
}
