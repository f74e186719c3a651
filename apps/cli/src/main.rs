//! errbit CLI — send error notices to an Errbit server.
//!
//! Sends test notices through the socket or HTTP writer, renders notice XML
//! for inspection, and manages the notifier config file.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
