use std::io;

use anyhow::Result;
use env_logger::Env;
use log::info;

mod apis;
mod cache;
mod display;
mod favorites;
mod history;
mod menu;
mod prompt;
mod report;
mod selectors;
mod store;
mod types;

use crate::{menu::App, types::Config};

/// Looks up tokens, wallets and market data from public APIs and keeps
/// favorite tokens and wallets in JSON files between sessions.
///
/// Token pairs come from a DEX aggregator. Wallet balances, transfers,
/// gas prices and holder lists come from the Etherscan family of block
/// explorers. Transaction call data is matched against a table of known
/// function selectors.
///
/// Everything runs on one thread, one request at a time.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let config = Config::from_env()?;
    info!("Data directory: {}", config.data_dir.display());

    let stdin = io::stdin();
    let mut app = App::new(config, stdin.lock())?;
    app.run().await
}
