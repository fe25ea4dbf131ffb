//! CLI entry point for the catexplorer tool.

use anyhow::Result;

mod app;
mod app_config;
mod cli;
mod output;

#[tokio::main]
async fn main() -> Result<()> {
    app::runtime::run().await
}
