//! PantryPal receipt OCR server

use anyhow::Result;
use clap::Parser;
use pantrypal_server::{logging, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();

    // Initialize tracing
    logging::init(&config.log)?;

    pantrypal_server::serve(config).await
}
