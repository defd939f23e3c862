//! RotaChain node daemon

use clap::Parser;
use rotachain::config::load_config;
use rotachain::node::Node;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rota-node", about = "Run a RotaChain node")]
struct Args {
    /// Path to the node configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    let node = Arc::new(Node::init(config).await?);
    node.run().await.map_err(|e| e as Box<dyn std::error::Error>)?;
    Ok(())
}
