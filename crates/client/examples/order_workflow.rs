//! Interactive-free walkthrough of the usual client workflow: fetch the
//! inventory, top up an item, place an order.
//!
//! Expects a name directory and a registered inventory service to be
//! reachable; configure via `inventory-client.toml` or `INVENTORY_`
//! environment variables, e.g.
//!
//! ```text
//! INVENTORY_REGISTRY_URL=http://127.0.0.1:2379 cargo run --example order_workflow
//! ```

use inventory_client::{ClientConfig, InventoryClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ClientConfig::load()?;
    let client = InventoryClient::connect(config)?;

    let items = client.get_inventory().await?;
    println!("current inventory ({} items):", items.len());
    for item in &items {
        println!(
            "  {:<12} {:<24} qty {:>5}  @ {:.2}",
            item.item_code, item.name, item.quantity, item.price
        );
    }

    if let Some(item) = items.first() {
        let status = client.update_inventory(&item.item_code, 10).await?;
        println!("update: {status}");

        let confirmation = client.place_order(&item.item_code, 2).await?;
        println!(
            "order {} placed: {}",
            confirmation.order_id, confirmation.status
        );
    }

    client.shutdown().await;
    Ok(())
}
