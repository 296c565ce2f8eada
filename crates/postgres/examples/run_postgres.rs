use pgnode_node::Node;
use pgnode_postgres::{CONF_FILE, Postgres, PostgresOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for better logging
    tracing_subscriber::fmt::init();

    let bin_dir = std::env::var("PG_BIN").unwrap_or_else(|_| "/usr/local/pgsql/bin".to_string());

    let node = Postgres::new(PostgresOptions::new(bin_dir))?;

    println!(
        "Starting Postgres node in directory: {}",
        node.base_dir().display()
    );

    node.init().await?;
    node.append_conf(CONF_FILE, "shared_preload_libraries = 'pg_stat_statements'")
        .await?;
    node.start().await?;

    println!("Postgres node is ready!");

    // Keep the node running until user interrupts with Ctrl+C
    println!("\nNode is running. Press Ctrl+C to stop...");
    tokio::signal::ctrl_c().await?;

    // Shutdown the node when done
    println!("Shutting down Postgres node...");
    node.teardown().await?;
    println!("Node shutdown complete");

    Ok(())
}
