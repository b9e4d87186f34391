use tracing::info;

use estuary::chat::server::{ChatServer, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("estuary — where messages wait for the tide");

    let config = Config::from_env();
    let server = ChatServer::bind(config).await?;
    info!("listening on {}", server.local_addr());

    // Ctrl-C flips the same shutdown flag the supervisor and every
    // session worker watch.
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            shutdown.shutdown();
        }
    });

    server.serve().await?;
    Ok(())
}
