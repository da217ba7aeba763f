use anyhow::{Context, Result};
use clap::Parser;
use docrag::{api, config, llm, logging, processing, vectordb};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "docrag", version, about = "Retrieval-augmented question answering over parsed documents")]
struct Cli {
    /// Port to listen on; overrides `SERVER_PORT`.
    #[arg(long)]
    port: Option<u16>,
    /// Environment file loaded before reading configuration.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Tracing reads RUST_LOG and DOCRAG_LOG_FILE, which the env file may set.
    config::init_config(cli.env_file.as_deref());
    logging::init_tracing();
    let config = config::get_config();
    tracing::debug!(
        generation_backend = ?config.generation_backend,
        embedding_backend = ?config.embedding_backend,
        vector_db_backend = ?config.vector_db_backend,
        vector_db_path = %config.vector_db_path.display(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );

    let store = vectordb::create_vector_store(config).context("failed to build vector store")?;
    store
        .connect()
        .await
        .context("failed to connect to vector store")?;
    let embedder =
        llm::create_embedding_client(config).context("failed to build embedding client")?;
    let generator =
        llm::create_generation_client(config).context("failed to build generation client")?;

    let service = processing::RagService::new(
        store.clone(),
        embedder,
        generator,
        processing::PipelineSettings::from_config(config),
    );
    let app = api::create_router(
        Arc::new(service),
        api::AppInfo {
            app_name: config.app_name.clone(),
            app_version: config.app_version.clone(),
        },
    );

    let (listener, port) = bind_listener(cli.port.or(config.server_port))
        .await
        .context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}/api/v1", port);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(error) = store.disconnect().await {
        tracing::warn!(error = %error, "Vector store did not disconnect cleanly");
    }
    tracing::info!("Server stopped");
    served.context("server terminated unexpectedly")
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 5000..=5099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 5000-5099",
    ))
}
