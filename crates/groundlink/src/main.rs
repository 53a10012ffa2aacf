//! Groundlink Server
//!
//! Field unit dashboard core: reads push-channel events, reconciles them
//! into unit state and serves that state to dashboards over WebSocket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use groundlink::catalog::{FileCatalog, SatelliteDirectory};
use groundlink::config::GroundlinkConfig;
use groundlink::dispatch::{ChannelSink, CommandDispatcher, drain_commands};
use groundlink::feed::{FeedSource, run_feed};
use groundlink::reconcile::{Reconciler, TopicRoutes};
use groundlink::render::TracingRenderer;
use groundlink::server::{AppState, ServerRenderer, create_router};
use groundlink::session::{Session, SessionHandle, StaleSweep};

/// Groundlink field unit dashboard server
#[derive(Parser, Debug)]
#[command(name = "groundlink")]
#[command(about = "Field unit dashboard state server", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Event feed: a JSON-lines file, or `-` for stdin
    #[arg(short, long)]
    feed: Option<FeedSource>,

    /// Server host address (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Don't start the WebSocket server
    #[arg(long)]
    no_server: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("groundlink=info,tower_http=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command line arguments
    let args = Args::parse();

    let mut config = GroundlinkConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.no_server {
        config.server.enabled = false;
    }

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    info!("Starting Groundlink v{}", env!("CARGO_PKG_VERSION"));

    // Satellite catalog
    let catalog = match &config.catalog.path {
        Some(path) => FileCatalog::load(path)
            .await
            .with_context(|| format!("loading satellite catalog {}", path.display()))?,
        None => {
            warn!("No satellite catalog configured, every lookup will be NotFound");
            FileCatalog::default()
        }
    };
    let satellites: Arc<dyn SatelliteDirectory> = Arc::new(catalog);

    // Outbound commands
    let (sink, command_rx) = ChannelSink::channel();
    let dispatcher = CommandDispatcher::new(Arc::new(sink), config.commands.topic.clone());
    let command_output = config.commands.output.clone();
    tokio::spawn(async move {
        match drain_commands(command_rx, command_output.as_deref()).await {
            Ok(sent) => info!(sent, "Command channel closed"),
            Err(e) => error!("Command output failed: {}", e),
        }
    });

    // Session owning the stores
    let routes = TopicRoutes::from_config(&config.topics);
    info!(routes = routes.len(), ordering = ?config.schedule.ordering, "Reconciler configured");
    let reconciler = Reconciler::new(routes, config.schedule.ordering);
    let (session, handle) = Session::new(reconciler, StaleSweep::from_config(&config.registry));
    let mut session = session.with_adapter(TracingRenderer::new());

    let state = AppState::new(handle.clone(), dispatcher, satellites);
    if config.server.enabled {
        session = session.with_adapter(ServerRenderer::new(state.clone()));
    }
    let session_task = tokio::spawn(session.run());

    // Event feed
    let feed_task = args.feed.map(|source| {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = run_feed(source, handle).await {
                error!("Event feed failed: {}", e);
            }
        })
    });

    if config.server.enabled {
        serve(&config.server.host, config.server.port, state).await?;
    } else if let Some(feed_task) = feed_task {
        tokio::select! {
            _ = feed_task => {},
            _ = shutdown_signal() => {},
        }
    } else {
        warn!("Server disabled and no feed given, nothing to do");
    }

    shutdown(handle).await;
    let _ = session_task.await;

    info!("Shutdown complete");
    Ok(())
}

async fn serve(host: &str, port: u16, state: AppState) -> Result<()> {
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown(handle: SessionHandle) {
    if let Err(e) = handle.shutdown().await {
        warn!("Session already stopped: {}", e);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
