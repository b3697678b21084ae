use std::io::IsTerminal;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, Method};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use logbeam_api::config::{parse_allowed_origins, LogSettings, ServerConfig};
use logbeam_api::{router, AppState};
use logbeam_core::ChannelDirectory;
use logbeam_jobs::{
    DispatcherBuilder, DispatcherConfig, LogSender, RateLimitConfig, StaticChannelDirectory,
    WebhookSender,
};
use logbeam_realtime::{start_relay_bridge, Hub, HubConfig, Relay};
use logbeam_store::{SharedStore, StoreConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _log_guard = init_tracing(&LogSettings::from_env());

    let config = ServerConfig::from_env();
    let store_config = StoreConfig::from_env()?;
    info!(backend = %store_config.backend, "Connecting shared store");
    let store = SharedStore::connect(&store_config).await?;

    let cancel = CancellationToken::new();

    // Realtime: hub plus relay bridge feeding it
    let hub = Hub::start(HubConfig::from_env(), cancel.child_token());
    let bridge = start_relay_bridge(
        Relay::new(store.relay.clone()),
        hub.clone(),
        cancel.child_token(),
    )
    .await?;

    let directory: Arc<dyn ChannelDirectory> = match &config.channels_file {
        Some(path) => Arc::new(StaticChannelDirectory::from_json_file(path)?),
        None => {
            warn!("CHANNELS_FILE not set; no notification channels configured");
            Arc::new(StaticChannelDirectory::default())
        }
    };

    let state = AppState::new(&store, hub, directory.clone(), RateLimitConfig::from_env());

    // Notification dispatch
    let dispatch_config = DispatcherConfig::from_env();
    let dispatcher = DispatcherBuilder::new(state.queue.clone(), state.limiter.clone(), directory)
        .with_sender(LogSender)
        .with_sender(WebhookSender::new(dispatch_config.send_timeout)?)
        .with_config(dispatch_config)
        .build()
        .start(cancel.child_token());

    let app = router(state).layer(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(parse_allowed_origins()))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
            .max_age(Duration::from_secs(3600)),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    info!("Server stopped, draining dispatcher");
    cancel.cancel();
    dispatcher.shutdown().await;
    if let Err(e) = bridge.await {
        warn!(error = %e, "Relay bridge ended abnormally");
    }

    Ok(())
}

const DEFAULT_LOG_FILTER: &str = "logbeam_api=debug,logbeam_realtime=debug,logbeam_jobs=debug,tower_http=debug";

/// Install the global subscriber. The returned guard flushes the file
/// writer on drop and must live until exit.
fn init_tracing(settings: &LogSettings) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let (writer, guard, ansi) = match &settings.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|d| !d.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let prefix = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "logbeam-api.log".into());
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, prefix));
            (BoxMakeWriter::new(writer), Some(guard), settings.ansi.unwrap_or(false))
        }
        None => {
            let ansi = settings
                .ansi
                .unwrap_or_else(|| std::io::stdout().is_terminal());
            (BoxMakeWriter::new(std::io::stdout), None, ansi)
        }
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);
    let registry = tracing_subscriber::registry().with(filter);
    if settings.json {
        registry.with(layer.json()).init();
    } else {
        registry.with(layer).init();
    }

    info!(
        json = settings.json,
        file = ?settings.file,
        "Logging initialized"
    );
    guard
}

/// Resolve on Ctrl-C or SIGTERM, then cancel every background component so
/// open viewer sockets close and the server can drain.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => {},
    }

    info!("Shutdown signal received");
    cancel.cancel();
}
