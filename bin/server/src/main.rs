use botdock_conversation::{ConversationEngine, MemorySessionStore, Messenger};
use botdock_server::config::ServerConfig;
use botdock_server::messenger::{CallbackMessenger, LogMessenger};
use botdock_server::{AppState, router, skills};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.messenger.http_timeout_ms))
        .build()
        .expect("failed to build HTTP client");

    let registry = skills::registry(&config.skills, http.clone()).expect("invalid skill definition");
    let messenger: Arc<dyn Messenger> = match &config.messenger.callback_url {
        Some(url) => {
            tracing::info!(url = %url, "delivering replies to callback");
            Arc::new(CallbackMessenger::new(http, url.clone()))
        }
        None => {
            tracing::info!("no callback configured, replies are only logged");
            Arc::new(LogMessenger)
        }
    };

    let engine = ConversationEngine::new(
        Arc::new(MemorySessionStore::new()),
        Arc::new(registry),
        Arc::new(skills::nlu(&config.skills)),
        messenger,
        config.engine,
    )
    .expect("failed to start conversation engine");

    let app = router(AppState::new(engine)).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
