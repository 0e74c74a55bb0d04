//! API server entry point.

use std::sync::Arc;

use api::AppState;
use api::config::Config;
use fulfillment::{
    AssetSource, Collaborators, EnhancementService, HttpAssetSource, HttpEnhancementService,
    HttpVendorApi, InMemoryAssetSource, InMemoryEnhancementService, InMemoryVendorApi,
    LoggingNotifier, VendorApi,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{FulfillmentStore, InMemoryFulfillmentStore, PostgresFulfillmentStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn collaborators(config: &Config) -> Collaborators {
    let client = reqwest::Client::new();

    let enhancement: Arc<dyn EnhancementService> = match &config.enhancement {
        Some(endpoint) => Arc::new(HttpEnhancementService::new(
            client.clone(),
            &endpoint.url,
            &endpoint.api_key,
        )),
        None => {
            tracing::warn!("ENHANCEMENT_URL not set, using the in-process enhancement stub");
            Arc::new(InMemoryEnhancementService::new())
        }
    };
    let vendor: Arc<dyn VendorApi> = match &config.vendor {
        Some(endpoint) => Arc::new(HttpVendorApi::new(
            client.clone(),
            &endpoint.url,
            &endpoint.token,
            &endpoint.shop_id,
        )),
        None => {
            tracing::warn!("VENDOR_API_URL not set, using the in-process vendor stub");
            Arc::new(InMemoryVendorApi::new())
        }
    };
    // Without an enhancement endpoint the pipeline skips enhancement, so
    // nothing is ever downloaded.
    let assets: Arc<dyn AssetSource> = if config.enhancement.is_some() {
        Arc::new(HttpAssetSource::new(client))
    } else {
        Arc::new(InMemoryAssetSource::new())
    };

    Collaborators {
        enhancement,
        vendor,
        notifier: Arc::new(LoggingNotifier),
        assets,
    }
}

async fn serve<S: FulfillmentStore + 'static>(
    store: S,
    config: &Config,
    metrics_handle: PrometheusHandle,
) {
    let state = Arc::new(AppState::new(
        Arc::new(store),
        collaborators(config),
        config.pipeline(),
    ));
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");

    // 1. Initialize tracing
    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt_layer)
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the store and serve
    match &config.database_url {
        Some(url) => {
            let store = PostgresFulfillmentStore::connect(url, 20)
                .await
                .expect("failed to connect to database");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            serve(store, &config, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            serve(InMemoryFulfillmentStore::new(), &config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
