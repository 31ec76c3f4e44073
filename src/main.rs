mod config;
mod connectivity;
mod domain;
mod reader_api;
mod remote_client;
mod restoration;
mod storage;
mod sync;
#[cfg(test)]
mod testing;

use std::{path::Path, sync::Arc, time::Duration};

use config::Config;
use connectivity::ConnectivityMonitor;
use poem::{
    EndpointExt, Route, Server,
    listener::TcpListener,
    middleware::{Cors, Tracing as PoemTracing},
};
use poem_openapi::OpenApiService;
use remote_client::ProgressApiClient;
use restoration::RestorationService;
use storage::{SeaOrmProgressStore, SeaOrmSyncQueue, SyncQueue};
use sync::ProgressSyncCoordinator;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt::SubscriberBuilder, prelude::*};

type ProgressSyncResult<T> = anyhow::Result<T>;

#[tokio::main]
async fn main() -> ProgressSyncResult<()> {
    // Respect RUST_LOG if set, default to info for our crate and warn for deps.
    let default_filter = format!(
        "{}=info,poem=info,reqwest=warn,sqlx=warn",
        env!("CARGO_CRATE_NAME")
    );
    let env_filter = std::env::var("RUST_LOG").unwrap_or(default_filter);
    SubscriberBuilder::default()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .with_level(true)
        .pretty()
        .finish()
        .with(ErrorLayer::default())
        .init();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting reading progress sync"
    );
    if Path::new(".env.local").exists() {
        dotenvy::from_filename(".env.local")?;
    } else if Path::new(".env").exists() {
        dotenvy::from_filename(".env")?;
    };
    let config = Config::load()?;
    if let Err(e) = config.validate() {
        return Err(anyhow::anyhow!(e));
    }

    let db = Arc::new(storage::open(&config.db_connection_string).await?);
    let store = Arc::new(SeaOrmProgressStore::new(db.clone()));
    let queue = Arc::new(SeaOrmSyncQueue::new(db));

    let remote = Arc::new(
        ProgressApiClient::new(&config.api_base_url)?
            .with_api_key(&config.api_key)
            .with_timeout(config.remote_timeout)?,
    );
    let has_api_key = !config.api_key.is_empty();
    tracing::info!(api_base = %config.api_base_url, has_api_key, "configured progress API client");

    let connectivity = Arc::new(ConnectivityMonitor::new(config.start_online));
    let coordinator = ProgressSyncCoordinator::new(
        store.clone(),
        queue.clone(),
        remote.clone(),
        connectivity.clone(),
        config.sync_settings(),
    );
    let restoration = Arc::new(RestorationService::new(
        store.clone(),
        remote.clone(),
        connectivity.clone(),
        coordinator.clone(),
    ));

    // Anything left in flight belongs to a dispatch that died with the last process.
    let recovered = queue.recover_in_flight().await?;
    if recovered > 0 {
        tracing::info!(recovered, "returned interrupted sync items to the queue");
    }
    let _listener = coordinator.spawn_reconnect_listener();
    if connectivity.is_online() {
        let startup = coordinator.clone();
        tokio::spawn(async move {
            startup.on_reconnect().await;
        });
    }

    let api = reader_api::ReaderApi {
        coordinator: coordinator.clone(),
        restoration,
        store,
        queue,
        remote,
        connectivity,
        seek_retry: config.seek_retry,
    };
    run_poem(api, &config.bind_addr).await?;

    let flushed = coordinator.flush_all().await;
    tracing::info!(flushed, "flushed pending progress before exit");
    Ok(())
}

pub async fn run_poem(api: reader_api::ReaderApi, bind_addr: &str) -> ProgressSyncResult<()> {
    let version = env!("CARGO_PKG_VERSION");
    let api_service = OpenApiService::new(api, "Reading Progress Sync API", version)
        .server(format!("http://{}", bind_addr));
    let ui = api_service.rapidoc();
    let spec = api_service.spec();
    let route = Route::new()
        .nest("/", api_service)
        .nest("/ui", ui)
        .nest("/spec", poem::endpoint::make_sync(move |_| spec.clone()))
        .with(Cors::new())
        .with(PoemTracing);

    tracing::info!(%bind_addr, "starting HTTP server");
    Server::new(TcpListener::bind(bind_addr))
        .run_with_graceful_shutdown(
            route,
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
            Some(Duration::from_secs(5)),
        )
        .await?;
    Ok(())
}
