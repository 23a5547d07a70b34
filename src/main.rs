//! kiosk-joystick binary entrypoint wiring REST, WebSocket, SSE and the record store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use kiosk_joystick::{
    config::AppConfig,
    dao::machine_store::{MachineStore, MemoryMachineStore},
    routes,
    state::{AppState, SharedState},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);
    install_machine_store(&app_state).await;

    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Use MongoDB when `MONGO_URI` is set, the in-memory store seeded from the config otherwise.
async fn install_machine_store(state: &SharedState) {
    #[cfg(feature = "mongo-store")]
    if env::var_os("MONGO_URI").is_some() {
        use kiosk_joystick::{
            dao::machine_store::mongodb::{MongoConfig, MongoMachineStore},
            services::storage_supervisor,
        };

        match MongoConfig::from_env().await {
            Ok(config) => {
                info!("record store: mongodb (supervised)");
                tokio::spawn(storage_supervisor::run(state.clone(), move || {
                    let config = config.clone();
                    async move {
                        let store = MongoMachineStore::connect(config).await?;
                        Ok(Arc::new(store) as Arc<dyn MachineStore>)
                    }
                }));
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "invalid MongoDB settings; using memory store")
            }
        }
    }

    let seeded = MemoryMachineStore::seeded(state.config().machines().iter().cloned());
    info!("record store: in-memory");
    state
        .set_machine_store(Arc::new(seeded) as Arc<dyn MachineStore>)
        .await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
