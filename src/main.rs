use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use ticketgate_server::config::Config;
use ticketgate_server::gate::Gate;
use ticketgate_server::offline::OfflineQueue;
use ticketgate_server::routes::create_routes;
use ticketgate_server::state::AppState;
use ticketgate_server::store::{PgTicketStore, TicketStore};
use ticketgate_server::sync::{run_probe, Connectivity, SyncReconciler};
use ticketgate_server::validation::Validator;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    // Lazy: the gateway must start even when the hosted store is unreachable.
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.remote_timeout)
        .connect_lazy(&config.database_url)
        .expect("DATABASE_URL must be a valid PostgreSQL URL");

    let connectivity = Arc::new(Connectivity::new(true));
    if config.run_migrations {
        match sqlx::migrate!().run(&pool).await {
            Ok(()) => tracing::info!("Migrations run successfully"),
            Err(e) => {
                tracing::warn!(error = %e, "Could not run migrations, starting offline");
                connectivity.mark_offline();
            }
        }
    }

    let queue = OfflineQueue::connect(&config.local_queue_url)
        .await
        .expect("Failed to open offline queue");

    let store: Arc<dyn TicketStore> = Arc::new(PgTicketStore::new(pool));
    let validator = Validator::new(Arc::clone(&store));
    let gate = Arc::new(Gate::new(
        validator.clone(),
        queue.clone(),
        Arc::clone(&connectivity),
        config.offline_policy,
    ));
    let reconciler = Arc::new(SyncReconciler::new(
        validator,
        queue,
        Arc::clone(&connectivity),
        config.sync.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let probe = tokio::spawn(run_probe(
        Arc::clone(&connectivity),
        store,
        config.probe_interval,
        shutdown_rx.clone(),
    ));
    let sync = tokio::spawn(Arc::clone(&reconciler).run(shutdown_rx));

    let app = create_routes(AppState { gate, reconciler }, &config);

    tracing::info!("🚀 Server running at http://{}", config.bind_addr);
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed");

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(probe, sync);
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
