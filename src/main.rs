use payment_guard::api::{create_router, AppState};
use payment_guard::boundary::{
    CosigningBoundary, DuplicateGuardConfig, Ed25519CoSigner, HttpForwarder, RemoteDuplicateGuard,
};
use payment_guard::cache::RedisDuplicateStore;
use payment_guard::config::Settings;
use payment_guard::observability::{init_logging, init_metrics, HealthChecker, LogConfig};
use payment_guard::repositories::PostgresSubmissionStore;
use payment_guard::services::{HttpConfirmationSource, PostCommitResolver, ReconciliationJob};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;
    init_logging(&LogConfig::from_settings(&settings.application));
    info!("Configuration loaded");

    let metrics_handle = init_metrics()?;

    // Connect to PostgreSQL
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&settings.database.url)
        .await?;
    info!("Database connection established");

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations applied successfully");

    // Connect to Redis
    info!("Connecting to Redis...");
    let redis_client = redis::Client::open(settings.redis.url.clone())?;
    let mut con = redis_client.get_multiplexed_async_connection().await?;
    let _: () = redis::cmd("PING").query_async(&mut con).await?;
    info!("Redis connection established");

    let duplicate_store = RedisDuplicateStore::new(redis_client.clone(), settings.guard.duplicate_key_prefix.clone());
    let guard = RemoteDuplicateGuard::new(Arc::new(duplicate_store), DuplicateGuardConfig::from(&settings.guard));
    let cosigner = Ed25519CoSigner::from_seed_hex(&settings.settlement.cosigner_seed_hex)?;
    let forwarder = HttpForwarder::new(&settings.settlement)?;
    let boundary = CosigningBoundary::new(guard, Arc::new(cosigner), Arc::new(forwarder));

    let resolver = PostCommitResolver::new(Arc::new(PostgresSubmissionStore::new(pool.clone())));

    if settings.settlement.confirmations_url.is_empty() {
        info!("No confirmations_url configured, reconciliation sweep disabled");
    } else {
        let source = HttpConfirmationSource::new(&settings.settlement)?;
        ReconciliationJob::new(
            Arc::new(source),
            resolver.clone(),
            settings.guard.reconciliation_interval_secs,
        )
        .start();
        info!("Reconciliation sweep started");
    }

    let health_checker = Arc::new(HealthChecker::new(pool.clone(), redis_client));
    let state = AppState::new(Arc::new(boundary), resolver)
        .with_metrics(metrics_handle)
        .with_health_checker(health_checker);

    let app = create_router(state);
    let addr = format!("0.0.0.0:{}", settings.application.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
