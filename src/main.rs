use anyhow::Context;
use backchannel::{registry::ConnectionRegistry, router, store, AppState};
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let database_url =
        dotenv::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:chat.db?mode=rwc".to_owned());
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&database_url)
        .await
        .with_context(|| format!("opening database {database_url}"))?;
    store::init(&db_pool).await.context("creating schema")?;

    let registry = ConnectionRegistry::default();
    let router_tx = router::spawn(db_pool.clone(), registry.clone());

    let state = AppState {
        db_pool,
        registry,
        router_tx,
    };

    let static_dir = dotenv::var("STATIC_DIR").unwrap_or_else(|_| "static".to_owned());
    let app = backchannel::app(state, &static_dir);

    let bind_addr = dotenv::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(%bind_addr, "listening");

    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
