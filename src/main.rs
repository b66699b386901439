use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scheduled_bar_api::{config::Config, db, router, services, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Session store connected and migrations applied");

    services::metrics::start(pool.clone());

    let addr = format!("{}:{}", config.host, config.port);
    info!(
        "Announcement bar admin listening on {} (Admin API {})",
        addr, config.api_version
    );

    let app = router(AppState::new(pool, config));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
