use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, CounterVec, Gauge};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::services::sessions::SessionService;

lazy_static! {
    pub static ref BAR_SAVES_COUNTER: CounterVec = register_counter_vec!(
        "api_bar_saves_total",
        "Announcement bar saves by outcome",
        &["status"]
    ).unwrap();

    pub static ref WEBHOOKS_COUNTER: CounterVec = register_counter_vec!(
        "api_webhooks_total",
        "Webhook deliveries by topic and outcome",
        &["topic", "status"]
    ).unwrap();

    pub static ref SHOPS_GAUGE: Gauge = register_gauge!(
        "app_installed_shops_total",
        "Shops with a stored offline session"
    ).unwrap();
}

/// Spawn the background metrics collector (refreshes every 5 minutes).
pub fn start(pool: PgPool) {
    tokio::spawn(async move {
        loop {
            match SessionService::count_offline(&pool).await {
                Ok(count) => {
                    SHOPS_GAUGE.set(count as f64);
                    info!("Metrics: {} installed shop(s)", count);
                }
                Err(e) => warn!("Metrics: collection failed: {}", e),
            }
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
        }
    });
}
