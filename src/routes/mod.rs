pub mod bars;
pub mod health;
pub mod metrics;
pub mod webhooks;
