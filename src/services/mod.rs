pub mod editor;
pub mod ids;
pub mod metafields;
pub mod metrics;
pub mod sessions;
pub mod status;
pub mod webhooks;
