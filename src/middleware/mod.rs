pub mod auth;
pub mod webhook;
