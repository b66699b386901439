pub mod bar;
pub mod session;
pub mod webhook;
