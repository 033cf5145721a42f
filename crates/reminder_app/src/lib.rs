pub mod app;
pub mod platform;
