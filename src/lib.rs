pub mod assets;
pub mod config;
pub mod database;
pub mod errors;
pub mod models;
pub mod relay;
pub mod repositories;
pub mod services;
pub mod telemetry;
