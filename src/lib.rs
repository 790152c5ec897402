pub mod auth;
pub mod capability;
pub mod cli;
pub mod config;
pub mod content;
pub mod database;
pub mod error;
pub mod handlers;
pub mod keys;
pub mod lifecycle;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;
