pub mod admin;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod market;
pub mod metrics;
pub mod notify;
pub mod scheduler;
pub mod settings;
pub mod store;
