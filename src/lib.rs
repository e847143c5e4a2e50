pub mod api;
pub mod config;
pub mod duty;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod observability;
pub mod state;
pub mod stats;
pub mod withdrawal;
