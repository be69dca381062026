pub mod api;
pub mod clients;
pub mod config;
pub mod models;
pub mod queue;
pub mod services;
pub mod store;
pub mod utils;
