pub mod api;
pub mod clients;
pub mod config;
pub mod events;
pub mod hub;
pub mod models;
pub mod utils;
