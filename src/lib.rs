pub mod analytics;
pub mod api;
pub mod auth;
pub mod cases;
pub mod compile;
pub mod config;
pub mod db;
pub mod models;
pub mod state;
pub mod tries;
