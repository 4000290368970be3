pub mod api;
pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod middleware;
pub mod repos;
pub mod services;
pub mod state;
pub mod tools;
