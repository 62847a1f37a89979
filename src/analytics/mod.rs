// src/analytics/mod.rs

pub mod handlers;
pub mod routes;

// Re-export commonly used items
pub use routes::analytics_routes;
