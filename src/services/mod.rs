// src/services/mod.rs
//
// Shared services module containing business logic services
// that can be used across different domain modules

pub mod ml;
pub mod outbox;
pub mod storage;

// Re-export commonly used types for convenience
pub use ml::MLService;
