pub mod admin;
pub mod auth;
pub mod error;
pub mod models;
pub mod moderation;
pub mod openapi;
pub mod quota;
pub mod reclaimer;
pub mod repo;
pub mod routes;
pub mod security;
pub mod storage;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
