#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
compile_error!("enable a storage backend: `inmem-store` or `postgres-store`");

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod permissions;
pub mod rate_limit;
pub mod repo;
pub mod routes;
pub mod slug;

// Re-export commonly used items for tests / external users
pub use middleware::UserBlock;
pub use routes::{app, config, AppState};
