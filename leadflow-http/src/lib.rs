pub mod auth;
pub mod config;
pub mod handlers;
pub mod openapi;
pub mod server;

pub use config::ServerConfig;
pub use handlers::AppState;
pub use server::{build_router, serve};
