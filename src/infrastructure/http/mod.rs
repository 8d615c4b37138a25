//! HTTP surface consumed by UI/CLI clients.

pub mod handlers;
pub mod server;

pub use server::{build_router, serve, AppState};
