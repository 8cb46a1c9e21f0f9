//! HTTP surface: the portal's rate-limited routes.

mod server;
mod service;

pub use server::HttpServer;
pub use service::{apply_headers, enforce_rate_limit, router, AppState, StatusQuery, StatusResponse};
