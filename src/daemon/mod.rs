//! Dockyard Daemon - HTTP request surface
//!
//! This module exposes the orchestration operations as one HTTP endpoint
//! each, served with axum on a TCP listener.

mod api;
mod server;

pub use api::{ApiHandler, ApiRequest, ApiResponse, GREETING};
pub use server::{create_router, DaemonConfig, DockyardDaemon, DEFAULT_LISTEN_ADDR};
