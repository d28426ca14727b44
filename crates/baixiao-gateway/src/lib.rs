//! # Baixiao Gateway
//!
//! Transport adapters over the chat orchestrator:
//! - HTTP (default :5000): `POST /chat` as Server-Sent Events, `POST /add_library`,
//!   `GET /login`, `GET /health`
//! - WebSocket (default :5001, path `/`): multi-request chat with idle timeout

pub mod routes;
pub mod server;
pub mod ws;

pub use server::{AppState, IdlePolicy, Services, build_http_router, build_services, build_ws_router, start};
