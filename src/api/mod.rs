//! HTTP API.
//!
//! ## Endpoints
//! - `POST /start-search` - submit a search, returns `202` with a task id
//! - `GET /search-status/:task_id` - poll a task, `404` once unknown or expired
//! - `GET /health` - liveness
//! - `GET /stats` - task and extraction counters

pub mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
