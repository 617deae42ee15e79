//! # Price Scout
//!
//! Answers "where can I buy X, and at what price?" asynchronously.
//!
//! This library provides:
//! - An HTTP API for search submission and polling
//! - Source discovery through a web search provider
//! - Per-page product extraction through an LLM oracle
//! - A task store with a fixed retention window
//!
//! ## Architecture
//!
//! ```text
//!   POST /start-search            GET /search-status/{id}
//!          │                               │
//!          ▼                               ▼
//!   ┌──────────────┐  put(pending)  ┌─────────────┐
//!   │ Orchestrator │ ─────────────▶ │  TaskStore  │
//!   └──────┬───────┘  put(terminal) └─────────────┘
//!          │ (background)
//!          ▼
//!   Discovery ──▶ Extractor × N ──▶ Aggregator
//!                 (fetch + oracle)
//! ```
//!
//! ## Task Flow
//! 1. Write a pending record and hand back the task id
//! 2. Discover candidate retailer pages for the query
//! 3. Extract one offer per page concurrently, isolating failures
//! 4. Rank surviving offers by price and write the terminal record
//!
//! ## Modules
//! - `task`: task records and the orchestrator
//! - `store`: task record persistence with expiry
//! - `discovery`: candidate source lookup
//! - `extract`: page fetching and product extraction
//! - `aggregate`: fan-in and ranking
//! - `api`: HTTP surface

pub mod aggregate;
pub mod api;
pub mod config;
pub mod discovery;
pub mod extract;
pub mod llm;
pub mod store;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use task::{Orchestrator, ProductCandidate, Query, TaskId, TaskRecord, TaskStatus};
