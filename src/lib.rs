//! Quizify · Python practice backend
//!
//! - Axum HTTP + WebSocket API
//! - Question store with JSON snapshot persistence
//! - Python execution through a local interpreter or a Piston-compatible API
//! - Static SPA fallback (./static/index.html)

pub mod config;
pub mod domain;
pub mod error;
pub mod grading;
pub mod logic;
pub mod progress;
pub mod protocol;
pub mod routes;
pub mod runtime;
pub mod seeds;
pub mod state;
pub mod store;
pub mod telemetry;
