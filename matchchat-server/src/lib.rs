//! `MatchChat` messaging server library.
//!
//! Exposes the server for use in tests and embedding. Members bind a
//! WebSocket connection to their user id, messages are persisted before they
//! are routed, and a receiver that is offline finds them in the conversation
//! history later.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod presence;
pub mod router;
pub mod server;
pub mod sqlite;
pub mod store;
