//! Presence tracking for the forum.
//!
//! A scheduler rebuilds a snapshot of recently active users from Redis every
//! few seconds and swaps it into a single-slot cache. Browsers poll `/` and
//! get the cached snapshot back wrapped in a JSONP callback, so request
//! latency never depends on the store.

pub mod app;
pub mod bootstrap;
pub mod builder;
pub mod config;
pub mod error;
pub mod handlers;
pub mod scheduler;
pub mod server;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod telemetry;
