//! Image storage with an asynchronous transformation pipeline.
//!
//! Layers, bottom-up:
//! - [`imaging`] — codec and pixel operations
//! - [`pipeline`] — bounded worker pool and the byte-level facade
//! - [`repositories`] — metadata (SQLite), durable storage (disk), cache
//! - [`services`] — cache-aside orchestration over the three tiers
//! - [`handlers`] / [`routes`] — the HTTP adapter

pub mod config;
pub mod errors;
pub mod handlers;
pub mod imaging;
pub mod models;
pub mod pipeline;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod test_helpers;
