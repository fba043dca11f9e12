//! Core domain + application logic for the Eurovision group client.
//!
//! This crate is intentionally backend-agnostic. Supabase auth / RPC / realtime
//! live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod domain;
pub mod errors;
pub mod feed;
pub mod location;
pub mod logging;
pub mod notifications;
pub mod ports;
pub mod routes;
pub mod schema;

pub use errors::{Error, Result};
