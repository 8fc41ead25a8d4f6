//! folio: draft/published content synchronization with cache-aside reads and interaction
//! counters.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
