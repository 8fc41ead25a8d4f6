//! Application services: repository contracts, synchronization and the cached façades.

pub mod backfill;
pub mod content;
pub mod error;
pub mod interactions;
pub mod offload;
pub mod read_events;
pub mod repos;
pub mod sync;
