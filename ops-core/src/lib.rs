//! ops-core: Shared infrastructure for agency operations services.
pub mod config;
pub mod error;
pub mod observability;

pub use anyhow;
pub use serde;
pub use tracing;
