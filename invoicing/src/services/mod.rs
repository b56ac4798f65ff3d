//! Services for the invoicing engine.

pub mod metrics;
pub mod sequencing;
