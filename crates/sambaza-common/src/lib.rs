//! Shared building blocks: snowflake row IDs and the serde types the
//! server and storage crates exchange.

pub mod id;
pub mod types;
