//! Row structs for `sqlx::FromRow` and their conversions into core types.
//!
//! Enumerations are stored as text and parsed on the way out; a value the
//! core does not recognise surfaces as a storage error.

pub mod node_definition;
pub mod workflow;
