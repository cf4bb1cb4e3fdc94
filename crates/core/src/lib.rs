pub mod cost;
pub mod definition;
pub mod error;
pub mod graph;
pub mod hashing;
pub mod pricing;
pub mod roles;
pub mod store;
pub mod types;
pub mod validation;
pub mod versioning;
pub mod workflows;
