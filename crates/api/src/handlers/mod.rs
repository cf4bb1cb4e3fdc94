pub mod cost;
pub mod node_definitions;
pub mod workflows;
