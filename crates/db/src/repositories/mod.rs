//! SQL repositories. Each repo is a unit struct with associated async
//! functions taking the pool, or an open transaction for multi-statement
//! writes.

pub mod io_definition_repo;
pub mod node_definition_repo;
pub mod socket_type_repo;
pub mod workflow_repo;

pub use io_definition_repo::IoDefinitionRepo;
pub use node_definition_repo::NodeDefinitionRepo;
pub use socket_type_repo::SocketTypeRepo;
pub use workflow_repo::WorkflowRepo;

pub(crate) type PgTransaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;
