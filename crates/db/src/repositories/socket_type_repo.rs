//! Repository for the `socket_types` table.

use sqlx::PgPool;

use crate::models::node_definition::SocketTypeRow;

pub struct SocketTypeRepo;

impl SocketTypeRepo {
    pub async fn list(pool: &PgPool) -> Result<Vec<SocketTypeRow>, sqlx::Error> {
        sqlx::query_as::<_, SocketTypeRow>("SELECT name, color FROM socket_types ORDER BY name")
            .fetch_all(pool)
            .await
    }
}
