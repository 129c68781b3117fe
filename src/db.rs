use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm::{ConnectionTrait, Schema};
use std::time::Duration;
use tracing::info;

use crate::entities;

pub type DbPool = DatabaseConnection;

/// Opens the database pool with the configured size and sane timeouts.
pub async fn establish_connection(url: &str, max_connections: u32) -> Result<DbPool, DbErr> {
    let mut opts = ConnectOptions::new(url.to_owned());
    opts.max_connections(max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    let db = Database::connect(opts).await?;
    info!("Database connection established");
    Ok(db)
}

/// Creates every table this service owns, honoring the entity column
/// definitions and unique constraints. Used by the sqlite dev bootstrap
/// and the test suite; production postgres schemas are managed
/// externally.
pub async fn create_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let statements = vec![
        schema.create_table_from_entity(entities::user::Entity),
        schema.create_table_from_entity(entities::store::Entity),
        schema.create_table_from_entity(entities::store_user::Entity),
        schema.create_table_from_entity(entities::product::Entity),
        schema.create_table_from_entity(entities::product_image::Entity),
        schema.create_table_from_entity(entities::purchase::Entity),
        schema.create_table_from_entity(entities::order::Entity),
        schema.create_table_from_entity(entities::order_item::Entity),
        schema.create_table_from_entity(entities::in_store_order_detail::Entity),
        schema.create_table_from_entity(entities::online_order_detail::Entity),
    ];

    for mut statement in statements {
        db.execute(backend.build(statement.if_not_exists())).await?;
    }

    info!("Schema ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{ConnectOptions, Database};

    #[tokio::test]
    async fn schema_bootstraps_on_sqlite_and_is_idempotent() {
        let mut opts = ConnectOptions::new("sqlite::memory:".to_owned());
        opts.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opts).await.unwrap();

        create_schema(&db).await.unwrap();
        // Re-running must be a no-op, not a duplicate-table error.
        create_schema(&db).await.unwrap();
    }
}
