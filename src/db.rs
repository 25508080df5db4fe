use anyhow::Result;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, EntityTrait,
    Schema, Statement,
};
use std::path::PathBuf;
use tokio::fs;

use crate::entity::{
    DiscountCodes, OrderEvents, OrderItems, Orders, PaymentRecords, ProcessedWebhookEvents,
    ProductMetrics, Products, SizeVariants,
};

/// Create a SeaORM connection.
pub async fn create_orm_conn(database_url: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options.sqlx_logging(false);
    // Every pooled connection to `sqlite::memory:` would see its own empty database.
    if database_url.starts_with("sqlite::memory:") {
        options.max_connections(1).min_connections(1);
    }
    let conn = Database::connect(options).await?;
    Ok(conn)
}

/// Apply the schema for whichever backend `conn` talks to.
pub async fn prepare_schema(conn: &DatabaseConnection) -> Result<()> {
    match conn.get_database_backend() {
        DatabaseBackend::Postgres => run_migrations(conn).await,
        _ => sync_schema(conn).await,
    }
}

/// Minimal migration runner that executes SQL files in `migrations/` in filename order.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    let mut entries = fs::read_dir("migrations").await?;
    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();

    let backend = conn.get_database_backend();
    for file in files {
        tracing::debug!(file = %file.display(), "applying migration");
        let sql = fs::read_to_string(&file).await?;
        // Postgres prepared statements cannot contain multiple commands,
        // so split the migration file and run each statement individually.
        for stmt in sql.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            let statement = format!("{stmt};");
            conn.execute(Statement::from_string(backend, statement))
                .await?;
        }
    }

    Ok(())
}

/// Create tables straight from the entity definitions. Used for SQLite
/// (tests and local runs), where the Postgres migration files do not apply.
pub async fn sync_schema(conn: &DatabaseConnection) -> Result<()> {
    create_table(conn, Products).await?;
    create_table(conn, SizeVariants).await?;
    create_table(conn, DiscountCodes).await?;
    create_table(conn, Orders).await?;
    create_table(conn, OrderItems).await?;
    create_table(conn, PaymentRecords).await?;
    create_table(conn, OrderEvents).await?;
    create_table(conn, ProcessedWebhookEvents).await?;
    create_table(conn, ProductMetrics).await?;
    Ok(())
}

async fn create_table<E: EntityTrait>(conn: &DatabaseConnection, entity: E) -> Result<()> {
    let backend = conn.get_database_backend();
    let mut stmt = Schema::new(backend).create_table_from_entity(entity);
    stmt.if_not_exists();
    conn.execute(backend.build(&stmt)).await?;
    Ok(())
}
