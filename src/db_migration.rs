use sqlx::SqlitePool;

use crate::errors::{DbError, DbResult};

const MIGRATION_INIT: &str = include_str!("../migrations/20240101000000_init.sql");

const MIGRATIONS: &[(&str, &str)] = &[("20240101000000_init.sql", MIGRATION_INIT)];

/// Creates the migrations-tracking table (if missing) and applies every
/// migration that has not yet been recorded, in order, inside a single
/// transaction.
pub async fn initialize_database(pool: &SqlitePool) -> DbResult<()> {
    log::info!("starting database migration");

    create_migrations_table(pool).await?;

    let last_migration = get_last_migration(pool).await?;
    match &last_migration {
        Some(name) => log::debug!("last applied migration: {}", name),
        None => log::debug!("no migrations applied yet"),
    }

    apply_pending_migrations(pool, last_migration).await?;

    log::info!("database migration complete");
    Ok(())
}

async fn create_migrations_table(pool: &SqlitePool) -> DbResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(DbError::Sqlx)?;

    Ok(())
}

async fn get_last_migration(pool: &SqlitePool) -> DbResult<Option<String>> {
    sqlx::query_scalar::<_, String>("SELECT name FROM migrations ORDER BY id DESC LIMIT 1")
        .fetch_optional(pool)
        .await
        .map_err(DbError::Sqlx)
}

async fn apply_pending_migrations(pool: &SqlitePool, last_migration: Option<String>) -> DbResult<()> {
    let pending = get_pending_migrations(last_migration);

    if pending.is_empty() {
        log::debug!("no pending migrations");
        return Ok(());
    }

    log::info!("applying {} pending migration(s)", pending.len());

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| DbError::Transaction(e.to_string()))?;

    for (migration_name, migration_sql) in pending {
        log::debug!("applying migration {}", migration_name);

        sqlx::query(migration_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Transaction(format!("migration {} failed: {}", migration_name, e)))?;

        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO migrations (name, applied_at) VALUES (?, ?)")
            .bind(migration_name)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Transaction(format!("recording migration {} failed: {}", migration_name, e)))?;
    }

    tx.commit()
        .await
        .map_err(|e| DbError::Transaction(e.to_string()))?;

    Ok(())
}

fn get_pending_migrations(last_migration: Option<String>) -> Vec<(&'static str, &'static str)> {
    let mut pending = Vec::new();
    let mut should_include = last_migration.is_none();

    for &(migration_name, migration_sql) in MIGRATIONS {
        if should_include {
            pending.push((migration_name, migration_sql));
        } else if Some(migration_name.to_string()) == last_migration {
            should_include = true;
        }
    }

    pending
}
