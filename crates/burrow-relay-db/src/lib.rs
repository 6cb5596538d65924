//! Durable storage for client sessions
//!
//! The server keeps its live sessions in memory and writes each one through to
//! the `client_sessions` table, so sessions kept as lost survive a restart and
//! are restored as lost on startup. With the default `sqlite::memory:` URL
//! nothing outlives the process.

pub mod entities;
pub mod migrator;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tracing::{debug, info};

/// Open the session database named by `--database-url`
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;
    info!(
        "Session store connected ({:?} backend)",
        db.get_database_backend()
    );
    Ok(db)
}

/// Bring the `client_sessions` schema up to date. Safe to run on every start.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    let pending = migrator::Migrator::get_pending_migrations(db).await?.len();
    if pending == 0 {
        debug!("Session store schema is up to date");
        return Ok(());
    }

    info!("Applying {} session store migrations", pending);
    migrator::Migrator::up(db, None).await
}
