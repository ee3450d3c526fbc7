//! Database layer
//!
//! Supports SQLite (default, single-file deployment) and PostgreSQL. The
//! driver is selected from configuration and hidden behind the
//! [`DatabasePool`] trait; repositories match on [`Backend`] to run the
//! dialect-specific SQL.
//!
//! # Usage
//!
//! ```ignore
//! use psycheconecta::config::DatabaseConfig;
//! use psycheconecta::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, PostgresDatabase,
    SqliteDatabase,
};

/// Whether a repository error was caused by a UNIQUE constraint.
///
/// Services check for duplicates before inserting; this catches the
/// concurrent insert that slips between the check and the write.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| match cause.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::models::{User, UserRole};
    use anyhow::Context;

    #[tokio::test]
    async fn test_duplicate_insert_is_unique_violation() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let repo = SqlxUserRepository::new(pool);
        let user = User::new("dup@example.com".into(), "Dup".into(), "h".into(), UserRole::User);

        repo.create(&user).await.unwrap();
        let err = repo
            .create(&user)
            .await
            .context("outer context")
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn test_other_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&anyhow::anyhow!("connection refused")));
        assert!(!is_unique_violation(&anyhow::Error::new(sqlx::Error::RowNotFound)));
    }
}
