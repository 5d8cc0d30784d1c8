use crate::error::Error;
use anyhow::Result;
use sqlx::PgPool;
use tracing::{debug, info};

/// Advisory lock key serializing schema creation across processes
const MIGRATION_LOCK_KEY: i64 = 0x6465_7465_6374;

/// Migration scripts, applied in order. Each one must be idempotent.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_create_detections.sql",
        include_str!("sql/001_create_detections.sql"),
    ),
    ("002_add_indexes.sql", include_str!("sql/002_add_indexes.sql")),
];

/// One statement of the migration transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// `pg_advisory_xact_lock`, released when the transaction ends
    Lock(i64),
    Script(&'static str, &'static str),
}

/// Statements in execution order: the lock, then every script
fn plan() -> Vec<Step> {
    std::iter::once(Step::Lock(MIGRATION_LOCK_KEY))
        .chain(MIGRATIONS.iter().map(|&(name, sql)| Step::Script(name, sql)))
        .collect()
}

/// Create the detection schema if it is missing.
///
/// Runs in one transaction holding a Postgres advisory lock, so processes
/// starting at the same time apply the scripts one after another and all
/// end with the same schema.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::Storage(format!("Failed to start migration transaction: {}", e)))?;

    for step in plan() {
        match step {
            Step::Lock(key) => {
                sqlx::query("SELECT pg_advisory_xact_lock($1)")
                    .bind(key)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        Error::Storage(format!("Failed to acquire migration lock: {}", e))
                    })?;
            }
            Step::Script(name, sql) => {
                debug!("Executing migration: {}", name);
                sqlx::Executor::execute(&mut *tx, sql)
                    .await
                    .map_err(|e| Error::Storage(format!("Migration {} failed: {}", name, e)))?;
                info!("Applied migration: {}", name);
            }
        }
    }

    tx.commit()
        .await
        .map_err(|e| Error::Storage(format!("Failed to commit migrations: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered_by_prefix() {
        let prefixes: Vec<u32> = MIGRATIONS
            .iter()
            .map(|(name, _)| name.split('_').next().unwrap().parse().unwrap())
            .collect();
        let mut sorted = prefixes.clone();
        sorted.sort();
        assert_eq!(prefixes, sorted);
    }

    #[test]
    fn lock_is_taken_before_any_script() {
        let steps = plan();
        assert_eq!(steps.first(), Some(&Step::Lock(MIGRATION_LOCK_KEY)));
        assert_eq!(steps.len(), MIGRATIONS.len() + 1);

        let scripts: Vec<&str> = steps[1..]
            .iter()
            .map(|step| match step {
                Step::Script(name, _) => *name,
                Step::Lock(_) => panic!("lock taken twice"),
            })
            .collect();
        let expected: Vec<&str> = MIGRATIONS.iter().map(|(name, _)| *name).collect();
        assert_eq!(scripts, expected);
    }

    #[test]
    fn every_statement_is_guarded() {
        for (name, sql) in MIGRATIONS {
            for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                assert!(
                    statement.contains("IF NOT EXISTS"),
                    "{} has a statement that is not idempotent: {}",
                    name,
                    statement
                );
            }
        }
    }
}
