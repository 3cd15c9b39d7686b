//! Procedure catalog schema.
//!
//! The SQLite backend stores procedure bodies and table types in ordinary
//! tables. Their layout is versioned through `PRAGMA user_version` so a
//! database written by a newer build is refused instead of misread.
//!
//! # Invariants
//! - Steps are listed in ascending version order.
//! - All pending steps commit together or not at all.
//! - Caller tables are never touched here.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

struct CatalogStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const CATALOG_STEPS: &[CatalogStep] = &[
    CatalogStep {
        version: 1,
        name: "procedures",
        sql: include_str!("0001_procedures.sql"),
    },
    CatalogStep {
        version: 2,
        name: "table_types",
        sql: include_str!("0002_table_types.sql"),
    },
];

/// Catalog version this build writes.
pub fn latest_version() -> u32 {
    CATALOG_STEPS.last().map_or(0, |step| step.version)
}

/// Catalog version recorded in the database.
pub fn catalog_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Brings the catalog up to [`latest_version`].
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let found = catalog_version(conn)?;
    let latest = latest_version();
    if found > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: found,
            latest_supported: latest,
        });
    }

    let pending: Vec<&CatalogStep> = CATALOG_STEPS
        .iter()
        .filter(|step| step.version > found)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in &pending {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        debug!(
            "event=catalog_step module=db status=ok version={} name={}",
            step.version, step.name
        );
    }
    tx.commit()?;

    info!(
        "event=catalog_migrate module=db status=ok from_version={} to_version={} steps={}",
        found,
        latest,
        pending.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, catalog_version, latest_version, CATALOG_STEPS};
    use rusqlite::Connection;

    #[test]
    fn steps_are_strictly_ascending() {
        let versions: Vec<u32> = CATALOG_STEPS.iter().map(|step| step.version).collect();
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(latest_version(), 2);
    }

    #[test]
    fn partially_migrated_catalog_catches_up() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CATALOG_STEPS[0].sql).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();

        apply_migrations(&mut conn).unwrap();
        assert_eq!(catalog_version(&conn).unwrap(), latest_version());

        apply_migrations(&mut conn).unwrap();
        assert_eq!(catalog_version(&conn).unwrap(), latest_version());
    }
}
