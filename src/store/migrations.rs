use rusqlite::Connection;

use crate::error::StoreOpenError;

use super::StoreKind;

/// Every store file carries its schema version in the `user_version` pragma;
/// all three collections evolve in lockstep under this single marker.
pub const SCHEMA_VERSION: i32 = 2;

pub fn run_migrations(conn: &mut Connection, kind: StoreKind) -> Result<(), StoreOpenError> {
    let mut version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > SCHEMA_VERSION {
        return Err(StoreOpenError::SchemaNewer {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    if version == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;

    while version < SCHEMA_VERSION {
        let next = version + 1;
        let sql = migration_sql(kind, next).ok_or_else(|| StoreOpenError::MigrationFailed {
            version: next,
            message: format!("no migration registered for {kind:?}"),
        })?;
        tx.execute_batch(sql)
            .map_err(|err| StoreOpenError::MigrationFailed {
                version: next,
                message: err.to_string(),
            })?;
        version = next;
    }

    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;

    Ok(())
}

fn migration_sql(kind: StoreKind, version: i32) -> Option<&'static str> {
    match (kind, version) {
        (StoreKind::Visits, 1) => Some(include_str!("schemas/visits_v1.sql")),
        (StoreKind::Visits, 2) => Some(include_str!("schemas/visits_v2.sql")),
        (StoreKind::Metadata, 1) => Some(include_str!("schemas/metadata_v1.sql")),
        (StoreKind::Metadata, 2) => Some(include_str!("schemas/metadata_v2.sql")),
        (StoreKind::Segments, 1) => Some(include_str!("schemas/segments_v1.sql")),
        (StoreKind::Segments, 2) => Some(include_str!("schemas/segments_v2.sql")),
        _ => None,
    }
}
