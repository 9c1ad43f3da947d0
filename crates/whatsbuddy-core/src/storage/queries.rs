//! Database query implementations

use crate::error::{Error, Result, StorageError};
use crate::types::{PermissionGrant, TreeUri};
use rusqlite::{params, Connection, OptionalExtension};

/// Key the status-folder grant is stored under
pub const STATUS_GRANT_KEY: &str = "Android/media/com.whatsapp/WhatsApp/Media/.Statuses";

// ===== Grant Queries =====

/// Insert or replace the grant stored under `key`
pub fn upsert_grant(conn: &Connection, key: &str, grant: &PermissionGrant) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO grants (grant_key, tree_uri, read_granted, write_granted, granted_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(grant_key) DO UPDATE SET
            tree_uri = excluded.tree_uri,
            read_granted = excluded.read_granted,
            write_granted = excluded.write_granted,
            granted_at = excluded.granted_at
        "#,
        params![
            key,
            grant.tree.to_string(),
            grant.read_granted,
            grant.write_granted,
            grant.granted_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

/// Get the grant stored under `key`
pub fn get_grant(conn: &Connection, key: &str) -> Result<Option<PermissionGrant>> {
    let row = conn
        .query_row(
            r#"
            SELECT tree_uri, read_granted, write_granted, granted_at
            FROM grants
            WHERE grant_key = ?
            "#,
            params![key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((tree_uri, read_granted, write_granted, granted_at)) = row else {
        return Ok(None);
    };

    let tree = TreeUri::parse(&tree_uri).map_err(|e| {
        Error::Storage(StorageError::Corrupt(format!("grant tree URI: {}", e)))
    })?;
    let granted_at = chrono::DateTime::parse_from_rfc3339(&granted_at)
        .map_err(|e| Error::Storage(StorageError::Corrupt(format!("grant timestamp: {}", e))))?
        .with_timezone(&chrono::Utc);

    Ok(Some(PermissionGrant {
        tree,
        read_granted,
        write_granted,
        granted_at,
    }))
}

// ===== Settings Queries =====

/// Get a setting value
pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let result = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?",
            params![key],
            |row| row.get(0),
        )
        .optional()?;

    Ok(result)
}

/// Set a setting value
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
        params![key, value],
    )?;

    Ok(())
}
