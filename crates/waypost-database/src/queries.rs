//! Queue queries run by [`AsyncDatabase`](crate::AsyncDatabase).
//!
//! Plain SQL on a borrowed connection, nothing else, so they are safe to run
//! inside `AsyncDatabase::call`.

use crate::{DatabaseError, DatabaseResult, LocationFix, StoredFix};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const FIX_COLUMNS: &str = "id, device_id, captured_at_ms, latitude, longitude, accuracy, \
                           battery, charging, mock, queued_at_ms";

/// Append a fix to the outbox and return its sequence id.
pub fn insert_fix(conn: &Connection, fix: &LocationFix) -> DatabaseResult<i64> {
    fix.validate().map_err(DatabaseError::InvalidData)?;

    conn.execute(
        "INSERT INTO location_fix_outbox
            (device_id, captured_at_ms, latitude, longitude, accuracy, battery, charging, mock, queued_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            fix.device_id,
            fix.captured_at.timestamp_millis(),
            fix.latitude,
            fix.longitude,
            fix.accuracy,
            fix.battery,
            fix.charging,
            fix.mock,
            Utc::now().timestamp_millis(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Read the oldest queued fix without removing it.
pub fn select_oldest_fix(conn: &Connection) -> DatabaseResult<Option<StoredFix>> {
    let sql = format!(
        "SELECT {} FROM location_fix_outbox ORDER BY id ASC LIMIT 1",
        FIX_COLUMNS
    );
    let fix = conn.query_row(&sql, [], row_to_stored_fix).optional()?;
    Ok(fix)
}

/// Delete a fix by id. Returns whether a row was removed; deleting an id
/// that is already gone is not an error.
pub fn delete_fix(conn: &Connection, id: i64) -> DatabaseResult<bool> {
    let deleted = conn.execute("DELETE FROM location_fix_outbox WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

/// Number of fixes waiting in the outbox.
pub fn count_fixes(conn: &Connection) -> DatabaseResult<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM location_fix_outbox", [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

fn row_to_stored_fix(row: &Row<'_>) -> rusqlite::Result<StoredFix> {
    Ok(StoredFix {
        id: row.get(0)?,
        fix: LocationFix {
            device_id: row.get(1)?,
            captured_at: parse_datetime_from_millis(row.get(2)?),
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            accuracy: row.get(5)?,
            battery: row.get(6)?,
            charging: row.get(7)?,
            mock: row.get(8)?,
        },
        queued_at: parse_datetime_from_millis(row.get(9)?),
    })
}

fn parse_datetime_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}
