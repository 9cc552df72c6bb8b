use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::models::to_micros;

pub fn create_session(conn: &Connection, token: &str, now: &DateTime<Utc>) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO upload_sessions (token, created_at) VALUES (?1, ?2)",
        params![token, to_micros(now)],
    )?;
    Ok(())
}

/// Consume a one-time upload session. Returns false if the token is unknown,
/// already used, or was created before `not_before`.
pub fn consume_session(
    conn: &Connection,
    token: &str,
    not_before: &DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "DELETE FROM upload_sessions WHERE token = ?1 AND created_at >= ?2",
        params![token, to_micros(not_before)],
    )?;
    // Stale sessions are useless either way.
    conn.execute(
        "DELETE FROM upload_sessions WHERE created_at < ?1",
        params![to_micros(not_before)],
    )?;
    Ok(rows > 0)
}
