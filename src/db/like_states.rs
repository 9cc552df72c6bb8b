use rusqlite::{params, Connection, OptionalExtension};

use super::models::LikeState;

pub fn find(conn: &Connection, user_id: i64, item_id: i64) -> rusqlite::Result<Option<LikeState>> {
    conn.query_row(
        "SELECT id, user_id, item_id, like_state FROM like_states
         WHERE user_id = ?1 AND item_id = ?2",
        params![user_id, item_id],
        |row| {
            Ok(LikeState {
                id: row.get(0)?,
                user_id: row.get(1)?,
                item_id: row.get(2)?,
                like_state: row.get(3)?,
            })
        },
    )
    .optional()
}

pub fn insert(
    conn: &Connection,
    user_id: i64,
    item_id: i64,
    like_state: bool,
) -> rusqlite::Result<LikeState> {
    conn.execute(
        "INSERT INTO like_states (user_id, item_id, like_state) VALUES (?1, ?2, ?3)",
        params![user_id, item_id, like_state],
    )?;
    Ok(LikeState {
        id: conn.last_insert_rowid(),
        user_id,
        item_id,
        like_state,
    })
}

pub fn set_state(conn: &Connection, id: i64, like_state: bool) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE like_states SET like_state = ?2 WHERE id = ?1",
        params![id, like_state],
    )?;
    Ok(())
}

/// Delete every like-state that references an item. Returns the number removed.
pub fn delete_for_item(conn: &Connection, item_id: i64) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM like_states WHERE item_id = ?1", params![item_id])
}

pub fn count_for_item(conn: &Connection, item_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM like_states WHERE item_id = ?1",
        params![item_id],
        |row| row.get(0),
    )
}
