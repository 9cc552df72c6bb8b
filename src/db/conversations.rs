use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{from_micros, to_micros, Conversation, Message, NewMessage};

fn from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        item_id: row.get(1)?,
        buyer_id: row.get(2)?,
        last_activity_date: from_micros(row.get(3)?),
    })
}

pub fn get(conn: &Connection, id: i64) -> rusqlite::Result<Option<Conversation>> {
    conn.query_row(
        "SELECT id, item_id, buyer_id, last_activity_date FROM conversations WHERE id = ?1",
        params![id],
        from_row,
    )
    .optional()
}

pub fn find(conn: &Connection, item_id: i64, buyer_id: i64) -> rusqlite::Result<Option<Conversation>> {
    conn.query_row(
        "SELECT id, item_id, buyer_id, last_activity_date FROM conversations
         WHERE item_id = ?1 AND buyer_id = ?2",
        params![item_id, buyer_id],
        from_row,
    )
    .optional()
}

/// Create the (item, buyer) conversation unless it already exists.
/// Returns the conversation and whether this call created it.
pub fn create_or_get(
    conn: &Connection,
    item_id: i64,
    buyer_id: i64,
    now: &DateTime<Utc>,
) -> rusqlite::Result<(Conversation, bool)> {
    let inserted = conn.execute(
        "INSERT INTO conversations (item_id, buyer_id, last_activity_date) VALUES (?1, ?2, ?3)
         ON CONFLICT (item_id, buyer_id) DO NOTHING",
        params![item_id, buyer_id, to_micros(now)],
    )?;
    let conversation = find(conn, item_id, buyer_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
    Ok((conversation, inserted > 0))
}

/// Append a message and move the conversation's last-activity date forward.
/// The message is stamped with the current time just before it is written.
pub fn append_message(
    conn: &Connection,
    conversation_id: i64,
    message: &NewMessage,
) -> rusqlite::Result<Message> {
    let tx = conn.unchecked_transaction()?;
    let create_date = Utc::now();
    tx.execute(
        "INSERT INTO messages (conversation_id, user_id, user_name, message, create_date)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            conversation_id,
            message.user_id,
            message.user_name,
            message.message,
            to_micros(&create_date)
        ],
    )?;
    let id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE conversations SET last_activity_date = MAX(last_activity_date, ?2) WHERE id = ?1",
        params![conversation_id, to_micros(&create_date)],
    )?;
    tx.commit()?;

    Ok(Message {
        id,
        conversation_id,
        user_id: message.user_id,
        user_name: message.user_name.clone(),
        message: message.message.clone(),
        create_date,
    })
}

/// Messages of a conversation in append order.
pub fn messages(conn: &Connection, conversation_id: i64) -> rusqlite::Result<Vec<Message>> {
    query_messages(conn, conversation_id, i64::MIN)
}

/// Messages created strictly after `after`, in append order.
pub fn messages_after(
    conn: &Connection,
    conversation_id: i64,
    after: &DateTime<Utc>,
) -> rusqlite::Result<Vec<Message>> {
    query_messages(conn, conversation_id, to_micros(after))
}

fn query_messages(
    conn: &Connection,
    conversation_id: i64,
    after_micros: i64,
) -> rusqlite::Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, user_id, user_name, message, create_date FROM messages
         WHERE conversation_id = ?1 AND create_date > ?2
         ORDER BY id ASC",
    )?;
    let messages = stmt
        .query_map(params![conversation_id, after_micros], |row| {
            Ok(Message {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                user_id: row.get(2)?,
                user_name: row.get(3)?,
                message: row.get(4)?,
                create_date: from_micros(row.get(5)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(messages)
}

pub fn ids_for_item(conn: &Connection, item_id: i64) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM conversations WHERE item_id = ?1 ORDER BY id")?;
    let ids = stmt
        .query_map(params![item_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Delete conversations and their messages.
pub fn delete_many(conn: &Connection, ids: &[i64]) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    for id in ids {
        tx.execute("DELETE FROM messages WHERE conversation_id = ?1", params![id])?;
        tx.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
    }
    tx.commit()
}
