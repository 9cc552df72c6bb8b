use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{from_micros, to_micros, Image, Item};

pub fn insert(conn: &Connection, user_id: i64, now: &DateTime<Utc>) -> rusqlite::Result<Item> {
    conn.execute(
        "INSERT INTO items (user_id, create_date, modify_date) VALUES (?1, ?2, ?2)",
        params![user_id, to_micros(now)],
    )?;
    Ok(Item {
        id: conn.last_insert_rowid(),
        user_id,
        create_date: *now,
        modify_date: *now,
        images: Vec::new(),
    })
}

/// Load an item together with its images.
pub fn get(conn: &Connection, id: i64) -> rusqlite::Result<Option<Item>> {
    let item = conn
        .query_row(
            "SELECT id, user_id, create_date, modify_date FROM items WHERE id = ?1",
            params![id],
            |row| {
                Ok(Item {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    create_date: from_micros(row.get(2)?),
                    modify_date: from_micros(row.get(3)?),
                    images: Vec::new(),
                })
            },
        )
        .optional()?;

    let Some(mut item) = item else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT blob_key, url FROM images WHERE item_id = ?1 ORDER BY position ASC, id ASC",
    )?;
    item.images = stmt
        .query_map(params![id], |row| {
            Ok(Image {
                blob_key: row.get(0)?,
                url: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(item))
}

/// The subset of `ids` that still resolve to an item.
pub fn live_ids(conn: &Connection, ids: &[i64]) -> rusqlite::Result<HashSet<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM items WHERE id = ?1")?;
    let mut live = HashSet::new();
    for id in ids {
        if stmt.exists(params![id])? {
            live.insert(*id);
        }
    }
    Ok(live)
}

/// Append an image and bump the item's modify date, unless the item already
/// holds `max_images`. Returns whether the image was added.
pub fn add_image(
    conn: &Connection,
    item_id: i64,
    image: &Image,
    max_images: usize,
    now: &DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    let added = tx.execute(
        "INSERT INTO images (item_id, blob_key, url, position)
         SELECT ?1, ?2, ?3, (SELECT COUNT(*) FROM images WHERE item_id = ?1)
         WHERE (SELECT COUNT(*) FROM images WHERE item_id = ?1) < ?4",
        params![item_id, image.blob_key, image.url, max_images as i64],
    )?;
    if added == 0 {
        return Ok(false);
    }
    tx.execute(
        "UPDATE items SET modify_date = ?2 WHERE id = ?1",
        params![item_id, to_micros(now)],
    )?;
    tx.commit()?;
    Ok(true)
}

/// Delete an item row and its image rows. Blobs are not touched.
pub fn delete(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM images WHERE item_id = ?1", params![id])?;
    let rows = tx.execute("DELETE FROM items WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(rows > 0)
}
