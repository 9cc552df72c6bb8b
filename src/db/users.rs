use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{from_micros, to_micros, User};
use super::{encode_id_list, id_list};

const COLUMNS: &str = "id, login_type, third_party_id, name, distance_radius_km, \
                       seen_item_ids, ongoing_conversations, last_active";

fn from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        login_type: row.get(1)?,
        third_party_id: row.get(2)?,
        name: row.get(3)?,
        distance_radius_km: row.get(4)?,
        seen_item_ids: id_list(row, 5)?,
        ongoing_conversations: id_list(row, 6)?,
        last_active: from_micros(row.get(7)?),
    })
}

pub fn get(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", COLUMNS),
        params![id],
        from_row,
    )
    .optional()
}

pub fn find_by_third_party_id(
    conn: &Connection,
    login_type: &str,
    third_party_id: &str,
) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM users WHERE login_type = ?1 AND third_party_id = ?2",
            COLUMNS
        ),
        params![login_type, third_party_id],
        from_row,
    )
    .optional()
}

/// Create a user. Fails with a constraint violation if the third-party id is taken.
pub fn insert(
    conn: &Connection,
    login_type: &str,
    third_party_id: &str,
    name: &str,
) -> rusqlite::Result<User> {
    conn.execute(
        "INSERT INTO users (login_type, third_party_id, name) VALUES (?1, ?2, ?3)",
        params![login_type, third_party_id, name],
    )?;
    let id = conn.last_insert_rowid();
    get(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn update_profile(
    conn: &Connection,
    id: i64,
    name: &str,
    distance_radius_km: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET name = ?2, distance_radius_km = ?3 WHERE id = ?1",
        params![id, name, distance_radius_km],
    )?;
    Ok(())
}

/// Append an item id to the seen list in a single statement.
pub fn append_seen_item(conn: &Connection, id: i64, item_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET seen_item_ids = json_insert(seen_item_ids, '$[#]', ?2) WHERE id = ?1",
        params![id, item_id],
    )?;
    Ok(())
}

pub fn append_ongoing_conversation(
    conn: &Connection,
    id: i64,
    conversation_id: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET ongoing_conversations = json_insert(ongoing_conversations, '$[#]', ?2) \
         WHERE id = ?1",
        params![id, conversation_id],
    )?;
    Ok(())
}

/// Remove `item_id` from the seen lists and `conversation_ids` from the ongoing
/// lists of the given users. Each list is rewritten in place, so entries
/// appended concurrently survive.
pub fn scrub_lists(
    conn: &Connection,
    user_ids: &[i64],
    item_id: i64,
    conversation_ids: &[i64],
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE users SET
           seen_item_ids = (SELECT json_group_array(s.value) FROM json_each(users.seen_item_ids) s
                            WHERE s.value != ?2),
           ongoing_conversations = (SELECT json_group_array(o.value)
                                    FROM json_each(users.ongoing_conversations) o
                                    WHERE o.value NOT IN (SELECT value FROM json_each(?3)))
         WHERE id IN (SELECT value FROM json_each(?1))",
        params![
            encode_id_list(user_ids),
            item_id,
            encode_id_list(conversation_ids)
        ],
    )
}

pub fn set_last_active(conn: &Connection, id: i64, at: &DateTime<Utc>) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET last_active = ?2 WHERE id = ?1",
        params![id, to_micros(at)],
    )?;
    Ok(())
}

/// One page of users whose seen list contains `item_id`, ordered by id and
/// starting after `after_id`.
pub fn page_seeing_item(
    conn: &Connection,
    item_id: i64,
    after_id: i64,
    limit: usize,
) -> rusqlite::Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users
         WHERE id > ?1
           AND EXISTS (SELECT 1 FROM json_each(users.seen_item_ids) WHERE json_each.value = ?2)
         ORDER BY id ASC
         LIMIT ?3",
        COLUMNS
    ))?;
    let users = stmt
        .query_map(params![after_id, item_id, limit as i64], from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::LOGIN_TYPE_FACEBOOK;
    use crate::db::{is_constraint_violation, test_support::test_pool};

    #[test]
    fn insert_sets_defaults() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        let user = insert(&conn, LOGIN_TYPE_FACEBOOK, "fb-1", "alice").unwrap();
        assert_eq!(user.name, "alice");
        assert_eq!(user.distance_radius_km, 10);
        assert!(user.seen_item_ids.is_empty());
        assert!(user.ongoing_conversations.is_empty());
        assert_eq!(user.last_active, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn third_party_ids_are_unique_per_login_type() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        insert(&conn, LOGIN_TYPE_FACEBOOK, "fb-1", "alice").unwrap();
        let err = insert(&conn, LOGIN_TYPE_FACEBOOK, "fb-1", "bob").unwrap_err();
        assert!(is_constraint_violation(&err));
        assert!(insert(&conn, "other", "fb-1", "bob").is_ok());
    }

    #[test]
    fn append_lists_in_place() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        let user = insert(&conn, LOGIN_TYPE_FACEBOOK, "fb-1", "alice").unwrap();
        append_seen_item(&conn, user.id, 7).unwrap();
        append_seen_item(&conn, user.id, 9).unwrap();
        append_ongoing_conversation(&conn, user.id, 3).unwrap();

        let user = get(&conn, user.id).unwrap().unwrap();
        assert_eq!(user.seen_item_ids, vec![7, 9]);
        assert_eq!(user.ongoing_conversations, vec![3]);
    }

    #[test]
    fn page_seeing_item_filters_and_paginates() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        let mut watchers = Vec::new();
        for i in 0..5 {
            let user = insert(&conn, LOGIN_TYPE_FACEBOOK, &format!("fb-{}", i), "u").unwrap();
            if i != 2 {
                append_seen_item(&conn, user.id, 42).unwrap();
                watchers.push(user.id);
            }
            append_seen_item(&conn, user.id, 1).unwrap();
        }

        let first = page_seeing_item(&conn, 42, 0, 3).unwrap();
        assert_eq!(first.len(), 3);
        let after = first.last().unwrap().id;
        let second = page_seeing_item(&conn, 42, after, 3).unwrap();
        assert_eq!(second.len(), 1);

        let found: Vec<i64> = first.iter().chain(second.iter()).map(|u| u.id).collect();
        assert_eq!(found, watchers);
    }

    #[test]
    fn scrub_lists_removes_only_the_deleted_item() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        let alice = insert(&conn, LOGIN_TYPE_FACEBOOK, "fb-1", "alice").unwrap();
        let bob = insert(&conn, LOGIN_TYPE_FACEBOOK, "fb-2", "bob").unwrap();
        for id in [3, 7, 9] {
            append_seen_item(&conn, alice.id, id).unwrap();
            append_seen_item(&conn, bob.id, id).unwrap();
        }
        for id in [11, 12, 13] {
            append_ongoing_conversation(&conn, alice.id, id).unwrap();
        }

        let changed = scrub_lists(&conn, &[alice.id], 7, &[12, 99]).unwrap();
        assert_eq!(changed, 1);

        let alice = get(&conn, alice.id).unwrap().unwrap();
        assert_eq!(alice.seen_item_ids, vec![3, 9]);
        assert_eq!(alice.ongoing_conversations, vec![11, 13]);
        let bob = get(&conn, bob.id).unwrap().unwrap();
        assert_eq!(bob.seen_item_ids, vec![3, 7, 9]);
    }

    #[test]
    fn scrub_lists_keeps_entries_added_after_the_page_was_read() {
        let (pool, _tmp) = test_pool();
        let conn = pool.get().unwrap();
        let user = insert(&conn, LOGIN_TYPE_FACEBOOK, "fb-1", "alice").unwrap();
        append_seen_item(&conn, user.id, 7).unwrap();

        let page = page_seeing_item(&conn, 7, 0, 10).unwrap();
        append_seen_item(&conn, user.id, 8).unwrap();
        let ids: Vec<i64> = page.iter().map(|u| u.id).collect();
        scrub_lists(&conn, &ids, 7, &[]).unwrap();

        let user = get(&conn, user.id).unwrap().unwrap();
        assert_eq!(user.seen_item_ids, vec![8]);
        assert!(user.ongoing_conversations.is_empty());
    }
}
