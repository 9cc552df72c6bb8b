use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Cursor, GeoPoint, ItemDocument, SearchError, SearchHit, SearchIndex, SearchPage, SearchQuery};
use crate::state::DbPool;

const COLUMNS: &str = "seq, doc_id, user_id, category, title, description, price, currency, lat, lng";

/// Search index stored in the `search_documents` table of the main database.
///
/// Structured filters run in SQL; distance and term matching run per row.
#[derive(Clone)]
pub struct SqliteSearchIndex {
    db: DbPool,
}

impl SqliteSearchIndex {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, SearchError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, SearchError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.get()?;
            f(&*conn)
        })
        .await
        .map_err(|e| SearchError::Backend(e.to_string()))?
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<(i64, ItemDocument)> {
    Ok((
        row.get(0)?,
        ItemDocument {
            doc_id: row.get(1)?,
            user_id: row.get(2)?,
            category: row.get(3)?,
            title: row.get(4)?,
            description: row.get(5)?,
            price: row.get(6)?,
            currency: row.get(7)?,
            location: GeoPoint::new(row.get(8)?, row.get(9)?),
        },
    ))
}

fn run_search(
    conn: &Connection,
    query: &SearchQuery,
    cursor: Option<Cursor>,
    limit: usize,
) -> Result<SearchPage, SearchError> {
    let after = cursor.map(|c| c.position()).unwrap_or(0);
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM search_documents
         WHERE seq > ?1
           AND (?2 IS NULL OR user_id != ?2)
           AND (?3 IS NULL OR category = ?3)
         ORDER BY seq ASC",
        COLUMNS
    ))?;
    let mut rows = stmt.query(params![after, query.exclude_user_id, query.category])?;

    let mut results = Vec::new();
    let mut has_more = false;
    while let Some(row) = rows.next()? {
        let (seq, document) = from_row(row)?;
        if query.near.distance_m(&document.location) >= query.radius_m {
            continue;
        }
        if !document.matches_terms(&query.terms) {
            continue;
        }
        if results.len() == limit {
            has_more = true;
            break;
        }
        results.push(SearchHit {
            document,
            cursor: Cursor::new(seq),
        });
    }

    let cursor = if has_more {
        results.last().map(|hit| hit.cursor)
    } else {
        None
    };
    Ok(SearchPage { results, cursor })
}

#[async_trait]
impl SearchIndex for SqliteSearchIndex {
    async fn put(&self, document: ItemDocument) -> Result<(), SearchError> {
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO search_documents
                    (doc_id, user_id, category, title, description, price, currency, lat, lng)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (doc_id) DO UPDATE SET
                    user_id = excluded.user_id,
                    category = excluded.category,
                    title = excluded.title,
                    description = excluded.description,
                    price = excluded.price,
                    currency = excluded.currency,
                    lat = excluded.lat,
                    lng = excluded.lng",
                params![
                    document.doc_id,
                    document.user_id,
                    document.category,
                    document.title,
                    document.description,
                    document.price,
                    document.currency,
                    document.location.lat,
                    document.location.lng
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get(&self, doc_id: i64) -> Result<Option<ItemDocument>, SearchError> {
        self.blocking(move |conn| {
            let found = conn
                .query_row(
                    &format!("SELECT {} FROM search_documents WHERE doc_id = ?1", COLUMNS),
                    params![doc_id],
                    from_row,
                )
                .optional()?;
            Ok(found.map(|(_, document)| document))
        })
        .await
    }

    async fn delete(&self, doc_id: i64) -> Result<(), SearchError> {
        self.blocking(move |conn| {
            conn.execute("DELETE FROM search_documents WHERE doc_id = ?1", params![doc_id])?;
            Ok(())
        })
        .await
    }

    async fn search(
        &self,
        query: &SearchQuery,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<SearchPage, SearchError> {
        let query = query.clone();
        self.blocking(move |conn| run_search(conn, &query, cursor, limit))
            .await
    }

    async fn clear(&self) -> Result<(), SearchError> {
        self.blocking(|conn| {
            conn.execute("DELETE FROM search_documents", [])?;
            Ok(())
        })
        .await
    }
}
