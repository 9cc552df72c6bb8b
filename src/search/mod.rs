pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use sqlite::SqliteSearchIndex;

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("invalid cursor")]
    InvalidCursor,

    #[error("search backend error: {0}")]
    Backend(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance in metres.
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }
}

/// Searchable mirror of an item's descriptive fields. `doc_id` is the item id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDocument {
    pub doc_id: i64,
    pub user_id: i64,
    pub category: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub currency: String,
    pub location: GeoPoint,
}

impl ItemDocument {
    /// True when every term prefixes some word of the title or description.
    pub fn matches_terms(&self, terms: &[String]) -> bool {
        if terms.is_empty() {
            return true;
        }
        let words: Vec<String> = tokenize(&self.title)
            .chain(tokenize(&self.description))
            .collect();
        terms
            .iter()
            .all(|term| words.iter().any(|word| word.starts_with(term.as_str())))
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub near: GeoPoint,
    pub radius_m: f64,
    pub exclude_user_id: Option<i64>,
    pub category: Option<String>,
    pub terms: Vec<String>,
}

impl SearchQuery {
    pub fn new(near: GeoPoint, radius_km: i64) -> Self {
        Self {
            near,
            radius_m: radius_km as f64 * 1000.0,
            exclude_user_id: None,
            category: None,
            terms: Vec::new(),
        }
    }

    pub fn excluding_user(mut self, user_id: i64) -> Self {
        self.exclude_user_id = Some(user_id);
        self
    }

    pub fn in_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }

    /// Split free text into lowercase search terms.
    pub fn with_terms(mut self, text: Option<&str>) -> Self {
        self.terms = text
            .map(|t| tokenize(t).collect())
            .unwrap_or_default();
        self
    }
}

/// Opaque position in a result stream. Resuming from a cursor yields the
/// results strictly after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor(i64);

impl Cursor {
    pub fn new(position: i64) -> Self {
        Self(position)
    }

    pub fn position(&self) -> i64 {
        self.0
    }

    pub fn parse(raw: &str) -> Result<Self, SearchError> {
        let bytes = hex::decode(raw).map_err(|_| SearchError::InvalidCursor)?;
        let bytes: [u8; 8] = bytes
            .try_into()
            .map_err(|_| SearchError::InvalidCursor)?;
        Ok(Self(i64::from_be_bytes(bytes)))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_be_bytes()))
    }
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document: ItemDocument,
    /// Resume point directly after this hit.
    pub cursor: Cursor,
}

#[derive(Debug, Clone)]
pub struct SearchPage {
    pub results: Vec<SearchHit>,
    /// Present only when more results follow this page.
    pub cursor: Option<Cursor>,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Insert or replace a document.
    async fn put(&self, document: ItemDocument) -> Result<(), SearchError>;

    async fn get(&self, doc_id: i64) -> Result<Option<ItemDocument>, SearchError>;

    async fn delete(&self, doc_id: i64) -> Result<(), SearchError>;

    async fn search(
        &self,
        query: &SearchQuery,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> Result<SearchPage, SearchError>;

    async fn clear(&self) -> Result<(), SearchError>;
}

pub type DynSearchIndex = Arc<dyn SearchIndex>;
