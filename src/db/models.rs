use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The only login type currently accepted.
pub const LOGIN_TYPE_FACEBOOK: &str = "facebook";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login_type: String,
    pub third_party_id: String,
    pub name: String,
    pub distance_radius_km: i64,
    pub seen_item_ids: Vec<i64>,
    pub ongoing_conversations: Vec<i64>,
    pub last_active: DateTime<Utc>,
}

impl User {
    pub fn has_seen(&self, item_id: i64) -> bool {
        self.seen_item_ids.contains(&item_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub blob_key: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub user_id: i64,
    pub create_date: DateTime<Utc>,
    pub modify_date: DateTime<Utc>,
    pub images: Vec<Image>,
}

impl Item {
    /// Most images an item may carry.
    pub const MAX_IMAGES: usize = 5;

    pub fn is_owned_by(&self, user: &User) -> bool {
        self.user_id == user.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeState {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub like_state: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub item_id: i64,
    pub buyer_id: i64,
    pub last_activity_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub message: String,
    pub create_date: DateTime<Utc>,
}

/// A message about to be appended to a conversation.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub user_id: i64,
    pub user_name: String,
    pub message: String,
}

pub fn to_micros(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_micros()
}

pub fn from_micros(micros: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(micros)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
