use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Always Postgres compatible (BIGSERIAL keys)
pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String, // argon2 PHC string, never leaves the server
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Role {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Permission {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Channel {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<Id>, // adjacency list; fixed at creation
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A channel together with the channels nested directly below it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChannelDetail {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub channels: Vec<Channel>,
}

impl ChannelDetail {
    pub fn new(channel: Channel, channels: Vec<Channel>) -> Self {
        Self {
            id: channel.id,
            name: channel.name,
            slug: channel.slug,
            parent_id: channel.parent_id,
            created_at: channel.created_at,
            updated_at: channel.updated_at,
            channels,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewChannel {
    pub name: String,
    pub slug: String,
    pub parent_id: Option<Id>,
}

#[derive(Debug, Clone)]
pub struct UpdateChannel {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Thread {
    pub id: Id,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub publish: bool,
    pub user_id: Id,
    pub channel_id: Id,
    pub best_answer_id: Option<Id>, // must point at an answer of this thread
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewThread {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub publish: bool,
    pub user_id: Id,
    pub channel_id: Id,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateThread {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub channel_id: Option<Id>,
    pub publish: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadFilter {
    pub channel_id: Option<Id>,
    pub include_unpublished: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Answer {
    pub id: Id,
    pub content: String,
    pub thread_id: Id,
    pub user_id: Id,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub content: String,
    pub thread_id: Id,
    pub user_id: Id,
}
