//! Domain entities mirrored from persistent storage.
//!
//! Timestamps are UTC epoch milliseconds throughout.

use serde::{Deserialize, Serialize};

use crate::domain::types::{ContentStatus, ToggleStatus};

/// Default number of characters kept in a listing abstract.
pub const DEFAULT_ABSTRACT_CHARS: usize = 128;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    /// Display name; empty when it has not been resolved.
    #[serde(default)]
    pub name: String,
}

impl Author {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            name: String::new(),
        }
    }
}

/// The author's working copy of a content item.
///
/// `id == 0` means the row has not been created yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub author: Author,
    pub status: ContentStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ContentItem {
    pub fn draft(author_id: i64, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: 0,
            title: title.into(),
            body: body.into(),
            author: Author::new(author_id),
            status: ContentStatus::Unpublished,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id <= 0
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Copy of this item whose body is replaced by its abstract.
    pub fn abstracted(&self, max_chars: usize) -> Self {
        Self {
            body: abstract_of(&self.body, max_chars),
            ..self.clone()
        }
    }
}

/// First `max_chars` characters of `body`, split on character boundaries.
pub fn abstract_of(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => body[..cut].to_string(),
        None => body.to_string(),
    }
}

/// Reader-facing projection of a draft. Its id is always the draft's id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedItem {
    pub id: i64,
    pub title: String,
    /// Empty when the body lives in the object store.
    pub body: String,
    pub author_id: i64,
    pub status: ContentStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl PublishedItem {
    /// Projection of `draft` carrying its id; `inline_body == false` keeps metadata only.
    pub fn from_draft(draft: &ContentItem, inline_body: bool) -> Self {
        Self {
            id: draft.id,
            title: draft.title.clone(),
            body: if inline_body {
                draft.body.clone()
            } else {
                String::new()
            },
            author_id: draft.author.id,
            status: draft.status,
            created_at: draft.created_at,
            updated_at: draft.updated_at,
        }
    }

    pub fn into_content(self, author_name: String) -> ContentItem {
        ContentItem {
            id: self.id,
            title: self.title,
            body: self.body,
            author: Author {
                id: self.author_id,
                name: author_name,
            },
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Read/like/collect counters of one (biz, biz_id).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionCounts {
    pub read_count: i64,
    pub like_count: i64,
    pub collect_count: i64,
}

/// Persisted counter row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRecord {
    pub biz: String,
    pub biz_id: i64,
    pub counts: InteractionCounts,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Counters plus the per-user flags for the requesting user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Interaction {
    pub biz: String,
    pub biz_id: i64,
    pub counts: InteractionCounts,
    pub liked: bool,
    pub collected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeRecord {
    pub user_id: i64,
    pub biz: String,
    pub biz_id: i64,
    pub status: ToggleStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A collect toggle. Unique per (user, biz, biz_id); the collection id is a plain column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectRecord {
    pub user_id: i64,
    pub biz: String,
    pub biz_id: i64,
    pub collection_id: i64,
    pub status: ToggleStatus,
    pub created_at: i64,
    pub updated_at: i64,
}
