use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Server ids are bigserial
pub type Id = i64;

/// 1-based page index sent to the server.
pub type Cursor = u32;

/// Text shown in place of a soft-deleted comment.
pub const TOMBSTONE_TEXT: &str = "Comment deleted";

/// Stable identity of anything the engine paginates.
pub trait Identified {
    fn id(&self) -> Id;
}

/// Items that belong to a user; used to gate edit/delete.
pub trait Authored {
    fn created_by(&self) -> Id;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Topic {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewTopic {
    pub title: String,
    pub description: String,
}
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateTopic {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub topic_id: Id,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub dislikes: i64,
    #[serde(default, deserialize_with = "flag")]
    pub is_edited: bool, // server sends 0/1
    #[serde(default)]
    pub views: i64,
    #[serde(default)]
    pub popularity: i64,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPost {
    pub topic_id: Id,
    pub title: String,
    pub description: String,
}
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdatePost {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: Id,
    pub description: String, // empty string = soft deleted
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub dislikes: i64,
    #[serde(default, deserialize_with = "flag")]
    pub is_edited: bool,
    pub post_id: Id,
    pub parent_comment_id: Option<Id>,
    pub created_by: Id,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub username: String,
}

impl Comment {
    pub fn is_deleted(&self) -> bool {
        self.description.is_empty()
    }

    pub fn display_text(&self) -> &str {
        if self.is_deleted() { TOMBSTONE_TEXT } else { &self.description }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewComment {
    pub post_id: Id,
    pub parent_comment_id: Option<Id>,
    pub description: String,
}
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateComment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One fetched page. `raw_count` is what the server returned, before any
/// client-side deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub raw_count: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        let raw_count = items.len();
        Self { items, raw_count }
    }

    pub fn empty() -> Self {
        Self { items: Vec::new(), raw_count: 0 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    /// Wire form used by the reaction endpoints (`true` = like).
    pub fn as_flag(self) -> bool {
        matches!(self, Reaction::Like)
    }

    pub fn from_flag(flag: bool) -> Self {
        if flag { Reaction::Like } else { Reaction::Dislike }
    }
}

/// Counter change produced by a confirmed reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionDelta {
    pub likes: i64,
    pub dislikes: i64,
}

impl ReactionDelta {
    pub fn added(r: Reaction) -> Self {
        match r {
            Reaction::Like => Self { likes: 1, dislikes: 0 },
            Reaction::Dislike => Self { likes: 0, dislikes: 1 },
        }
    }

    pub fn removed(r: Reaction) -> Self {
        let d = Self::added(r);
        Self { likes: -d.likes, dislikes: -d.dislikes }
    }
}

fn flag<'de, D>(de: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
    }
    Ok(match Raw::deserialize(de)? {
        Raw::Bool(b) => b,
        Raw::Int(i) => i != 0,
    })
}

impl Identified for Topic {
    fn id(&self) -> Id { self.id }
}
impl Identified for Post {
    fn id(&self) -> Id { self.id }
}
impl Identified for Comment {
    fn id(&self) -> Id { self.id }
}
impl Identified for Id {
    fn id(&self) -> Id { *self }
}

impl Authored for Topic {
    fn created_by(&self) -> Id { self.created_by }
}
impl Authored for Post {
    fn created_by(&self) -> Id { self.created_by }
}
impl Authored for Comment {
    fn created_by(&self) -> Id { self.created_by }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comment_accepts_numeric_edit_flag_and_null_parent() {
        let c: Comment = serde_json::from_value(serde_json::json!({
            "id": 4, "description": "", "likes": 2, "dislikes": 0, "is_edited": 1,
            "post_id": 1, "parent_comment_id": null, "created_by": 9,
            "created_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert!(c.is_edited);
        assert_eq!(c.parent_comment_id, None);
        assert_eq!(c.display_text(), TOMBSTONE_TEXT);
        assert!(c.username.is_empty());
    }

    #[test]
    fn reaction_delta_is_symmetric() {
        let add = ReactionDelta::added(Reaction::Dislike);
        let rm = ReactionDelta::removed(Reaction::Dislike);
        assert_eq!(add.dislikes + rm.dislikes, 0);
        assert_eq!(add.likes, 0);
    }
}
