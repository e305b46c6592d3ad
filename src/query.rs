//! Filter keys for the list views.
//!
//! Each key is composed from every dimension the view exposes (scope,
//! search text, sort, order). Changing any one of them yields a different
//! key, and a different key is what makes a [`PagedList`](crate::paged::PagedList)
//! throw its pages away and start over.

use crate::models::Id;

fn normalize_search(q: Option<String>) -> Option<String> {
    q.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PostSort {
    #[default]
    Popularity,
    Recency,
    Views,
}

impl PostSort {
    pub fn as_param(self) -> &'static str {
        match self {
            PostSort::Popularity => "popularity",
            PostSort::Recency => "recency",
            PostSort::Views => "views",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "popularity" => Some(PostSort::Popularity),
            "recency" => Some(PostSort::Recency),
            "views" => Some(PostSort::Views),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CommentSort {
    #[default]
    CreatedAt,
    Likes,
}

impl CommentSort {
    pub fn as_param(self) -> &'static str {
        match self {
            CommentSort::CreatedAt => "created_at",
            CommentSort::Likes => "likes",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_param(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Topics are always newest first; only the search text varies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TopicQuery {
    search: Option<String>,
}

impl TopicQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_search(self, q: impl Into<String>) -> Self {
        Self { search: normalize_search(Some(q.into())) }
    }

    pub fn without_search(self) -> Self {
        Self { search: None }
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PostScope {
    #[default]
    All,
    Topic(Id),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PostQuery {
    scope: PostScope,
    search: Option<String>,
    sort: PostSort,
}

impl PostQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_topic(topic_id: Id) -> Self {
        Self { scope: PostScope::Topic(topic_id), ..Self::default() }
    }

    pub fn with_search(self, q: impl Into<String>) -> Self {
        Self { search: normalize_search(Some(q.into())), ..self }
    }

    pub fn without_search(self) -> Self {
        Self { search: None, ..self }
    }

    pub fn with_sort(self, sort: PostSort) -> Self {
        Self { sort, ..self }
    }

    pub fn scope(&self) -> PostScope {
        self.scope
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn sort(&self) -> PostSort {
        self.sort
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommentQuery {
    post_id: Id,
    sort: CommentSort,
    order: SortOrder,
}

impl CommentQuery {
    pub fn for_post(post_id: Id) -> Self {
        Self { post_id, sort: CommentSort::default(), order: SortOrder::default() }
    }

    pub fn with_sort(self, sort: CommentSort) -> Self {
        Self { sort, ..self }
    }

    pub fn with_order(self, order: SortOrder) -> Self {
        Self { order, ..self }
    }

    pub fn post_id(&self) -> Id {
        self.post_id
    }

    pub fn sort(&self) -> CommentSort {
        self.sort
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_search_is_no_search() {
        assert_eq!(PostQuery::all().with_search("   "), PostQuery::all());
        assert_eq!(TopicQuery::all().with_search(" rust "), TopicQuery::all().with_search("rust"));
    }

    #[test]
    fn every_dimension_changes_the_key() {
        let base = PostQuery::in_topic(3).with_search("tokio");
        assert_ne!(base, base.clone().with_sort(PostSort::Views));
        assert_ne!(base, base.clone().without_search());
        assert_ne!(base, PostQuery::in_topic(4).with_search("tokio"));
        // sort kept when search changes
        let sorted = base.clone().with_sort(PostSort::Recency).with_search("serde");
        assert_eq!(sorted.sort(), PostSort::Recency);
    }

    #[test]
    fn comment_key_tracks_sort_and_order() {
        let q = CommentQuery::for_post(1);
        assert_ne!(q, q.clone().with_order(SortOrder::Asc));
        assert_ne!(q, q.clone().with_sort(CommentSort::Likes));
        assert_eq!(PostSort::parse(" Views"), Some(PostSort::Views));
    }
}
