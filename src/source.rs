use async_trait::async_trait;

use crate::error::{FetchResult, MutationResult};
use crate::models::*;
use crate::query::{CommentQuery, PostQuery, TopicQuery};

/// Fetches one page of a flat list. `cursor` is 1-based.
#[async_trait]
pub trait PageSource<T, K>: Send + Sync {
    async fn fetch_page(&self, cursor: Cursor, key: &K) -> FetchResult<Page<T>>;
}

/// Fetches one page of a node's children.
#[async_trait]
pub trait ChildSource<T>: Send + Sync {
    async fn fetch_children(&self, parent: Id, cursor: Cursor) -> FetchResult<Page<T>>;
}

#[async_trait]
pub trait TopicWriter: Send + Sync {
    async fn create_topic(&self, new: NewTopic) -> MutationResult<Topic>;
    async fn update_topic(&self, id: Id, upd: UpdateTopic) -> MutationResult<Topic>;
    async fn delete_topic(&self, id: Id) -> MutationResult<()>;
}

#[async_trait]
pub trait PostWriter: Send + Sync {
    async fn create_post(&self, new: NewPost) -> MutationResult<Post>;
    async fn update_post(&self, id: Id, upd: UpdatePost) -> MutationResult<Post>;
    async fn delete_post(&self, id: Id) -> MutationResult<()>;
    /// Counts one more view of a post that was shown with `views` views.
    /// Needs no login.
    async fn record_view(&self, id: Id, views: i64) -> MutationResult<Post>;
    async fn my_post_reaction(&self, id: Id) -> MutationResult<Option<Reaction>>;
    async fn react_post(&self, id: Id, reaction: Reaction) -> MutationResult<()>;
    async fn unreact_post(&self, id: Id) -> MutationResult<()>;
}

#[async_trait]
pub trait CommentWriter: Send + Sync {
    async fn create_comment(&self, new: NewComment) -> MutationResult<Comment>;
    async fn update_comment(&self, id: Id, upd: UpdateComment) -> MutationResult<Comment>;
    /// Soft delete: the server keeps the row and clears its text.
    async fn delete_comment(&self, id: Id) -> MutationResult<()>;
    async fn react_comment(&self, id: Id, reaction: Reaction) -> MutationResult<()>;
    async fn unreact_comment(&self, id: Id) -> MutationResult<()>;
}

/// Everything the forum views need from the remote side.
pub trait ForumApi:
    PageSource<Topic, TopicQuery>
    + PageSource<Post, PostQuery>
    + PageSource<Comment, CommentQuery>
    + ChildSource<Comment>
    + TopicWriter
    + PostWriter
    + CommentWriter
{
}

impl<T> ForumApi for T where
    T: PageSource<Topic, TopicQuery>
        + PageSource<Post, PostQuery>
        + PageSource<Comment, CommentQuery>
        + ChildSource<Comment>
        + TopicWriter
        + PostWriter
        + CommentWriter
{
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use crate::auth::{Identity, SessionOracle};
    use crate::config::PAGE_SIZE;
    use crate::error::{FetchError, MutationError};
    use crate::query::{CommentSort, PostScope, PostSort, SortOrder};
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use std::time::Duration;

    #[derive(Default)]
    struct State {
        users: HashMap<Id, String>,
        topics: HashMap<Id, Topic>,
        posts: HashMap<Id, Post>,
        comments: HashMap<Id, Comment>,
        post_reactions: HashMap<(Id, Id), Reaction>, // (post, user)
        comment_reactions: HashMap<(Id, Id), Reaction>,
        session: Option<Id>,
        next_id: Id,
        fail_next: usize,
        latency: Option<Duration>,
        fetches: usize,
    }

    /// Forum server kept in memory. Mirrors the REST API's paging and
    /// sorting rules; also acts as the session oracle for whoever is
    /// logged in through [`InMemForum::login`].
    #[derive(Clone)]
    pub struct InMemForum {
        state: Arc<RwLock<State>>,
        epoch: DateTime<Utc>,
    }

    impl Default for InMemForum {
        fn default() -> Self { Self::new() }
    }

    impl InMemForum {
        pub fn new() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), epoch: Utc::now() }
        }

        // recover the guard from a poisoned lock
        fn read(&self) -> RwLockReadGuard<'_, State> {
            self.state.read().unwrap_or_else(|e| e.into_inner())
        }

        fn write(&self) -> RwLockWriteGuard<'_, State> {
            self.state.write().unwrap_or_else(|e| e.into_inner())
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }

        // one second per id keeps created_at strictly increasing
        fn stamp(&self, id: Id) -> DateTime<Utc> {
            self.epoch + ChronoDuration::seconds(id)
        }

        pub fn add_user(&self, username: &str) -> Id {
            let mut s = self.write();
            let id = Self::next_id(&mut s);
            s.users.insert(id, username.to_string());
            id
        }

        pub fn login(&self, user_id: Id) {
            self.write().session = Some(user_id);
        }

        pub fn logout(&self) {
            self.write().session = None;
        }

        /// Makes the next `n` page fetches fail with a 503.
        pub fn fail_next_fetches(&self, n: usize) {
            self.write().fail_next = n;
        }

        /// Delays every page fetch.
        pub fn set_latency(&self, latency: Option<Duration>) {
            self.write().latency = latency;
        }

        /// Number of page fetches served (including failed ones).
        pub fn fetch_count(&self) -> usize {
            self.read().fetches
        }

        pub fn seed_topic(&self, author: Id, title: &str) -> Topic {
            let mut s = self.write();
            let id = Self::next_id(&mut s);
            let topic = Topic { id, title: title.into(), description: String::new(), created_by: author, created_at: self.stamp(id) };
            s.topics.insert(id, topic.clone());
            topic
        }

        pub fn seed_post(&self, topic_id: Id, author: Id, title: &str, popularity: i64, views: i64) -> Post {
            let mut s = self.write();
            let id = Self::next_id(&mut s);
            let post = Post {
                id,
                title: title.into(),
                description: format!("{title} body"),
                topic_id,
                likes: 0,
                dislikes: 0,
                is_edited: false,
                views,
                popularity,
                created_by: author,
                created_at: self.stamp(id),
            };
            s.posts.insert(id, post.clone());
            post
        }

        pub fn seed_comment(&self, post_id: Id, parent: Option<Id>, author: Id, text: &str) -> Comment {
            let mut s = self.write();
            let id = Self::next_id(&mut s);
            let comment = Comment {
                id,
                description: text.into(),
                likes: 0,
                dislikes: 0,
                is_edited: false,
                post_id,
                parent_comment_id: parent,
                created_by: author,
                created_at: self.stamp(id),
                username: s.users.get(&author).cloned().unwrap_or_default(),
            };
            s.comments.insert(id, comment.clone());
            comment
        }

        pub fn comment(&self, id: Id) -> Option<Comment> {
            self.read().comments.get(&id).cloned()
        }

        pub fn post(&self, id: Id) -> Option<Post> {
            self.read().posts.get(&id).cloned()
        }

        /// Shared prologue of every page fetch: latency, fault injection, counting.
        async fn serve(&self) -> FetchResult<()> {
            let latency = self.read().latency;
            if let Some(d) = latency {
                tokio::time::sleep(d).await;
            }
            let mut s = self.write();
            s.fetches += 1;
            if s.fail_next > 0 {
                s.fail_next -= 1;
                log::warn!("[inmem] injected fetch failure");
                return Err(FetchError::Status(503));
            }
            Ok(())
        }

        fn page_of<T: Clone>(sorted: Vec<&T>, cursor: Cursor) -> Page<T> {
            let offset = (cursor.max(1) as usize - 1) * PAGE_SIZE;
            Page::new(sorted.into_iter().skip(offset).take(PAGE_SIZE).cloned().collect())
        }

        fn session_user(s: &State) -> MutationResult<Id> {
            s.session.ok_or(MutationError::NotLoggedIn)
        }
    }

    fn matches(q: &str, fields: &[&str]) -> bool {
        let q = q.to_lowercase();
        fields.iter().any(|f| f.to_lowercase().contains(&q))
    }

    #[async_trait]
    impl PageSource<Topic, TopicQuery> for InMemForum {
        async fn fetch_page(&self, cursor: Cursor, key: &TopicQuery) -> FetchResult<Page<Topic>> {
            self.serve().await?;
            let s = self.read();
            let mut v: Vec<&Topic> = s
                .topics
                .values()
                .filter(|t| key.search().map_or(true, |q| matches(q, &[t.title.as_str(), t.description.as_str()])))
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))); // newest first
            Ok(Self::page_of(v, cursor))
        }
    }

    #[async_trait]
    impl PageSource<Post, PostQuery> for InMemForum {
        async fn fetch_page(&self, cursor: Cursor, key: &PostQuery) -> FetchResult<Page<Post>> {
            self.serve().await?;
            let s = self.read();
            let mut v: Vec<&Post> = s
                .posts
                .values()
                .filter(|p| match key.scope() {
                    PostScope::All => true,
                    PostScope::Topic(t) => p.topic_id == t,
                })
                .filter(|p| key.search().map_or(true, |q| matches(q, &[p.title.as_str(), p.description.as_str()])))
                .collect();
            v.sort_by(|a, b| {
                let primary = match key.sort() {
                    PostSort::Popularity => b.popularity.cmp(&a.popularity),
                    PostSort::Recency => b.created_at.cmp(&a.created_at),
                    PostSort::Views => b.views.cmp(&a.views),
                };
                primary.then(b.id.cmp(&a.id))
            });
            Ok(Self::page_of(v, cursor))
        }
    }

    #[async_trait]
    impl PageSource<Comment, CommentQuery> for InMemForum {
        async fn fetch_page(&self, cursor: Cursor, key: &CommentQuery) -> FetchResult<Page<Comment>> {
            self.serve().await?;
            let s = self.read();
            let mut v: Vec<&Comment> = s
                .comments
                .values()
                .filter(|c| c.post_id == key.post_id() && c.parent_comment_id.is_none())
                .collect();
            v.sort_by(|a, b| {
                let asc = match key.sort() {
                    CommentSort::CreatedAt => a.created_at.cmp(&b.created_at),
                    CommentSort::Likes => a.likes.cmp(&b.likes),
                }
                .then(a.id.cmp(&b.id));
                match key.order() {
                    SortOrder::Asc => asc,
                    SortOrder::Desc => asc.reverse(),
                }
            });
            Ok(Self::page_of(v, cursor))
        }
    }

    #[async_trait]
    impl ChildSource<Comment> for InMemForum {
        async fn fetch_children(&self, parent: Id, cursor: Cursor) -> FetchResult<Page<Comment>> {
            self.serve().await?;
            let s = self.read();
            let mut v: Vec<&Comment> = s.comments.values().filter(|c| c.parent_comment_id == Some(parent)).collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at)); // ascending
            Ok(Self::page_of(v, cursor))
        }
    }

    #[async_trait]
    impl TopicWriter for InMemForum {
        async fn create_topic(&self, new: NewTopic) -> MutationResult<Topic> {
            if new.title.trim().is_empty() || new.description.trim().is_empty() {
                return Err(MutationError::Invalid("empty fields".into()));
            }
            let mut s = self.write();
            let user = Self::session_user(&s)?;
            let id = Self::next_id(&mut s);
            let topic = Topic { id, title: new.title, description: new.description, created_by: user, created_at: self.stamp(id) };
            s.topics.insert(id, topic.clone());
            Ok(topic)
        }

        async fn update_topic(&self, id: Id, upd: UpdateTopic) -> MutationResult<Topic> {
            let mut s = self.write();
            let user = Self::session_user(&s)?;
            let topic = s.topics.get_mut(&id).ok_or(MutationError::NotFound)?;
            if topic.created_by != user {
                return Err(MutationError::NotOwner);
            }
            if let Some(title) = upd.title { topic.title = title; }
            if let Some(description) = upd.description { topic.description = description; }
            Ok(topic.clone())
        }

        async fn delete_topic(&self, id: Id) -> MutationResult<()> {
            let mut s = self.write();
            let user = Self::session_user(&s)?;
            let owner = s.topics.get(&id).ok_or(MutationError::NotFound)?.created_by;
            if owner != user {
                return Err(MutationError::NotOwner);
            }
            s.topics.remove(&id);
            Ok(())
        }
    }

    #[async_trait]
    impl PostWriter for InMemForum {
        async fn create_post(&self, new: NewPost) -> MutationResult<Post> {
            if new.title.trim().is_empty() {
                return Err(MutationError::Invalid("empty title".into()));
            }
            let mut s = self.write();
            let user = Self::session_user(&s)?;
            if !s.topics.contains_key(&new.topic_id) {
                return Err(MutationError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let post = Post {
                id,
                title: new.title,
                description: new.description,
                topic_id: new.topic_id,
                likes: 0,
                dislikes: 0,
                is_edited: false,
                views: 0,
                popularity: 0,
                created_by: user,
                created_at: self.stamp(id),
            };
            s.posts.insert(id, post.clone());
            Ok(post)
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> MutationResult<Post> {
            let mut s = self.write();
            let user = Self::session_user(&s)?;
            let post = s.posts.get_mut(&id).ok_or(MutationError::NotFound)?;
            if post.created_by != user {
                return Err(MutationError::NotOwner);
            }
            if let Some(title) = upd.title { post.title = title; }
            if let Some(description) = upd.description { post.description = description; }
            post.is_edited = true;
            Ok(post.clone())
        }

        async fn delete_post(&self, id: Id) -> MutationResult<()> {
            let mut s = self.write();
            let user = Self::session_user(&s)?;
            let owner = s.posts.get(&id).ok_or(MutationError::NotFound)?.created_by;
            if owner != user {
                return Err(MutationError::NotOwner);
            }
            s.posts.remove(&id);
            s.comments.retain(|_, c| c.post_id != id);
            Ok(())
        }

        async fn record_view(&self, id: Id, views: i64) -> MutationResult<Post> {
            let mut s = self.write();
            let post = s.posts.get_mut(&id).ok_or(MutationError::NotFound)?;
            post.views = views + 1;
            Ok(post.clone())
        }

        async fn my_post_reaction(&self, id: Id) -> MutationResult<Option<Reaction>> {
            let s = self.read();
            let user = Self::session_user(&s)?;
            Ok(s.post_reactions.get(&(id, user)).copied())
        }

        async fn react_post(&self, id: Id, reaction: Reaction) -> MutationResult<()> {
            let mut s = self.write();
            let user = Self::session_user(&s)?;
            if s.post_reactions.contains_key(&(id, user)) {
                return Err(MutationError::ReactionConflict);
            }
            let post = s.posts.get_mut(&id).ok_or(MutationError::NotFound)?;
            match reaction {
                Reaction::Like => post.likes += 1,
                Reaction::Dislike => post.dislikes += 1,
            }
            s.post_reactions.insert((id, user), reaction);
            Ok(())
        }

        async fn unreact_post(&self, id: Id) -> MutationResult<()> {
            let mut s = self.write();
            let user = Self::session_user(&s)?;
            let reaction = s.post_reactions.remove(&(id, user)).ok_or(MutationError::NotFound)?;
            if let Some(post) = s.posts.get_mut(&id) {
                match reaction {
                    Reaction::Like => post.likes -= 1,
                    Reaction::Dislike => post.dislikes -= 1,
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CommentWriter for InMemForum {
        async fn create_comment(&self, new: NewComment) -> MutationResult<Comment> {
            if new.description.trim().is_empty() {
                return Err(MutationError::Invalid("empty fields".into()));
            }
            let mut s = self.write();
            let user = Self::session_user(&s)?;
            if !s.posts.contains_key(&new.post_id) {
                return Err(MutationError::NotFound);
            }
            if let Some(parent) = new.parent_comment_id {
                match s.comments.get(&parent) {
                    Some(p) if p.post_id == new.post_id => {}
                    _ => return Err(MutationError::NotFound),
                }
            }
            let id = Self::next_id(&mut s);
            let comment = Comment {
                id,
                description: new.description,
                likes: 0,
                dislikes: 0,
                is_edited: false,
                post_id: new.post_id,
                parent_comment_id: new.parent_comment_id,
                created_by: user,
                created_at: self.stamp(id),
                username: s.users.get(&user).cloned().unwrap_or_default(),
            };
            s.comments.insert(id, comment.clone());
            Ok(comment)
        }

        async fn update_comment(&self, id: Id, upd: UpdateComment) -> MutationResult<Comment> {
            if upd.description.as_deref().is_some_and(|d| d.is_empty()) {
                return Err(MutationError::Invalid("description cannot be empty".into()));
            }
            let mut s = self.write();
            let user = Self::session_user(&s)?;
            let comment = s.comments.get_mut(&id).ok_or(MutationError::NotFound)?;
            if comment.created_by != user {
                return Err(MutationError::NotOwner);
            }
            if let Some(description) = upd.description {
                comment.description = description;
                comment.is_edited = true;
            }
            Ok(comment.clone())
        }

        async fn delete_comment(&self, id: Id) -> MutationResult<()> {
            let mut s = self.write();
            let user = Self::session_user(&s)?;
            let comment = s.comments.get_mut(&id).ok_or(MutationError::NotFound)?;
            if comment.created_by != user {
                return Err(MutationError::NotOwner);
            }
            comment.description.clear();
            Ok(())
        }

        async fn react_comment(&self, id: Id, reaction: Reaction) -> MutationResult<()> {
            let mut s = self.write();
            let user = Self::session_user(&s)?;
            if s.comment_reactions.contains_key(&(id, user)) {
                return Err(MutationError::ReactionConflict);
            }
            let comment = s.comments.get_mut(&id).ok_or(MutationError::NotFound)?;
            match reaction {
                Reaction::Like => comment.likes += 1,
                Reaction::Dislike => comment.dislikes += 1,
            }
            s.comment_reactions.insert((id, user), reaction);
            Ok(())
        }

        async fn unreact_comment(&self, id: Id) -> MutationResult<()> {
            let mut s = self.write();
            let user = Self::session_user(&s)?;
            let reaction = s.comment_reactions.remove(&(id, user)).ok_or(MutationError::NotFound)?;
            if let Some(comment) = s.comments.get_mut(&id) {
                match reaction {
                    Reaction::Like => comment.likes -= 1,
                    Reaction::Dislike => comment.dislikes -= 1,
                }
            }
            Ok(())
        }
    }

    impl SessionOracle for InMemForum {
        fn current_identity(&self) -> Identity {
            let s = self.read();
            match s.session {
                Some(id) => Identity::logged_in(id, s.users.get(&id).cloned().unwrap_or_default()),
                None => Identity::anonymous(),
            }
        }
    }
}
