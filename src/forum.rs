//! Forum views wired to one backend and one session.
//!
//! Every write goes to the backend first; the loaded feed is only touched
//! once the call has succeeded, and then through a single [`Mutation`].

use std::sync::Arc;

use metrics::increment_counter;
use tracing::{info, warn};

use crate::auth::{require_login, require_owner, Identity, SessionOracle};
use crate::error::{MutationError, MutationResult};
use crate::feed::{Feed, TreeFeed};
use crate::merge::{Mutation, ReactionPlan};
use crate::models::*;
use crate::query::{CommentQuery, PostQuery, PostScope, TopicQuery};
use crate::source::{ChildSource, ForumApi, PageSource};

pub type TopicFeed = Feed<Topic, TopicQuery>;
pub type PostFeed = Feed<Post, PostQuery>;
pub type CommentFeed = TreeFeed<Comment, CommentQuery>;

pub struct ForumClient<A> {
    api: Arc<A>,
    session: Arc<dyn SessionOracle>,
}

impl<A> Clone for ForumClient<A> {
    fn clone(&self) -> Self {
        Self { api: Arc::clone(&self.api), session: Arc::clone(&self.session) }
    }
}

fn record<T>(op: &'static str, result: MutationResult<T>) -> MutationResult<T> {
    if let Err(error) = &result {
        warn!(op, %error, "mutation failed");
        increment_counter!("forumfeed_mutation_failed", "op" => op);
    }
    result
}

impl<A: ForumApi + 'static> ForumClient<A> {
    pub fn new(api: Arc<A>, session: Arc<dyn SessionOracle>) -> Self {
        Self { api, session }
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    pub fn identity(&self) -> Identity {
        self.session.current_identity()
    }

    // ── views ───────────────────────────────────────────────────────

    /// Topic list, first page already requested.
    pub fn topics(&self, query: TopicQuery) -> TopicFeed {
        let source: Arc<dyn PageSource<Topic, TopicQuery>> = self.api.clone();
        let mut feed = Feed::new(source, query).labelled("topics");
        feed.open();
        feed
    }

    pub fn posts(&self, query: PostQuery) -> PostFeed {
        let source: Arc<dyn PageSource<Post, PostQuery>> = self.api.clone();
        let mut feed = Feed::new(source, query).labelled("posts");
        feed.open();
        feed
    }

    pub fn comments(&self, query: CommentQuery) -> CommentFeed {
        let roots: Arc<dyn PageSource<Comment, CommentQuery>> = self.api.clone();
        let children: Arc<dyn ChildSource<Comment>> = self.api.clone();
        let mut feed = TreeFeed::new(roots, children, query).labelled("comments");
        feed.open();
        feed
    }

    // ── topics ──────────────────────────────────────────────────────

    pub async fn create_topic(&self, feed: &mut TopicFeed, new: NewTopic) -> MutationResult<Topic> {
        record("create_topic", async {
            require_login(self.session.as_ref())?;
            let topic = self.api.create_topic(new).await?;
            info!(id = topic.id, "topic created");
            feed.apply(Mutation::Insert { parent: None, item: topic.clone() });
            Ok(topic)
        }
        .await)
    }

    pub async fn edit_topic(&self, feed: &mut TopicFeed, id: Id, upd: UpdateTopic) -> MutationResult<Topic> {
        record("edit_topic", async {
            self.gate(feed.list().find(id))?;
            let topic = self.api.update_topic(id, upd).await?;
            feed.apply(Mutation::Replace(topic.clone()));
            Ok(topic)
        }
        .await)
    }

    pub async fn delete_topic(&self, feed: &mut TopicFeed, id: Id) -> MutationResult<()> {
        record("delete_topic", async {
            self.gate(feed.list().find(id))?;
            self.api.delete_topic(id).await?;
            feed.apply(Mutation::Remove(id));
            Ok(())
        }
        .await)
    }

    // ── posts ───────────────────────────────────────────────────────

    /// Creates a post; it is put at the front of `feed` when the feed shows
    /// that post's topic.
    pub async fn create_post(&self, feed: &mut PostFeed, new: NewPost) -> MutationResult<Post> {
        record("create_post", async {
            require_login(self.session.as_ref())?;
            let post = self.api.create_post(new).await?;
            info!(id = post.id, topic = post.topic_id, "post created");
            let shown = match feed.query().scope() {
                PostScope::All => true,
                PostScope::Topic(t) => t == post.topic_id,
            };
            if shown {
                feed.apply(Mutation::Insert { parent: None, item: post.clone() });
            }
            Ok(post)
        }
        .await)
    }

    pub async fn edit_post(&self, feed: &mut PostFeed, id: Id, upd: UpdatePost) -> MutationResult<Post> {
        record("edit_post", async {
            self.gate(feed.list().find(id))?;
            let post = self.api.update_post(id, upd).await?;
            feed.apply(Mutation::Replace(post.clone()));
            Ok(post)
        }
        .await)
    }

    pub async fn delete_post(&self, feed: &mut PostFeed, id: Id) -> MutationResult<()> {
        record("delete_post", async {
            self.gate(feed.list().find(id))?;
            self.api.delete_post(id).await?;
            feed.apply(Mutation::Remove(id));
            Ok(())
        }
        .await)
    }

    /// Records a view of a loaded post before it is opened and refreshes it
    /// in `feed`. Anonymous readers count too.
    pub async fn open_post(&self, feed: &mut PostFeed, id: Id) -> MutationResult<Post> {
        record("open_post", async {
            let views = feed.list().find(id).map(|p| p.views).ok_or(MutationError::NotFound)?;
            let post = self.api.record_view(id, views).await?;
            feed.apply(Mutation::Replace(post.clone()));
            Ok(post)
        }
        .await)
    }

    pub async fn my_post_reaction(&self, id: Id) -> MutationResult<Option<Reaction>> {
        require_login(self.session.as_ref())?;
        self.api.my_post_reaction(id).await
    }

    /// Presses a reaction button on a post. `current` is the user's reaction
    /// as last known; returns the reaction after the press.
    pub async fn react_post(
        &self,
        feed: &mut PostFeed,
        id: Id,
        current: Option<Reaction>,
        pressed: Reaction,
    ) -> MutationResult<Option<Reaction>> {
        record("react_post", async {
            require_login(self.session.as_ref())?;
            let plan = ReactionPlan::plan(current, pressed)?;
            match plan {
                ReactionPlan::Add(r) => self.api.react_post(id, r).await?,
                ReactionPlan::Remove(_) => self.api.unreact_post(id).await?,
            }
            feed.apply(Mutation::React { id, delta: plan.delta() });
            Ok(plan.resulting())
        }
        .await)
    }

    // ── comments ────────────────────────────────────────────────────

    /// Posts a comment, or a reply when `parent` is set. The new comment is
    /// shown first under its parent whether or not the parent was expanded.
    pub async fn reply(
        &self,
        tree: &mut CommentFeed,
        post_id: Id,
        parent: Option<Id>,
        text: &str,
    ) -> MutationResult<Comment> {
        record("reply", async {
            let me = require_login(self.session.as_ref())?;
            let text = text.trim();
            if text.is_empty() {
                return Err(MutationError::Invalid("empty comment".into()));
            }
            let new = NewComment { post_id, parent_comment_id: parent, description: text.to_string() };
            let mut comment = self.api.create_comment(new).await?;
            if comment.username.is_empty() {
                comment.username = me.username;
            }
            info!(id = comment.id, ?parent, "comment created");
            tree.apply(Mutation::Insert { parent, item: comment.clone() });
            Ok(comment)
        }
        .await)
    }

    pub async fn edit_comment(&self, tree: &mut CommentFeed, id: Id, text: &str) -> MutationResult<Comment> {
        record("edit_comment", async {
            let existing = tree.tree().get(id).map(|n| n.item());
            self.gate(existing)?;
            let username = existing.map(|c| c.username.clone()).unwrap_or_default();
            let upd = UpdateComment { description: Some(text.trim().to_string()) };
            let mut comment = self.api.update_comment(id, upd).await?;
            if comment.username.is_empty() {
                comment.username = username;
            }
            tree.apply(Mutation::Replace(comment.clone()));
            Ok(comment)
        }
        .await)
    }

    /// Soft delete: the node stays in place (replies included) and renders as
    /// a tombstone.
    pub async fn delete_comment(&self, tree: &mut CommentFeed, id: Id) -> MutationResult<()> {
        record("delete_comment", async {
            self.gate(tree.tree().get(id).map(|n| n.item()))?;
            self.api.delete_comment(id).await?;
            tree.apply(Mutation::Tombstone(id));
            Ok(())
        }
        .await)
    }

    pub async fn react_comment(
        &self,
        tree: &mut CommentFeed,
        id: Id,
        current: Option<Reaction>,
        pressed: Reaction,
    ) -> MutationResult<Option<Reaction>> {
        record("react_comment", async {
            require_login(self.session.as_ref())?;
            let plan = ReactionPlan::plan(current, pressed)?;
            match plan {
                ReactionPlan::Add(r) => self.api.react_comment(id, r).await?,
                ReactionPlan::Remove(_) => self.api.unreact_comment(id).await?,
            }
            tree.apply(Mutation::React { id, delta: plan.delta() });
            Ok(plan.resulting())
        }
        .await)
    }

    /// Owner check when the item is loaded; login check otherwise (the server
    /// has the final word).
    fn gate<T: Authored>(&self, item: Option<&T>) -> MutationResult<Identity> {
        match item {
            Some(item) => require_owner(self.session.as_ref(), item),
            None => require_login(self.session.as_ref()),
        }
    }
}
