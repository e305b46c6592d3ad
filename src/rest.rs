//! reqwest-backed collaborator for the forum's REST API.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use urlencoding::encode;

use crate::auth::Identity;
use crate::config::FeedConfig;
use crate::error::{FetchError, FetchResult, MutationError, MutationResult};
use crate::models::*;
use crate::query::{CommentQuery, PostScope, PostQuery, TopicQuery};
use crate::source::{ChildSource, CommentWriter, PageSource, PostWriter, TopicWriter};

#[derive(Clone, Debug)]
pub struct RestClient {
    http: Client,
    base: String,
    token: Option<String>,
    // author names by user id, shared by clones
    users: Arc<RwLock<HashMap<Id, String>>>,
}

#[derive(Deserialize)]
struct ReactionBody {
    reaction: Option<bool>,
}

#[derive(Deserialize)]
struct UserBody {
    username: String,
}

impl RestClient {
    pub fn new(cfg: &FeedConfig) -> FetchResult<Self> {
        let http = Client::builder().timeout(cfg.fetch_timeout).build()?;
        Ok(Self {
            http,
            base: cfg.api_url.trim_end_matches('/').to_string(),
            token: cfg.session_token.clone(),
            users: Arc::default(),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => req.header(header::COOKIE, format!("token={t}")),
            None => req,
        }
    }

    async fn get_page<T: DeserializeOwned>(&self, path: String, field: &str) -> FetchResult<Page<T>> {
        log::debug!("GET {path}");
        let resp = self.authed(self.http.get(self.url(&path))).send().await?.error_for_status()?;
        let mut body: Value = resp.json().await?;
        // an empty result set comes back as null
        let items: Vec<T> = match body.get_mut(field).map(Value::take) {
            None | Some(Value::Null) => Vec::new(),
            Some(list) => serde_json::from_value(list)?,
        };
        Ok(Page::new(items))
    }

    /// Comment rows come without the author's name; it is looked up once per
    /// user and remembered. A failed lookup leaves the name blank.
    async fn fill_authors(&self, comments: &mut [Comment]) {
        for comment in comments.iter_mut().filter(|c| c.username.is_empty()) {
            match self.username(comment.created_by).await {
                Ok(name) => comment.username = name,
                Err(e) => log::warn!("author lookup for user {} failed: {e}", comment.created_by),
            }
        }
    }

    async fn username(&self, user: Id) -> FetchResult<String> {
        let cached = self.users.read().unwrap_or_else(|e| e.into_inner()).get(&user).cloned();
        if let Some(name) = cached {
            return Ok(name);
        }
        let path = format!("/public/users/{user}");
        log::debug!("GET {path}");
        let resp = self.authed(self.http.get(self.url(&path))).send().await?.error_for_status()?;
        let body: UserBody = resp.json().await?;
        self.users.write().unwrap_or_else(|e| e.into_inner()).insert(user, body.username.clone());
        Ok(body.username)
    }

    async fn send(&self, req: RequestBuilder) -> MutationResult<Response> {
        let resp = self.authed(req).send().await.map_err(FetchError::from)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        log::warn!("forum write refused: {status} {body}");
        Err(refusal(status, &body))
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> MutationResult<T> {
        let resp = self.send(req).await?;
        Ok(resp.json::<T>().await.map_err(FetchError::from)?)
    }

    /// Asks the server who the session token belongs to.
    pub async fn fetch_session(&self) -> FetchResult<Identity> {
        let resp = self.authed(self.http.get(self.url("/public/auth/loginStatus"))).send().await?;
        // logged-out answers are a 400 with the same body shape
        if resp.status() == StatusCode::BAD_REQUEST {
            return Ok(Identity::anonymous());
        }
        Ok(resp.error_for_status()?.json().await?)
    }
}

fn refusal(status: StatusCode, body: &str) -> MutationError {
    match status {
        StatusCode::UNAUTHORIZED => MutationError::NotLoggedIn,
        StatusCode::FORBIDDEN => MutationError::NotOwner,
        StatusCode::NOT_FOUND => MutationError::NotFound,
        StatusCode::CONFLICT => MutationError::ReactionConflict,
        StatusCode::BAD_REQUEST => {
            let msg = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| body.to_string());
            MutationError::Invalid(msg)
        }
        other => MutationError::Remote(FetchError::Status(other.as_u16())),
    }
}

#[async_trait]
impl PageSource<Topic, TopicQuery> for RestClient {
    async fn fetch_page(&self, cursor: Cursor, key: &TopicQuery) -> FetchResult<Page<Topic>> {
        let path = match key.search() {
            Some(q) => format!("/public/topics/search?page={cursor}&q={}", encode(q)),
            None => format!("/public/topics?page={cursor}"),
        };
        self.get_page(path, "topics").await
    }
}

#[async_trait]
impl PageSource<Post, PostQuery> for RestClient {
    async fn fetch_page(&self, cursor: Cursor, key: &PostQuery) -> FetchResult<Page<Post>> {
        let sort = key.sort().as_param();
        let path = match (key.scope(), key.search()) {
            (scope, Some(q)) => {
                let topic = match scope {
                    PostScope::All => 0,
                    PostScope::Topic(id) => id,
                };
                format!("/public/topics/{topic}/posts/search?page={cursor}&q={}&sort_by={sort}", encode(q))
            }
            (PostScope::All, None) => format!("/public/posts?page={cursor}&sort_by={sort}"),
            (PostScope::Topic(id), None) => format!("/public/topics/{id}/posts?page={cursor}&sort_by={sort}"),
        };
        self.get_page(path, "posts").await
    }
}

#[async_trait]
impl PageSource<Comment, CommentQuery> for RestClient {
    async fn fetch_page(&self, cursor: Cursor, key: &CommentQuery) -> FetchResult<Page<Comment>> {
        let path = format!(
            "/public/posts/{}/comments?page={cursor}&sort_by={}&order={}",
            key.post_id(),
            key.sort().as_param(),
            key.order().as_param()
        );
        // replies are listed here too; raw_count stays the server's row count
        let mut page: Page<Comment> = self.get_page(path, "comments").await?;
        page.items.retain(|c| c.parent_comment_id.is_none());
        self.fill_authors(&mut page.items).await;
        Ok(page)
    }
}

#[async_trait]
impl ChildSource<Comment> for RestClient {
    async fn fetch_children(&self, parent: Id, cursor: Cursor) -> FetchResult<Page<Comment>> {
        let mut page: Page<Comment> = self.get_page(format!("/public/comments/{parent}?page={cursor}"), "comments").await?;
        self.fill_authors(&mut page.items).await;
        Ok(page)
    }
}

#[async_trait]
impl TopicWriter for RestClient {
    async fn create_topic(&self, new: NewTopic) -> MutationResult<Topic> {
        self.send_json(self.http.post(self.url("/logged_in/topics")).json(&new)).await
    }

    async fn update_topic(&self, id: Id, upd: UpdateTopic) -> MutationResult<Topic> {
        let path = format!("/logged_in/topics/{id}");
        self.send(self.http.patch(self.url(&path)).json(&upd)).await?;
        self.send_json(self.http.get(self.url(&path))).await
    }

    async fn delete_topic(&self, id: Id) -> MutationResult<()> {
        self.send(self.http.delete(self.url(&format!("/logged_in/topics/{id}")))).await?;
        Ok(())
    }
}

#[async_trait]
impl PostWriter for RestClient {
    async fn create_post(&self, new: NewPost) -> MutationResult<Post> {
        let path = format!("/logged_in/topics/{}/posts", new.topic_id);
        self.send_json(self.http.post(self.url(&path)).json(&new)).await
    }

    async fn update_post(&self, id: Id, upd: UpdatePost) -> MutationResult<Post> {
        let path = format!("/logged_in/posts/{id}");
        self.send(self.http.patch(self.url(&path)).json(&upd)).await?;
        self.send_json(self.http.get(self.url(&path))).await
    }

    async fn delete_post(&self, id: Id) -> MutationResult<()> {
        self.send(self.http.delete(self.url(&format!("/logged_in/posts/{id}")))).await?;
        Ok(())
    }

    // the public PATCH only touches the fields it is given
    async fn record_view(&self, id: Id, views: i64) -> MutationResult<Post> {
        let path = format!("/public/posts/{id}");
        self.send(self.http.patch(self.url(&path)).json(&json!({ "views": views + 1 }))).await?;
        self.send_json(self.http.get(self.url(&path))).await
    }

    async fn my_post_reaction(&self, id: Id) -> MutationResult<Option<Reaction>> {
        let body: ReactionBody = self.send_json(self.http.get(self.url(&format!("/logged_in/posts/{id}/reactions")))).await?;
        Ok(body.reaction.map(Reaction::from_flag))
    }

    async fn react_post(&self, id: Id, reaction: Reaction) -> MutationResult<()> {
        let req = self
            .http
            .post(self.url(&format!("/logged_in/posts/{id}/reactions")))
            .json(&json!({ "reaction": reaction.as_flag() }));
        self.send(req).await?;
        Ok(())
    }

    async fn unreact_post(&self, id: Id) -> MutationResult<()> {
        self.send(self.http.delete(self.url(&format!("/logged_in/posts/{id}/reactions")))).await?;
        Ok(())
    }
}

#[async_trait]
impl CommentWriter for RestClient {
    async fn create_comment(&self, new: NewComment) -> MutationResult<Comment> {
        self.send_json(self.http.post(self.url("/logged_in/comments")).json(&new)).await
    }

    // the PATCH answer carries only a status line
    async fn update_comment(&self, id: Id, upd: UpdateComment) -> MutationResult<Comment> {
        let path = format!("/logged_in/comments/{id}");
        self.send(self.http.patch(self.url(&path)).json(&upd)).await?;
        self.send_json(self.http.get(self.url(&path))).await
    }

    async fn delete_comment(&self, id: Id) -> MutationResult<()> {
        self.send(self.http.delete(self.url(&format!("/logged_in/comments/{id}")))).await?;
        Ok(())
    }

    async fn react_comment(&self, id: Id, reaction: Reaction) -> MutationResult<()> {
        let req = self
            .http
            .post(self.url(&format!("/logged_in/comments/{id}/reaction")))
            .json(&json!({ "reaction": reaction.as_flag() }));
        self.send(req).await?;
        Ok(())
    }

    async fn unreact_comment(&self, id: Id) -> MutationResult<()> {
        self.send(self.http.delete(self.url(&format!("/logged_in/comments/{id}/reaction")))).await?;
        Ok(())
    }
}
