use std::sync::Arc;

use anyhow::Context;
use forumfeed::auth::{SessionOracle, StaticSession};
use forumfeed::config::FeedConfig;
use forumfeed::query::{CommentQuery, PostQuery, PostSort, TopicQuery};
use forumfeed::rest::RestClient;
use forumfeed::source::ForumApi;
use forumfeed::{FeedEvent, ForumClient, ScrollMetrics};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "inmem-store")]
use forumfeed::source::inmem::InMemForum;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = FeedConfig::from_env();
    let backend = std::env::var("FORUM_BACKEND").unwrap_or_else(|_| default_backend().to_string());
    info!(%backend, api = %cfg.api_url, "starting forum walk");

    match backend.as_str() {
        #[cfg(feature = "inmem-store")]
        "inmem" => {
            let forum = Arc::new(seed_demo_forum());
            let session: Arc<dyn SessionOracle> = forum.clone();
            walk(ForumClient::new(forum, session)).await
        }
        "rest" => {
            let client = RestClient::new(&cfg).context("building http client")?;
            let identity = client.fetch_session().await.context("reading login status")?;
            info!(logged_in = identity.logged_in, user = %identity.username, "session");
            let session: Arc<dyn SessionOracle> = Arc::new(StaticSession::new(identity));
            walk(ForumClient::new(Arc::new(client), session)).await
        }
        other => anyhow::bail!("unknown FORUM_BACKEND {other:?}"),
    }
}

fn default_backend() -> &'static str {
    if cfg!(feature = "inmem-store") { "inmem" } else { "rest" }
}

/// Loads topics, pages through the post list like a scrolling reader would,
/// then opens the most popular post's comment thread.
async fn walk<A: ForumApi + 'static>(forum: ForumClient<A>) -> anyhow::Result<()> {
    let mut topics = forum.topics(TopicQuery::all());
    report(topics.settle().await);
    println!("== {} topics", topics.items().len());
    for t in topics.items() {
        println!("  #{} {}", t.id, t.title);
    }

    let mut posts = forum.posts(PostQuery::all().with_sort(PostSort::Popularity));
    report(posts.settle().await);
    // pretend the reader keeps hitting the bottom of the list
    let bottom = ScrollMetrics::new(900.0, 1000.0, 100.0);
    while posts.on_scroll(bottom) {
        report(posts.settle().await);
    }
    println!("== {} posts by popularity", posts.items().len());
    for p in posts.items().iter().take(5) {
        println!("  #{} {} (+{} -{}, {} views)", p.id, p.title, p.likes, p.dislikes, p.views);
    }

    let Some(first) = posts.items().first().map(|p| p.id) else {
        println!("no posts");
        return Ok(());
    };
    let post = forum.open_post(&mut posts, first).await?;

    let mut thread = forum.comments(CommentQuery::for_post(post.id));
    report(thread.settle().await);
    let roots: Vec<_> = thread.tree().roots().items().to_vec();
    for id in roots {
        thread.expand(id);
    }
    report(thread.settle().await);

    if forum.identity().logged_in {
        let first = thread.tree().roots().items().first().copied();
        if let Some(first) = first {
            match forum.reply(&mut thread, post.id, Some(first), "Replying from the demo walk").await {
                Ok(c) => info!(id = c.id, "reply posted"),
                Err(e) => warn!(error = %e, "reply refused"),
            }
        }
    }

    println!("== comments on #{} {}", post.id, post.title);
    for (depth, node) in thread.tree().walk() {
        let c = node.item();
        let more = if node.children().has_more() && node.expanded() { " [more replies]" } else { "" };
        println!("{}- {}: {}{}", "  ".repeat(depth + 1), c.username, c.display_text(), more);
    }
    Ok(())
}

fn report(events: Vec<FeedEvent>) {
    for event in events {
        if let FeedEvent::Failed { parent, error } = event {
            warn!(?parent, %error, "load failed");
        }
    }
}

#[cfg(feature = "inmem-store")]
fn seed_demo_forum() -> InMemForum {
    let forum = InMemForum::new();
    let ana = forum.add_user("ana");
    let bo = forum.add_user("bo");
    let rust = forum.seed_topic(ana, "Rust");
    let books = forum.seed_topic(bo, "Books");
    for i in 0..14 {
        let topic = if i % 2 == 0 { rust.id } else { books.id };
        let author = if i % 3 == 0 { bo } else { ana };
        forum.seed_post(topic, author, &format!("Post {i}"), (i * 7) % 23, i * 11);
    }
    let hot = forum.seed_post(rust.id, ana, "Async pagination without tears", 99, 500);
    for i in 0..4 {
        let c = forum.seed_comment(hot.id, None, if i % 2 == 0 { bo } else { ana }, &format!("Top-level remark {i}"));
        for j in 0..i {
            forum.seed_comment(hot.id, Some(c.id), ana, &format!("Reply {j} to remark {i}"));
        }
    }
    forum.login(bo);
    forum
}
