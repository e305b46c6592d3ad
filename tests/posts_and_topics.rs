#![cfg(feature = "inmem-store")]

use std::sync::Arc;

use forumfeed::auth::SessionOracle;
use forumfeed::error::MutationError;
use forumfeed::models::{Id, NewPost, NewTopic, Reaction, UpdatePost, UpdateTopic};
use forumfeed::query::{PostQuery, PostSort, TopicQuery};
use forumfeed::source::inmem::InMemForum;
use forumfeed::{ForumClient, ScrollMetrics};

fn setup() -> (Arc<InMemForum>, ForumClient<InMemForum>, Id, Id) {
    let forum = Arc::new(InMemForum::new());
    let ana = forum.add_user("ana");
    let bo = forum.add_user("bo");
    let session: Arc<dyn SessionOracle> = forum.clone();
    (forum.clone(), ForumClient::new(forum, session), ana, bo)
}

#[tokio::test]
async fn post_list_scrolls_through_every_page_in_sort_order() {
    let (forum, client, ana, _) = setup();
    let topic = forum.seed_topic(ana, "t");
    for i in 0..25 {
        forum.seed_post(topic.id, ana, &format!("p{i}"), i, 100 - i);
    }
    let bottom = ScrollMetrics::new(950.0, 1000.0, 50.0);

    let mut feed = client.posts(PostQuery::all().with_sort(PostSort::Popularity));
    feed.settle().await;
    while feed.on_scroll(bottom) {
        feed.settle().await;
    }
    let pops: Vec<i64> = feed.items().iter().map(|p| p.popularity).collect();
    assert_eq!(pops.len(), 25);
    assert!(pops.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(forum.fetch_count(), 3);

    assert!(feed.set_query(PostQuery::all().with_sort(PostSort::Views)));
    assert!(feed.items().is_empty());
    feed.settle().await;
    assert_eq!(feed.items().len(), 10);
    assert_eq!(feed.items()[0].title, "p0");
    assert!(!feed.set_query(PostQuery::all().with_sort(PostSort::Views)), "same query is a no-op");
}

#[tokio::test]
async fn topic_search_resets_the_list() {
    let (forum, client, ana, _) = setup();
    forum.seed_topic(ana, "Rust async");
    forum.seed_topic(ana, "Gardening");
    forum.seed_topic(ana, "rust embedded");

    let mut feed = client.topics(TopicQuery::all());
    feed.settle().await;
    assert_eq!(feed.items().len(), 3);

    feed.set_query(TopicQuery::all().with_search("  RUST "));
    feed.settle().await;
    let titles: Vec<&str> = feed.items().iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["rust embedded", "Rust async"]);
    assert!(!feed.set_query(TopicQuery::all().with_search("RUST")), "normalized search is unchanged");
}

#[tokio::test]
async fn topic_owner_rules() {
    let (forum, client, ana, bo) = setup();
    let mut feed = client.topics(TopicQuery::all());
    feed.settle().await;

    let new = NewTopic { title: "Meta".into(), description: "about the forum".into() };
    assert_eq!(client.create_topic(&mut feed, new.clone()).await, Err(MutationError::NotLoggedIn));
    forum.login(ana);
    let topic = client.create_topic(&mut feed, new).await.unwrap();
    assert_eq!(feed.items()[0].id, topic.id);

    forum.login(bo);
    let upd = UpdateTopic { title: Some("hijacked".into()), description: None };
    assert_eq!(client.edit_topic(&mut feed, topic.id, upd.clone()).await, Err(MutationError::NotOwner));
    assert_eq!(feed.items()[0].title, "Meta");

    forum.login(ana);
    client.edit_topic(&mut feed, topic.id, upd).await.unwrap();
    assert_eq!(feed.items()[0].title, "hijacked");
    client.delete_topic(&mut feed, topic.id).await.unwrap();
    assert!(feed.items().is_empty());
}

#[tokio::test]
async fn created_post_lands_only_in_its_topic_feed() {
    let (forum, client, ana, _) = setup();
    let a = forum.seed_topic(ana, "a");
    let b = forum.seed_topic(ana, "b");
    forum.seed_post(a.id, ana, "old", 0, 0);
    let mut in_a = client.posts(PostQuery::in_topic(a.id));
    let mut in_b = client.posts(PostQuery::in_topic(b.id));
    in_a.settle().await;
    in_b.settle().await;

    forum.login(ana);
    let new = NewPost { topic_id: a.id, title: "new".into(), description: "body".into() };
    let post = client.create_post(&mut in_a, new.clone()).await.unwrap();
    assert_eq!(in_a.items()[0].id, post.id);
    assert_eq!(in_a.items().len(), 2);

    client.create_post(&mut in_b, new).await.unwrap();
    assert!(in_b.items().is_empty());

    let edited = client
        .edit_post(&mut in_a, post.id, UpdatePost { title: None, description: Some("edited".into()) })
        .await
        .unwrap();
    assert!(edited.is_edited);
    assert_eq!(in_a.list().find(post.id).unwrap().description, "edited");

    client.delete_post(&mut in_a, post.id).await.unwrap();
    assert!(in_a.list().find(post.id).is_none());
    assert!(forum.post(post.id).is_none());
}

#[tokio::test]
async fn post_reactions_follow_the_server() {
    let (forum, client, ana, bo) = setup();
    let t = forum.seed_topic(ana, "t");
    let p = forum.seed_post(t.id, ana, "p", 0, 0);
    let mut feed = client.posts(PostQuery::in_topic(t.id));
    feed.settle().await;

    assert_eq!(client.my_post_reaction(p.id).await, Err(MutationError::NotLoggedIn));
    forum.login(bo);
    assert_eq!(client.my_post_reaction(p.id).await, Ok(None));

    let now = client.react_post(&mut feed, p.id, None, Reaction::Dislike).await.unwrap();
    assert_eq!(now, Some(Reaction::Dislike));
    assert_eq!(client.my_post_reaction(p.id).await, Ok(Some(Reaction::Dislike)));
    assert_eq!(feed.list().find(p.id).unwrap().dislikes, 1);
    assert_eq!(forum.post(p.id).unwrap().dislikes, 1);

    let now = client.react_post(&mut feed, p.id, now, Reaction::Dislike).await.unwrap();
    assert_eq!(now, None);
    assert_eq!(feed.list().find(p.id).unwrap().dislikes, 0);
}

#[tokio::test]
async fn failed_page_is_reported_and_retried() {
    let (forum, client, ana, _) = setup();
    forum.seed_topic(ana, "only");
    forum.fail_next_fetches(1);
    let mut feed = client.topics(TopicQuery::all());
    let events = feed.settle().await;
    assert!(matches!(events.as_slice(), [forumfeed::FeedEvent::Failed { .. }]));
    assert!(feed.request_next_page());
    feed.settle().await;
    assert_eq!(feed.items().len(), 1);
}

#[tokio::test]
async fn opening_a_post_counts_a_view_without_login() {
    let (forum, client, ana, _) = setup();
    let t = forum.seed_topic(ana, "t");
    let p = forum.seed_post(t.id, ana, "p", 0, 41);
    let mut feed = client.posts(PostQuery::in_topic(t.id));
    feed.settle().await;

    let opened = client.open_post(&mut feed, p.id).await.unwrap();
    assert_eq!(opened.views, 42);
    assert_eq!(feed.list().find(p.id).unwrap().views, 42);
    assert_eq!(forum.post(p.id).unwrap().views, 42);

    assert_eq!(client.open_post(&mut feed, p.id + 100).await, Err(MutationError::NotFound));
}
