#![cfg(feature = "inmem-store")]

use std::sync::Arc;

use forumfeed::auth::SessionOracle;
use forumfeed::error::MutationError;
use forumfeed::forum::CommentFeed;
use forumfeed::models::{Id, Reaction, TOMBSTONE_TEXT};
use forumfeed::query::CommentQuery;
use forumfeed::source::inmem::InMemForum;
use forumfeed::{FeedEvent, ForumClient};

struct Fixture {
    forum: Arc<InMemForum>,
    client: ForumClient<InMemForum>,
    ana: Id,
    bo: Id,
    post: Id,
    roots: Vec<Id>,
}

/// One post, three top-level comments by ana (oldest first), the oldest with
/// `replies` replies by bo.
fn fixture(replies: usize) -> Fixture {
    let forum = Arc::new(InMemForum::new());
    let ana = forum.add_user("ana");
    let bo = forum.add_user("bo");
    let topic = forum.seed_topic(ana, "general");
    let post = forum.seed_post(topic.id, ana, "hello", 1, 1).id;
    let roots: Vec<Id> = (0..3).map(|i| forum.seed_comment(post, None, ana, &format!("c{i}")).id).collect();
    for i in 0..replies {
        forum.seed_comment(post, Some(roots[0]), bo, &format!("r{i}"));
    }
    let session: Arc<dyn SessionOracle> = forum.clone();
    let client = ForumClient::new(forum.clone(), session);
    Fixture { forum, client, ana, bo, post, roots }
}

async fn open_thread(fx: &Fixture) -> CommentFeed {
    let mut thread = fx.client.comments(CommentQuery::for_post(fx.post));
    thread.settle().await;
    thread
}

#[tokio::test]
async fn roots_load_newest_first() {
    let fx = fixture(0);
    let thread = open_thread(&fx).await;
    let mut expected = fx.roots.clone();
    expected.reverse();
    assert_eq!(thread.tree().roots().items(), expected.as_slice());
    assert!(!thread.tree().roots().has_more());
}

#[tokio::test]
async fn reply_to_unexpanded_comment_shows_immediately_and_expansion_skips_it() {
    let fx = fixture(2);
    let mut thread = open_thread(&fx).await;
    fx.forum.login(fx.bo);

    let reply = fx.client.reply(&mut thread, fx.post, Some(fx.roots[0]), "  fresh  ").await.unwrap();
    assert_eq!(reply.description, "fresh");
    assert_eq!(reply.username, "bo");
    let node = thread.tree().get(fx.roots[0]).unwrap();
    assert_eq!(node.child_ids(), &[reply.id]);
    assert!(!node.expanded());

    assert!(thread.expand(fx.roots[0]));
    let events = thread.settle().await;
    // server returns r0, r1 and the new reply; the reply is already shown
    assert_eq!(events, vec![FeedEvent::Appended { parent: Some(fx.roots[0]), added: 2, has_more: false }]);
    let node = thread.tree().get(fx.roots[0]).unwrap();
    assert_eq!(node.child_ids().len(), 3);
    assert_eq!(node.child_ids()[0], reply.id);
    assert!(node.expanded());
}

#[tokio::test]
async fn deep_replies_expand_level_by_level() {
    let fx = fixture(1);
    let deep = fx.forum.seed_comment(fx.post, Some(fx.roots[0] + 3), fx.ana, "deep");
    let mut thread = open_thread(&fx).await;

    thread.expand(fx.roots[0]);
    thread.settle().await;
    let child = thread.tree().get(fx.roots[0]).unwrap().child_ids()[0];
    assert_eq!(deep.parent_comment_id, Some(child));
    assert!(thread.expand(child));
    thread.settle().await;

    let depths: Vec<(usize, Id)> = thread
        .tree()
        .walk()
        .into_iter()
        .filter(|(_, n)| n.item().id == deep.id || n.item().id == child)
        .map(|(d, n)| (d, n.item().id))
        .collect();
    assert_eq!(depths, vec![(1, child), (2, deep.id)]);
}

#[tokio::test]
async fn delete_tombstones_in_place_and_keeps_replies() {
    let fx = fixture(2);
    let mut thread = open_thread(&fx).await;
    thread.expand(fx.roots[0]);
    thread.settle().await;

    fx.forum.login(fx.ana);
    fx.client.delete_comment(&mut thread, fx.roots[0]).await.unwrap();

    let node = thread.tree().get(fx.roots[0]).unwrap();
    assert!(node.item().is_deleted());
    assert_eq!(node.item().display_text(), TOMBSTONE_TEXT);
    assert_eq!(node.child_ids().len(), 2);
    assert!(thread.tree().roots().items().contains(&fx.roots[0]));
    assert!(fx.forum.comment(fx.roots[0]).unwrap().is_deleted());
}

#[tokio::test]
async fn refused_writes_leave_the_thread_untouched() {
    let fx = fixture(1);
    let mut thread = open_thread(&fx).await;
    let before: Vec<_> = thread.tree().walk().into_iter().map(|(d, n)| (d, n.item().clone())).collect();

    fx.forum.logout();
    assert_eq!(
        fx.client.reply(&mut thread, fx.post, None, "hi").await,
        Err(MutationError::NotLoggedIn)
    );

    fx.forum.login(fx.bo);
    assert_eq!(fx.client.edit_comment(&mut thread, fx.roots[1], "mine now").await, Err(MutationError::NotOwner));
    assert_eq!(fx.client.delete_comment(&mut thread, fx.roots[1]).await, Err(MutationError::NotOwner));
    assert!(matches!(
        fx.client.reply(&mut thread, fx.post, Some(fx.roots[1]), "   ").await,
        Err(MutationError::Invalid(_))
    ));

    let after: Vec<_> = thread.tree().walk().into_iter().map(|(d, n)| (d, n.item().clone())).collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn edit_replaces_text_and_keeps_author_name() {
    let fx = fixture(0);
    let mut thread = open_thread(&fx).await;
    fx.forum.login(fx.ana);
    let edited = fx.client.edit_comment(&mut thread, fx.roots[2], "better wording").await.unwrap();
    assert!(edited.is_edited);
    let node = thread.tree().get(fx.roots[2]).unwrap();
    assert_eq!(node.item().description, "better wording");
    assert_eq!(node.item().username, "ana");
}

#[tokio::test]
async fn reaction_counts_move_only_after_the_server_agrees() {
    let fx = fixture(0);
    let mut thread = open_thread(&fx).await;
    let target = fx.roots[1];
    fx.forum.login(fx.bo);

    let now = fx.client.react_comment(&mut thread, target, None, Reaction::Like).await.unwrap();
    assert_eq!(now, Some(Reaction::Like));
    assert_eq!(thread.tree().get(target).unwrap().item().likes, 1);

    // stale view: the client thinks there is no reaction yet, the server disagrees
    assert_eq!(
        fx.client.react_comment(&mut thread, target, None, Reaction::Dislike).await,
        Err(MutationError::ReactionConflict)
    );
    let item = thread.tree().get(target).unwrap().item();
    assert_eq!((item.likes, item.dislikes), (1, 0));

    // opposite button while liked is refused locally
    assert_eq!(
        fx.client.react_comment(&mut thread, target, now, Reaction::Dislike).await,
        Err(MutationError::ReactionConflict)
    );

    let now = fx.client.react_comment(&mut thread, target, now, Reaction::Like).await.unwrap();
    assert_eq!(now, None);
    assert_eq!(thread.tree().get(target).unwrap().item().likes, 0);
    assert_eq!(fx.forum.comment(target).unwrap().likes, 0);
}

#[tokio::test]
async fn top_level_comment_goes_first() {
    let fx = fixture(0);
    let mut thread = open_thread(&fx).await;
    fx.forum.login(fx.bo);
    let c = fx.client.reply(&mut thread, fx.post, None, "first!").await.unwrap();
    assert_eq!(thread.tree().roots().items()[0], c.id);
    assert_eq!(thread.tree().len(), 4);
}
