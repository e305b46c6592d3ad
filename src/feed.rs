//! Async drivers for [`PagedList`] and [`LazyTree`].
//!
//! A feed owns the state machine and an unbounded channel. Fetches run as
//! tokio tasks and post their outcome back on the channel; the owner applies
//! them one at a time in [`Feed::next_event`], so completions, resets and
//! local mutations never interleave.

use std::collections::HashSet;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use metrics::increment_counter;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::config::PAGE_SIZE;
use crate::error::{FetchError, FetchResult};
use crate::merge::{Mergeable, Mutation};
use crate::models::{Id, Identified, Page};
use crate::paged::{Applied, Generation, PagedList};
use crate::scroll::{ScrollMetrics, ScrollTrigger};
use crate::source::{ChildSource, PageSource};
use crate::tree::{ChildTicket, LazyTree};

/// Outcome of one completed fetch, as seen by the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// `parent` is `None` for the top level.
    Appended { parent: Option<Id>, added: usize, has_more: bool },
    Failed { parent: Option<Id>, error: FetchError },
    /// The result arrived for a query or node state that no longer exists.
    Discarded,
}

impl FeedEvent {
    fn from_applied(parent: Option<Id>, applied: Applied) -> Self {
        match applied {
            Applied::Appended { added, has_more } => FeedEvent::Appended { parent, added, has_more },
            Applied::Discarded => FeedEvent::Discarded,
        }
    }
}

/// Runs `fetch` on a task of its own so that a panicking source still ends
/// in a completion.
async fn guarded<T: Send + 'static>(
    fetch: impl Future<Output = FetchResult<Page<T>>> + Send + 'static,
) -> FetchResult<Page<T>> {
    tokio::spawn(fetch)
        .await
        .unwrap_or_else(|e| Err(FetchError::Transport(format!("fetch task failed: {e}"))))
}

struct Completion<T, K> {
    generation: Generation<K>,
    outcome: FetchResult<Page<T>>,
}

/// A flat list view: topics, posts, top-level comments.
pub struct Feed<T, K> {
    list: PagedList<T, K>,
    source: Arc<dyn PageSource<T, K>>,
    trigger: ScrollTrigger,
    tx: UnboundedSender<Completion<T, K>>,
    rx: UnboundedReceiver<Completion<T, K>>,
    in_flight: usize,
    label: &'static str,
}

impl<T, K> Feed<T, K>
where
    T: Identified + Send + 'static,
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
{
    pub fn new(source: Arc<dyn PageSource<T, K>>, key: K) -> Self {
        Self::with_page_size(source, key, PAGE_SIZE)
    }

    pub fn with_page_size(source: Arc<dyn PageSource<T, K>>, key: K, page_size: usize) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            list: PagedList::with_page_size(key, page_size),
            source,
            trigger: ScrollTrigger::default(),
            tx,
            rx,
            in_flight: 0,
            label: "feed",
        }
    }

    /// Name used in logs and metric labels.
    pub fn labelled(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn with_trigger(mut self, trigger: ScrollTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn list(&self) -> &PagedList<T, K> {
        &self.list
    }

    pub fn items(&self) -> &[T] {
        self.list.items()
    }

    pub fn query(&self) -> &K {
        self.list.filter_key()
    }

    /// Fetch tasks whose completion has not been consumed yet, stale ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Loads the first page. Same as [`request_next_page`](Self::request_next_page)
    /// on a fresh feed.
    pub fn open(&mut self) -> bool {
        self.request_next_page()
    }

    /// Switches the filter/sort key. On a change the list is emptied and page 1
    /// of the new key is requested; results of older keys will be discarded.
    pub fn set_query(&mut self, key: K) -> bool {
        if !self.list.reset(key) {
            return false;
        }
        debug!(feed = self.label, query = ?self.list.filter_key(), "query changed");
        self.request_next_page()
    }

    /// Drops everything loaded and starts over under the same key.
    pub fn refresh(&mut self) -> bool {
        self.list.restart();
        self.request_next_page()
    }

    pub fn request_next_page(&mut self) -> bool {
        match self.list.request_next_page() {
            Some(generation) => {
                self.dispatch(generation);
                true
            }
            None => false,
        }
    }

    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> bool {
        match self.trigger.on_scroll(&mut self.list, metrics) {
            Some(generation) => {
                self.dispatch(generation);
                true
            }
            None => false,
        }
    }

    fn dispatch(&mut self, generation: Generation<K>) {
        debug!(feed = self.label, cursor = generation.cursor(), query = ?generation.key(), "fetching page");
        increment_counter!("forumfeed_fetch_dispatched", "feed" => self.label);
        self.in_flight += 1;
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let (cursor, key) = (generation.cursor(), generation.key().clone());
        tokio::spawn(async move {
            let outcome = guarded(async move { source.fetch_page(cursor, &key).await }).await;
            // receiver gone means the feed was dropped
            let _ = tx.send(Completion { generation, outcome });
        });
    }

    /// Waits for the next fetch to finish and applies it. `None` when nothing
    /// is in flight.
    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        if self.in_flight == 0 {
            return None;
        }
        let done = self.rx.recv().await?;
        self.in_flight -= 1;
        Some(self.complete(done))
    }

    /// Applies completions until nothing is in flight.
    pub async fn settle(&mut self) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    fn complete(&mut self, done: Completion<T, K>) -> FeedEvent {
        let Completion { generation, outcome } = done;
        let event = match outcome {
            Ok(page) => {
                let mut seen: HashSet<Id> = self.list.items().iter().map(Identified::id).collect();
                let applied = self.list.resolve_filtered(&generation, page, |item| seen.insert(item.id()));
                FeedEvent::from_applied(None, applied)
            }
            Err(error) => match self.list.on_fetch_failed(&generation, error) {
                Some(error) => {
                    warn!(feed = self.label, cursor = generation.cursor(), %error, "page fetch failed");
                    increment_counter!("forumfeed_fetch_failed", "feed" => self.label);
                    FeedEvent::Failed { parent: None, error }
                }
                None => FeedEvent::Discarded,
            },
        };
        if event == FeedEvent::Discarded {
            debug!(feed = self.label, cursor = generation.cursor(), query = ?generation.key(), "stale page discarded");
            increment_counter!("forumfeed_fetch_discarded", "feed" => self.label);
        }
        event
    }
}

impl<T: Mergeable, K: Clone + PartialEq> Feed<T, K> {
    /// Splices a confirmed write into the loaded items.
    pub fn apply(&mut self, mutation: Mutation<T>) -> bool {
        self.list.apply(mutation)
    }
}

enum TreeCompletion<T, K> {
    Roots(Completion<T, K>),
    Children { ticket: ChildTicket, outcome: FetchResult<Page<T>> },
}

/// A threaded view: top-level items from a [`PageSource`], replies from a
/// [`ChildSource`], loaded one level and one page at a time.
pub struct TreeFeed<T, K> {
    tree: LazyTree<T, K>,
    roots: Arc<dyn PageSource<T, K>>,
    children: Arc<dyn ChildSource<T>>,
    trigger: ScrollTrigger,
    tx: UnboundedSender<TreeCompletion<T, K>>,
    rx: UnboundedReceiver<TreeCompletion<T, K>>,
    in_flight: usize,
    label: &'static str,
}

impl<T, K> TreeFeed<T, K>
where
    T: Identified + Send + 'static,
    K: Clone + PartialEq + Debug + Send + Sync + 'static,
{
    pub fn new(roots: Arc<dyn PageSource<T, K>>, children: Arc<dyn ChildSource<T>>, key: K) -> Self {
        Self::with_page_size(roots, children, key, PAGE_SIZE)
    }

    pub fn with_page_size(
        roots: Arc<dyn PageSource<T, K>>,
        children: Arc<dyn ChildSource<T>>,
        key: K,
        page_size: usize,
    ) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            tree: LazyTree::with_page_size(key, page_size),
            roots,
            children,
            trigger: ScrollTrigger::default(),
            tx,
            rx,
            in_flight: 0,
            label: "tree",
        }
    }

    pub fn labelled(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn tree(&self) -> &LazyTree<T, K> {
        &self.tree
    }

    pub fn query(&self) -> &K {
        self.tree.filter_key()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn open(&mut self) -> bool {
        self.request_root_page()
    }

    pub fn set_query(&mut self, key: K) -> bool {
        if !self.tree.reset(key) {
            return false;
        }
        debug!(feed = self.label, query = ?self.tree.filter_key(), "query changed");
        self.request_root_page()
    }

    pub fn refresh(&mut self) -> bool {
        self.tree.restart();
        self.request_root_page()
    }

    pub fn request_root_page(&mut self) -> bool {
        let Some(generation) = self.tree.request_root_page() else { return false };
        debug!(feed = self.label, cursor = generation.cursor(), "fetching root page");
        increment_counter!("forumfeed_fetch_dispatched", "feed" => self.label);
        self.in_flight += 1;
        let source = Arc::clone(&self.roots);
        let tx = self.tx.clone();
        let (cursor, key) = (generation.cursor(), generation.key().clone());
        tokio::spawn(async move {
            let outcome = guarded(async move { source.fetch_page(cursor, &key).await }).await;
            let _ = tx.send(TreeCompletion::Roots(Completion { generation, outcome }));
        });
        true
    }

    /// Scrolling only ever pages the top level.
    pub fn on_scroll(&mut self, metrics: ScrollMetrics) -> bool {
        let roots = self.tree.roots();
        if !self.trigger.should_fire(metrics, roots.is_loading(), roots.has_more()) {
            return false;
        }
        self.request_root_page()
    }

    /// Loads the next page of `id`'s replies ("show replies" / "load more").
    pub fn expand(&mut self, id: Id) -> bool {
        let Some(ticket) = self.tree.expand(id) else { return false };
        debug!(feed = self.label, parent = id, cursor = ticket.cursor(), "fetching children");
        increment_counter!("forumfeed_fetch_dispatched", "feed" => self.label);
        self.in_flight += 1;
        let source = Arc::clone(&self.children);
        let tx = self.tx.clone();
        let (parent, cursor) = (ticket.parent(), ticket.cursor());
        tokio::spawn(async move {
            let outcome = guarded(async move { source.fetch_children(parent, cursor).await }).await;
            let _ = tx.send(TreeCompletion::Children { ticket, outcome });
        });
        true
    }

    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        if self.in_flight == 0 {
            return None;
        }
        let done = self.rx.recv().await?;
        self.in_flight -= 1;
        Some(self.complete(done))
    }

    pub async fn settle(&mut self) -> Vec<FeedEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    fn complete(&mut self, done: TreeCompletion<T, K>) -> FeedEvent {
        let (parent, result) = match done {
            TreeCompletion::Roots(Completion { generation, outcome }) => match outcome {
                Ok(page) => (None, Ok(self.tree.on_roots_resolved(&generation, page))),
                Err(error) => (None, Err(self.tree.on_roots_failed(&generation, error))),
            },
            TreeCompletion::Children { ticket, outcome } => {
                let parent = Some(ticket.parent());
                match outcome {
                    Ok(page) => (parent, Ok(self.tree.on_children_resolved(&ticket, page))),
                    Err(error) => (parent, Err(self.tree.on_children_failed(&ticket, error))),
                }
            }
        };
        let event = match result {
            Ok(applied) => FeedEvent::from_applied(parent, applied),
            Err(Some(error)) => {
                warn!(feed = self.label, ?parent, %error, "tree fetch failed");
                increment_counter!("forumfeed_fetch_failed", "feed" => self.label);
                FeedEvent::Failed { parent, error }
            }
            Err(None) => FeedEvent::Discarded,
        };
        if event == FeedEvent::Discarded {
            debug!(feed = self.label, ?parent, "stale tree page discarded");
            increment_counter!("forumfeed_fetch_discarded", "feed" => self.label);
        }
        event
    }
}

impl<T: Mergeable, K: Clone + PartialEq> TreeFeed<T, K> {
    pub fn apply(&mut self, mutation: Mutation<T>) -> bool {
        self.tree.apply(mutation)
    }

    pub fn mutate_node<F: FnOnce(&mut T)>(&mut self, id: Id, update: F) -> bool {
        self.tree.mutate_node(id, update)
    }
}
