//! Recursively paginated tree (comments and their replies).
//!
//! Nodes live in an arena keyed by id. The root level and each node's
//! children are [`PagedList`]s of ids, so every level keeps its own cursor,
//! loading flag and exhaustion flag. Ids are unique across the whole tree:
//! a fetched item whose id is already present anywhere is dropped on merge.

use std::collections::HashMap;

use crate::config::PAGE_SIZE;
use crate::error::FetchError;
use crate::models::{Id, Identified, Page};
use crate::paged::{Applied, Generation, PagedList};

#[derive(Debug, Clone)]
pub struct TreeNode<T> {
    item: T,
    parent: Option<Id>,
    children: PagedList<Id, ()>,
    expanded: bool,
}

impl<T> TreeNode<T> {
    fn new(item: T, parent: Option<Id>, page_size: usize) -> Self {
        Self { item, parent, children: PagedList::with_page_size((), page_size), expanded: false }
    }

    pub fn item(&self) -> &T {
        &self.item
    }

    pub fn parent(&self) -> Option<Id> {
        self.parent
    }

    pub fn children(&self) -> &PagedList<Id, ()> {
        &self.children
    }

    pub fn child_ids(&self) -> &[Id] {
        self.children.items()
    }

    /// Whether child loading was requested and succeeded at least once.
    pub fn expanded(&self) -> bool {
        self.expanded
    }

    /// Whether an expand request would do anything right now.
    pub fn can_expand(&self) -> bool {
        !self.children.is_loading() && (self.children.has_more() || !self.expanded)
    }
}

/// Token for one in-flight child-page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildTicket {
    parent: Id,
    tree_epoch: u64,
    generation: Generation<()>,
}

impl ChildTicket {
    pub fn parent(&self) -> Id {
        self.parent
    }

    pub fn cursor(&self) -> crate::models::Cursor {
        self.generation.cursor()
    }
}

#[derive(Debug, Clone)]
pub struct LazyTree<T, K> {
    nodes: HashMap<Id, TreeNode<T>>,
    roots: PagedList<Id, K>,
    epoch: u64,
    page_size: usize,
}

impl<T: Identified, K: Clone + PartialEq> LazyTree<T, K> {
    pub fn new(filter_key: K) -> Self {
        Self::with_page_size(filter_key, PAGE_SIZE)
    }

    pub fn with_page_size(filter_key: K, page_size: usize) -> Self {
        Self {
            nodes: HashMap::new(),
            roots: PagedList::with_page_size(filter_key, page_size),
            epoch: 0,
            page_size,
        }
    }

    pub fn roots(&self) -> &PagedList<Id, K> {
        &self.roots
    }

    pub fn filter_key(&self) -> &K {
        self.roots.filter_key()
    }

    pub fn get(&self, id: Id) -> Option<&TreeNode<T>> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: Id) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes at every depth.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children_of(&self, id: Id) -> Vec<&TreeNode<T>> {
        self.nodes
            .get(&id)
            .map(|n| n.child_ids().iter().filter_map(|c| self.nodes.get(c)).collect())
            .unwrap_or_default()
    }

    /// Depth-first, pre-order: each root followed by its loaded replies.
    pub fn walk(&self) -> Vec<(usize, &TreeNode<T>)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, Id)> = self.roots.items().iter().rev().map(|id| (0, *id)).collect();
        while let Some((depth, id)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else { continue };
            out.push((depth, node));
            stack.extend(node.child_ids().iter().rev().map(|c| (depth + 1, *c)));
        }
        out
    }

    // ── root level ──────────────────────────────────────────────────

    /// Switches the root filter. Drops every node when the key changed.
    pub fn reset(&mut self, new_key: K) -> bool {
        if !self.roots.reset(new_key) {
            return false;
        }
        self.clear_nodes();
        true
    }

    pub fn restart(&mut self) {
        self.roots.restart();
        self.clear_nodes();
    }

    fn clear_nodes(&mut self) {
        self.nodes.clear();
        self.epoch += 1;
    }

    pub fn request_root_page(&mut self) -> Option<Generation<K>> {
        self.roots.request_next_page()
    }

    pub fn on_roots_resolved(&mut self, generation: &Generation<K>, page: Page<T>) -> Applied {
        if !self.roots.is_current(generation) {
            return Applied::Discarded;
        }
        let raw_count = page.raw_count;
        let fresh = self.adopt(page.items, None);
        self.roots.on_fetch_resolved(generation, Page { items: fresh, raw_count })
    }

    pub fn on_roots_failed(&mut self, generation: &Generation<K>, error: FetchError) -> Option<FetchError> {
        self.roots.on_fetch_failed(generation, error)
    }

    // ── per-node children ───────────────────────────────────────────

    /// Requests the next page of `id`'s children. `None` when the node is
    /// unknown, already loading, or exhausted after a previous expansion.
    pub fn expand(&mut self, id: Id) -> Option<ChildTicket> {
        let node = self.nodes.get_mut(&id)?;
        if !node.can_expand() {
            return None;
        }
        let generation = node.children.request_next_page()?;
        Some(ChildTicket { parent: id, tree_epoch: self.epoch, generation })
    }

    pub fn on_children_resolved(&mut self, ticket: &ChildTicket, page: Page<T>) -> Applied {
        if !self.ticket_is_current(ticket) {
            return Applied::Discarded;
        }
        let raw_count = page.raw_count;
        let fresh = self.adopt(page.items, Some(ticket.parent));
        let Some(node) = self.nodes.get_mut(&ticket.parent) else { return Applied::Discarded };
        let applied = node.children.on_fetch_resolved(&ticket.generation, Page { items: fresh, raw_count });
        if matches!(applied, Applied::Appended { .. }) {
            node.expanded = true;
        }
        applied
    }

    pub fn on_children_failed(&mut self, ticket: &ChildTicket, error: FetchError) -> Option<FetchError> {
        if ticket.tree_epoch != self.epoch {
            return None;
        }
        self.nodes.get_mut(&ticket.parent)?.children.on_fetch_failed(&ticket.generation, error)
    }

    fn ticket_is_current(&self, ticket: &ChildTicket) -> bool {
        ticket.tree_epoch == self.epoch
            && self.nodes.get(&ticket.parent).is_some_and(|n| n.children.is_current(&ticket.generation))
    }

    /// Inserts unseen items as nodes under `parent`; returns their ids in
    /// arrival order.
    fn adopt(&mut self, items: Vec<T>, parent: Option<Id>) -> Vec<Id> {
        let mut fresh = Vec::with_capacity(items.len());
        for item in items {
            let id = item.id();
            if self.nodes.contains_key(&id) {
                continue;
            }
            self.nodes.insert(id, TreeNode::new(item, parent, self.page_size));
            fresh.push(id);
        }
        fresh
    }

    // ── local splices ───────────────────────────────────────────────

    /// Puts `child` first among `parent_id`'s children, whatever the state of
    /// that children list. Returns `false` if the parent is unknown or the
    /// child id is already in the tree.
    pub fn merge_reply(&mut self, parent_id: Id, child: T) -> bool {
        let id = child.id();
        if self.nodes.contains_key(&id) || !self.nodes.contains_key(&parent_id) {
            return false;
        }
        self.nodes.insert(id, TreeNode::new(child, Some(parent_id), self.page_size));
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children.items_mut().insert(0, id);
        }
        true
    }

    /// Puts a new top-level item first.
    pub fn prepend_root(&mut self, item: T) -> bool {
        let id = item.id();
        if self.nodes.contains_key(&id) {
            return false;
        }
        self.nodes.insert(id, TreeNode::new(item, None, self.page_size));
        self.roots.items_mut().insert(0, id);
        true
    }

    /// Edits a node's payload in place; its children are untouched.
    pub fn mutate_node<F>(&mut self, id: Id, update: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                update(&mut node.item);
                true
            }
            None => false,
        }
    }

    /// Swaps in a fresh copy of a node's payload (same id), keeping children.
    pub fn replace_node(&mut self, item: T) -> bool {
        self.mutate_node(item.id(), move |slot| *slot = item)
    }

    /// Detaches `id` from its parent (or the root level) and drops it with
    /// its whole subtree.
    pub fn remove(&mut self, id: Id) -> bool {
        let Some(parent) = self.nodes.get(&id).map(|n| n.parent) else { return false };
        match parent {
            Some(p) => {
                if let Some(parent) = self.nodes.get_mut(&p) {
                    parent.children.items_mut().retain(|c| *c != id);
                }
            }
            None => self.roots.items_mut().retain(|c| *c != id),
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(gone) = self.nodes.remove(&next) {
                stack.extend_from_slice(gone.child_ids());
            }
        }
        true
    }
}
