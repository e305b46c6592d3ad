//! Splicing confirmed local writes into loaded lists and trees.
//!
//! A `Mutation` is built from the *result* of a successful remote call and
//! applied in one step; nothing here is speculative. Created items go to the
//! front, edits replace the payload in place, deletes tombstone (or remove,
//! for types without a tombstone form), reactions adjust counters.

use crate::error::{MutationError, MutationResult};
use crate::models::{Comment, Id, Identified, Post, Reaction, ReactionDelta, Topic};
use crate::paged::PagedList;
use crate::tree::LazyTree;

/// Payload capabilities the merge policy can use.
pub trait Mergeable: Identified {
    /// Soft-deletes in place. Returns `false` for types without a tombstone form.
    fn tombstone(&mut self) -> bool {
        false
    }

    fn apply_reaction(&mut self, _delta: ReactionDelta) {}
}

impl Mergeable for Topic {}

impl Mergeable for Post {
    fn apply_reaction(&mut self, delta: ReactionDelta) {
        self.likes += delta.likes;
        self.dislikes += delta.dislikes;
    }
}

impl Mergeable for Comment {
    fn tombstone(&mut self) -> bool {
        self.description.clear();
        true
    }

    fn apply_reaction(&mut self, delta: ReactionDelta) {
        self.likes += delta.likes;
        self.dislikes += delta.dislikes;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<T> {
    /// New item; `parent` is only meaningful for trees.
    Insert { parent: Option<Id>, item: T },
    Replace(T),
    Tombstone(Id),
    Remove(Id),
    React { id: Id, delta: ReactionDelta },
}

impl<T: Identified> Mutation<T> {
    pub fn target(&self) -> Id {
        match self {
            Mutation::Insert { item, .. } | Mutation::Replace(item) => item.id(),
            Mutation::Tombstone(id) | Mutation::Remove(id) | Mutation::React { id, .. } => *id,
        }
    }
}

impl<T: Mergeable, K: Clone + PartialEq> PagedList<T, K> {
    /// Applies a confirmed write. Returns whether anything changed.
    pub fn apply(&mut self, mutation: Mutation<T>) -> bool {
        let items = self.items_mut();
        match mutation {
            Mutation::Insert { parent: Some(_), .. } => false,
            Mutation::Insert { parent: None, item } => {
                if items.iter().any(|i| i.id() == item.id()) {
                    return false;
                }
                items.insert(0, item);
                true
            }
            Mutation::Replace(item) => match items.iter_mut().find(|i| i.id() == item.id()) {
                Some(slot) => {
                    *slot = item;
                    true
                }
                None => false,
            },
            Mutation::Tombstone(id) => items.iter_mut().find(|i| i.id() == id).is_some_and(|i| i.tombstone()),
            Mutation::Remove(id) => {
                let before = items.len();
                items.retain(|i| i.id() != id);
                items.len() != before
            }
            Mutation::React { id, delta } => match items.iter_mut().find(|i| i.id() == id) {
                Some(item) => {
                    item.apply_reaction(delta);
                    true
                }
                None => false,
            },
        }
    }

    pub fn find(&self, id: Id) -> Option<&T> {
        self.items().iter().find(|i| i.id() == id)
    }
}

impl<T: Mergeable, K: Clone + PartialEq> LazyTree<T, K> {
    /// Applies a confirmed write to the tree. Returns whether anything changed.
    pub fn apply(&mut self, mutation: Mutation<T>) -> bool {
        match mutation {
            Mutation::Insert { parent: Some(p), item } => self.merge_reply(p, item),
            Mutation::Insert { parent: None, item } => self.prepend_root(item),
            Mutation::Replace(item) => self.replace_node(item),
            Mutation::Tombstone(id) => {
                let mut done = false;
                self.mutate_node(id, |item| done = item.tombstone());
                done
            }
            Mutation::Remove(id) => self.remove(id),
            Mutation::React { id, delta } => self.mutate_node(id, |item| item.apply_reaction(delta)),
        }
    }
}

/// What pressing a reaction button does, given the user's current reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionPlan {
    Add(Reaction),
    Remove(Reaction),
}

impl ReactionPlan {
    /// Pressing the active reaction removes it; pressing the other one while
    /// a reaction is active is refused.
    pub fn plan(current: Option<Reaction>, pressed: Reaction) -> MutationResult<Self> {
        match current {
            None => Ok(ReactionPlan::Add(pressed)),
            Some(r) if r == pressed => Ok(ReactionPlan::Remove(r)),
            Some(_) => Err(MutationError::ReactionConflict),
        }
    }

    pub fn delta(self) -> ReactionDelta {
        match self {
            ReactionPlan::Add(r) => ReactionDelta::added(r),
            ReactionPlan::Remove(r) => ReactionDelta::removed(r),
        }
    }

    /// The user's reaction once the plan has been carried out.
    pub fn resulting(self) -> Option<Reaction> {
        match self {
            ReactionPlan::Add(r) => Some(r),
            ReactionPlan::Remove(_) => None,
        }
    }
}
