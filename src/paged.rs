//! Flat, append-only paginated list bound to a filter key.
//!
//! `PagedList` is a synchronous state machine. It never performs I/O:
//! [`request_next_page`](PagedList::request_next_page) hands out a
//! [`Generation`] token, the caller runs the fetch however it likes, and
//! reports back through [`on_fetch_resolved`](PagedList::on_fetch_resolved)
//! or [`on_fetch_failed`](PagedList::on_fetch_failed) with that token.
//!
//! ```text
//! Idle(has_more) --request--> Loading --resolved--> Idle(has_more = full page)
//!                                     --failed----> Idle(unchanged)
//! any state --reset(new key)--> Idle(has_more = true, cursor = 1, empty)
//! ```

use crate::config::PAGE_SIZE;
use crate::error::FetchError;
use crate::models::{Cursor, Page};

/// Identifies one dispatched fetch. A result is only applied when its
/// token still matches the list's current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation<K> {
    epoch: u64,
    cursor: Cursor,
    key: K,
}

impl<K> Generation<K> {
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn key(&self) -> &K {
        &self.key
    }
}

/// What happened to a resolved fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Appended { added: usize, has_more: bool },
    /// The list was reset (or moved on) while the fetch was in flight.
    Discarded,
}

#[derive(Debug, Clone)]
pub struct PagedList<T, K> {
    items: Vec<T>,
    cursor: Cursor,
    filter_key: K,
    has_more: bool,
    loading: bool,
    // bumped on every reset; makes A -> B -> A resets distinguishable
    epoch: u64,
    page_size: usize,
}

impl<T, K: Clone + PartialEq> PagedList<T, K> {
    pub fn new(filter_key: K) -> Self {
        Self::with_page_size(filter_key, PAGE_SIZE)
    }

    pub fn with_page_size(filter_key: K, page_size: usize) -> Self {
        Self {
            items: Vec::new(),
            cursor: 1,
            filter_key,
            has_more: true,
            loading: false,
            epoch: 0,
            page_size: page_size.max(1),
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub(crate) fn items_mut(&mut self) -> &mut Vec<T> {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn filter_key(&self) -> &K {
        &self.filter_key
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Switches to `new_key`. Returns `false` (and changes nothing) when the
    /// key is unchanged.
    pub fn reset(&mut self, new_key: K) -> bool {
        if new_key == self.filter_key {
            return false;
        }
        self.filter_key = new_key;
        self.restart();
        true
    }

    /// Unconditional reset under the current key.
    pub fn restart(&mut self) {
        self.items.clear();
        self.cursor = 1;
        self.has_more = true;
        self.loading = false;
        self.epoch += 1;
    }

    /// Marks the list loading and returns the token to fetch with, or `None`
    /// when a fetch is already outstanding or the list is exhausted.
    pub fn request_next_page(&mut self) -> Option<Generation<K>> {
        if self.loading || !self.has_more {
            return None;
        }
        self.loading = true;
        Some(Generation { epoch: self.epoch, cursor: self.cursor, key: self.filter_key.clone() })
    }

    pub fn is_current(&self, generation: &Generation<K>) -> bool {
        self.loading
            && generation.epoch == self.epoch
            && generation.cursor == self.cursor
            && generation.key == self.filter_key
    }

    pub fn on_fetch_resolved(&mut self, generation: &Generation<K>, page: Page<T>) -> Applied {
        self.resolve_filtered(generation, page, |_| true)
    }

    /// Like [`on_fetch_resolved`](Self::on_fetch_resolved) but only appends
    /// items accepted by `keep`. Exhaustion is still decided from the
    /// server's raw count, so filtered-out duplicates never end pagination
    /// early.
    pub fn resolve_filtered<F>(&mut self, generation: &Generation<K>, page: Page<T>, mut keep: F) -> Applied
    where
        F: FnMut(&T) -> bool,
    {
        if !self.is_current(generation) {
            return Applied::Discarded;
        }
        let before = self.items.len();
        for item in page.items {
            if keep(&item) {
                self.items.push(item);
            }
        }
        self.has_more = page.raw_count >= self.page_size;
        self.cursor += 1;
        self.loading = false;
        Applied::Appended { added: self.items.len() - before, has_more: self.has_more }
    }

    /// Rolls back to idle. Returns the error when it belongs to the current
    /// generation (so the caller can surface it), `None` when stale.
    pub fn on_fetch_failed(&mut self, generation: &Generation<K>, error: FetchError) -> Option<FetchError> {
        if !self.is_current(generation) {
            return None;
        }
        self.loading = false;
        Some(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(range: std::ops::Range<i64>) -> Page<i64> {
        Page::new(range.collect())
    }

    #[test]
    fn short_second_page_exhausts() {
        let mut l: PagedList<i64, &str> = PagedList::new("popularity");
        let g = l.request_next_page().unwrap();
        assert_eq!(g.cursor(), 1);
        assert_eq!(l.on_fetch_resolved(&g, page(0..10)), Applied::Appended { added: 10, has_more: true });
        let g = l.request_next_page().unwrap();
        assert_eq!(g.cursor(), 2);
        l.on_fetch_resolved(&g, page(10..14));
        assert_eq!(l.len(), 14);
        assert!(!l.has_more());
        assert!(l.request_next_page().is_none());
        assert!(!l.is_loading());
    }

    #[test]
    fn no_double_dispatch_while_loading() {
        let mut l: PagedList<i64, ()> = PagedList::new(());
        assert!(l.request_next_page().is_some());
        for _ in 0..5 {
            assert!(l.request_next_page().is_none());
        }
    }

    #[test]
    fn empty_first_page_is_terminal() {
        let mut l: PagedList<i64, ()> = PagedList::new(());
        let g = l.request_next_page().unwrap();
        assert_eq!(l.on_fetch_resolved(&g, Page::empty()), Applied::Appended { added: 0, has_more: false });
        assert!(l.is_empty());
        assert!(l.request_next_page().is_none());
    }

    #[test]
    fn reset_discards_in_flight_result() {
        let mut l: PagedList<i64, &str> = PagedList::new("popularity");
        let f1 = l.request_next_page().unwrap();
        assert!(l.reset("recency"));
        assert!(!l.is_loading());
        assert_eq!(l.on_fetch_resolved(&f1, page(0..10)), Applied::Discarded);
        assert!(l.is_empty());
        assert_eq!(l.cursor(), 1);
    }

    #[test]
    fn reset_back_to_same_key_still_discards() {
        let mut l: PagedList<i64, &str> = PagedList::new("a");
        let old = l.request_next_page().unwrap();
        l.reset("b");
        l.reset("a");
        let fresh = l.request_next_page().unwrap();
        assert_eq!(l.on_fetch_resolved(&old, page(100..110)), Applied::Discarded);
        l.on_fetch_resolved(&fresh, page(0..10));
        assert_eq!(l.items()[0], 0);
        assert_eq!(l.len(), 10);
    }

    #[test]
    fn reset_to_same_key_is_noop() {
        let mut l: PagedList<i64, &str> = PagedList::new("a");
        let g = l.request_next_page().unwrap();
        assert!(!l.reset("a"));
        assert!(l.is_loading());
        l.on_fetch_resolved(&g, page(0..3));
        assert_eq!(l.len(), 3);
    }

    #[test]
    fn failure_rolls_back_and_allows_retry() {
        let mut l: PagedList<i64, ()> = PagedList::new(());
        let g = l.request_next_page().unwrap();
        l.on_fetch_resolved(&g, page(0..10));
        let g = l.request_next_page().unwrap();
        assert_eq!(l.on_fetch_failed(&g, FetchError::Timeout), Some(FetchError::Timeout));
        assert!(!l.is_loading());
        assert!(l.has_more());
        assert_eq!(l.cursor(), 2);
        let retry = l.request_next_page().unwrap();
        assert_eq!(retry.cursor(), 2);
    }

    #[test]
    fn stale_failure_is_swallowed() {
        let mut l: PagedList<i64, u8> = PagedList::new(1);
        let g = l.request_next_page().unwrap();
        l.reset(2);
        let live = l.request_next_page().unwrap();
        assert_eq!(l.on_fetch_failed(&g, FetchError::Status(500)), None);
        assert!(l.is_loading(), "live fetch must stay outstanding");
        assert!(l.is_current(&live));
    }

    #[test]
    fn full_pages_then_short_page() {
        let n = 4;
        let short = 7;
        let mut l: PagedList<i64, ()> = PagedList::new(());
        for i in 0..n {
            let g = l.request_next_page().unwrap();
            l.on_fetch_resolved(&g, page(i * 10..i * 10 + 10));
        }
        let g = l.request_next_page().unwrap();
        l.on_fetch_resolved(&g, page(0..short));
        assert_eq!(l.len(), (n as usize) * PAGE_SIZE + short as usize);
        assert!(!l.has_more());
        // stays exhausted until reset
        assert!(l.request_next_page().is_none());
        l.restart();
        assert!(l.has_more());
        assert!(l.is_empty());
    }

    #[test]
    fn filtered_resolve_uses_raw_count() {
        let mut l: PagedList<i64, ()> = PagedList::new(());
        let g = l.request_next_page().unwrap();
        let applied = l.resolve_filtered(&g, page(0..10), |v| v % 2 == 0);
        assert_eq!(applied, Applied::Appended { added: 5, has_more: true });
    }
}
