use crate::config::SCROLL_THRESHOLD;
use crate::paged::{Generation, PagedList};

/// Scroll geometry of the container hosting a list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub viewport_height: f64,
}

impl ScrollMetrics {
    pub fn new(scroll_top: f64, scroll_height: f64, viewport_height: f64) -> Self {
        Self { scroll_top, scroll_height, viewport_height }
    }

    /// Distance left to scroll before the bottom edge.
    pub fn remaining(&self) -> f64 {
        self.scroll_height - self.scroll_top - self.viewport_height
    }
}

/// Turns scroll events into next-page requests. Holds no state between
/// calls; the list's own `loading`/`has_more` flags are the only debounce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollTrigger {
    threshold: f64,
}

impl Default for ScrollTrigger {
    fn default() -> Self {
        Self { threshold: SCROLL_THRESHOLD }
    }
}

impl ScrollTrigger {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn near_bottom(&self, m: ScrollMetrics) -> bool {
        m.scroll_height - m.scroll_top <= m.viewport_height + self.threshold
    }

    pub fn should_fire(&self, m: ScrollMetrics, loading: bool, has_more: bool) -> bool {
        !loading && has_more && self.near_bottom(m)
    }

    /// Requests the next page of `list` when the predicate holds.
    pub fn on_scroll<T, K: Clone + PartialEq>(&self, list: &mut PagedList<T, K>, m: ScrollMetrics) -> Option<Generation<K>> {
        if !self.should_fire(m, list.is_loading(), list.has_more()) {
            return None;
        }
        list.request_next_page()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Page;

    #[test]
    fn fires_inside_threshold_only() {
        let t = ScrollTrigger::default();
        // 1000 tall content, 400 viewport: bottom edge when scroll_top = 600
        assert!(!t.near_bottom(ScrollMetrics::new(499.0, 1000.0, 400.0)));
        assert!(t.near_bottom(ScrollMetrics::new(500.0, 1000.0, 400.0)));
        assert!(t.near_bottom(ScrollMetrics::new(600.0, 1000.0, 400.0)));
    }

    #[test]
    fn loading_list_is_not_refired() {
        let t = ScrollTrigger::default();
        let mut list: PagedList<u32, ()> = PagedList::new(());
        let bottom = ScrollMetrics::new(600.0, 1000.0, 400.0);
        assert!(t.on_scroll(&mut list, bottom).is_some());
        for _ in 0..10 {
            assert!(t.on_scroll(&mut list, bottom).is_none());
        }
    }

    #[test]
    fn exhausted_list_is_not_refired() {
        let t = ScrollTrigger::new(0.0);
        let mut list: PagedList<u32, ()> = PagedList::new(());
        let g = list.request_next_page().unwrap();
        list.on_fetch_resolved(&g, Page::new(vec![1, 2]));
        assert!(!t.should_fire(ScrollMetrics::new(600.0, 1000.0, 400.0), false, list.has_more()));
        assert!(t.on_scroll(&mut list, ScrollMetrics::new(600.0, 1000.0, 400.0)).is_none());
    }
}
