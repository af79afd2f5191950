//! Host history contract.

use std::sync::Mutex;

/// Trait for the host's navigation history.
pub trait Navigator: Send + Sync {
    /// Push a new entry, dropping any forward entries.
    fn push_url(&self, url: &str);

    /// Replace the current entry without navigating.
    fn replace_state(&self, url: &str);

    /// Step back one entry. Returns the new current URL, or `None` at the start.
    fn back(&self) -> Option<String>;

    /// Current URL.
    fn current(&self) -> String;
}

#[derive(Debug)]
struct HistoryInner {
    entries: Vec<String>,
    index: usize,
}

/// In-memory history stack.
#[derive(Debug)]
pub struct MemoryHistory {
    inner: Mutex<HistoryInner>,
}

impl MemoryHistory {
    /// Create a history whose only entry is `initial`.
    #[must_use]
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(HistoryInner {
                entries: vec![initial.into()],
                index: 0,
            }),
        }
    }

    /// Entries up to and including the current one.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        let inner = self.lock();
        inner.entries[..=inner.index].to_vec()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HistoryInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for MemoryHistory {
    fn push_url(&self, url: &str) {
        let mut inner = self.lock();
        let keep = inner.index + 1;
        inner.entries.truncate(keep);
        inner.entries.push(url.to_string());
        inner.index = keep;
    }

    fn replace_state(&self, url: &str) {
        let mut inner = self.lock();
        let index = inner.index;
        inner.entries[index] = url.to_string();
    }

    fn back(&self) -> Option<String> {
        let mut inner = self.lock();
        if inner.index == 0 {
            return None;
        }
        inner.index -= 1;
        Some(inner.entries[inner.index].clone())
    }

    fn current(&self) -> String {
        let inner = self.lock();
        inner.entries[inner.index].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_truncates_forward_entries() {
        let history = MemoryHistory::default();
        history.push_url("/a");
        history.push_url("/b");
        assert_eq!(history.back().as_deref(), Some("/a"));

        history.push_url("/c");
        assert_eq!(history.entries(), ["/", "/a", "/c"]);
        assert_eq!(history.current(), "/c");
    }

    #[test]
    fn test_back_stops_at_first_entry() {
        let history = MemoryHistory::new("/start");
        assert_eq!(history.back(), None);
        assert_eq!(history.current(), "/start");
    }

    #[test]
    fn test_replace_state_keeps_depth() {
        let history = MemoryHistory::default();
        history.push_url("/a");
        history.replace_state("/a?q=1");
        assert_eq!(history.entries(), ["/", "/a?q=1"]);
        assert_eq!(history.back().as_deref(), Some("/"));
    }
}
