use std::collections::VecDeque;

pub const HISTORY_LIMIT: usize = 50;

/// Undo/redo stacks of whole-state snapshots.
///
/// `past` is ordered oldest -> newest, `future` nearest -> farthest. Both are
/// capped at `limit`; on overflow the entry farthest from the present is dropped.
#[derive(Debug, Clone)]
pub struct History<T> {
    past: VecDeque<T>,
    future: VecDeque<T>,
    limit: usize,
}

impl<T> Default for History<T> {
    fn default() -> Self { Self::new(HISTORY_LIMIT) }
}

impl<T> History<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            past: VecDeque::new(),
            future: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    // Called with the pre-mutation state; a fresh edit invalidates redo
    pub fn record(&mut self, previous: T) {
        self.push_past(previous);
        self.future.clear();
    }

    pub fn undo(&mut self, current: T) -> Option<T> {
        let previous = self.past.pop_back()?;
        self.future.push_front(current);
        self.future.truncate(self.limit);
        Some(previous)
    }

    pub fn redo(&mut self, current: T) -> Option<T> {
        let next = self.future.pop_front()?;
        self.push_past(current);
        Some(next)
    }

    fn push_past(&mut self, snapshot: T) {
        self.past.push_back(snapshot);
        while self.past.len() > self.limit {
            self.past.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
    }

    pub fn can_undo(&self) -> bool { !self.past.is_empty() }
    pub fn can_redo(&self) -> bool { !self.future.is_empty() }
    pub fn past_len(&self) -> usize { self.past.len() }
    pub fn future_len(&self) -> usize { self.future.len() }
    pub fn limit(&self) -> usize { self.limit }
}
