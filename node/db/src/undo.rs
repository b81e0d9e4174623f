// Copyright 2020-2023 Agora Labs
// SPDX-License-Identifier: Apache-2.0, MIT

/// A stack of inverse mutations with nested session markers.
///
/// Records accumulate while at least one session is open; `undo` replays the
/// top session's inverses in LIFO order, `commit` merges them into the
/// enclosing session. Block application leaves one marker per applied block
/// so blocks can be popped until they turn irreversible, at which point
/// `trim_oldest` makes the oldest sessions permanent.
pub struct UndoStack<S> {
    records: Vec<Box<dyn FnOnce(&mut S) + Send>>,
    markers: Vec<usize>,
}

impl<S> Default for UndoStack<S> {
    fn default() -> Self {
        UndoStack { records: Vec::new(), markers: Vec::new() }
    }
}

impl<S> UndoStack<S> {
    /// Record an inverse mutation. Outside any session the mutation is
    /// permanent and nothing is recorded.
    pub fn push(&mut self, record: Box<dyn FnOnce(&mut S) + Send>) {
        if !self.markers.is_empty() {
            self.records.push(record);
        }
    }

    pub fn begin(&mut self) {
        self.markers.push(self.records.len());
    }

    /// Replay the top session's inverses against `tables`, newest first.
    pub fn undo(&mut self, tables: &mut S) {
        let mark = self.markers.pop().expect("undo without an open session");
        while self.records.len() > mark {
            let record = self.records.pop().expect("length checked");
            record(tables);
        }
    }

    /// Merge the top session into its parent; with no parent its records are
    /// dropped and the mutations become permanent.
    pub fn commit(&mut self) {
        let mark = self.markers.pop().expect("commit without an open session");
        if self.markers.is_empty() {
            debug_assert_eq!(mark, 0);
            self.records.clear();
        }
    }

    pub fn sessions(&self) -> usize {
        self.markers.len()
    }

    /// Drop the oldest sessions until at most `max_sessions` remain.
    pub fn trim_oldest(&mut self, max_sessions: usize) {
        while self.markers.len() > max_sessions.max(1) {
            let cut = self.markers[1];
            self.records.drain(..cut);
            self.markers.remove(0);
            for mark in self.markers.iter_mut() {
                *mark -= cut;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_outside_sessions_are_dropped() {
        let mut stack: UndoStack<Vec<u32>> = UndoStack::default();
        stack.push(Box::new(|v| v.push(1)));
        let mut state = Vec::new();
        assert_eq!(stack.sessions(), 0);
        // nothing to undo; no session was open
        stack.begin();
        stack.undo(&mut state);
        assert!(state.is_empty());
    }

    #[test]
    fn undo_applies_in_reverse_order() {
        let mut stack: UndoStack<Vec<u32>> = UndoStack::default();
        stack.begin();
        stack.push(Box::new(|v| v.push(1)));
        stack.push(Box::new(|v| v.push(2)));
        let mut state = Vec::new();
        stack.undo(&mut state);
        assert_eq!(state, vec![2, 1]);
    }

    #[test]
    fn commit_merges_into_parent() {
        let mut stack: UndoStack<Vec<u32>> = UndoStack::default();
        stack.begin();
        stack.push(Box::new(|v| v.push(1)));
        stack.begin();
        stack.push(Box::new(|v| v.push(2)));
        stack.commit();
        let mut state = Vec::new();
        stack.undo(&mut state);
        assert_eq!(state, vec![2, 1]);
    }
}
