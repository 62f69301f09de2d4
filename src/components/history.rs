use std::collections::{HashSet, VecDeque};

// ============================================================================
// MEMORY ACCOUNTING
// ============================================================================

/// Implemented by history states that can report how many bytes they keep
/// alive, so the history can be pruned against a memory budget.
pub trait MemoryFootprint {
    /// Bytes owned by this state alone.
    fn memory_size(&self) -> usize;

    /// A large buffer this state may share with other states, as
    /// `(identity, bytes)`. Each identity is counted once per history.
    fn shared_buffer(&self) -> Option<(usize, usize)> {
        None
    }
}

// ============================================================================
// HISTORY MANAGER - Bounded linear undo/redo over state snapshots
// ============================================================================

/// Undo/redo history over opaque state values.
///
/// `past` runs oldest → newest and is never empty; its last element is the
/// current state. `future` holds redo candidates, most recent last.
/// Pushing a new state discards the whole redo chain: history is linear, not
/// a tree.
#[derive(Clone, Debug)]
pub struct HistoryManager<T> {
    past: VecDeque<T>,
    future: Vec<T>,
    max_size: usize,
}

impl<T> HistoryManager<T> {
    /// Start a history holding only `initial`. A `max_size` of 0 is treated as 1.
    pub fn new(initial: T, max_size: usize) -> Self {
        let mut past = VecDeque::with_capacity(max_size.max(1) + 1);
        past.push_back(initial);
        Self {
            past,
            future: Vec::new(),
            max_size: max_size.max(1),
        }
    }

    /// Record a new current state.
    ///
    /// Returns the entry evicted from the oldest end when the history was
    /// already full, so the owner can release whatever it referenced.
    pub fn push(&mut self, state: T) -> Option<T> {
        // Clear redo stack when a new action is performed
        self.future.clear();
        self.past.push_back(state);
        self.evict_overflow()
    }

    /// Step back one state. Returns the state that is now current, or `None`
    /// when already at the oldest retained state.
    pub fn undo(&mut self) -> Option<&T> {
        if self.past.len() <= 1 {
            return None;
        }
        let undone = self.past.pop_back()?;
        self.future.push(undone);
        self.past.back()
    }

    /// Step forward one state. Returns the state that is now current, or
    /// `None` when there is nothing to redo.
    pub fn redo(&mut self) -> Option<&T> {
        let state = self.future.pop()?;
        self.past.push_back(state);
        self.evict_overflow();
        self.past.back()
    }

    /// Undo `steps` times, stopping early at the oldest state.
    /// Returns how many steps were actually taken.
    pub fn undo_to(&mut self, steps: usize) -> usize {
        let mut taken = 0;
        while taken < steps && self.undo().is_some() {
            taken += 1;
        }
        taken
    }

    pub fn current(&self) -> &T {
        // `past` always holds at least the initial state.
        self.past.back().unwrap_or_else(|| unreachable!("history past is never empty"))
    }

    pub fn can_undo(&self) -> bool {
        self.past.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Drop all history and start again from `initial`.
    pub fn reset(&mut self, initial: T) {
        self.past.clear();
        self.future.clear();
        self.past.push_back(initial);
    }

    /// Change the depth limit. Prior history is discarded, not truncated:
    /// the new history holds only `initial`.
    pub fn reset_with_limit(&mut self, initial: T, max_size: usize) {
        self.max_size = max_size.max(1);
        self.reset(initial);
    }

    /// Retained states, oldest first. The last one is the current state.
    pub fn past(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.past.iter()
    }

    /// Number of states retained, including the current one.
    pub fn len(&self) -> usize {
        self.past.len()
    }

    pub fn undo_count(&self) -> usize {
        self.past.len() - 1
    }

    pub fn redo_count(&self) -> usize {
        self.future.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn evict_overflow(&mut self) -> Option<T> {
        if self.past.len() > self.max_size {
            self.past.pop_front()
        } else {
            None
        }
    }
}

impl<T: MemoryFootprint> HistoryManager<T> {
    /// Bytes kept alive by every state in both stacks. Shared buffers are
    /// counted once.
    pub fn memory_usage(&self) -> usize {
        let mut seen = HashSet::new();
        self.past
            .iter()
            .chain(self.future.iter())
            .map(|s| {
                let shared = match s.shared_buffer() {
                    Some((key, bytes)) if seen.insert(key) => bytes,
                    _ => 0,
                };
                s.memory_size() + shared
            })
            .sum()
    }

    /// Evict the oldest states until the history fits in `max_bytes`.
    /// The current state is always kept, even when it alone is over budget.
    pub fn prune_to_memory(&mut self, max_bytes: usize) -> Vec<T> {
        let mut evicted = Vec::new();
        while self.past.len() > 1 && self.memory_usage() > max_bytes {
            if let Some(removed) = self.past.pop_front() {
                evicted.push(removed);
            }
        }
        evicted
    }
}
