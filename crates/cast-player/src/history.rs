//! Navigable record of played items.
//!
//! While not browsing, the cursor is parked on the newest entry and the queue
//! is the source of truth for what plays next.  While browsing, the cursor
//! names the past entry being replayed.

use crate::item::{Item, ItemId};

#[derive(Debug, Clone, Default)]
pub struct History {
    items: Vec<Item>,
    index: usize,
    browsing: bool,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `item` and park the cursor on it.  Entries ahead of a browsing
    /// cursor are kept: the history is a play log, not an undo stack.
    pub fn push(&mut self, item: Item) {
        self.items.push(item);
        self.stop_browsing();
    }

    /// Step back one entry and enter browsing.  Returns false (and changes
    /// nothing) when there is no earlier entry.
    pub fn prev(&mut self) -> bool {
        if !self.can_prev() {
            return false;
        }
        self.index -= 1;
        self.browsing = true;
        true
    }

    /// Step forward one entry.  Moving past the newest entry ends browsing.
    pub fn next(&mut self) {
        if !self.browsing {
            return;
        }
        if self.index + 1 >= self.items.len() {
            self.stop_browsing();
        } else {
            self.index += 1;
        }
    }

    pub fn can_prev(&self) -> bool {
        self.index > 0
    }

    pub fn current_item(&self) -> Option<&Item> {
        self.items.get(self.index)
    }

    /// Drop every entry for `id`, keeping the cursor on the same neighbour.
    pub fn remove(&mut self, id: ItemId) {
        let before_cursor = self
            .items
            .iter()
            .take(self.index)
            .filter(|item| item.id() == id)
            .count();
        self.items.retain(|item| item.id() != id);
        self.index = self.index.saturating_sub(before_cursor);

        if self.items.is_empty() {
            self.index = 0;
            self.browsing = false;
        } else if self.index >= self.items.len() {
            self.index = self.items.len() - 1;
        }
    }

    pub fn stop_browsing(&mut self) {
        self.index = self.items.len().saturating_sub(1);
        self.browsing = false;
    }

    pub fn is_browsing(&self) -> bool {
        self.browsing
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }
}
