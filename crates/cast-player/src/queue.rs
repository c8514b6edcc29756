use crate::item::Item;
use std::collections::VecDeque;

/// Pending items, FIFO.
#[derive(Debug, Clone, Default)]
pub struct Queue {
    items: VecDeque<Item>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `item`, or with `first` put it ahead of everything except the
    /// queued items of its own playlist: it lands right after the last of
    /// them, or at the front when there are none.
    ///
    /// Returns the position the item was inserted at.
    pub fn insert(&mut self, item: Item, first: bool) -> usize {
        let position = if !first {
            self.items.len()
        } else {
            item.playlist_id()
                .and_then(|playlist| {
                    self.items
                        .iter()
                        .rposition(|queued| queued.playlist_id() == Some(playlist))
                })
                .map(|last| last + 1)
                .unwrap_or(0)
        };
        self.items.insert(position, item);
        position
    }

    pub fn push_back(&mut self, item: Item) {
        self.items.push_back(item);
    }

    pub fn pop_front(&mut self) -> Option<Item> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sources(queue: &Queue) -> Vec<String> {
        queue.items().map(|i| i.source().to_string()).collect()
    }

    #[test]
    fn default_insert_is_fifo() {
        let mut queue = Queue::new();
        queue.insert(Item::new("a"), false);
        queue.insert(Item::new("b"), false);
        queue.insert(Item::new("c"), false);
        assert_eq!(sources(&queue), vec!["a", "b", "c"]);
        assert_eq!(queue.pop_front().unwrap().source(), "a");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn first_without_playlist_goes_to_front() {
        let mut queue = Queue::new();
        queue.insert(Item::new("a").with_playlist("pl"), false);
        queue.insert(Item::new("b"), false);
        assert_eq!(queue.insert(Item::new("now"), true), 0);
        assert_eq!(sources(&queue), vec!["now", "a", "b"]);
    }

    #[test]
    fn first_joins_its_playlist_run() {
        let mut queue = Queue::new();
        queue.insert(Item::new("x1").with_playlist("x"), false);
        queue.insert(Item::new("y1").with_playlist("y"), false);
        queue.insert(Item::new("x2").with_playlist("x"), false);
        queue.insert(Item::new("z"), false);

        let position = queue.insert(Item::new("y2").with_playlist("y"), true);
        assert_eq!(position, 2);
        assert_eq!(sources(&queue), vec!["x1", "y1", "y2", "x2", "z"]);

        queue.insert(Item::new("w1").with_playlist("w"), true);
        assert_eq!(sources(&queue)[0], "w1");
    }

    proptest! {
        /// Property: one playlist inserted with `first` stays contiguous and in
        /// insertion order, whatever else is already queued
        #[test]
        fn playlist_run_is_contiguous(
            background in prop::collection::vec(proptest::option::of(0u8..3), 0..20),
            count in 1usize..15,
        ) {
            let mut queue = Queue::new();
            for (n, playlist) in background.iter().enumerate() {
                let mut item = Item::new(format!("bg-{}", n));
                if let Some(p) = playlist {
                    item = item.with_playlist(format!("other-{}", p));
                }
                queue.insert(item, false);
            }
            for n in 0..count {
                queue.insert(Item::new(format!("run-{}", n)).with_playlist("run"), true);
            }

            let positions: Vec<usize> = queue
                .items()
                .enumerate()
                .filter(|(_, i)| i.playlist_id() == Some("run"))
                .map(|(pos, _)| pos)
                .collect();
            prop_assert_eq!(positions.len(), count);
            prop_assert_eq!(positions[positions.len() - 1] - positions[0], count - 1);

            let run: Vec<String> = queue
                .items()
                .filter(|i| i.playlist_id() == Some("run"))
                .map(|i| i.source().to_string())
                .collect();
            let expected: Vec<String> = (0..count).map(|n| format!("run-{}", n)).collect();
            prop_assert_eq!(run, expected);
            prop_assert_eq!(queue.len(), background.len() + count);
        }
    }
}
