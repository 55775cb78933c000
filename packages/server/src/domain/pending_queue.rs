//! Ordered set of citizens waiting for an admin.
//!
//! Pure data structure: FIFO order with idempotent insertion. Locking and
//! snapshot publication live in `broker::SharedPendingQueue`.

use std::collections::VecDeque;

use super::value_object::ExternalId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingQueue {
    entries: VecDeque<ExternalId>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the back. Returns `false` if already queued.
    pub fn enqueue(&mut self, citizen_id: ExternalId) -> bool {
        if self.contains(&citizen_id) {
            return false;
        }
        self.entries.push_back(citizen_id);
        true
    }

    /// Insert at the front (requeue after an admin drop). Returns `false` if
    /// already queued; the existing position is kept.
    pub fn enqueue_front(&mut self, citizen_id: ExternalId) -> bool {
        if self.contains(&citizen_id) {
            return false;
        }
        self.entries.push_front(citizen_id);
        true
    }

    /// Remove wherever it sits. Returns `false` if it was not queued.
    pub fn dequeue(&mut self, citizen_id: &ExternalId) -> bool {
        match self.entries.iter().position(|id| id == citizen_id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, citizen_id: &ExternalId) -> bool {
        self.entries.iter().any(|id| id == citizen_id)
    }

    /// Next citizen to be served
    pub fn front(&self) -> Option<&ExternalId> {
        self.entries.front()
    }

    pub fn snapshot(&self) -> Vec<ExternalId> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: &str) -> ExternalId {
        ExternalId::new(value.to_string()).unwrap()
    }

    #[test]
    fn test_enqueue_preserves_fifo_order() {
        // テスト項目: enqueue の順序がスナップショットの順序と一致する
        // given (前提条件):
        let mut queue = PendingQueue::new();

        // when (操作):
        for name in ["C1", "C2", "C3"] {
            queue.enqueue(id(name));
        }

        // then (期待する結果):
        assert_eq!(queue.snapshot(), vec![id("C1"), id("C2"), id("C3")]);
        assert_eq!(queue.front(), Some(&id("C1")));
    }

    #[test]
    fn test_enqueue_is_idempotent() {
        // テスト項目: 同じ citizen を二度 enqueue しても一度しか並ばない
        // given (前提条件):
        let mut queue = PendingQueue::new();
        queue.enqueue(id("C1"));
        queue.enqueue(id("C2"));

        // when (操作):
        let added = queue.enqueue(id("C1"));

        // then (期待する結果):
        assert!(!added);
        assert_eq!(queue.snapshot(), vec![id("C1"), id("C2")]);
    }

    #[test]
    fn test_enqueue_front_puts_citizen_first_once() {
        // テスト項目: enqueue_front は先頭に挿入し、既存なら位置を変えない
        // given (前提条件):
        let mut queue = PendingQueue::new();
        queue.enqueue(id("C2"));
        queue.enqueue(id("C3"));

        // when (操作):
        let added = queue.enqueue_front(id("C1"));
        let again = queue.enqueue_front(id("C3"));

        // then (期待する結果):
        assert!(added);
        assert!(!again);
        assert_eq!(queue.snapshot(), vec![id("C1"), id("C2"), id("C3")]);
    }

    #[test]
    fn test_dequeue_from_middle() {
        // テスト項目: 途中の要素を取り除いても残りの順序は保たれる
        // given (前提条件):
        let mut queue = PendingQueue::new();
        for name in ["C1", "C2", "C3"] {
            queue.enqueue(id(name));
        }

        // when (操作):
        let removed = queue.dequeue(&id("C2"));
        let missing = queue.dequeue(&id("C9"));

        // then (期待する結果):
        assert!(removed);
        assert!(!missing);
        assert_eq!(queue.snapshot(), vec![id("C1"), id("C3")]);
        assert_eq!(queue.len(), 2);
    }
}
