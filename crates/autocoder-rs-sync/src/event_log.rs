use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One agent output line as pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub line: String,
    pub timestamp: String,
}

/// FIFO of at most `capacity` records; the oldest are evicted first.
#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    records: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedLog<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn append(&mut self, record: T) {
        self.records.push_back(record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter()
    }
}

impl<T: Clone> BoundedLog<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.records.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn keeps_most_recent_records_in_order() {
        let mut log = BoundedLog::new(100);
        for n in 1..=150 {
            log.append(n);
        }
        assert_eq!(log.len(), 100);
        assert_eq!(log.to_vec(), (51..=150).collect::<Vec<_>>());
    }

    #[test]
    fn clear_empties_without_changing_capacity() {
        let mut log = BoundedLog::new(2);
        log.append(LogRecord {
            line: "compiling".to_string(),
            timestamp: "2024-05-01T10:00:00Z".to_string(),
        });
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.capacity(), 2);
    }

    #[test]
    fn zero_capacity_still_holds_latest() {
        let mut log = BoundedLog::new(0);
        log.append("a");
        log.append("b");
        assert_eq!(log.to_vec(), vec!["b"]);
    }
}
