//! Bounded in-memory transaction log.

use std::collections::VecDeque;

use parking_lot::RwLock;

use super::Transaction;

/// Ring buffer of completed transactions, oldest first.
#[derive(Debug)]
pub struct TransactionLog {
    entries: RwLock<VecDeque<Transaction>>,
    max_entries: usize,
}

impl TransactionLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(max_entries.min(1024))),
            max_entries,
        }
    }

    /// Append a transaction, evicting the oldest entries over the bound.
    pub fn push(&self, transaction: Transaction) {
        if self.max_entries == 0 {
            return;
        }
        let mut entries = self.entries.write();
        while entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(transaction);
    }

    /// One page of entries. `page` is 1-based; page 0 is treated as 1.
    pub fn page(&self, page: usize, limit: usize) -> Vec<Transaction> {
        let start = page.max(1).saturating_sub(1).saturating_mul(limit);
        self.entries
            .read()
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Transaction> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::tests::transaction;

    #[test]
    fn test_bound_keeps_newest_last() {
        let log = TransactionLog::new(3);
        for i in 0..5 {
            log.push(transaction(&format!("/r{i}")));
        }
        let paths: Vec<String> = log.all().into_iter().map(|t| t.request.url_path).collect();
        assert_eq!(paths, vec!["/r2", "/r3", "/r4"]);
    }

    #[test]
    fn test_page_slices() {
        let log = TransactionLog::new(100);
        for i in 0..12 {
            log.push(transaction(&format!("/r{i}")));
        }
        let paths: Vec<String> = log.page(2, 5).into_iter().map(|t| t.request.url_path).collect();
        assert_eq!(paths, vec!["/r5", "/r6", "/r7", "/r8", "/r9"]);
        assert_eq!(log.page(3, 5).len(), 2);
        assert!(log.page(4, 5).is_empty());
        assert_eq!(log.page(0, 5).len(), 5);
    }

    #[test]
    fn test_clear() {
        let log = TransactionLog::new(2);
        log.push(transaction("/a"));
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_zero_bound_stores_nothing() {
        let log = TransactionLog::new(0);
        log.push(transaction("/a"));
        assert_eq!(log.len(), 0);
    }
}
