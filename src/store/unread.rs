// Total unread bookkeeping
// The total is derived from the directory on every mutation and published on
// a watch channel; it is never incremented or decremented on its own.

use log::debug;
use tokio::sync::watch;

use crate::models::Contact;

#[derive(Debug)]
pub struct UnreadAggregator {
    total_tx: watch::Sender<u32>,
}

impl UnreadAggregator {
    pub fn new() -> Self {
        let (total_tx, _) = watch::channel(0);
        UnreadAggregator { total_tx }
    }

    /// Recompute the sum of unread counts and publish it if it changed.
    pub fn recompute(&self, contacts: &[Contact]) -> u32 {
        let total = contacts
            .iter()
            .fold(0u32, |sum, c| sum.saturating_add(c.unread_count));
        self.total_tx.send_if_modified(|current| {
            if *current == total {
                return false;
            }
            debug!("Total unread changed from {} to {}", current, total);
            *current = total;
            true
        });
        total
    }

    pub fn total(&self) -> u32 {
        *self.total_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u32> {
        self.total_tx.subscribe()
    }
}

impl Default for UnreadAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recompute_sums_unread_counts() {
        let aggregator = UnreadAggregator::new();
        let mut a = Contact::new(1, "Anna", "A");
        let mut b = Contact::new(2, "Class 6B", "B");
        a.unread_count = 2;
        b.unread_count = 5;

        assert_eq!(aggregator.recompute(&[a.clone(), b.clone()]), 7);
        assert_eq!(aggregator.total(), 7);

        a.unread_count = 0;
        assert_eq!(aggregator.recompute(&[a, b]), 5);
        assert_eq!(aggregator.total(), 5);
    }

    #[test]
    fn test_recompute_saturates() {
        let aggregator = UnreadAggregator::new();
        let mut a = Contact::new(1, "Anna", "A");
        let mut b = Contact::new(2, "Max", "M");
        a.unread_count = u32::MAX - 1;
        b.unread_count = 5;
        assert_eq!(aggregator.recompute(&[a, b]), u32::MAX);
    }

    #[test]
    fn test_subscribers_see_changes() {
        let aggregator = UnreadAggregator::new();
        let mut rx = aggregator.subscribe();
        assert!(!rx.has_changed().unwrap());

        let mut a = Contact::new(1, "Anna", "A");
        a.unread_count = 3;
        aggregator.recompute(&[a.clone()]);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 3);

        // Same total again is not a change
        aggregator.recompute(&[a]);
        assert!(!rx.has_changed().unwrap());
    }
}
