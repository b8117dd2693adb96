//! Fetch-then-render record stores.
//!
//! Views never render from a collection that has not been fetched: an empty
//! collection makes [`Collection::ready`] wait for the next [`Collection::reset`],
//! while a populated one renders immediately. Resets replace the whole
//! contents, the shape the server's list endpoints return.

use tokio::sync::{watch, RwLock};

pub struct Collection<T> {
    records: RwLock<Vec<T>>,
    resets: watch::Sender<u64>,
    key: fn(&T) -> i64,
}

impl<T: Clone> Collection<T> {
    pub fn new(key: fn(&T) -> i64) -> Self {
        let (resets, _) = watch::channel(0);
        Self {
            records: RwLock::new(Vec::new()),
            resets,
            key,
        }
    }

    /// Replaces the whole contents and wakes anything blocked in [`ready`].
    ///
    /// [`ready`]: Collection::ready
    pub async fn reset(&self, records: Vec<T>) {
        *self.records.write().await = records;
        self.resets.send_modify(|n| *n += 1);
    }

    /// Resolves immediately when the collection holds records, otherwise
    /// waits for the next reset, even one that leaves the collection empty.
    pub async fn ready(&self) {
        // Subscribe before the emptiness check so a reset racing us is not missed.
        let mut changes = self.resets.subscribe();
        if !self.records.read().await.is_empty() {
            return;
        }
        let _ = changes.changed().await;
    }

    pub async fn snapshot(&self) -> Vec<T> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, id: i64) -> Option<T> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| (self.key)(record) == id)
            .cloned()
    }

    /// Newest-first insert, used after creating a record locally.
    pub async fn prepend(&self, record: T) {
        self.records.write().await.insert(0, record);
    }

    /// Swaps a record in place by key. Returns false when no record matches.
    pub async fn replace(&self, record: T) -> bool {
        let mut records = self.records.write().await;
        let id = (self.key)(&record);
        match records.iter().position(|existing| (self.key)(existing) == id) {
            Some(index) => {
                records[index] = record;
                true
            }
            None => false,
        }
    }

    /// How many resets the collection has seen.
    pub fn resets(&self) -> u64 {
        *self.resets.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn numbers() -> Collection<i64> {
        Collection::new(|n| *n)
    }

    #[tokio::test]
    async fn ready_resolves_immediately_when_populated() {
        let collection = numbers();
        collection.reset(vec![1, 2]).await;
        tokio::time::timeout(Duration::from_millis(100), collection.ready())
            .await
            .expect("populated collection must not block");
    }

    #[tokio::test]
    async fn ready_waits_for_a_reset_even_one_that_stays_empty() {
        let collection = Arc::new(numbers());
        let waiter = {
            let collection = Arc::clone(&collection);
            tokio::spawn(async move { collection.ready().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "ready resolved before any reset");

        collection.reset(Vec::new()).await;
        tokio::time::timeout(Duration::from_millis(500), waiter)
            .await
            .expect("reset must wake the waiter")
            .expect("waiter task");
    }

    #[tokio::test]
    async fn reset_replaces_contents_wholesale() {
        let collection = numbers();
        collection.reset(vec![1, 2, 3]).await;
        collection.reset(vec![9]).await;
        assert_eq!(collection.snapshot().await, vec![9]);
        assert_eq!(collection.resets(), 2);
    }

    #[tokio::test]
    async fn get_finds_records_by_key() {
        let collection = numbers();
        collection.reset(vec![4, 7]).await;
        assert_eq!(collection.get(7).await, Some(7));
        assert_eq!(collection.get(8).await, None);
    }

    #[tokio::test]
    async fn prepend_puts_the_newest_record_first() {
        let collection = numbers();
        collection.reset(vec![1]).await;
        collection.prepend(2).await;
        assert_eq!(collection.snapshot().await, vec![2, 1]);
    }

    #[tokio::test]
    async fn replace_swaps_in_place_only_when_present() {
        let collection = Collection::new(|pair: &(i64, &'static str)| pair.0);
        collection.reset(vec![(1, "old"), (2, "two")]).await;
        assert!(collection.replace((1, "new")).await);
        assert!(!collection.replace((9, "missing")).await);
        assert_eq!(collection.get(1).await, Some((1, "new")));
        assert_eq!(collection.len().await, 2);
    }
}
