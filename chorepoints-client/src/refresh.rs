use std::collections::BTreeSet;
use std::sync::Arc;

use chorepoints_shared::api::Collection;
use tokio::sync::{Mutex, Notify};

/// Single-consumer refresh requests. Requests made while a refresh is
/// running merge into one pending set, so there is at most one refresh in
/// flight and one waiting.
#[derive(Debug, Clone, Default)]
pub struct RefreshQueue {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    pending: Mutex<BTreeSet<Collection>>,
    wake: Notify,
}

impl RefreshQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn request<I>(&self, collections: I)
    where
        I: IntoIterator<Item = Collection>,
    {
        let mut pending = self.inner.pending.lock().await;
        let before = pending.len();
        pending.extend(collections);
        if pending.len() > before {
            self.inner.wake.notify_one();
        }
    }

    /// Wait for work and take everything requested so far.
    pub async fn next(&self) -> BTreeSet<Collection> {
        loop {
            {
                let mut pending = self.inner.pending.lock().await;
                if !pending.is_empty() {
                    return std::mem::take(&mut *pending);
                }
            }
            self.inner.wake.notified().await;
        }
    }

    pub async fn is_idle(&self) -> bool {
        self.inner.pending.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn requests_merge_while_pending() {
        let q = RefreshQueue::new();
        q.request([Collection::Tasks]).await;
        q.request([Collection::Children, Collection::Tasks]).await;
        q.request([Collection::PointHistory]).await;
        let batch = q.next().await;
        assert_eq!(
            batch.into_iter().collect::<Vec<_>>(),
            vec![
                Collection::Children,
                Collection::Tasks,
                Collection::PointHistory
            ]
        );
        assert!(q.is_idle().await);
    }

    #[tokio::test]
    async fn consumer_wakes_on_request() {
        let q = RefreshQueue::new();
        let consumer = {
            let q = q.clone();
            tokio::spawn(async move { q.next().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.request([Collection::Rewards]).await;
        let batch = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(batch.contains(&Collection::Rewards));
    }

    #[tokio::test]
    async fn stale_wakeup_does_not_return_empty_batch() {
        let q = RefreshQueue::new();
        q.request([Collection::Tasks]).await;
        assert_eq!(q.next().await.len(), 1);
        // The leftover wakeup permit must not produce an empty batch.
        let waited = tokio::time::timeout(Duration::from_millis(50), q.next()).await;
        assert!(waited.is_err());
    }
}
