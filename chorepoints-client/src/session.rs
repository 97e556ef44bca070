use std::sync::Arc;
use std::time::Duration;

use chorepoints_shared::api::Collection;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ClientError;
use crate::cache::SnapshotCache;
use crate::remote::FeedEvent;
use crate::repository::Repository;

const DAY_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const MAX_RETRY_SECS: u64 = 30;

/// Keeps a [`Repository`] in step with its remote: full load and rollover at
/// start, then feed-driven refreshes through the repository's refresh queue
/// and a rollover check when the calendar day changes.
pub struct SyncSession {
    repo: Arc<Repository>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl SyncSession {
    /// Load the repository and start the background workers. When the remote
    /// is unreachable and `cache` holds an earlier snapshot, the session starts
    /// from that and keeps retrying in the background.
    pub async fn start(
        repo: Arc<Repository>,
        cache: Option<SnapshotCache>,
    ) -> Result<Self, ClientError> {
        let cancel = CancellationToken::new();
        // Subscribe before loading. A feed that connects later sends a resync,
        // so writes committed in between are still picked up.
        let feed = repo.remote().feed(cancel.child_token());

        match repo.load().await {
            Ok(()) => {
                info!("initial load complete");
                save_cache(&repo, cache.as_ref()).await;
            }
            Err(e) if e.is_retryable() => {
                let cached = cache.as_ref().map(|c| c.load()).transpose()?.flatten();
                let Some((saved_at, snapshot)) = cached else {
                    cancel.cancel();
                    return Err(e);
                };
                warn!(error = %e, %saved_at, "remote unreachable; starting from cached snapshot");
                repo.restore(snapshot).await;
                repo.refresh_queue().request(Collection::ALL).await;
            }
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        }

        let handles = vec![
            tokio::spawn(refresh_worker(repo.clone(), cache, cancel.clone())),
            tokio::spawn(feed_consumer(repo.clone(), feed, cancel.clone())),
            tokio::spawn(day_watch(repo.clone(), cancel.clone())),
        ];
        Ok(Self {
            repo,
            cancel,
            handles,
        })
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if tokio::time::timeout(Duration::from_secs(3), handle)
                .await
                .is_err()
            {
                warn!("sync worker did not stop in time");
            }
        }
        info!("sync session stopped");
    }
}

async fn save_cache(repo: &Repository, cache: Option<&SnapshotCache>) {
    let Some(cache) = cache else {
        return;
    };
    if let Err(e) = cache.save(&repo.snapshot().await) {
        warn!(path = %cache.path().display(), error = %e, "failed to save snapshot cache");
    }
}

/// Sole consumer of the refresh queue. A failed refresh is queued again
/// after a growing pause; the snapshot stays as it was.
async fn refresh_worker(
    repo: Arc<Repository>,
    cache: Option<SnapshotCache>,
    cancel: CancellationToken,
) {
    let queue = repo.refresh_queue().clone();
    let mut retry_secs = 1u64;
    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => break,
            b = queue.next() => b,
        };
        let collections: Vec<Collection> = batch.iter().copied().collect();
        match repo.refresh(&collections).await {
            Ok(()) => {
                debug!(?collections, "refreshed");
                retry_secs = 1;
                save_cache(&repo, cache.as_ref()).await;
            }
            Err(e) => {
                warn!(error = %e, ?collections, retry_secs, "refresh failed; will retry");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(retry_secs)) => {}
                }
                retry_secs = (retry_secs * 2).min(MAX_RETRY_SECS);
                queue.request(batch).await;
            }
        }
    }
}

async fn feed_consumer(
    repo: Arc<Repository>,
    mut feed: tokio::sync::mpsc::Receiver<FeedEvent>,
    cancel: CancellationToken,
) {
    loop {
        let ev = tokio::select! {
            _ = cancel.cancelled() => break,
            ev = feed.recv() => ev,
        };
        match ev {
            Some(FeedEvent::Changed(collections)) => {
                repo.refresh_queue().request(collections).await;
            }
            Some(FeedEvent::Resync) => {
                info!("change feed (re)connected; reloading everything");
                repo.refresh_queue().request(Collection::ALL).await;
            }
            None => {
                warn!("change feed closed");
                break;
            }
        }
    }
}

/// On a new calendar day re-check the tasks; the refresh rolls over any
/// daily submission left from the day before.
async fn day_watch(repo: Arc<Repository>, cancel: CancellationToken) {
    let mut last = repo.today();
    let mut ticker = tokio::time::interval(DAY_CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let today = repo.today();
        if today != last {
            info!(%today, "day changed");
            last = today;
            repo.refresh_queue().request([Collection::Tasks]).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Clock;
    use crate::memory::MemoryStore;
    use crate::remote::{RemoteStore, Rows};
    use chorepoints_shared::api::ChildDraft;
    use chorepoints_shared::mapping;
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 3).unwrap()
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..250 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn remote_changes_reach_the_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let repo = Arc::new(Repository::new(store.clone(), Clock::Fixed(today())));
        let session = SyncSession::start(repo.clone(), None).await.unwrap();
        assert!(repo.children().await.is_empty());

        // Another device adds a child directly on the remote.
        store
            .add_child(&ChildDraft {
                name: "Bob".into(),
                avatar: "👦".into(),
            })
            .await
            .unwrap();
        eventually(|| {
            let repo = repo.clone();
            async move { repo.children().await.len() == 1 }
        })
        .await;
        session.shutdown().await;
    }

    #[tokio::test]
    async fn offline_start_uses_cache_then_catches_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .add_child(&ChildDraft {
                name: "Alice".into(),
                avatar: "🧒".into(),
            })
            .await
            .unwrap();
        let cache = SnapshotCache::new(dir.path().join("snap.json"), "mem");

        let first = Arc::new(Repository::new(store.clone(), Clock::Fixed(today())));
        SyncSession::start(first, Some(cache.clone()))
            .await
            .unwrap()
            .shutdown()
            .await;

        store.set_offline(true);
        let repo = Arc::new(Repository::new(store.clone(), Clock::Fixed(today())));
        let session = SyncSession::start(repo.clone(), Some(cache)).await.unwrap();
        assert_eq!(repo.children().await.len(), 1);

        store.set_offline(false);
        store
            .add_child(&ChildDraft {
                name: "Bob".into(),
                avatar: "👦".into(),
            })
            .await
            .unwrap();
        eventually(|| {
            let repo = repo.clone();
            async move { repo.children().await.len() == 2 }
        })
        .await;
        session.shutdown().await;
    }

    #[tokio::test]
    async fn cached_start_keeps_the_pin_locked() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.set_pin("1234").await.unwrap();
        let cache = SnapshotCache::new(dir.path().join("snap.json"), "mem");
        let first = Arc::new(Repository::new(store.clone(), Clock::Fixed(today())));
        SyncSession::start(first, Some(cache.clone()))
            .await
            .unwrap()
            .shutdown()
            .await;

        store.set_offline(true);
        let repo = Arc::new(Repository::new(store.clone(), Clock::Fixed(today())));
        let session = SyncSession::start(repo.clone(), Some(cache)).await.unwrap();
        assert!(!repo.is_setup_mode().await);

        store.set_offline(false);
        assert!(matches!(
            repo.set_pin(None, "0000").await,
            Err(ClientError::Locked)
        ));
        let Rows::Config(rows) = store.fetch(Collection::Config).await.unwrap() else {
            panic!("expected config rows");
        };
        assert_eq!(mapping::pin_from_config(&rows).as_deref(), Some("1234"));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn offline_start_without_cache_fails() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let repo = Arc::new(Repository::new(store, Clock::Fixed(today())));
        let err = SyncSession::start(repo, None).await.err().unwrap();
        assert!(err.is_retryable());
    }
}
