//! In-process [`RemoteStore`] with the same rules as the server. Used by tests
//! and for running the client without a server.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chorepoints_shared::api::{
    ChildDraft, ChildRow, Collection, ConfigRow, DeductReq, MarkDoneReq, PointsChangeResp,
    RedeemResp, RedemptionRow, RewardDraft, RewardRow, RolloverReq, RolloverResp, ServerEvent,
    TaskChangeResp, TaskDraft, TaskRow,
};
use chorepoints_shared::gate::AccessGate;
use chorepoints_shared::{
    Child, ChildId, DomainError, Entity, EntryId, NewEntry, PointHistoryEntry, Redemption,
    RedemptionId, Reward, RewardId, Task, TaskId, catalog, ledger, lifecycle, mapping, now_utc,
};
use chrono::NaiveDate;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::ClientError;
use crate::remote::{FeedEvent, RemoteStore, Rows};

#[derive(Debug)]
struct State {
    pin: Option<String>,
    children: Vec<Child>,
    tasks: Vec<Task>,
    rewards: Vec<Reward>,
    redemptions: Vec<Redemption>,
    history: Vec<PointHistoryEntry>,
    next_entry: i64,
    today: NaiveDate,
}

impl State {
    fn child_mut(&mut self, id: &ChildId) -> Result<&mut Child, DomainError> {
        self.children
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| DomainError::not_found(Entity::Child, id))
    }

    fn task_index(&self, id: &TaskId) -> Result<usize, DomainError> {
        self.tasks
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| DomainError::not_found(Entity::Task, id))
    }

    fn reward(&self, id: &RewardId) -> Result<&Reward, DomainError> {
        self.rewards
            .iter()
            .find(|r| &r.id == id)
            .ok_or_else(|| DomainError::not_found(Entity::Reward, id))
    }

    fn append(&mut self, entry: NewEntry) -> PointHistoryEntry {
        self.next_entry += 1;
        let stored = entry.into_entry(EntryId(self.next_entry), now_utc());
        self.history.push(stored.clone());
        stored
    }

    /// Work on copies of the task and its child, then commit both. Keeps a
    /// refused transition from leaving anything half-applied.
    fn task_change<F>(&mut self, id: &TaskId, f: F) -> Result<TaskChangeResp, DomainError>
    where
        F: FnOnce(&mut Task, Option<&mut Child>, NaiveDate) -> Result<Option<NewEntry>, DomainError>,
    {
        let idx = self.task_index(id)?;
        let mut task = self.tasks[idx].clone();
        let child_idx = self.children.iter().position(|c| c.id == task.assigned_to);
        let mut child = child_idx.map(|i| self.children[i].clone());
        let entry = f(&mut task, child.as_mut(), self.today)?;

        self.tasks[idx] = task.clone();
        let mut resp = TaskChangeResp {
            task: mapping::task_to_row(&task),
            child: None,
            entry: None,
        };
        if let Some(entry) = entry {
            if let (Some(i), Some(c)) = (child_idx, child) {
                resp.child = Some(mapping::child_to_row(&c));
                self.children[i] = c;
            }
            resp.entry = Some(mapping::entry_to_row(&self.append(entry)));
        }
        Ok(resp)
    }
}

pub struct MemoryStore {
    state: Mutex<State>,
    events: broadcast::Sender<ServerEvent>,
    offline: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(State {
                pin: None,
                children: Vec::new(),
                tasks: Vec::new(),
                rewards: Vec::new(),
                redemptions: Vec::new(),
                history: Vec::new(),
                next_entry: 0,
                today: now_utc().date_naive(),
            }),
            events,
            offline: AtomicBool::new(false),
        }
    }

    /// The store's idea of "today", used for ledger dates and rollover.
    pub async fn set_today(&self, today: NaiveDate) {
        self.state.lock().await.today = today;
    }

    /// While offline every call fails the way an unreachable server does.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn reachable(&self) -> Result<(), ClientError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ClientError::SyncFailure("remote store is offline".into()));
        }
        Ok(())
    }

    fn notify(&self, collections: &[Collection]) {
        let _ = self.events.send(ServerEvent::Changed {
            collections: collections.to_vec(),
        });
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn fetch(&self, collection: Collection) -> Result<Rows, ClientError> {
        self.reachable()?;
        let st = self.state.lock().await;
        let rows = match collection {
            Collection::Config => Rows::Config(vec![mapping::pin_to_config(st.pin.as_deref())]),
            Collection::Children => {
                Rows::Children(st.children.iter().map(mapping::child_to_row).collect())
            }
            Collection::Tasks => Rows::Tasks(st.tasks.iter().map(mapping::task_to_row).collect()),
            Collection::Rewards => {
                Rows::Rewards(st.rewards.iter().map(mapping::reward_to_row).collect())
            }
            Collection::Redemptions => Rows::Redemptions(
                st.redemptions
                    .iter()
                    .map(mapping::redemption_to_row)
                    .collect(),
            ),
            Collection::PointHistory => {
                let mut rows: Vec<_> = st.history.iter().map(mapping::entry_to_row).collect();
                rows.reverse();
                Rows::PointHistory(rows)
            }
        };
        Ok(rows)
    }

    async fn set_pin(&self, pin: &str) -> Result<ConfigRow, ClientError> {
        self.reachable()?;
        let mut st = self.state.lock().await;
        let mut gate = AccessGate::from_stored(st.pin.as_deref());
        gate.set_pin(pin)?;
        st.pin = Some(pin.to_string());
        drop(st);
        self.notify(&[Collection::Config]);
        Ok(mapping::pin_to_config(Some(pin)))
    }

    async fn add_child(&self, draft: &ChildDraft) -> Result<ChildRow, ClientError> {
        self.reachable()?;
        let child = catalog::new_child(draft)?;
        let row = mapping::child_to_row(&child);
        self.state.lock().await.children.push(child);
        self.notify(&[Collection::Children]);
        Ok(row)
    }

    async fn update_child(&self, id: &ChildId, draft: &ChildDraft) -> Result<ChildRow, ClientError> {
        self.reachable()?;
        let mut st = self.state.lock().await;
        let child = st.child_mut(id)?;
        catalog::edit_child(child, draft)?;
        let row = mapping::child_to_row(child);
        drop(st);
        self.notify(&[Collection::Children]);
        Ok(row)
    }

    async fn delete_child(&self, id: &ChildId) -> Result<(), ClientError> {
        self.reachable()?;
        let mut st = self.state.lock().await;
        let before = st.children.len();
        st.children.retain(|c| &c.id != id);
        if st.children.len() == before {
            return Err(DomainError::not_found(Entity::Child, id).into());
        }
        drop(st);
        self.notify(&[Collection::Children]);
        Ok(())
    }

    async fn deduct(&self, id: &ChildId, req: &DeductReq) -> Result<PointsChangeResp, ClientError> {
        self.reachable()?;
        let mut st = self.state.lock().await;
        let today = st.today;
        let child = st.child_mut(id)?;
        let entry = ledger::deduct(child, req.amount, &req.reason, today)?;
        let child = mapping::child_to_row(child);
        let entry = mapping::entry_to_row(&st.append(entry));
        drop(st);
        self.notify(&[Collection::Children, Collection::PointHistory]);
        Ok(PointsChangeResp { child, entry })
    }

    async fn add_task(&self, draft: &TaskDraft) -> Result<TaskRow, ClientError> {
        self.reachable()?;
        let task = catalog::new_task(draft, now_utc())?;
        let row = mapping::task_to_row(&task);
        self.state.lock().await.tasks.push(task);
        self.notify(&[Collection::Tasks]);
        Ok(row)
    }

    async fn update_task(&self, id: &TaskId, draft: &TaskDraft) -> Result<TaskRow, ClientError> {
        self.reachable()?;
        let mut st = self.state.lock().await;
        let idx = st.task_index(id)?;
        let mut task = st.tasks[idx].clone();
        catalog::edit_task(&mut task, draft)?;
        let row = mapping::task_to_row(&task);
        st.tasks[idx] = task;
        drop(st);
        self.notify(&[Collection::Tasks]);
        Ok(row)
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), ClientError> {
        self.reachable()?;
        let mut st = self.state.lock().await;
        let idx = st.task_index(id)?;
        st.tasks.remove(idx);
        drop(st);
        self.notify(&[Collection::Tasks]);
        Ok(())
    }

    async fn mark_done(&self, id: &TaskId, req: &MarkDoneReq) -> Result<TaskChangeResp, ClientError> {
        self.reachable()?;
        let photo = req.photo.clone();
        let resp = self.state.lock().await.task_change(id, |task, _, today| {
            lifecycle::mark_done(task, photo, today)?;
            Ok(None)
        })?;
        self.notify(&[Collection::Tasks]);
        Ok(resp)
    }

    async fn approve(&self, id: &TaskId) -> Result<TaskChangeResp, ClientError> {
        self.reachable()?;
        let resp = self
            .state
            .lock()
            .await
            .task_change(id, |task, child, today| {
                lifecycle::approve(task, child, today).map(Some)
            })?;
        self.notify(&[
            Collection::Tasks,
            Collection::Children,
            Collection::PointHistory,
        ]);
        Ok(resp)
    }

    async fn reject(&self, id: &TaskId) -> Result<TaskChangeResp, ClientError> {
        self.reachable()?;
        let resp = self.state.lock().await.task_change(id, |task, _, _| {
            lifecycle::reject(task)?;
            Ok(None)
        })?;
        self.notify(&[Collection::Tasks]);
        Ok(resp)
    }

    async fn execute_penalty(&self, id: &TaskId) -> Result<TaskChangeResp, ClientError> {
        self.reachable()?;
        let resp = self
            .state
            .lock()
            .await
            .task_change(id, |task, child, today| {
                ledger::execute_penalty(task, child, today).map(Some)
            })?;
        self.notify(&[Collection::Children, Collection::PointHistory]);
        Ok(resp)
    }

    async fn rollover(&self, req: &RolloverReq) -> Result<RolloverResp, ClientError> {
        self.reachable()?;
        let mut st = self.state.lock().await;
        let reference_date = req.reference_date.unwrap_or(st.today);
        let changed = lifecycle::rollover(st.tasks.iter_mut(), reference_date);
        drop(st);
        if !changed.is_empty() {
            self.notify(&[Collection::Tasks]);
        }
        Ok(RolloverResp {
            reference_date,
            changed: changed.into_iter().map(|id| id.0).collect(),
        })
    }

    async fn add_reward(&self, draft: &RewardDraft) -> Result<RewardRow, ClientError> {
        self.reachable()?;
        let reward = catalog::new_reward(draft)?;
        let row = mapping::reward_to_row(&reward);
        self.state.lock().await.rewards.push(reward);
        self.notify(&[Collection::Rewards]);
        Ok(row)
    }

    async fn update_reward(
        &self,
        id: &RewardId,
        draft: &RewardDraft,
    ) -> Result<RewardRow, ClientError> {
        self.reachable()?;
        let mut st = self.state.lock().await;
        let mut reward = st.reward(id)?.clone();
        catalog::edit_reward(&mut reward, draft)?;
        let row = mapping::reward_to_row(&reward);
        if let Some(slot) = st.rewards.iter_mut().find(|r| &r.id == id) {
            *slot = reward;
        }
        drop(st);
        self.notify(&[Collection::Rewards]);
        Ok(row)
    }

    async fn delete_reward(&self, id: &RewardId) -> Result<(), ClientError> {
        self.reachable()?;
        let mut st = self.state.lock().await;
        st.reward(id)?;
        st.rewards.retain(|r| &r.id != id);
        drop(st);
        self.notify(&[Collection::Rewards]);
        Ok(())
    }

    async fn redeem(
        &self,
        reward_id: &RewardId,
        child_id: &ChildId,
    ) -> Result<RedeemResp, ClientError> {
        self.reachable()?;
        let mut st = self.state.lock().await;
        let reward = st.reward(reward_id)?.clone();
        let today = st.today;
        let child = st.child_mut(child_id)?;
        let (redemption, entry) = ledger::redeem(&reward, child, now_utc(), today)?;
        let child = mapping::child_to_row(child);
        let entry = mapping::entry_to_row(&st.append(entry));
        let row = mapping::redemption_to_row(&redemption);
        st.redemptions.push(redemption);
        drop(st);
        self.notify(&[
            Collection::Children,
            Collection::Redemptions,
            Collection::PointHistory,
        ]);
        Ok(RedeemResp {
            redemption: row,
            child,
            entry,
        })
    }

    async fn fulfill(&self, id: &RedemptionId) -> Result<RedemptionRow, ClientError> {
        self.reachable()?;
        let mut st = self.state.lock().await;
        let redemption = st
            .redemptions
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| DomainError::not_found(Entity::Redemption, id))?;
        ledger::fulfill(redemption);
        let row = mapping::redemption_to_row(redemption);
        drop(st);
        self.notify(&[Collection::Redemptions]);
        Ok(row)
    }

    fn feed(&self, cancel: CancellationToken) -> mpsc::Receiver<FeedEvent> {
        let (tx, rx) = mpsc::channel(32);
        let mut events = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                let ev = tokio::select! {
                    _ = cancel.cancelled() => break,
                    ev = events.recv() => ev,
                };
                let feed = match ev {
                    Ok(ServerEvent::Changed { collections }) => FeedEvent::Changed(collections),
                    Err(broadcast::error::RecvError::Lagged(_)) => FeedEvent::Resync,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if tx.send(feed).await.is_err() {
                    break;
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorepoints_shared::Repeat;

    fn draft(title: &str, points: i64, to: &str) -> TaskDraft {
        TaskDraft {
            title: title.into(),
            description: None,
            points,
            assigned_to: to.into(),
            due_date: None,
            repeat: Repeat::None,
            require_photo: false,
            is_penalty: false,
        }
    }

    #[tokio::test]
    async fn refused_approval_changes_nothing() {
        let store = MemoryStore::new();
        let alice = store
            .add_child(&ChildDraft {
                name: "Alice".into(),
                avatar: "🧒".into(),
            })
            .await
            .unwrap();
        let task = store.add_task(&draft("Dishes", 3, &alice.id)).await.unwrap();
        let err = store.approve(&TaskId(task.id.clone())).await.unwrap_err();
        assert_eq!(err.kind(), chorepoints_shared::ErrorKind::InvalidTransition);

        let Rows::PointHistory(h) = store.fetch(Collection::PointHistory).await.unwrap() else {
            panic!("wrong rows");
        };
        assert!(h.is_empty());
    }

    #[tokio::test]
    async fn approving_for_removed_child_is_not_found() {
        let store = MemoryStore::new();
        let alice = store
            .add_child(&ChildDraft {
                name: "Alice".into(),
                avatar: "🧒".into(),
            })
            .await
            .unwrap();
        let task = store.add_task(&draft("Dishes", 3, &alice.id)).await.unwrap();
        let tid = TaskId(task.id);
        store.mark_done(&tid, &MarkDoneReq::default()).await.unwrap();
        store.delete_child(&ChildId(alice.id)).await.unwrap();

        let err = store.approve(&tid).await.unwrap_err();
        assert_eq!(err.kind(), chorepoints_shared::ErrorKind::NotFound);
        let Rows::Tasks(tasks) = store.fetch(Collection::Tasks).await.unwrap() else {
            panic!("wrong rows");
        };
        assert_eq!(tasks[0].status, "done");
    }

    #[tokio::test]
    async fn offline_store_reports_sync_failure() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let err = store.fetch(Collection::Children).await.unwrap_err();
        assert!(err.is_retryable());
        store.set_offline(false);
        assert!(store.fetch(Collection::Children).await.is_ok());
    }

    #[tokio::test]
    async fn feed_reports_changes() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        let mut feed = store.feed(cancel.clone());
        store.set_pin("1234").await.unwrap();
        assert_eq!(
            feed.recv().await,
            Some(FeedEvent::Changed(vec![Collection::Config]))
        );
        cancel.cancel();
    }
}
