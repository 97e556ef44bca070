//! Local projection of the remote store.
//!
//! The [`Repository`] keeps the last good [`Snapshot`] of every collection,
//! answers reads from it and routes writes to the [`RemoteStore`]. A write
//! is applied locally only after the remote accepted it, from the rows the
//! remote sent back, and the affected collections are then queued for a
//! re-fetch. A failed fetch never replaces what is already held.

use std::collections::BTreeMap;
use std::sync::Arc;

use chorepoints_shared::api::{
    ChildDraft, Collection, DeductReq, MarkDoneReq, RewardDraft, RolloverReq, TaskDraft,
};
use chorepoints_shared::gate::{AccessGate, ParentConsole};
use chorepoints_shared::ledger::{self, BalanceSheet, Discrepancy};
use chorepoints_shared::mapping::{self, MappingError};
use chorepoints_shared::{
    Child, ChildId, DomainError, Entity, PointHistoryEntry, Redemption, RedemptionId,
    RedemptionStatus, Reward, RewardId, Task, TaskId, lifecycle,
};
use chrono::NaiveDate;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::ClientError;
use crate::config::Clock;
use crate::refresh::RefreshQueue;
use crate::remote::{RemoteStore, Rows};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Never written to disk.
    #[serde(skip)]
    pub pin: Option<String>,
    /// Whether the household has a PIN. Survives the cache so a restored
    /// snapshot does not look like setup mode.
    #[serde(default)]
    pub pin_set: bool,
    pub children: Vec<Child>,
    pub tasks: Vec<Task>,
    pub rewards: Vec<Reward>,
    pub redemptions: Vec<Redemption>,
    pub history: Vec<PointHistoryEntry>,
}

impl Snapshot {
    fn replace(&mut self, rows: Rows) -> Result<(), MappingError> {
        match rows {
            Rows::Config(rows) => {
                self.pin = mapping::pin_from_config(&rows);
                self.pin_set = self.pin.is_some();
            }
            Rows::Children(rows) => {
                self.children = rows.into_iter().map(mapping::child_from_row).collect()
            }
            Rows::Tasks(rows) => self.tasks = mapping::map_rows(rows, mapping::task_from_row)?,
            Rows::Rewards(rows) => {
                self.rewards = rows.into_iter().map(mapping::reward_from_row).collect()
            }
            Rows::Redemptions(rows) => {
                self.redemptions = mapping::map_rows(rows, mapping::redemption_from_row)?
            }
            Rows::PointHistory(rows) => {
                self.history = mapping::map_rows(rows, mapping::entry_from_row)?
            }
        }
        Ok(())
    }

    fn child(&self, id: &ChildId) -> Option<&Child> {
        self.children.iter().find(|c| &c.id == id)
    }

    fn upsert_child(&mut self, child: Child) {
        match self.children.iter_mut().find(|c| c.id == child.id) {
            Some(slot) => *slot = child,
            None => self.children.push(child),
        }
    }

    fn upsert_task(&mut self, task: Task) {
        match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => *slot = task,
            None => self.tasks.push(task),
        }
    }

    fn upsert_reward(&mut self, reward: Reward) {
        match self.rewards.iter_mut().find(|r| r.id == reward.id) {
            Some(slot) => *slot = reward,
            None => self.rewards.push(reward),
        }
    }

    fn upsert_redemption(&mut self, redemption: Redemption) {
        match self.redemptions.iter_mut().find(|r| r.id == redemption.id) {
            Some(slot) => *slot = redemption,
            None => self.redemptions.push(redemption),
        }
    }

    fn push_entry(&mut self, entry: PointHistoryEntry) {
        if !self.history.iter().any(|e| e.id == entry.id) {
            self.history.push(entry);
        }
    }
}

/// A submitted task waiting for review, with the child it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub task: Task,
    /// `None` when the child has been removed since.
    pub child: Option<Child>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopItem {
    pub reward: Reward,
    pub affordable: bool,
}

pub struct Repository {
    remote: Arc<dyn RemoteStore>,
    snapshot: RwLock<Snapshot>,
    clock: Clock,
    refresh: RefreshQueue,
}

impl Repository {
    pub fn new(remote: Arc<dyn RemoteStore>, clock: Clock) -> Self {
        Self {
            remote,
            snapshot: RwLock::new(Snapshot::default()),
            clock,
            refresh: RefreshQueue::new(),
        }
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Refresh requests raised by writes. Drained by the sync session.
    pub fn refresh_queue(&self) -> &RefreshQueue {
        &self.refresh
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    /// Start from a previously saved snapshot, e.g. while the remote is down.
    pub async fn restore(&self, snapshot: Snapshot) {
        *self.snapshot.write().await = snapshot;
    }

    /// Fetch every collection and replace the snapshot in one go, then expire
    /// stale daily submissions.
    pub async fn load(&self) -> Result<(), ClientError> {
        self.fetch_and_replace(&Collection::ALL).await?;
        self.rollover().await?;
        Ok(())
    }

    /// Re-fetch the given collections. Rolls over when the fresh tasks show a
    /// daily submission from an earlier day.
    pub async fn refresh(&self, collections: &[Collection]) -> Result<(), ClientError> {
        if collections.is_empty() {
            return Ok(());
        }
        self.fetch_and_replace(collections).await?;
        if collections.contains(&Collection::Tasks) && self.needs_rollover().await {
            self.rollover().await?;
        }
        Ok(())
    }

    async fn fetch_and_replace(&self, collections: &[Collection]) -> Result<(), ClientError> {
        let fetched = try_join_all(collections.iter().map(|c| self.remote.fetch(*c))).await?;
        let mut snap = self.snapshot.write().await;
        let mut next = snap.clone();
        for rows in fetched {
            next.replace(rows)?;
        }
        *snap = next;
        debug!(?collections, "snapshot refreshed");
        Ok(())
    }

    pub async fn needs_rollover(&self) -> bool {
        let today = self.today();
        self.snapshot
            .read()
            .await
            .tasks
            .iter()
            .any(|t| lifecycle::needs_rollover(t, today))
    }

    /// Ask the remote to expire daily submissions not made today. Returns the
    /// ids that changed.
    pub async fn rollover(&self) -> Result<Vec<TaskId>, ClientError> {
        let req = RolloverReq {
            reference_date: Some(self.today()),
        };
        let resp = self.remote.rollover(&req).await?;
        let changed: Vec<TaskId> = resp.changed.into_iter().map(TaskId).collect();
        if !changed.is_empty() {
            info!(reference_date = %resp.reference_date, count = changed.len(), "daily tasks rolled over");
            self.fetch_and_replace(&[Collection::Tasks]).await?;
        }
        Ok(changed)
    }

    // ---- reads ----

    pub async fn children(&self) -> Vec<Child> {
        self.snapshot.read().await.children.clone()
    }

    pub async fn child(&self, id: &ChildId) -> Result<Child, ClientError> {
        self.snapshot
            .read()
            .await
            .child(id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(Entity::Child, id).into())
    }

    /// A child's regular tasks, oldest first.
    pub async fn tasks_for(&self, child_id: &ChildId) -> Vec<Task> {
        let snap = self.snapshot.read().await;
        let mut out: Vec<Task> = snap
            .tasks
            .iter()
            .filter(|t| &t.assigned_to == child_id && !t.is_penalty)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    pub async fn penalties(&self) -> Vec<Task> {
        let snap = self.snapshot.read().await;
        snap.tasks.iter().filter(|t| t.is_penalty).cloned().collect()
    }

    pub async fn approval_queue(&self) -> Vec<QueueItem> {
        let snap = self.snapshot.read().await;
        lifecycle::approval_queue(&snap.tasks)
            .into_iter()
            .map(|t| QueueItem {
                task: t.clone(),
                child: snap.child(&t.assigned_to).cloned(),
            })
            .collect()
    }

    /// Available rewards and whether the child can afford each right now.
    pub async fn shop(&self, child_id: &ChildId) -> Result<Vec<ShopItem>, ClientError> {
        let snap = self.snapshot.read().await;
        let child = snap
            .child(child_id)
            .ok_or_else(|| DomainError::not_found(Entity::Child, child_id))?;
        Ok(snap
            .rewards
            .iter()
            .filter(|r| r.available)
            .map(|r| ShopItem {
                reward: r.clone(),
                affordable: ledger::redemption_blocker(r, child).is_none(),
            })
            .collect())
    }

    pub async fn pending_redemptions(&self) -> Vec<Redemption> {
        let snap = self.snapshot.read().await;
        snap.redemptions
            .iter()
            .filter(|r| r.status == RedemptionStatus::Pending)
            .cloned()
            .collect()
    }

    /// The child's ledger, newest first, with the running balance per line.
    pub async fn balance_sheet(&self, child_id: &ChildId) -> Result<BalanceSheet, ClientError> {
        let snap = self.snapshot.read().await;
        let child = snap
            .child(child_id)
            .ok_or_else(|| DomainError::not_found(Entity::Child, child_id))?;
        let history: Vec<PointHistoryEntry> = snap
            .history
            .iter()
            .filter(|e| &e.child_id == child_id)
            .cloned()
            .collect();
        Ok(ledger::compute_balance(&history, child.points))
    }

    pub async fn daily_totals(&self, child_id: &ChildId) -> BTreeMap<NaiveDate, i64> {
        ledger::daily_totals(&self.snapshot.read().await.history, child_id)
    }

    pub async fn audit(&self) -> Vec<Discrepancy> {
        let snap = self.snapshot.read().await;
        ledger::audit(&snap.children, &snap.history)
    }

    // ---- access gate ----

    /// True only while no PIN is known to exist, locally or in a restored
    /// snapshot.
    pub async fn is_setup_mode(&self) -> bool {
        let snap = self.snapshot.read().await;
        snap.pin.is_none() && !snap.pin_set
    }

    async fn gate(&self) -> AccessGate {
        AccessGate::from_stored(self.snapshot.read().await.pin.as_deref())
    }

    pub async fn verify_pin(&self, input: &str) -> bool {
        self.gate().await.verify_pin(input)
    }

    pub async fn unlock(&self, input: &str) -> Option<ParentConsole> {
        self.gate().await.unlock(input)
    }

    /// Set or change the PIN. Needs an unlocked console unless no PIN exists.
    pub async fn set_pin(
        &self,
        console: Option<&ParentConsole>,
        pin: &str,
    ) -> Result<ParentConsole, ClientError> {
        if console.is_none() && !self.is_setup_mode().await {
            return Err(ClientError::Locked);
        }
        let unlocked = self.gate().await.set_pin(pin)?;
        let row = self.remote.set_pin(pin).await?;
        let mut snap = self.snapshot.write().await;
        snap.pin_set = row.value.is_some();
        snap.pin = row.value;
        drop(snap);
        self.after_write([Collection::Config]).await;
        Ok(unlocked)
    }

    async fn after_write<const N: usize>(&self, collections: [Collection; N]) {
        self.refresh.request(collections).await;
    }

    // ---- child operations ----

    pub async fn mark_done(
        &self,
        task_id: &TaskId,
        photo: Option<String>,
    ) -> Result<Task, ClientError> {
        let resp = self.remote.mark_done(task_id, &MarkDoneReq { photo }).await?;
        let task = mapping::task_from_row(resp.task)?;
        self.snapshot.write().await.upsert_task(task.clone());
        self.after_write([Collection::Tasks]).await;
        Ok(task)
    }

    /// Spend points. A refusal, such as too few points, changes nothing.
    pub async fn redeem(
        &self,
        reward_id: &RewardId,
        child_id: &ChildId,
    ) -> Result<Redemption, ClientError> {
        let resp = self.remote.redeem(reward_id, child_id).await?;
        let redemption = mapping::redemption_from_row(resp.redemption)?;
        let entry = mapping::entry_from_row(resp.entry)?;
        {
            let mut snap = self.snapshot.write().await;
            snap.upsert_child(mapping::child_from_row(resp.child));
            snap.upsert_redemption(redemption.clone());
            snap.push_entry(entry);
        }
        self.after_write([
            Collection::Children,
            Collection::Redemptions,
            Collection::PointHistory,
        ])
        .await;
        Ok(redemption)
    }

    // ---- parent operations ----

    pub async fn add_child(
        &self,
        _console: &ParentConsole,
        draft: &ChildDraft,
    ) -> Result<Child, ClientError> {
        let child = mapping::child_from_row(self.remote.add_child(draft).await?);
        self.snapshot.write().await.upsert_child(child.clone());
        self.after_write([Collection::Children]).await;
        Ok(child)
    }

    pub async fn update_child(
        &self,
        _console: &ParentConsole,
        id: &ChildId,
        draft: &ChildDraft,
    ) -> Result<Child, ClientError> {
        let child = mapping::child_from_row(self.remote.update_child(id, draft).await?);
        self.snapshot.write().await.upsert_child(child.clone());
        self.after_write([Collection::Children]).await;
        Ok(child)
    }

    /// Remove a child. Their tasks, redemptions and history stay.
    pub async fn remove_child(
        &self,
        _console: &ParentConsole,
        id: &ChildId,
    ) -> Result<(), ClientError> {
        self.remote.delete_child(id).await?;
        self.snapshot.write().await.children.retain(|c| &c.id != id);
        self.after_write([Collection::Children]).await;
        Ok(())
    }

    /// Take points away. Returns the entry actually recorded, which may be
    /// smaller than `amount` when the balance runs out.
    pub async fn deduct(
        &self,
        _console: &ParentConsole,
        child_id: &ChildId,
        amount: i64,
        reason: &str,
    ) -> Result<PointHistoryEntry, ClientError> {
        let req = DeductReq {
            amount,
            reason: reason.to_string(),
        };
        let resp = self.remote.deduct(child_id, &req).await?;
        let entry = mapping::entry_from_row(resp.entry)?;
        {
            let mut snap = self.snapshot.write().await;
            snap.upsert_child(mapping::child_from_row(resp.child));
            snap.push_entry(entry.clone());
        }
        self.after_write([Collection::Children, Collection::PointHistory])
            .await;
        Ok(entry)
    }

    pub async fn add_task(
        &self,
        _console: &ParentConsole,
        draft: &TaskDraft,
    ) -> Result<Task, ClientError> {
        let task = mapping::task_from_row(self.remote.add_task(draft).await?)?;
        self.snapshot.write().await.upsert_task(task.clone());
        self.after_write([Collection::Tasks]).await;
        Ok(task)
    }

    pub async fn update_task(
        &self,
        _console: &ParentConsole,
        id: &TaskId,
        draft: &TaskDraft,
    ) -> Result<Task, ClientError> {
        let task = mapping::task_from_row(self.remote.update_task(id, draft).await?)?;
        self.snapshot.write().await.upsert_task(task.clone());
        self.after_write([Collection::Tasks]).await;
        Ok(task)
    }

    pub async fn delete_task(&self, _console: &ParentConsole, id: &TaskId) -> Result<(), ClientError> {
        self.remote.delete_task(id).await?;
        self.snapshot.write().await.tasks.retain(|t| &t.id != id);
        self.after_write([Collection::Tasks]).await;
        Ok(())
    }

    pub async fn approve(&self, _console: &ParentConsole, id: &TaskId) -> Result<Task, ClientError> {
        let resp = self.remote.approve(id).await?;
        let task = self.apply_task_change(resp).await?;
        self.after_write([
            Collection::Tasks,
            Collection::Children,
            Collection::PointHistory,
        ])
        .await;
        Ok(task)
    }

    pub async fn reject(&self, _console: &ParentConsole, id: &TaskId) -> Result<Task, ClientError> {
        let resp = self.remote.reject(id).await?;
        let task = self.apply_task_change(resp).await?;
        self.after_write([Collection::Tasks]).await;
        Ok(task)
    }

    /// Apply a penalty task to its child. Returns the recorded entry.
    pub async fn execute_penalty(
        &self,
        _console: &ParentConsole,
        id: &TaskId,
    ) -> Result<PointHistoryEntry, ClientError> {
        let resp = self.remote.execute_penalty(id).await?;
        let entry = resp
            .entry
            .clone()
            .map(mapping::entry_from_row)
            .transpose()?
            .ok_or_else(|| ClientError::SyncFailure("penalty response without entry".into()))?;
        self.apply_task_change(resp).await?;
        self.after_write([Collection::Children, Collection::PointHistory])
            .await;
        Ok(entry)
    }

    async fn apply_task_change(
        &self,
        resp: chorepoints_shared::api::TaskChangeResp,
    ) -> Result<Task, ClientError> {
        let task = mapping::task_from_row(resp.task)?;
        let entry = resp.entry.map(mapping::entry_from_row).transpose()?;
        let mut snap = self.snapshot.write().await;
        snap.upsert_task(task.clone());
        if let Some(child) = resp.child {
            snap.upsert_child(mapping::child_from_row(child));
        }
        if let Some(entry) = entry {
            snap.push_entry(entry);
        }
        Ok(task)
    }

    pub async fn add_reward(
        &self,
        _console: &ParentConsole,
        draft: &RewardDraft,
    ) -> Result<Reward, ClientError> {
        let reward = mapping::reward_from_row(self.remote.add_reward(draft).await?);
        self.snapshot.write().await.upsert_reward(reward.clone());
        self.after_write([Collection::Rewards]).await;
        Ok(reward)
    }

    pub async fn update_reward(
        &self,
        _console: &ParentConsole,
        id: &RewardId,
        draft: &RewardDraft,
    ) -> Result<Reward, ClientError> {
        let reward = mapping::reward_from_row(self.remote.update_reward(id, draft).await?);
        self.snapshot.write().await.upsert_reward(reward.clone());
        self.after_write([Collection::Rewards]).await;
        Ok(reward)
    }

    /// Show or hide a reward in the shop, keeping its other fields.
    pub async fn set_reward_available(
        &self,
        console: &ParentConsole,
        id: &RewardId,
        available: bool,
    ) -> Result<Reward, ClientError> {
        let current = self
            .snapshot
            .read()
            .await
            .rewards
            .iter()
            .find(|r| &r.id == id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(Entity::Reward, id))?;
        let draft = RewardDraft {
            title: current.title,
            description: current.description,
            cost: current.cost,
            icon: current.icon,
            available: Some(available),
        };
        self.update_reward(console, id, &draft).await
    }

    pub async fn delete_reward(
        &self,
        _console: &ParentConsole,
        id: &RewardId,
    ) -> Result<(), ClientError> {
        self.remote.delete_reward(id).await?;
        self.snapshot.write().await.rewards.retain(|r| &r.id != id);
        self.after_write([Collection::Rewards]).await;
        Ok(())
    }

    pub async fn fulfill(
        &self,
        _console: &ParentConsole,
        id: &RedemptionId,
    ) -> Result<Redemption, ClientError> {
        let redemption = mapping::redemption_from_row(self.remote.fulfill(id).await?)?;
        self.snapshot
            .write()
            .await
            .upsert_redemption(redemption.clone());
        self.after_write([Collection::Redemptions]).await;
        Ok(redemption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chorepoints_shared::{EntryType, ErrorKind, Repeat, TaskStatus};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    async fn household(today: NaiveDate) -> (Arc<MemoryStore>, Repository, ParentConsole) {
        let store = Arc::new(MemoryStore::new());
        store.set_today(today).await;
        let repo = Repository::new(store.clone(), Clock::Fixed(today));
        repo.load().await.unwrap();
        assert!(repo.is_setup_mode().await);
        let console = repo.set_pin(None, "1234").await.unwrap();
        (store, repo, console)
    }

    fn chore(title: &str, points: i64, child: &Child, repeat: Repeat) -> TaskDraft {
        TaskDraft {
            title: title.into(),
            description: None,
            points,
            assigned_to: child.id.to_string(),
            due_date: None,
            repeat,
            require_photo: false,
            is_penalty: false,
        }
    }

    async fn alice(repo: &Repository, console: &ParentConsole) -> Child {
        repo.add_child(
            console,
            &ChildDraft {
                name: "Alice".into(),
                avatar: "🧒".into(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn household_scenario() {
        let (_store, repo, console) = household(day(3)).await;
        let a = alice(&repo, &console).await;
        assert_eq!(a.points, 0);

        let clean = repo
            .add_task(&console, &chore("Clean room", 10, &a, Repeat::None))
            .await
            .unwrap();
        repo.mark_done(&clean.id, None).await.unwrap();
        assert_eq!(repo.approval_queue().await.len(), 1);
        let approved = repo.approve(&console, &clean.id).await.unwrap();
        assert_eq!(approved.status, TaskStatus::Approved);
        assert_eq!(repo.child(&a.id).await.unwrap().points, 10);

        let movie = repo
            .add_reward(
                &console,
                &RewardDraft {
                    title: "Movie".into(),
                    description: None,
                    cost: 8,
                    icon: "🎬".into(),
                    available: None,
                },
            )
            .await
            .unwrap();
        let shop = repo.shop(&a.id).await.unwrap();
        assert!(shop[0].affordable);
        let redemption = repo.redeem(&movie.id, &a.id).await.unwrap();
        assert_eq!(redemption.status, RedemptionStatus::Pending);
        assert_eq!(repo.child(&a.id).await.unwrap().points, 2);
        assert!(!repo.shop(&a.id).await.unwrap()[0].affordable);

        let entry = repo.deduct(&console, &a.id, 5, "Talking back").await.unwrap();
        assert_eq!(entry.points, -2);
        assert_eq!(entry.kind, EntryType::Deduct);

        let sheet = repo.balance_sheet(&a.id).await.unwrap();
        assert_eq!(sheet.current, 0);
        let deltas: Vec<i64> = sheet.lines.iter().map(|l| l.entry.points).collect();
        assert_eq!(deltas, vec![-2, -8, 10]);
        assert!(repo.audit().await.is_empty());

        // A full reload agrees with what was applied locally.
        let local = repo.snapshot().await;
        repo.load().await.unwrap();
        let reloaded = repo.snapshot().await;
        assert_eq!(reloaded.children, local.children);
        assert_eq!(reloaded.history.len(), local.history.len());

        repo.fulfill(&console, &redemption.id).await.unwrap();
        assert!(repo.pending_redemptions().await.is_empty());
    }

    #[tokio::test]
    async fn declined_redemption_changes_nothing() {
        let (_store, repo, console) = household(day(3)).await;
        let a = alice(&repo, &console).await;
        let bike = repo
            .add_reward(
                &console,
                &RewardDraft {
                    title: "Bike".into(),
                    description: None,
                    cost: 500,
                    icon: "🚲".into(),
                    available: None,
                },
            )
            .await
            .unwrap();
        let before = repo.snapshot().await;
        let err = repo.redeem(&bike.id, &a.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(repo.snapshot().await, before);
    }

    #[tokio::test]
    async fn set_pin_requires_console_once_set() {
        let (_store, repo, console) = household(day(3)).await;
        assert!(matches!(
            repo.set_pin(None, "9999").await,
            Err(ClientError::Locked)
        ));
        assert!(repo.unlock("9999").await.is_none());
        repo.set_pin(Some(&console), "4321").await.unwrap();
        assert!(repo.unlock("1234").await.is_none());
        assert!(repo.unlock("4321").await.is_some());
        assert!(matches!(
            repo.set_pin(Some(&console), "12").await,
            Err(ClientError::Domain(_))
        ));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_snapshot() {
        let (store, repo, console) = household(day(3)).await;
        alice(&repo, &console).await;
        let before = repo.snapshot().await;
        store.set_offline(true);
        let err = repo.refresh(&Collection::ALL).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(repo.snapshot().await, before);
    }

    #[tokio::test]
    async fn stale_daily_submission_rolls_over_on_refresh() {
        let store = Arc::new(MemoryStore::new());
        store.set_today(day(3)).await;
        let yesterday = Repository::new(store.clone(), Clock::Fixed(day(3)));
        yesterday.load().await.unwrap();
        let console = yesterday.set_pin(None, "1234").await.unwrap();
        let a = alice(&yesterday, &console).await;
        let feed = yesterday
            .add_task(&console, &chore("Feed cat", 2, &a, Repeat::Daily))
            .await
            .unwrap();
        let done = yesterday.mark_done(&feed.id, None).await.unwrap();
        assert_eq!(done.last_submitted_date, Some(day(3)));

        let today = Repository::new(store.clone(), Clock::Fixed(day(4)));
        today.load().await.unwrap();
        let tasks = today.tasks_for(&a.id).await;
        assert_eq!(tasks[0].status, TaskStatus::Pending);
        assert_eq!(tasks[0].last_submitted_date, None);
        assert!(today.approval_queue().await.is_empty());

        // Idempotent.
        assert!(today.rollover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn penalty_and_queue_with_removed_child() {
        let (_store, repo, console) = household(day(3)).await;
        let a = alice(&repo, &console).await;
        let mut hit = chore("Hitting", 4, &a, Repeat::None);
        hit.is_penalty = true;
        let hit = repo.add_task(&console, &hit).await.unwrap();
        let entry = repo.execute_penalty(&console, &hit.id).await.unwrap();
        assert_eq!(entry.points, 0);
        assert_eq!(entry.kind, EntryType::Penalty);
        assert_eq!(repo.penalties().await.len(), 1);
        assert!(repo.tasks_for(&a.id).await.is_empty());

        let dishes = repo
            .add_task(&console, &chore("Dishes", 3, &a, Repeat::None))
            .await
            .unwrap();
        repo.mark_done(&dishes.id, None).await.unwrap();
        repo.remove_child(&console, &a.id).await.unwrap();
        let queue = repo.approval_queue().await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].child, None);
        assert_eq!(
            repo.approve(&console, &dishes.id).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn writes_queue_a_refresh() {
        let (_store, repo, console) = household(day(3)).await;
        // Drain what set_pin queued.
        repo.refresh_queue().next().await;
        alice(&repo, &console).await;
        let batch = repo.refresh_queue().next().await;
        assert!(batch.contains(&Collection::Children));
    }

    #[tokio::test]
    async fn hidden_rewards_leave_the_shop() {
        let (_store, repo, console) = household(day(3)).await;
        let a = alice(&repo, &console).await;
        let r = repo
            .add_reward(
                &console,
                &RewardDraft {
                    title: "Sweets".into(),
                    description: None,
                    cost: 1,
                    icon: "🍬".into(),
                    available: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(repo.shop(&a.id).await.unwrap().len(), 1);
        let hidden = repo.set_reward_available(&console, &r.id, false).await.unwrap();
        assert!(!hidden.available);
        assert!(repo.shop(&a.id).await.unwrap().is_empty());
        assert_eq!(
            repo.redeem(&r.id, &a.id).await.unwrap_err().kind(),
            ErrorKind::PreconditionFailed
        );
    }
}
