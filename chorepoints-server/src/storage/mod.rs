pub mod models;
pub mod schema;

use chorepoints_shared::api::{
    ChildDraft, ChildRow, ConfigRow, PointHistoryRow, PointsChangeResp, RedeemResp,
    RedemptionRow, RewardDraft, RewardRow, TaskChangeResp, TaskDraft, TaskRow,
};
use chorepoints_shared::gate::AccessGate;
use chorepoints_shared::ledger::{self, Discrepancy};
use chorepoints_shared::mapping::{self, MappingError};
use chorepoints_shared::{
    Child as DomainChild, DomainError, Entity, EntryId, NewEntry, PointHistoryEntry,
    Redemption as DomainRedemption, Repeat, Reward as DomainReward, Task as DomainTask, TaskId,
    TaskStatus, catalog, lifecycle,
};
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{debug, info, trace};

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// A stored row could not be read back into the domain model.
    #[error("corrupt row: {0}")]
    Mapping(#[from] MappingError),

    /// The operation was refused by the domain rules; nothing was written.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Everything in the database at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub children: Vec<DomainChild>,
    pub history: Vec<PointHistoryEntry>,
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            f(&mut conn)
        })
        .await?
    }

    /// Run `f` inside an IMMEDIATE transaction so concurrent writers queue up
    /// instead of interleaving their read-modify-write cycles.
    async fn write<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
    {
        self.blocking(move |conn| conn.immediate_transaction(f)).await
    }

    /// First-run seeding. Children and rewards are only inserted into empty
    /// tables and an existing PIN is never replaced.
    pub async fn seed_from_config(
        &self,
        cfg_children: &[ChildDraft],
        cfg_rewards: &[RewardDraft],
        cfg_pin: Option<&str>,
    ) -> Result<(), StorageError> {
        let children_owned = cfg_children.to_owned();
        let rewards_owned = cfg_rewards.to_owned();
        let pin_owned = cfg_pin.map(str::to_string);
        self.write(move |conn| {
            use schema::{children, config, rewards};

            let have_children: i64 = children::table.count().get_result(conn)?;
            if have_children == 0 {
                for draft in &children_owned {
                    let child = catalog::new_child(draft)?;
                    let row: models::Child = mapping::child_to_row(&child).into();
                    diesel::insert_into(children::table)
                        .values(&row)
                        .execute(conn)?;
                    info!(child_id = %child.id, name = %child.name, "seeded child");
                }
            }

            let have_rewards: i64 = rewards::table.count().get_result(conn)?;
            if have_rewards == 0 {
                for draft in &rewards_owned {
                    let reward = catalog::new_reward(draft)?;
                    let row: models::Reward = mapping::reward_to_row(&reward).into();
                    diesel::insert_into(rewards::table)
                        .values(&row)
                        .execute(conn)?;
                    info!(reward_id = %reward.id, title = %reward.title, "seeded reward");
                }
            }

            if let Some(pin) = pin_owned {
                let stored = load_pin(conn)?;
                if stored.is_none() {
                    let mut gate = AccessGate::default();
                    gate.set_pin(&pin)?;
                    diesel::insert_into(config::table)
                        .values(&models::ConfigEntry {
                            key: mapping::PIN_KEY.to_string(),
                            value: Some(pin),
                        })
                        .execute(conn)?;
                    info!("seeded parent PIN");
                }
            }
            Ok(())
        })
        .await
    }

    // ---- reads ----

    pub async fn list_config(&self) -> Result<Vec<ConfigRow>, StorageError> {
        self.blocking(|conn| {
            use schema::config::dsl::*;
            Ok(config
                .order(key.asc())
                .load::<models::ConfigEntry>(conn)?
                .into_iter()
                .map(ConfigRow::from)
                .collect())
        })
        .await
    }

    pub async fn list_children(&self) -> Result<Vec<ChildRow>, StorageError> {
        self.blocking(|conn| {
            use schema::children::dsl::*;
            Ok(children
                .order((name.asc(), id.asc()))
                .load::<models::Child>(conn)?
                .into_iter()
                .map(ChildRow::from)
                .collect())
        })
        .await
    }

    pub async fn list_tasks(&self) -> Result<Vec<TaskRow>, StorageError> {
        self.blocking(|conn| {
            use schema::tasks::dsl::*;
            Ok(tasks
                .order((created_at.asc(), id.asc()))
                .load::<models::Task>(conn)?
                .into_iter()
                .map(TaskRow::from)
                .collect())
        })
        .await
    }

    pub async fn list_rewards(&self) -> Result<Vec<RewardRow>, StorageError> {
        self.blocking(|conn| {
            use schema::rewards::dsl::*;
            Ok(rewards
                .order((cost.asc(), title.asc()))
                .load::<models::Reward>(conn)?
                .into_iter()
                .map(RewardRow::from)
                .collect())
        })
        .await
    }

    pub async fn list_redemptions(&self) -> Result<Vec<RedemptionRow>, StorageError> {
        self.blocking(|conn| {
            use schema::redemptions::dsl::*;
            Ok(redemptions
                .order((redeemed_at.desc(), id.asc()))
                .load::<models::Redemption>(conn)?
                .into_iter()
                .map(RedemptionRow::from)
                .collect())
        })
        .await
    }

    /// Newest first.
    pub async fn list_point_history(&self) -> Result<Vec<PointHistoryRow>, StorageError> {
        self.blocking(|conn| {
            use schema::point_history::dsl::*;
            Ok(point_history
                .order((created_at.desc(), id.desc()))
                .load::<models::PointEntry>(conn)?
                .into_iter()
                .map(PointHistoryRow::from)
                .collect())
        })
        .await
    }

    /// Children and the full ledger, read in one transaction.
    pub async fn snapshot(&self) -> Result<Snapshot, StorageError> {
        self.blocking(|conn| conn.transaction(|conn| {
            let children = schema::children::table
                .load::<models::Child>(conn)?
                .into_iter()
                .map(|c| mapping::child_from_row(c.into()))
                .collect();
            let history = mapping::map_rows(
                schema::point_history::table
                    .load::<models::PointEntry>(conn)?
                    .into_iter()
                    .map(PointHistoryRow::from)
                    .collect(),
                mapping::entry_from_row,
            )?;
            Ok(Snapshot { children, history })
        }))
        .await
    }

    /// Children whose cached balance disagrees with the ledger.
    pub async fn audit(&self) -> Result<Vec<Discrepancy>, StorageError> {
        let snap = self.snapshot().await?;
        Ok(ledger::audit(&snap.children, &snap.history))
    }

    // ---- access gate ----

    pub async fn set_pin(&self, raw: &str) -> Result<ConfigRow, StorageError> {
        let raw = raw.to_string();
        self.write(move |conn| {
            use schema::config;
            let mut gate = AccessGate::from_stored(load_pin(conn)?.as_deref());
            gate.set_pin(&raw)?;
            let row = models::ConfigEntry {
                key: mapping::PIN_KEY.to_string(),
                value: Some(raw),
            };
            diesel::insert_into(config::table)
                .values(&row)
                .on_conflict(config::key)
                .do_update()
                .set(&row)
                .execute(conn)?;
            Ok(ConfigRow::from(row))
        })
        .await
    }

    // ---- children ----

    pub async fn add_child(&self, draft: &ChildDraft) -> Result<ChildRow, StorageError> {
        let child = catalog::new_child(draft)?;
        self.write(move |conn| {
            let row: models::Child = mapping::child_to_row(&child).into();
            diesel::insert_into(schema::children::table)
                .values(&row)
                .execute(conn)?;
            Ok(ChildRow::from(row))
        })
        .await
    }

    pub async fn update_child(
        &self,
        child_id: &str,
        draft: &ChildDraft,
    ) -> Result<ChildRow, StorageError> {
        let cid = child_id.to_string();
        let draft = draft.clone();
        self.write(move |conn| {
            let mut child =
                load_child(conn, &cid)?.ok_or_else(|| DomainError::not_found(Entity::Child, &cid))?;
            catalog::edit_child(&mut child, &draft)?;
            save_child(conn, &child)?;
            Ok(mapping::child_to_row(&child))
        })
        .await
    }

    /// Tasks, redemptions and ledger rows that mention the child are kept.
    pub async fn delete_child(&self, child_id: &str) -> Result<(), StorageError> {
        let cid = child_id.to_string();
        self.write(move |conn| {
            use schema::children::dsl::*;
            let deleted = diesel::delete(children.filter(id.eq(&cid))).execute(conn)?;
            if deleted == 0 {
                return Err(DomainError::not_found(Entity::Child, &cid).into());
            }
            Ok(())
        })
        .await
    }

    pub async fn deduct(
        &self,
        child_id: &str,
        amount: i64,
        reason: &str,
        today: NaiveDate,
    ) -> Result<PointsChangeResp, StorageError> {
        let cid = child_id.to_string();
        let reason = reason.to_string();
        self.write(move |conn| {
            let mut child =
                load_child(conn, &cid)?.ok_or_else(|| DomainError::not_found(Entity::Child, &cid))?;
            let entry = ledger::deduct(&mut child, amount, &reason, today)?;
            save_child(conn, &child)?;
            let entry = append_entry(conn, entry, Utc::now())?;
            debug!(child_id = %cid, delta = entry.points, balance = child.points, "deducted points");
            Ok(PointsChangeResp {
                child: mapping::child_to_row(&child),
                entry: mapping::entry_to_row(&entry),
            })
        })
        .await
    }

    // ---- tasks ----

    pub async fn add_task(
        &self,
        draft: &TaskDraft,
        now: DateTime<Utc>,
    ) -> Result<TaskRow, StorageError> {
        let task = catalog::new_task(draft, now)?;
        self.write(move |conn| {
            let row: models::Task = mapping::task_to_row(&task).into();
            diesel::insert_into(schema::tasks::table)
                .values(&row)
                .execute(conn)?;
            Ok(TaskRow::from(row))
        })
        .await
    }

    pub async fn update_task(&self, task_id: &str, draft: &TaskDraft) -> Result<TaskRow, StorageError> {
        let tid = task_id.to_string();
        let draft = draft.clone();
        self.write(move |conn| {
            let mut task = load_task(conn, &tid)?;
            catalog::edit_task(&mut task, &draft)?;
            save_task(conn, &task)?;
            Ok(mapping::task_to_row(&task))
        })
        .await
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), StorageError> {
        let tid = task_id.to_string();
        self.write(move |conn| {
            use schema::tasks::dsl::*;
            let deleted = diesel::delete(tasks.filter(id.eq(&tid))).execute(conn)?;
            if deleted == 0 {
                return Err(DomainError::not_found(Entity::Task, &tid).into());
            }
            Ok(())
        })
        .await
    }

    pub async fn mark_done(
        &self,
        task_id: &str,
        photo: Option<String>,
        today: NaiveDate,
    ) -> Result<TaskChangeResp, StorageError> {
        let tid = task_id.to_string();
        self.write(move |conn| {
            let mut task = load_task(conn, &tid)?;
            lifecycle::mark_done(&mut task, photo, today)?;
            save_task(conn, &task)?;
            debug!(task_id = %tid, "task submitted");
            Ok(TaskChangeResp {
                task: mapping::task_to_row(&task),
                child: None,
                entry: None,
            })
        })
        .await
    }

    /// Approve a submission: status change, child credit and ledger row
    /// commit together or not at all.
    pub async fn approve(&self, task_id: &str, today: NaiveDate) -> Result<TaskChangeResp, StorageError> {
        let tid = task_id.to_string();
        self.write(move |conn| {
            let mut task = load_task(conn, &tid)?;
            let mut child = load_child(conn, task.assigned_to.as_str())?;
            let entry = lifecycle::approve(&mut task, child.as_mut(), today)?;
            save_task(conn, &task)?;
            let child = child.ok_or_else(|| DomainError::not_found(Entity::Child, &task.assigned_to))?;
            save_child(conn, &child)?;
            let entry = append_entry(conn, entry, Utc::now())?;
            info!(task_id = %tid, child_id = %child.id, points = entry.points, "task approved");
            Ok(TaskChangeResp {
                task: mapping::task_to_row(&task),
                child: Some(mapping::child_to_row(&child)),
                entry: Some(mapping::entry_to_row(&entry)),
            })
        })
        .await
    }

    pub async fn reject(&self, task_id: &str) -> Result<TaskChangeResp, StorageError> {
        let tid = task_id.to_string();
        self.write(move |conn| {
            let mut task = load_task(conn, &tid)?;
            lifecycle::reject(&mut task)?;
            save_task(conn, &task)?;
            info!(task_id = %tid, "task rejected");
            Ok(TaskChangeResp {
                task: mapping::task_to_row(&task),
                child: None,
                entry: None,
            })
        })
        .await
    }

    pub async fn execute_penalty(
        &self,
        task_id: &str,
        today: NaiveDate,
    ) -> Result<TaskChangeResp, StorageError> {
        let tid = task_id.to_string();
        self.write(move |conn| {
            let task = load_task(conn, &tid)?;
            let mut child = load_child(conn, task.assigned_to.as_str())?;
            let entry = ledger::execute_penalty(&task, child.as_mut(), today)?;
            let child = child.ok_or_else(|| DomainError::not_found(Entity::Child, &task.assigned_to))?;
            save_child(conn, &child)?;
            let entry = append_entry(conn, entry, Utc::now())?;
            info!(task_id = %tid, child_id = %child.id, delta = entry.points, "penalty executed");
            Ok(TaskChangeResp {
                task: mapping::task_to_row(&task),
                child: Some(mapping::child_to_row(&child)),
                entry: Some(mapping::entry_to_row(&entry)),
            })
        })
        .await
    }

    /// Expire daily submissions not made on `reference_date`. Returns the ids
    /// that changed; an immediate second call returns nothing.
    pub async fn rollover(&self, reference_date: NaiveDate) -> Result<Vec<TaskId>, StorageError> {
        self.write(move |conn| {
            use schema::tasks::dsl::*;
            let rows = tasks
                .filter(repeat.eq(Repeat::Daily.as_str()))
                .filter(status.eq(TaskStatus::Done.as_str()))
                .load::<models::Task>(conn)?;
            let mut daily = mapping::map_rows(
                rows.into_iter().map(TaskRow::from).collect(),
                mapping::task_from_row,
            )?;
            let changed = lifecycle::rollover(daily.iter_mut(), reference_date);
            for task in daily.iter().filter(|t| changed.contains(&t.id)) {
                save_task(conn, task)?;
            }
            if !changed.is_empty() {
                info!(%reference_date, count = changed.len(), "daily tasks rolled over");
            }
            Ok(changed)
        })
        .await
    }

    // ---- rewards ----

    pub async fn add_reward(&self, draft: &RewardDraft) -> Result<RewardRow, StorageError> {
        let reward = catalog::new_reward(draft)?;
        self.write(move |conn| {
            let row: models::Reward = mapping::reward_to_row(&reward).into();
            diesel::insert_into(schema::rewards::table)
                .values(&row)
                .execute(conn)?;
            Ok(RewardRow::from(row))
        })
        .await
    }

    pub async fn update_reward(
        &self,
        reward_id: &str,
        draft: &RewardDraft,
    ) -> Result<RewardRow, StorageError> {
        let rid = reward_id.to_string();
        let draft = draft.clone();
        self.write(move |conn| {
            let mut reward = load_reward(conn, &rid)?;
            catalog::edit_reward(&mut reward, &draft)?;
            let row: models::Reward = mapping::reward_to_row(&reward).into();
            diesel::update(schema::rewards::table.find(&row.id))
                .set(&row)
                .execute(conn)?;
            Ok(RewardRow::from(row))
        })
        .await
    }

    pub async fn delete_reward(&self, reward_id: &str) -> Result<(), StorageError> {
        let rid = reward_id.to_string();
        self.write(move |conn| {
            use schema::rewards::dsl::*;
            let deleted = diesel::delete(rewards.filter(id.eq(&rid))).execute(conn)?;
            if deleted == 0 {
                return Err(DomainError::not_found(Entity::Reward, &rid).into());
            }
            Ok(())
        })
        .await
    }

    /// Spend points on a reward. Declined redemptions come back as
    /// `StorageError::Domain` with nothing written.
    pub async fn redeem(
        &self,
        reward_id: &str,
        child_id: &str,
        today: NaiveDate,
    ) -> Result<RedeemResp, StorageError> {
        let rid = reward_id.to_string();
        let cid = child_id.to_string();
        self.write(move |conn| {
            let reward = load_reward(conn, &rid)?;
            let mut child =
                load_child(conn, &cid)?.ok_or_else(|| DomainError::not_found(Entity::Child, &cid))?;
            let now = Utc::now();
            let (redemption, entry) = ledger::redeem(&reward, &mut child, now, today)?;
            save_child(conn, &child)?;
            let row: models::Redemption = mapping::redemption_to_row(&redemption).into();
            diesel::insert_into(schema::redemptions::table)
                .values(&row)
                .execute(conn)?;
            let entry = append_entry(conn, entry, now)?;
            info!(reward_id = %rid, child_id = %cid, cost = reward.cost, "reward redeemed");
            Ok(RedeemResp {
                redemption: RedemptionRow::from(row),
                child: mapping::child_to_row(&child),
                entry: mapping::entry_to_row(&entry),
            })
        })
        .await
    }

    pub async fn fulfill(&self, redemption_id: &str) -> Result<RedemptionRow, StorageError> {
        let rid = redemption_id.to_string();
        self.write(move |conn| {
            let mut redemption = load_redemption(conn, &rid)?;
            ledger::fulfill(&mut redemption);
            let row: models::Redemption = mapping::redemption_to_row(&redemption).into();
            diesel::update(schema::redemptions::table.find(&row.id))
                .set(&row)
                .execute(conn)?;
            Ok(RedemptionRow::from(row))
        })
        .await
    }
}

fn load_pin(conn: &mut SqliteConnection) -> Result<Option<String>, StorageError> {
    use schema::config::dsl::*;
    let row = config
        .filter(key.eq(mapping::PIN_KEY))
        .first::<models::ConfigEntry>(conn)
        .optional()?;
    Ok(row.and_then(|r| r.value))
}

fn load_child(conn: &mut SqliteConnection, child_id: &str) -> Result<Option<DomainChild>, StorageError> {
    let row = schema::children::table
        .find(child_id)
        .first::<models::Child>(conn)
        .optional()?;
    Ok(row.map(|r| mapping::child_from_row(r.into())))
}

fn save_child(conn: &mut SqliteConnection, child: &DomainChild) -> Result<(), StorageError> {
    let row: models::Child = mapping::child_to_row(child).into();
    diesel::update(schema::children::table.find(&row.id))
        .set(&row)
        .execute(conn)?;
    Ok(())
}

fn load_task(conn: &mut SqliteConnection, task_id: &str) -> Result<DomainTask, StorageError> {
    let row = schema::tasks::table
        .find(task_id)
        .first::<models::Task>(conn)
        .optional()?
        .ok_or_else(|| DomainError::not_found(Entity::Task, task_id))?;
    Ok(mapping::task_from_row(row.into())?)
}

fn save_task(conn: &mut SqliteConnection, task: &DomainTask) -> Result<(), StorageError> {
    let row: models::Task = mapping::task_to_row(task).into();
    trace!(task_id = %row.id, status = %row.status, "saving task");
    diesel::update(schema::tasks::table.find(&row.id))
        .set(&row)
        .execute(conn)?;
    Ok(())
}

fn load_reward(conn: &mut SqliteConnection, reward_id: &str) -> Result<DomainReward, StorageError> {
    let row = schema::rewards::table
        .find(reward_id)
        .first::<models::Reward>(conn)
        .optional()?
        .ok_or_else(|| DomainError::not_found(Entity::Reward, reward_id))?;
    Ok(mapping::reward_from_row(row.into()))
}

fn load_redemption(
    conn: &mut SqliteConnection,
    redemption_id: &str,
) -> Result<DomainRedemption, StorageError> {
    let row = schema::redemptions::table
        .find(redemption_id)
        .first::<models::Redemption>(conn)
        .optional()?
        .ok_or_else(|| DomainError::not_found(Entity::Redemption, redemption_id))?;
    Ok(mapping::redemption_from_row(row.into())?)
}

/// Append a ledger row and return it with the id SQLite assigned.
fn append_entry(
    conn: &mut SqliteConnection,
    entry: NewEntry,
    now: DateTime<Utc>,
) -> Result<PointHistoryEntry, StorageError> {
    use schema::point_history;
    let date = mapping::format_date(entry.date);
    let created_at = mapping::format_timestamp(now);
    let new_row = models::NewPointEntry {
        child_id: entry.child_id.as_str(),
        date: &date,
        points: entry.points,
        reason: &entry.reason,
        kind: entry.kind.as_str(),
        created_at: &created_at,
    };
    let id: i64 = diesel::insert_into(point_history::table)
        .values(&new_row)
        .returning(point_history::id)
        .get_result(conn)?;
    Ok(entry.into_entry(EntryId(id), now))
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorepoints_shared::error::Precondition;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    async fn store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        let store = Store::connect_sqlite(path.to_str().unwrap()).await.unwrap();
        (dir, store)
    }

    fn task_draft(child: &str, points: i64) -> TaskDraft {
        TaskDraft {
            title: "Dishes".into(),
            description: None,
            points,
            assigned_to: child.into(),
            due_date: None,
            repeat: Repeat::None,
            require_photo: false,
            is_penalty: false,
        }
    }

    #[tokio::test]
    async fn approve_credits_and_records_entry() {
        let (_dir, store) = store().await;
        let child = store
            .add_child(&ChildDraft {
                name: "Alice".into(),
                avatar: "a".into(),
            })
            .await
            .unwrap();
        let task = store
            .add_task(&task_draft(&child.id, 5), Utc::now())
            .await
            .unwrap();
        store.mark_done(&task.id, None, day(3)).await.unwrap();
        let resp = store.approve(&task.id, day(3)).await.unwrap();
        assert_eq!(resp.task.status, "approved");
        assert_eq!(resp.child.unwrap().points, 5);
        let entry = resp.entry.unwrap();
        assert_eq!((entry.points, entry.kind.as_str()), (5, "task"));
        assert!(store.audit().await.unwrap().is_empty());

        let err = store.approve(&task.id, day(3)).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Domain(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(store.list_point_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn declined_redeem_writes_nothing() {
        let (_dir, store) = store().await;
        let child = store
            .add_child(&ChildDraft {
                name: "Bob".into(),
                avatar: "b".into(),
            })
            .await
            .unwrap();
        let reward = store
            .add_reward(&RewardDraft {
                title: "Movie".into(),
                description: None,
                cost: 10,
                icon: "m".into(),
                available: None,
            })
            .await
            .unwrap();
        let err = store.redeem(&reward.id, &child.id, day(3)).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Domain(DomainError::PreconditionFailed(
                Precondition::InsufficientPoints { balance: 0, cost: 10 }
            ))
        ));
        assert!(store.list_redemptions().await.unwrap().is_empty());
        assert!(store.list_point_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deduct_floors_at_zero() {
        let (_dir, store) = store().await;
        let child = store
            .add_child(&ChildDraft {
                name: "Cy".into(),
                avatar: "c".into(),
            })
            .await
            .unwrap();
        let task = store
            .add_task(&task_draft(&child.id, 2), Utc::now())
            .await
            .unwrap();
        store.mark_done(&task.id, None, day(3)).await.unwrap();
        store.approve(&task.id, day(3)).await.unwrap();
        let resp = store.deduct(&child.id, 5, "rude", day(3)).await.unwrap();
        assert_eq!(resp.child.points, 0);
        assert_eq!(resp.entry.points, -2);
        assert!(store.audit().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rollover_only_touches_stale_daily_submissions() {
        let (_dir, store) = store().await;
        let child = store
            .add_child(&ChildDraft {
                name: "Dee".into(),
                avatar: "d".into(),
            })
            .await
            .unwrap();
        let mut draft = task_draft(&child.id, 1);
        draft.repeat = Repeat::Daily;
        let daily = store.add_task(&draft, Utc::now()).await.unwrap();
        let once = store
            .add_task(&task_draft(&child.id, 1), Utc::now())
            .await
            .unwrap();
        store.mark_done(&daily.id, None, day(2)).await.unwrap();
        store.mark_done(&once.id, None, day(2)).await.unwrap();

        assert!(store.rollover(day(2)).await.unwrap().is_empty());
        let changed = store.rollover(day(3)).await.unwrap();
        assert_eq!(changed, vec![TaskId::from(daily.id.as_str())]);
        assert!(store.rollover(day(3)).await.unwrap().is_empty());

        let tasks = store.list_tasks().await.unwrap();
        let status_of = |id: &str| {
            tasks
                .iter()
                .find(|t| t.id == id)
                .map(|t| t.status.clone())
                .unwrap()
        };
        assert_eq!(status_of(&daily.id), "pending");
        assert_eq!(status_of(&once.id), "done");
    }

    #[tokio::test]
    async fn deleting_a_child_keeps_its_tasks() {
        let (_dir, store) = store().await;
        let child = store
            .add_child(&ChildDraft {
                name: "Eve".into(),
                avatar: "e".into(),
            })
            .await
            .unwrap();
        store
            .add_task(&task_draft(&child.id, 1), Utc::now())
            .await
            .unwrap();
        store.delete_child(&child.id).await.unwrap();
        assert!(store.list_children().await.unwrap().is_empty());
        assert_eq!(store.list_tasks().await.unwrap().len(), 1);
        assert!(matches!(
            store.delete_child(&child.id).await.unwrap_err(),
            StorageError::Domain(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn seeding_is_first_run_only() {
        let (_dir, store) = store().await;
        let kids = vec![ChildDraft {
            name: "Alice".into(),
            avatar: "a".into(),
        }];
        store.seed_from_config(&kids, &[], Some("1234")).await.unwrap();
        store.seed_from_config(&kids, &[], Some("9999")).await.unwrap();
        assert_eq!(store.list_children().await.unwrap().len(), 1);
        let pin = mapping::pin_from_config(&store.list_config().await.unwrap());
        assert_eq!(pin.as_deref(), Some("1234"));
    }
}
