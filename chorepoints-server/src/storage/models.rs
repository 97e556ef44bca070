use crate::storage::schema::{children, config, point_history, redemptions, rewards, tasks};
use chorepoints_shared::api::{
    ChildRow, ConfigRow, PointHistoryRow, RedemptionRow, RewardRow, TaskRow,
};
use diesel::prelude::*;

// Each table row converts losslessly to and from the wire row in
// `chorepoints_shared::api`; domain conversion happens in the shared mapping.

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = config)]
#[diesel(primary_key(key))]
#[diesel(treat_none_as_null = true)]
pub struct ConfigEntry {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = children)]
pub struct Child {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub points: i64,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = tasks)]
#[diesel(treat_none_as_null = true)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub points: i64,
    pub assigned_to: String,
    pub due_date: Option<String>,
    pub status: String,
    pub repeat: String,
    pub last_submitted_date: Option<String>,
    pub require_photo: bool,
    pub photo: Option<String>,
    pub is_penalty: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = rewards)]
#[diesel(treat_none_as_null = true)]
pub struct Reward {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub cost: i64,
    pub icon: String,
    pub available: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = redemptions)]
pub struct Redemption {
    pub id: String,
    pub reward_id: String,
    pub child_id: String,
    pub redeemed_at: String,
    pub status: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = point_history)]
pub struct PointEntry {
    pub id: i64,
    pub child_id: String,
    pub date: String,
    pub points: i64,
    pub reason: String,
    pub kind: String,
    pub created_at: String,
}

/// Ledger rows are append-only; the id comes from SQLite.
#[derive(Insertable)]
#[diesel(table_name = point_history)]
pub struct NewPointEntry<'a> {
    pub child_id: &'a str,
    pub date: &'a str,
    pub points: i64,
    pub reason: &'a str,
    pub kind: &'a str,
    pub created_at: &'a str,
}

impl From<ConfigEntry> for ConfigRow {
    fn from(v: ConfigEntry) -> Self {
        ConfigRow {
            key: v.key,
            value: v.value,
        }
    }
}

impl From<Child> for ChildRow {
    fn from(v: Child) -> Self {
        ChildRow {
            id: v.id,
            name: v.name,
            avatar: v.avatar,
            points: v.points,
        }
    }
}

impl From<ChildRow> for Child {
    fn from(v: ChildRow) -> Self {
        Child {
            id: v.id,
            name: v.name,
            avatar: v.avatar,
            points: v.points,
        }
    }
}

impl From<Task> for TaskRow {
    fn from(v: Task) -> Self {
        TaskRow {
            id: v.id,
            title: v.title,
            description: v.description,
            points: v.points,
            assigned_to: v.assigned_to,
            due_date: v.due_date,
            status: v.status,
            repeat: v.repeat,
            last_submitted_date: v.last_submitted_date,
            require_photo: v.require_photo,
            photo: v.photo,
            is_penalty: v.is_penalty,
            created_at: v.created_at,
        }
    }
}

impl From<TaskRow> for Task {
    fn from(v: TaskRow) -> Self {
        Task {
            id: v.id,
            title: v.title,
            description: v.description,
            points: v.points,
            assigned_to: v.assigned_to,
            due_date: v.due_date,
            status: v.status,
            repeat: v.repeat,
            last_submitted_date: v.last_submitted_date,
            require_photo: v.require_photo,
            photo: v.photo,
            is_penalty: v.is_penalty,
            created_at: v.created_at,
        }
    }
}

impl From<Reward> for RewardRow {
    fn from(v: Reward) -> Self {
        RewardRow {
            id: v.id,
            title: v.title,
            description: v.description,
            cost: v.cost,
            icon: v.icon,
            available: v.available,
        }
    }
}

impl From<RewardRow> for Reward {
    fn from(v: RewardRow) -> Self {
        Reward {
            id: v.id,
            title: v.title,
            description: v.description,
            cost: v.cost,
            icon: v.icon,
            available: v.available,
        }
    }
}

impl From<Redemption> for RedemptionRow {
    fn from(v: Redemption) -> Self {
        RedemptionRow {
            id: v.id,
            reward_id: v.reward_id,
            child_id: v.child_id,
            redeemed_at: v.redeemed_at,
            status: v.status,
        }
    }
}

impl From<RedemptionRow> for Redemption {
    fn from(v: RedemptionRow) -> Self {
        Redemption {
            id: v.id,
            reward_id: v.reward_id,
            child_id: v.child_id,
            redeemed_at: v.redeemed_at,
            status: v.status,
        }
    }
}

impl From<PointEntry> for PointHistoryRow {
    fn from(v: PointEntry) -> Self {
        PointHistoryRow {
            id: v.id,
            child_id: v.child_id,
            date: v.date,
            points: v.points,
            reason: v.reason,
            kind: v.kind,
            created_at: v.created_at,
        }
    }
}
