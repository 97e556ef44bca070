use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new_v4() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok($name(s.to_string()))
            }
        }
    };
}

string_id!(ChildId);
string_id!(TaskId);
string_id!(RewardId);
string_id!(RedemptionId);

/// Ledger entries are numbered by the store in insertion order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub i64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    pub id: ChildId,
    pub name: String,
    pub avatar: String,
    pub points: i64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Done,
    Approved,
    Rejected,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Done => "done",
            TaskStatus::Approved => "approved",
            TaskStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    #[default]
    None,
    Daily,
}

impl Repeat {
    pub fn as_str(self) -> &'static str {
        match self {
            Repeat::None => "none",
            Repeat::Daily => "daily",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    /// Award on approval, or deduction magnitude for penalty tasks.
    pub points: i64,
    pub assigned_to: ChildId,
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub repeat: Repeat,
    pub require_photo: bool,
    pub photo: Option<String>,
    pub is_penalty: bool,
    pub last_submitted_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn is_daily(&self) -> bool {
        self.repeat == Repeat::Daily
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub id: RewardId,
    pub title: String,
    pub description: Option<String>,
    pub cost: i64,
    pub icon: String,
    pub available: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    Pending,
    Fulfilled,
}

impl RedemptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RedemptionStatus::Pending => "pending",
            RedemptionStatus::Fulfilled => "fulfilled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub id: RedemptionId,
    pub reward_id: RewardId,
    pub child_id: ChildId,
    pub redeemed_at: DateTime<Utc>,
    pub status: RedemptionStatus,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Task,
    Deduct,
    Penalty,
    Reward,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Task => "task",
            EntryType::Deduct => "deduct",
            EntryType::Penalty => "penalty",
            EntryType::Reward => "reward",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointHistoryEntry {
    pub id: EntryId,
    pub child_id: ChildId,
    pub date: NaiveDate,
    pub points: i64,
    pub reason: String,
    #[serde(rename = "type")]
    pub kind: EntryType,
    pub created_at: DateTime<Utc>,
}

/// A ledger line that has been computed but not yet stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub child_id: ChildId,
    pub date: NaiveDate,
    pub points: i64,
    pub reason: String,
    pub kind: EntryType,
}

impl NewEntry {
    pub fn into_entry(self, id: EntryId, created_at: DateTime<Utc>) -> PointHistoryEntry {
        PointHistoryEntry {
            id,
            child_id: self.child_id,
            date: self.date,
            points: self.points,
            reason: self.reason,
            kind: self.kind,
            created_at,
        }
    }
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
