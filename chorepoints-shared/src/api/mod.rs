use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::Repeat;
use crate::error::ErrorKind;

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_PREFIX: &str = "/api";

/// Remote collections. Names match the stored tables.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Config,
    Children,
    Tasks,
    Rewards,
    Redemptions,
    PointHistory,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Config,
        Collection::Children,
        Collection::Tasks,
        Collection::Rewards,
        Collection::Redemptions,
        Collection::PointHistory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Config => "config",
            Collection::Children => "children",
            Collection::Tasks => "tasks",
            Collection::Rewards => "rewards",
            Collection::Redemptions => "redemptions",
            Collection::PointHistory => "point_history",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown collection: {s}"))
    }
}

// Rows: the remote shape of each collection, snake_case with textual enums,
// ISO dates and RFC3339 timestamps. Convert with `crate::mapping`.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRow {
    pub key: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRow {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub cost: i64,
    pub icon: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRow {
    pub id: String,
    pub reward_id: String,
    pub child_id: String,
    pub redeemed_at: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointHistoryRow {
    pub id: i64,
    pub child_id: String,
    pub date: String,
    pub points: i64,
    pub reason: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: String,
}

// Requests

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPinReq {
    pub pin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildDraft {
    pub name: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub points: i64,
    pub assigned_to: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub repeat: Repeat,
    #[serde(default)]
    pub require_photo: bool,
    #[serde(default)]
    pub is_penalty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cost: i64,
    pub icon: String,
    #[serde(default)]
    pub available: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkDoneReq {
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemReq {
    pub child_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductReq {
    pub amount: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolloverReq {
    #[serde(default)]
    pub reference_date: Option<NaiveDate>,
}

// Responses

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloverResp {
    pub reference_date: NaiveDate,
    pub changed: Vec<String>,
}

/// Result of a task transition. `child` and `entry` are present when points
/// moved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskChangeResp {
    pub task: TaskRow,
    pub child: Option<ChildRow>,
    pub entry: Option<PointHistoryRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsChangeResp {
    pub child: ChildRow,
    pub entry: PointHistoryRow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemResp {
    pub redemption: RedemptionRow,
    pub child: ChildRow,
    pub entry: PointHistoryRow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: Option<ErrorKind>,
}

/// Pushed over `/api/events` whenever a write commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Changed { collections: Vec<Collection> },
}
