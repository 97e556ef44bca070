use async_trait::async_trait;
use chorepoints_shared::api::{
    ChildDraft, ChildRow, Collection, ConfigRow, DeductReq, MarkDoneReq, PointHistoryRow,
    PointsChangeResp, RedeemResp, RedemptionRow, RewardDraft, RewardRow, RolloverReq,
    RolloverResp, TaskChangeResp, TaskDraft, TaskRow,
};
use chorepoints_shared::{ChildId, RedemptionId, RewardId, TaskId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ClientError;

/// One fetched collection, still in its remote shape.
#[derive(Debug, Clone)]
pub enum Rows {
    Config(Vec<ConfigRow>),
    Children(Vec<ChildRow>),
    Tasks(Vec<TaskRow>),
    Rewards(Vec<RewardRow>),
    Redemptions(Vec<RedemptionRow>),
    PointHistory(Vec<PointHistoryRow>),
}

impl Rows {
    pub fn collection(&self) -> Collection {
        match self {
            Rows::Config(_) => Collection::Config,
            Rows::Children(_) => Collection::Children,
            Rows::Tasks(_) => Collection::Tasks,
            Rows::Rewards(_) => Collection::Rewards,
            Rows::Redemptions(_) => Collection::Redemptions,
            Rows::PointHistory(_) => Collection::PointHistory,
        }
    }
}

/// What the change feed tells a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// These collections changed remotely.
    Changed(Vec<Collection>),
    /// The feed (re)connected or fell behind; anything may have been missed.
    Resync,
}

/// The authoritative shared store. Every mutation is atomic on the remote
/// side and answers with the rows it touched.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch(&self, collection: Collection) -> Result<Rows, ClientError>;

    async fn set_pin(&self, pin: &str) -> Result<ConfigRow, ClientError>;

    async fn add_child(&self, draft: &ChildDraft) -> Result<ChildRow, ClientError>;
    async fn update_child(&self, id: &ChildId, draft: &ChildDraft) -> Result<ChildRow, ClientError>;
    async fn delete_child(&self, id: &ChildId) -> Result<(), ClientError>;
    async fn deduct(&self, id: &ChildId, req: &DeductReq) -> Result<PointsChangeResp, ClientError>;

    async fn add_task(&self, draft: &TaskDraft) -> Result<TaskRow, ClientError>;
    async fn update_task(&self, id: &TaskId, draft: &TaskDraft) -> Result<TaskRow, ClientError>;
    async fn delete_task(&self, id: &TaskId) -> Result<(), ClientError>;
    async fn mark_done(&self, id: &TaskId, req: &MarkDoneReq) -> Result<TaskChangeResp, ClientError>;
    async fn approve(&self, id: &TaskId) -> Result<TaskChangeResp, ClientError>;
    async fn reject(&self, id: &TaskId) -> Result<TaskChangeResp, ClientError>;
    async fn execute_penalty(&self, id: &TaskId) -> Result<TaskChangeResp, ClientError>;
    async fn rollover(&self, req: &RolloverReq) -> Result<RolloverResp, ClientError>;

    async fn add_reward(&self, draft: &RewardDraft) -> Result<RewardRow, ClientError>;
    async fn update_reward(&self, id: &RewardId, draft: &RewardDraft)
    -> Result<RewardRow, ClientError>;
    async fn delete_reward(&self, id: &RewardId) -> Result<(), ClientError>;
    async fn redeem(&self, reward_id: &RewardId, child_id: &ChildId)
    -> Result<RedeemResp, ClientError>;
    async fn fulfill(&self, id: &RedemptionId) -> Result<RedemptionRow, ClientError>;

    /// Subscribe to remote changes until `cancel` fires.
    fn feed(&self, cancel: CancellationToken) -> mpsc::Receiver<FeedEvent>;
}
