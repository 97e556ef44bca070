use async_trait::async_trait;
use chorepoints_shared::api::{
    self, ChildDraft, ChildRow, Collection, ConfigRow, DeductReq, MarkDoneReq, PointsChangeResp,
    RedeemResp, RedemptionRow, RewardDraft, RewardRow, RolloverReq, RolloverResp, TaskChangeResp,
    TaskDraft, TaskRow, rest,
};
use chorepoints_shared::{ChildId, RedemptionId, RewardId, TaskId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ClientError;
use crate::config::normalize_server_url;
use crate::remote::{FeedEvent, RemoteStore, Rows};
use crate::sse;

/// [`RemoteStore`] backed by a chorepoints server.
#[derive(Debug, Clone)]
pub struct HttpStore {
    base: String,
}

impl HttpStore {
    pub fn new(server_url: &str) -> Self {
        Self {
            base: normalize_server_url(server_url),
        }
    }

    pub async fn health(&self) -> Result<serde_json::Value, ClientError> {
        Ok(rest::health(&self.base).await?)
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn fetch(&self, collection: Collection) -> Result<Rows, ClientError> {
        let b = &self.base;
        let rows = match collection {
            Collection::Config => Rows::Config(rest::list(b, collection).await?),
            Collection::Children => Rows::Children(rest::list(b, collection).await?),
            Collection::Tasks => Rows::Tasks(rest::list(b, collection).await?),
            Collection::Rewards => Rows::Rewards(rest::list(b, collection).await?),
            Collection::Redemptions => Rows::Redemptions(rest::list(b, collection).await?),
            Collection::PointHistory => Rows::PointHistory(rest::list(b, collection).await?),
        };
        Ok(rows)
    }

    async fn set_pin(&self, pin: &str) -> Result<ConfigRow, ClientError> {
        Ok(rest::set_pin(&self.base, pin).await?)
    }

    async fn add_child(&self, draft: &ChildDraft) -> Result<ChildRow, ClientError> {
        Ok(rest::add_child(&self.base, draft).await?)
    }

    async fn update_child(&self, id: &ChildId, draft: &ChildDraft) -> Result<ChildRow, ClientError> {
        Ok(rest::update_child(&self.base, id.as_str(), draft).await?)
    }

    async fn delete_child(&self, id: &ChildId) -> Result<(), ClientError> {
        Ok(rest::delete_child(&self.base, id.as_str()).await?)
    }

    async fn deduct(&self, id: &ChildId, req: &DeductReq) -> Result<PointsChangeResp, ClientError> {
        Ok(rest::deduct(&self.base, id.as_str(), req).await?)
    }

    async fn add_task(&self, draft: &TaskDraft) -> Result<TaskRow, ClientError> {
        Ok(rest::add_task(&self.base, draft).await?)
    }

    async fn update_task(&self, id: &TaskId, draft: &TaskDraft) -> Result<TaskRow, ClientError> {
        Ok(rest::update_task(&self.base, id.as_str(), draft).await?)
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), ClientError> {
        Ok(rest::delete_task(&self.base, id.as_str()).await?)
    }

    async fn mark_done(&self, id: &TaskId, req: &MarkDoneReq) -> Result<TaskChangeResp, ClientError> {
        Ok(rest::mark_done(&self.base, id.as_str(), req).await?)
    }

    async fn approve(&self, id: &TaskId) -> Result<TaskChangeResp, ClientError> {
        Ok(rest::approve(&self.base, id.as_str()).await?)
    }

    async fn reject(&self, id: &TaskId) -> Result<TaskChangeResp, ClientError> {
        Ok(rest::reject(&self.base, id.as_str()).await?)
    }

    async fn execute_penalty(&self, id: &TaskId) -> Result<TaskChangeResp, ClientError> {
        Ok(rest::execute_penalty(&self.base, id.as_str()).await?)
    }

    async fn rollover(&self, req: &RolloverReq) -> Result<RolloverResp, ClientError> {
        Ok(rest::rollover(&self.base, req).await?)
    }

    async fn add_reward(&self, draft: &RewardDraft) -> Result<RewardRow, ClientError> {
        Ok(rest::add_reward(&self.base, draft).await?)
    }

    async fn update_reward(
        &self,
        id: &RewardId,
        draft: &RewardDraft,
    ) -> Result<RewardRow, ClientError> {
        Ok(rest::update_reward(&self.base, id.as_str(), draft).await?)
    }

    async fn delete_reward(&self, id: &RewardId) -> Result<(), ClientError> {
        Ok(rest::delete_reward(&self.base, id.as_str()).await?)
    }

    async fn redeem(
        &self,
        reward_id: &RewardId,
        child_id: &ChildId,
    ) -> Result<RedeemResp, ClientError> {
        Ok(rest::redeem(&self.base, reward_id.as_str(), child_id.as_str()).await?)
    }

    async fn fulfill(&self, id: &RedemptionId) -> Result<RedemptionRow, ClientError> {
        Ok(rest::fulfill(&self.base, id.as_str()).await?)
    }

    fn feed(&self, cancel: CancellationToken) -> mpsc::Receiver<FeedEvent> {
        let (tx, rx) = mpsc::channel(32);
        sse::spawn_listener(api::endpoints::events(&self.base), tx, cancel);
        rx
    }
}
