//! Minimal REST client helpers for consumers (clients).

use super::endpoints as ep;
use super::*;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    /// The server rejected the call with a structured error body.
    #[error("status {status}: {message}")]
    Api {
        status: u16,
        kind: Option<ErrorKind>,
        message: String,
    },
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

impl RestError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RestError::Api { kind, .. } => *kind,
            _ => None,
        }
    }
}

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .tcp_keepalive(Some(Duration::from_secs(180)))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(180))
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

fn mk_client() -> reqwest::Client {
    HTTP_CLIENT.clone()
}

fn status_error(status: StatusCode, body: String) -> RestError {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => RestError::Api {
            status: status.as_u16(),
            kind: err.kind,
            message: err.error,
        },
        Err(_) => RestError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

async fn handle_json<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, RestError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(status_error(status, body));
    }
    res.json::<T>()
        .await
        .map_err(|e| RestError::Serde(e.to_string()))
}

async fn get_json<T: DeserializeOwned>(url: String) -> Result<T, RestError> {
    let res = mk_client()
        .get(url)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
    method: reqwest::Method,
    url: String,
    body: &B,
) -> Result<T, RestError> {
    let res = mk_client()
        .request(method, url)
        .json(body)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

async fn delete(url: String) -> Result<(), RestError> {
    let res = mk_client()
        .delete(url)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    let status = res.status();
    if status.is_success() {
        return Ok(());
    }
    let body = res.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

pub async fn health(base: &str) -> Result<serde_json::Value, RestError> {
    get_json(ep::health(base)).await
}

/// Fetch every row of one collection. The row type must match `collection`.
pub async fn list<T: DeserializeOwned>(base: &str, collection: Collection) -> Result<Vec<T>, RestError> {
    get_json(ep::collection(base, collection)).await
}

pub async fn set_pin(base: &str, pin: &str) -> Result<ConfigRow, RestError> {
    let body = SetPinReq {
        pin: pin.to_string(),
    };
    send_json(reqwest::Method::PUT, ep::config_pin(base), &body).await
}

pub async fn add_child(base: &str, draft: &ChildDraft) -> Result<ChildRow, RestError> {
    send_json(reqwest::Method::POST, ep::children(base), draft).await
}

pub async fn update_child(base: &str, child_id: &str, draft: &ChildDraft) -> Result<ChildRow, RestError> {
    send_json(reqwest::Method::PUT, ep::child(base, child_id), draft).await
}

pub async fn delete_child(base: &str, child_id: &str) -> Result<(), RestError> {
    delete(ep::child(base, child_id)).await
}

pub async fn deduct(base: &str, child_id: &str, req: &DeductReq) -> Result<PointsChangeResp, RestError> {
    send_json(reqwest::Method::POST, ep::child_deduct(base, child_id), req).await
}

pub async fn add_task(base: &str, draft: &TaskDraft) -> Result<TaskRow, RestError> {
    send_json(reqwest::Method::POST, ep::tasks(base), draft).await
}

pub async fn update_task(base: &str, task_id: &str, draft: &TaskDraft) -> Result<TaskRow, RestError> {
    send_json(reqwest::Method::PUT, ep::task(base, task_id), draft).await
}

pub async fn delete_task(base: &str, task_id: &str) -> Result<(), RestError> {
    delete(ep::task(base, task_id)).await
}

pub async fn mark_done(base: &str, task_id: &str, req: &MarkDoneReq) -> Result<TaskChangeResp, RestError> {
    send_json(reqwest::Method::POST, ep::task_action(base, task_id, "done"), req).await
}

pub async fn approve(base: &str, task_id: &str) -> Result<TaskChangeResp, RestError> {
    send_json(
        reqwest::Method::POST,
        ep::task_action(base, task_id, "approve"),
        &serde_json::json!({}),
    )
    .await
}

pub async fn reject(base: &str, task_id: &str) -> Result<TaskChangeResp, RestError> {
    send_json(
        reqwest::Method::POST,
        ep::task_action(base, task_id, "reject"),
        &serde_json::json!({}),
    )
    .await
}

pub async fn execute_penalty(base: &str, task_id: &str) -> Result<TaskChangeResp, RestError> {
    send_json(
        reqwest::Method::POST,
        ep::task_action(base, task_id, "execute"),
        &serde_json::json!({}),
    )
    .await
}

pub async fn rollover(base: &str, req: &RolloverReq) -> Result<RolloverResp, RestError> {
    send_json(reqwest::Method::POST, ep::tasks_rollover(base), req).await
}

pub async fn add_reward(base: &str, draft: &RewardDraft) -> Result<RewardRow, RestError> {
    send_json(reqwest::Method::POST, ep::rewards(base), draft).await
}

pub async fn update_reward(base: &str, reward_id: &str, draft: &RewardDraft) -> Result<RewardRow, RestError> {
    send_json(reqwest::Method::PUT, ep::reward(base, reward_id), draft).await
}

pub async fn delete_reward(base: &str, reward_id: &str) -> Result<(), RestError> {
    delete(ep::reward(base, reward_id)).await
}

pub async fn redeem(base: &str, reward_id: &str, child_id: &str) -> Result<RedeemResp, RestError> {
    let body = RedeemReq {
        child_id: child_id.to_string(),
    };
    send_json(reqwest::Method::POST, ep::reward_redeem(base, reward_id), &body).await
}

pub async fn fulfill(base: &str, redemption_id: &str) -> Result<RedemptionRow, RestError> {
    send_json(
        reqwest::Method::POST,
        ep::redemption_fulfill(base, redemption_id),
        &serde_json::json!({}),
    )
    .await
}
