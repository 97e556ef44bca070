//! Point accounting.
//!
//! `Child::points` is a cached running total; the append-only list of
//! [`PointHistoryEntry`] rows is the record of what happened. Every function
//! here that changes a balance returns the matching [`NewEntry`], carrying the
//! delta that was actually applied, so the two can never drift apart.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Child, ChildId, EntryType, NewEntry, PointHistoryEntry, Redemption, RedemptionId,
    RedemptionStatus, Reward, Task,
};
use crate::error::{DomainError, Entity, Precondition, TaskAction};

/// Credit a child. Used by task approval.
pub(crate) fn award(
    child: &mut Child,
    amount: i64,
    reason: &str,
    today: NaiveDate,
) -> Result<NewEntry, DomainError> {
    child.points = child
        .points
        .checked_add(amount)
        .ok_or_else(|| DomainError::precondition(Precondition::BalanceOverflow))?;
    Ok(NewEntry {
        child_id: child.id.clone(),
        date: today,
        points: amount,
        reason: reason.to_string(),
        kind: EntryType::Task,
    })
}

fn floor_deduct(
    child: &mut Child,
    amount: i64,
    reason: &str,
    kind: EntryType,
    today: NaiveDate,
) -> Result<NewEntry, DomainError> {
    if amount <= 0 {
        return Err(DomainError::precondition(Precondition::NonPositiveAmount(
            amount,
        )));
    }
    let current = child.points;
    let next = current.saturating_sub(amount).max(0);
    child.points = next;
    Ok(NewEntry {
        child_id: child.id.clone(),
        date: today,
        points: next - current,
        reason: reason.to_string(),
        kind,
    })
}

/// Parent takes points away. The balance stops at zero and the entry records
/// only what was really removed.
pub fn deduct(
    child: &mut Child,
    amount: i64,
    reason: &str,
    today: NaiveDate,
) -> Result<NewEntry, DomainError> {
    floor_deduct(child, amount, reason, EntryType::Deduct, today)
}

/// Apply a penalty task to its assigned child. The task itself is not changed
/// and may be executed any number of times.
pub fn execute_penalty(
    task: &Task,
    child: Option<&mut Child>,
    today: NaiveDate,
) -> Result<NewEntry, DomainError> {
    if !task.is_penalty {
        return Err(DomainError::InvalidAction {
            task_id: task.id.to_string(),
            action: TaskAction::Execute,
            reason: "only penalty tasks can be executed",
        });
    }
    let child = match child {
        Some(c) if c.id == task.assigned_to => c,
        _ => return Err(DomainError::not_found(Entity::Child, &task.assigned_to)),
    };
    floor_deduct(child, task.points, &task.title, EntryType::Penalty, today)
}

/// Why a redemption did not go through.
pub fn redemption_blocker(reward: &Reward, child: &Child) -> Option<Precondition> {
    if !reward.available {
        return Some(Precondition::RewardUnavailable);
    }
    if child.points < reward.cost {
        return Some(Precondition::InsufficientPoints {
            balance: child.points,
            cost: reward.cost,
        });
    }
    None
}

/// Exchange points for a reward. A declined redemption is reported as
/// `PreconditionFailed` and changes nothing.
pub fn redeem(
    reward: &Reward,
    child: &mut Child,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> Result<(Redemption, NewEntry), DomainError> {
    if let Some(blocker) = redemption_blocker(reward, child) {
        return Err(DomainError::precondition(blocker));
    }
    child.points -= reward.cost;
    let redemption = Redemption {
        id: RedemptionId::new_v4(),
        reward_id: reward.id.clone(),
        child_id: child.id.clone(),
        redeemed_at: now,
        status: RedemptionStatus::Pending,
    };
    let entry = NewEntry {
        child_id: child.id.clone(),
        date: today,
        points: -reward.cost,
        reason: reward.title.clone(),
        kind: EntryType::Reward,
    };
    Ok((redemption, entry))
}

/// Mark a redemption as handed over. Informational only; already fulfilled
/// redemptions stay as they are.
pub fn fulfill(redemption: &mut Redemption) {
    redemption.status = RedemptionStatus::Fulfilled;
}

/// One ledger row together with the balance right after it was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerLine {
    pub entry: PointHistoryEntry,
    pub balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSheet {
    pub current: i64,
    /// Newest first.
    pub lines: Vec<LedgerLine>,
}

fn newest_first(history: &[PointHistoryEntry]) -> Vec<&PointHistoryEntry> {
    let mut sorted: Vec<&PointHistoryEntry> = history.iter().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    sorted
}

/// Walk a child's history backwards from the cached balance.
pub fn compute_balance(history: &[PointHistoryEntry], current: i64) -> BalanceSheet {
    let mut balance = current;
    let mut lines = Vec::with_capacity(history.len());
    for entry in newest_first(history) {
        lines.push(LedgerLine {
            entry: entry.clone(),
            balance,
        });
        balance -= entry.points;
    }
    BalanceSheet { current, lines }
}

/// Sum of a child's deltas, i.e. what `Child::points` must equal.
pub fn replay(history: &[PointHistoryEntry], child_id: &ChildId) -> i64 {
    history
        .iter()
        .filter(|e| &e.child_id == child_id)
        .map(|e| e.points)
        .sum()
}

/// Net change per calendar day for one child.
pub fn daily_totals(history: &[PointHistoryEntry], child_id: &ChildId) -> BTreeMap<NaiveDate, i64> {
    let mut out = BTreeMap::new();
    for e in history.iter().filter(|e| &e.child_id == child_id) {
        *out.entry(e.date).or_insert(0) += e.points;
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    pub child_id: ChildId,
    pub cached: i64,
    pub replayed: i64,
}

/// Children whose cached balance disagrees with their ledger.
pub fn audit(children: &[Child], history: &[PointHistoryEntry]) -> Vec<Discrepancy> {
    children
        .iter()
        .filter_map(|c| {
            let replayed = replay(history, &c.id);
            (replayed != c.points).then(|| Discrepancy {
                child_id: c.id.clone(),
                cached: c.points,
                replayed,
            })
        })
        .collect()
}
