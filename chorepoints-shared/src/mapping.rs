//! Translation between the remote rows in [`crate::api`] and the domain model.
//!
//! This is the only place that knows remote column names and textual enum
//! encodings. Every collection has a `*_from_row` / `*_to_row` pair.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use thiserror::Error;

use crate::api::{
    ChildRow, ConfigRow, PointHistoryRow, RedemptionRow, RewardRow, TaskRow,
};
use crate::domain::{
    Child, ChildId, EntryId, EntryType, PointHistoryEntry, Redemption, RedemptionId,
    RedemptionStatus, Repeat, Reward, RewardId, Task, TaskId, TaskStatus,
};

pub const PIN_KEY: &str = "pin";
const DATE_FMT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{table}.{column}: unexpected value {value:?}")]
pub struct MappingError {
    pub table: &'static str,
    pub column: &'static str,
    pub value: String,
}

fn bad(table: &'static str, column: &'static str, value: &str) -> MappingError {
    MappingError {
        table,
        column,
        value: value.to_string(),
    }
}

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

/// Fixed-width UTC timestamps, so text order equals time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_date(table: &'static str, column: &'static str, raw: &str) -> Result<NaiveDate, MappingError> {
    NaiveDate::parse_from_str(raw, DATE_FMT).map_err(|_| bad(table, column, raw))
}

fn parse_opt_date(
    table: &'static str,
    column: &'static str,
    raw: Option<String>,
) -> Result<Option<NaiveDate>, MappingError> {
    // Older rows store an empty string for "no date".
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(table, column, s).map(Some),
    }
}

fn parse_timestamp(
    table: &'static str,
    column: &'static str,
    raw: &str,
) -> Result<DateTime<Utc>, MappingError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| bad(table, column, raw))
}

pub fn parse_task_status(raw: &str) -> Option<TaskStatus> {
    match raw {
        "pending" => Some(TaskStatus::Pending),
        "done" => Some(TaskStatus::Done),
        "approved" => Some(TaskStatus::Approved),
        "rejected" => Some(TaskStatus::Rejected),
        _ => None,
    }
}

pub fn parse_repeat(raw: &str) -> Option<Repeat> {
    match raw {
        "" | "none" => Some(Repeat::None),
        "daily" => Some(Repeat::Daily),
        _ => None,
    }
}

pub fn parse_redemption_status(raw: &str) -> Option<RedemptionStatus> {
    match raw {
        "pending" => Some(RedemptionStatus::Pending),
        "fulfilled" => Some(RedemptionStatus::Fulfilled),
        _ => None,
    }
}

pub fn parse_entry_type(raw: &str) -> Option<EntryType> {
    match raw {
        "task" => Some(EntryType::Task),
        "deduct" => Some(EntryType::Deduct),
        "penalty" => Some(EntryType::Penalty),
        "reward" => Some(EntryType::Reward),
        _ => None,
    }
}

pub fn pin_from_config(rows: &[ConfigRow]) -> Option<String> {
    rows.iter()
        .find(|r| r.key == PIN_KEY)
        .and_then(|r| r.value.clone())
}

pub fn pin_to_config(pin: Option<&str>) -> ConfigRow {
    ConfigRow {
        key: PIN_KEY.to_string(),
        value: pin.map(str::to_string),
    }
}

pub fn child_from_row(row: ChildRow) -> Child {
    Child {
        id: ChildId(row.id),
        name: row.name,
        avatar: row.avatar,
        points: row.points,
    }
}

pub fn child_to_row(child: &Child) -> ChildRow {
    ChildRow {
        id: child.id.0.clone(),
        name: child.name.clone(),
        avatar: child.avatar.clone(),
        points: child.points,
    }
}

pub fn task_from_row(row: TaskRow) -> Result<Task, MappingError> {
    const T: &str = "tasks";
    let status = parse_task_status(&row.status).ok_or_else(|| bad(T, "status", &row.status))?;
    let repeat = parse_repeat(&row.repeat).ok_or_else(|| bad(T, "repeat", &row.repeat))?;
    Ok(Task {
        id: TaskId(row.id),
        title: row.title,
        description: row.description,
        points: row.points,
        assigned_to: ChildId(row.assigned_to),
        due_date: parse_opt_date(T, "due_date", row.due_date)?,
        status,
        repeat,
        require_photo: row.require_photo,
        photo: row.photo,
        is_penalty: row.is_penalty,
        last_submitted_date: parse_opt_date(T, "last_submitted_date", row.last_submitted_date)?,
        created_at: parse_timestamp(T, "created_at", &row.created_at)?,
    })
}

pub fn task_to_row(task: &Task) -> TaskRow {
    TaskRow {
        id: task.id.0.clone(),
        title: task.title.clone(),
        description: task.description.clone(),
        points: task.points,
        assigned_to: task.assigned_to.0.clone(),
        due_date: task.due_date.map(format_date),
        status: task.status.as_str().to_string(),
        repeat: task.repeat.as_str().to_string(),
        last_submitted_date: task.last_submitted_date.map(format_date),
        require_photo: task.require_photo,
        photo: task.photo.clone(),
        is_penalty: task.is_penalty,
        created_at: format_timestamp(task.created_at),
    }
}

pub fn reward_from_row(row: RewardRow) -> Reward {
    Reward {
        id: RewardId(row.id),
        title: row.title,
        description: row.description,
        cost: row.cost,
        icon: row.icon,
        available: row.available,
    }
}

pub fn reward_to_row(reward: &Reward) -> RewardRow {
    RewardRow {
        id: reward.id.0.clone(),
        title: reward.title.clone(),
        description: reward.description.clone(),
        cost: reward.cost,
        icon: reward.icon.clone(),
        available: reward.available,
    }
}

pub fn redemption_from_row(row: RedemptionRow) -> Result<Redemption, MappingError> {
    const T: &str = "redemptions";
    let status =
        parse_redemption_status(&row.status).ok_or_else(|| bad(T, "status", &row.status))?;
    Ok(Redemption {
        id: RedemptionId(row.id),
        reward_id: RewardId(row.reward_id),
        child_id: ChildId(row.child_id),
        redeemed_at: parse_timestamp(T, "redeemed_at", &row.redeemed_at)?,
        status,
    })
}

pub fn redemption_to_row(r: &Redemption) -> RedemptionRow {
    RedemptionRow {
        id: r.id.0.clone(),
        reward_id: r.reward_id.0.clone(),
        child_id: r.child_id.0.clone(),
        redeemed_at: format_timestamp(r.redeemed_at),
        status: r.status.as_str().to_string(),
    }
}

pub fn entry_from_row(row: PointHistoryRow) -> Result<PointHistoryEntry, MappingError> {
    const T: &str = "point_history";
    let kind = parse_entry_type(&row.kind).ok_or_else(|| bad(T, "type", &row.kind))?;
    Ok(PointHistoryEntry {
        id: EntryId(row.id),
        child_id: ChildId(row.child_id),
        date: parse_date(T, "date", &row.date)?,
        points: row.points,
        reason: row.reason,
        kind,
        created_at: parse_timestamp(T, "created_at", &row.created_at)?,
    })
}

pub fn entry_to_row(e: &PointHistoryEntry) -> PointHistoryRow {
    PointHistoryRow {
        id: e.id.0,
        child_id: e.child_id.0.clone(),
        date: format_date(e.date),
        points: e.points,
        reason: e.reason.clone(),
        kind: e.kind.as_str().to_string(),
        created_at: format_timestamp(e.created_at),
    }
}

/// Map a whole collection, failing on the first bad row.
pub fn map_rows<R, T, F>(rows: Vec<R>, f: F) -> Result<Vec<T>, MappingError>
where
    F: FnMut(R) -> Result<T, MappingError>,
{
    rows.into_iter().map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_row() -> TaskRow {
        TaskRow {
            id: "t1".into(),
            title: "Feed cat".into(),
            description: Some("twice".into()),
            points: 2,
            assigned_to: "a".into(),
            due_date: Some("".into()),
            status: "done".into(),
            repeat: "daily".into(),
            last_submitted_date: Some("2024-05-03".into()),
            require_photo: true,
            photo: Some("data:image/png;base64,AAAA".into()),
            is_penalty: false,
            created_at: "2024-05-01T08:00:00+00:00".into(),
        }
    }

    #[test]
    fn task_row_maps_to_camel_case_domain() {
        let task = task_from_row(task_row()).unwrap();
        assert_eq!(task.assigned_to, ChildId::from("a"));
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.repeat, Repeat::Daily);
        assert_eq!(task.due_date, None);
        assert_eq!(
            task.last_submitted_date,
            NaiveDate::from_ymd_opt(2024, 5, 3)
        );

        let json = serde_json::to_value(&task).unwrap();
        assert!(json.get("assignedTo").is_some());
        assert!(json.get("lastSubmittedDate").is_some());
        assert!(json.get("assigned_to").is_none());

        let back = task_to_row(&task);
        assert_eq!(back.assigned_to, "a");
        assert_eq!(back.due_date, None);
        assert_eq!(back.last_submitted_date.as_deref(), Some("2024-05-03"));
    }

    #[test]
    fn unknown_status_is_a_mapping_error() {
        let mut row = task_row();
        row.status = "archived".into();
        let err = task_from_row(row).unwrap_err();
        assert_eq!(err.column, "status");
        assert_eq!(err.value, "archived");
    }

    #[test]
    fn entry_type_column_is_called_type() {
        let row = PointHistoryRow {
            id: 4,
            child_id: "a".into(),
            date: "2024-05-03".into(),
            points: -3,
            reason: "rude".into(),
            kind: "deduct".into(),
            created_at: "2024-05-03T10:00:00Z".into(),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["type"], "deduct");
        let entry = entry_from_row(row).unwrap();
        assert_eq!(entry.kind, EntryType::Deduct);
        assert_eq!(entry.points, -3);
    }

    #[test]
    fn pin_lives_under_its_key() {
        let rows = vec![
            ConfigRow {
                key: "theme".into(),
                value: Some("dark".into()),
            },
            pin_to_config(Some("1234")),
        ];
        assert_eq!(pin_from_config(&rows).as_deref(), Some("1234"));
        assert_eq!(pin_from_config(&[pin_to_config(None)]), None);
    }
}
