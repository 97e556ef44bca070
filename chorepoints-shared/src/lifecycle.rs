//! Task status state machine.
//!
//! Regular tasks move `pending -> done -> approved | rejected`. Daily tasks
//! never settle: approval, rejection and the day boundary all send them back
//! to `pending`. Penalty tasks have no status flow at all and are handled by
//! [`crate::ledger::execute_penalty`].
//!
//! Every function validates first and mutates last, so an `Err` always
//! leaves its arguments untouched.

use chrono::NaiveDate;

use crate::domain::{Child, NewEntry, Task, TaskId, TaskStatus};
use crate::error::{DomainError, Entity, Precondition, TaskAction};
use crate::ledger;

fn reject_penalty(task: &Task, action: TaskAction) -> Result<(), DomainError> {
    if task.is_penalty {
        return Err(DomainError::InvalidAction {
            task_id: task.id.to_string(),
            action,
            reason: "penalty tasks can only be executed",
        });
    }
    Ok(())
}

fn invalid(task: &Task, action: TaskAction) -> DomainError {
    DomainError::InvalidTransition {
        task_id: task.id.to_string(),
        from: task.status,
        action,
    }
}

/// Whether the child may submit this task right now.
pub fn can_mark_done(task: &Task) -> bool {
    if task.is_penalty {
        return false;
    }
    match task.status {
        TaskStatus::Pending => true,
        TaskStatus::Rejected => !task.is_daily(),
        TaskStatus::Done | TaskStatus::Approved => false,
    }
}

/// Child submits the task, optionally with photo proof.
pub fn mark_done(
    task: &mut Task,
    photo: Option<String>,
    today: NaiveDate,
) -> Result<(), DomainError> {
    reject_penalty(task, TaskAction::MarkDone)?;
    if !can_mark_done(task) {
        return Err(invalid(task, TaskAction::MarkDone));
    }
    let photo = photo.filter(|p| !p.trim().is_empty());
    if task.require_photo && photo.is_none() {
        return Err(DomainError::precondition(Precondition::PhotoRequired));
    }

    task.status = TaskStatus::Done;
    task.photo = photo;
    if task.is_daily() {
        task.last_submitted_date = Some(today);
    }
    Ok(())
}

/// A daily submission left unreviewed past its day expires back to pending.
pub fn needs_rollover(task: &Task, reference_date: NaiveDate) -> bool {
    task.is_daily()
        && task.status == TaskStatus::Done
        && task.last_submitted_date != Some(reference_date)
}

fn reset_daily(task: &mut Task) {
    task.status = TaskStatus::Pending;
    task.last_submitted_date = None;
    task.photo = None;
}

/// Expire stale daily submissions. Returns the ids that changed; running it
/// again with the same date returns an empty list.
pub fn rollover<'a, I>(tasks: I, reference_date: NaiveDate) -> Vec<TaskId>
where
    I: IntoIterator<Item = &'a mut Task>,
{
    let mut changed = Vec::new();
    for task in tasks {
        if needs_rollover(task, reference_date) {
            reset_daily(task);
            changed.push(task.id.clone());
        }
    }
    changed
}

/// Parent approves a submitted task and the assigned child is credited.
///
/// `child` is `None` when the assignment dangles after the child was removed;
/// that is reported as `NotFound` and nothing changes.
pub fn approve(
    task: &mut Task,
    child: Option<&mut Child>,
    today: NaiveDate,
) -> Result<NewEntry, DomainError> {
    reject_penalty(task, TaskAction::Approve)?;
    if task.status != TaskStatus::Done {
        return Err(invalid(task, TaskAction::Approve));
    }
    let child = child.ok_or_else(|| DomainError::not_found(Entity::Child, &task.assigned_to))?;
    if child.id != task.assigned_to {
        return Err(DomainError::not_found(Entity::Child, &task.assigned_to));
    }

    let entry = ledger::award(child, task.points, &task.title, today)?;
    if task.is_daily() {
        reset_daily(task);
    } else {
        task.status = TaskStatus::Approved;
        task.photo = None;
    }
    Ok(entry)
}

/// Parent rejects a submitted task. No points move.
pub fn reject(task: &mut Task) -> Result<(), DomainError> {
    reject_penalty(task, TaskAction::Reject)?;
    if task.status != TaskStatus::Done {
        return Err(invalid(task, TaskAction::Reject));
    }
    if task.is_daily() {
        reset_daily(task);
    } else {
        task.status = TaskStatus::Rejected;
        task.photo = None;
    }
    Ok(())
}

/// Tasks waiting for a parent decision, oldest first.
pub fn approval_queue(tasks: &[Task]) -> Vec<&Task> {
    let mut out: Vec<&Task> = tasks
        .iter()
        .filter(|t| !t.is_penalty && t.status == TaskStatus::Done)
        .collect();
    out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChildId, EntryType, Repeat};
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn task(repeat: Repeat) -> Task {
        Task {
            id: TaskId::from("t1"),
            title: "Clean room".into(),
            description: None,
            points: 10,
            assigned_to: ChildId::from("a"),
            due_date: None,
            status: TaskStatus::Pending,
            repeat,
            require_photo: false,
            photo: None,
            is_penalty: false,
            last_submitted_date: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        }
    }

    fn child(points: i64) -> Child {
        Child {
            id: ChildId::from("a"),
            name: "Alice".into(),
            avatar: "🧒".into(),
            points,
        }
    }

    #[test]
    fn one_off_task_is_approved_and_credits_child() {
        let mut t = task(Repeat::None);
        let mut c = child(0);
        mark_done(&mut t, None, day(3)).unwrap();
        assert_eq!(t.status, TaskStatus::Done);
        assert_eq!(t.last_submitted_date, None);

        let entry = approve(&mut t, Some(&mut c), day(3)).unwrap();
        assert_eq!(t.status, TaskStatus::Approved);
        assert_eq!(c.points, 10);
        assert_eq!(entry.points, 10);
        assert_eq!(entry.kind, EntryType::Task);
        assert_eq!(entry.reason, "Clean room");
    }

    #[test]
    fn daily_task_returns_to_pending_on_approval() {
        let mut t = task(Repeat::Daily);
        let mut c = child(5);
        mark_done(&mut t, Some("photo://1".into()), day(3)).unwrap();
        assert_eq!(t.last_submitted_date, Some(day(3)));

        approve(&mut t, Some(&mut c), day(3)).unwrap();
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.last_submitted_date, None);
        assert_eq!(t.photo, None);
        assert_eq!(c.points, 15);
    }

    #[test]
    fn approving_pending_task_is_invalid_and_changes_nothing() {
        let mut t = task(Repeat::None);
        let mut c = child(0);
        let err = approve(&mut t, Some(&mut c), day(3)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(c.points, 0);
    }

    #[test]
    fn approving_with_dangling_child_is_not_found() {
        let mut t = task(Repeat::None);
        mark_done(&mut t, None, day(3)).unwrap();
        let err = approve(&mut t, None, day(3)).unwrap_err();
        assert!(matches!(
            err,
            DomainError::NotFound {
                entity: Entity::Child,
                ..
            }
        ));
        assert_eq!(t.status, TaskStatus::Done);
    }

    #[test]
    fn rejected_one_off_can_be_resubmitted() {
        let mut t = task(Repeat::None);
        mark_done(&mut t, None, day(3)).unwrap();
        reject(&mut t).unwrap();
        assert_eq!(t.status, TaskStatus::Rejected);
        mark_done(&mut t, None, day(4)).unwrap();
        assert_eq!(t.status, TaskStatus::Done);
    }

    #[test]
    fn rejected_daily_goes_back_to_pending() {
        let mut t = task(Repeat::Daily);
        mark_done(&mut t, None, day(3)).unwrap();
        reject(&mut t).unwrap();
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.last_submitted_date, None);
    }

    #[test]
    fn photo_is_required_when_flagged() {
        let mut t = task(Repeat::None);
        t.require_photo = true;
        let err = mark_done(&mut t, Some("   ".into()), day(3)).unwrap_err();
        assert_eq!(
            err,
            DomainError::PreconditionFailed(Precondition::PhotoRequired)
        );
        assert_eq!(t.status, TaskStatus::Pending);
        mark_done(&mut t, Some("img".into()), day(3)).unwrap();
        assert_eq!(t.photo.as_deref(), Some("img"));
    }

    #[test]
    fn penalty_tasks_reject_status_actions() {
        let mut t = task(Repeat::None);
        t.is_penalty = true;
        assert!(matches!(
            mark_done(&mut t, None, day(3)),
            Err(DomainError::InvalidAction { .. })
        ));
        assert!(matches!(reject(&mut t), Err(DomainError::InvalidAction { .. })));
    }

    #[test]
    fn rollover_expires_stale_daily_submissions_only() {
        let mut daily_old = task(Repeat::Daily);
        mark_done(&mut daily_old, Some("p".into()), day(3)).unwrap();
        let mut daily_today = task(Repeat::Daily);
        daily_today.id = TaskId::from("t2");
        mark_done(&mut daily_today, None, day(4)).unwrap();
        let mut one_off = task(Repeat::None);
        one_off.id = TaskId::from("t3");
        mark_done(&mut one_off, None, day(3)).unwrap();

        let mut all = vec![daily_old, daily_today, one_off];
        let changed = rollover(all.iter_mut(), day(4));
        assert_eq!(changed, vec![TaskId::from("t1")]);
        assert_eq!(all[0].status, TaskStatus::Pending);
        assert_eq!(all[0].photo, None);
        assert_eq!(all[0].last_submitted_date, None);
        assert_eq!(all[1].status, TaskStatus::Done);
        assert_eq!(all[2].status, TaskStatus::Done);

        let snapshot = all.clone();
        assert!(rollover(all.iter_mut(), day(4)).is_empty());
        assert_eq!(all, snapshot);
    }

    #[test]
    fn approval_queue_lists_done_tasks() {
        let mut a = task(Repeat::None);
        mark_done(&mut a, None, day(3)).unwrap();
        let b = task(Repeat::Daily);
        let tasks = vec![a, b];
        let queue = approval_queue(&tasks);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].status, TaskStatus::Done);
    }
}
