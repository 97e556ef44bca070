//! Create and edit children, tasks and rewards from parent-supplied drafts.

use chrono::{DateTime, Utc};

use crate::api::{ChildDraft, RewardDraft, TaskDraft};
use crate::domain::{Child, ChildId, Reward, RewardId, Task, TaskId, TaskStatus};
use crate::error::{DomainError, Precondition};

fn invalid(msg: &str) -> DomainError {
    DomainError::precondition(Precondition::InvalidField(msg.to_string()))
}

fn required(value: &str, field: &str) -> Result<String, DomainError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(invalid(&format!("{field} must not be empty")));
    }
    Ok(v.to_string())
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn new_child(draft: &ChildDraft) -> Result<Child, DomainError> {
    Ok(Child {
        id: ChildId::new_v4(),
        name: required(&draft.name, "name")?,
        avatar: draft.avatar.trim().to_string(),
        points: 0,
    })
}

/// Rename or re-avatar a child. The balance is never editable.
pub fn edit_child(child: &mut Child, draft: &ChildDraft) -> Result<(), DomainError> {
    let name = required(&draft.name, "name")?;
    child.name = name;
    child.avatar = draft.avatar.trim().to_string();
    Ok(())
}

fn check_task(draft: &TaskDraft) -> Result<String, DomainError> {
    let title = required(&draft.title, "title")?;
    required(&draft.assigned_to, "assigned_to")?;
    if draft.points <= 0 {
        return Err(DomainError::precondition(Precondition::NonPositiveAmount(
            draft.points,
        )));
    }
    Ok(title)
}

pub fn new_task(draft: &TaskDraft, now: DateTime<Utc>) -> Result<Task, DomainError> {
    let title = check_task(draft)?;
    Ok(Task {
        id: TaskId::new_v4(),
        title,
        description: non_blank(draft.description.as_ref()),
        points: draft.points,
        assigned_to: ChildId::from(draft.assigned_to.trim()),
        due_date: draft.due_date,
        status: TaskStatus::Pending,
        repeat: draft.repeat,
        require_photo: draft.require_photo && !draft.is_penalty,
        photo: None,
        is_penalty: draft.is_penalty,
        last_submitted_date: None,
        created_at: now,
    })
}

/// Replace the editable fields of a task. Status is kept unless the task
/// turns into a penalty, which has no status flow.
pub fn edit_task(task: &mut Task, draft: &TaskDraft) -> Result<(), DomainError> {
    let title = check_task(draft)?;
    task.title = title;
    task.description = non_blank(draft.description.as_ref());
    task.points = draft.points;
    task.assigned_to = ChildId::from(draft.assigned_to.trim());
    task.due_date = draft.due_date;
    task.repeat = draft.repeat;
    task.require_photo = draft.require_photo && !draft.is_penalty;
    task.is_penalty = draft.is_penalty;
    if task.is_penalty || !task.is_daily() {
        task.last_submitted_date = None;
    }
    if task.is_penalty {
        task.status = TaskStatus::Pending;
        task.photo = None;
    }
    Ok(())
}

fn check_reward(draft: &RewardDraft) -> Result<String, DomainError> {
    let title = required(&draft.title, "title")?;
    if draft.cost <= 0 {
        return Err(DomainError::precondition(Precondition::NonPositiveAmount(
            draft.cost,
        )));
    }
    Ok(title)
}

pub fn new_reward(draft: &RewardDraft) -> Result<Reward, DomainError> {
    let title = check_reward(draft)?;
    Ok(Reward {
        id: RewardId::new_v4(),
        title,
        description: non_blank(draft.description.as_ref()),
        cost: draft.cost,
        icon: draft.icon.trim().to_string(),
        available: draft.available.unwrap_or(true),
    })
}

/// `available: None` leaves availability as it was.
pub fn edit_reward(reward: &mut Reward, draft: &RewardDraft) -> Result<(), DomainError> {
    let title = check_reward(draft)?;
    reward.title = title;
    reward.description = non_blank(draft.description.as_ref());
    reward.cost = draft.cost;
    reward.icon = draft.icon.trim().to_string();
    if let Some(available) = draft.available {
        reward.available = available;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Repeat;

    fn draft() -> TaskDraft {
        TaskDraft {
            title: "  Dishes ".into(),
            description: Some("   ".into()),
            points: 5,
            assigned_to: "a".into(),
            due_date: None,
            repeat: Repeat::None,
            require_photo: true,
            is_penalty: false,
        }
    }

    #[test]
    fn new_task_trims_and_starts_pending() {
        let t = new_task(&draft(), Utc::now()).unwrap();
        assert_eq!(t.title, "Dishes");
        assert_eq!(t.description, None);
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.require_photo);
    }

    #[test]
    fn penalty_needs_positive_points_and_no_photo() {
        let mut d = draft();
        d.is_penalty = true;
        d.points = 0;
        assert!(new_task(&d, Utc::now()).is_err());
        d.points = 3;
        let t = new_task(&d, Utc::now()).unwrap();
        assert!(!t.require_photo);
    }

    #[test]
    fn tasks_and_rewards_need_positive_values() {
        let mut d = draft();
        d.points = 0;
        assert!(matches!(
            new_task(&d, Utc::now()),
            Err(DomainError::PreconditionFailed(Precondition::NonPositiveAmount(0)))
        ));
        let mut t = new_task(&draft(), Utc::now()).unwrap();
        d.points = -2;
        assert!(edit_task(&mut t, &d).is_err());
        assert_eq!(t.points, 5);

        let reward = RewardDraft {
            title: "Ice cream".into(),
            description: None,
            cost: 0,
            icon: "i".into(),
            available: None,
        };
        assert!(matches!(
            new_reward(&reward),
            Err(DomainError::PreconditionFailed(Precondition::NonPositiveAmount(0)))
        ));
    }

    #[test]
    fn empty_names_are_refused() {
        let err = new_child(&ChildDraft {
            name: " ".into(),
            avatar: "x".into(),
        })
        .unwrap_err();
        assert!(matches!(
            err,
            DomainError::PreconditionFailed(Precondition::InvalidField(_))
        ));
    }

    #[test]
    fn editing_a_child_keeps_points() {
        let mut c = new_child(&ChildDraft {
            name: "Alice".into(),
            avatar: "a".into(),
        })
        .unwrap();
        c.points = 7;
        edit_child(
            &mut c,
            &ChildDraft {
                name: "Ally".into(),
                avatar: "b".into(),
            },
        )
        .unwrap();
        assert_eq!((c.name.as_str(), c.points), ("Ally", 7));
    }

    #[test]
    fn reward_availability_toggle() {
        let mut r = new_reward(&RewardDraft {
            title: "Movie".into(),
            description: None,
            cost: 10,
            icon: "m".into(),
            available: None,
        })
        .unwrap();
        assert!(r.available);
        let mut d = RewardDraft {
            title: "Movie".into(),
            description: None,
            cost: 12,
            icon: "m".into(),
            available: Some(false),
        };
        edit_reward(&mut r, &d).unwrap();
        assert!(!r.available);
        d.available = None;
        edit_reward(&mut r, &d).unwrap();
        assert!(!r.available);
        assert_eq!(r.cost, 12);
    }
}
