use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::{API_PREFIX, Collection};

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

pub fn health(base: &str) -> String {
    base_join(base, "/healthz")
}
pub fn collection(base: &str, c: Collection) -> String {
    base_join(base, &format!("{}/{}", API_PREFIX, c.as_str()))
}
pub fn events(base: &str) -> String {
    base_join(base, &format!("{}/events", API_PREFIX))
}
pub fn config_pin(base: &str) -> String {
    base_join(base, &format!("{}/config/pin", API_PREFIX))
}

pub fn children(base: &str) -> String {
    collection(base, Collection::Children)
}
pub fn child(base: &str, child_id: &str) -> String {
    base_join(base, &format!("{}/children/{}", API_PREFIX, enc(child_id)))
}
pub fn child_deduct(base: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!("{}/children/{}/deduct", API_PREFIX, enc(child_id)),
    )
}

pub fn tasks(base: &str) -> String {
    collection(base, Collection::Tasks)
}
pub fn task(base: &str, task_id: &str) -> String {
    base_join(base, &format!("{}/tasks/{}", API_PREFIX, enc(task_id)))
}
/// `action` is one of `done`, `approve`, `reject`, `execute`.
pub fn task_action(base: &str, task_id: &str, action: &str) -> String {
    base_join(
        base,
        &format!("{}/tasks/{}/{}", API_PREFIX, enc(task_id), action),
    )
}
pub fn tasks_rollover(base: &str) -> String {
    base_join(base, &format!("{}/tasks/rollover", API_PREFIX))
}

pub fn rewards(base: &str) -> String {
    collection(base, Collection::Rewards)
}
pub fn reward(base: &str, reward_id: &str) -> String {
    base_join(base, &format!("{}/rewards/{}", API_PREFIX, enc(reward_id)))
}
pub fn reward_redeem(base: &str, reward_id: &str) -> String {
    base_join(
        base,
        &format!("{}/rewards/{}/redeem", API_PREFIX, enc(reward_id)),
    )
}

pub fn redemption_fulfill(base: &str, redemption_id: &str) -> String {
    base_join(
        base,
        &format!("{}/redemptions/{}/fulfill", API_PREFIX, enc(redemption_id)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_and_encodes() {
        assert_eq!(
            task_action("http://h:1/", "a b", "approve"),
            "http://h:1/api/tasks/a%20b/approve"
        );
        assert_eq!(
            collection("http://h", Collection::PointHistory),
            "http://h/api/point_history"
        );
        assert_eq!(health("http://h/"), "http://h/healthz");
    }
}
