use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::{API_V1_PREFIX, family_scope};

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

pub fn auth_login(base: &str) -> String {
    base_join(base, &format!("{}/auth/login", API_V1_PREFIX))
}
pub fn auth_logout(base: &str) -> String {
    base_join(base, &format!("{}/auth/logout", API_V1_PREFIX))
}
pub fn children(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/children", family_scope(family_id)))
}
pub fn child_ledger(base: &str, family_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/ledger",
            family_scope(family_id),
            enc(child_id)
        ),
    )
}
pub fn child_streak(base: &str, family_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/streak",
            family_scope(family_id),
            enc(child_id)
        ),
    )
}
pub fn child_achievements(base: &str, family_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/achievements",
            family_scope(family_id),
            enc(child_id)
        ),
    )
}
pub fn household_progress(base: &str, family_id: &str) -> String {
    base_join(
        base,
        &format!("{}/household/progress", family_scope(family_id)),
    )
}
pub fn child_tasks(base: &str, family_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/tasks",
            family_scope(family_id),
            enc(child_id)
        ),
    )
}
fn child_task(base: &str, family_id: &str, child_id: &str, task_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/tasks/{}",
            family_scope(family_id),
            enc(child_id),
            enc(task_id)
        ),
    )
}
pub fn task_complete(base: &str, family_id: &str, child_id: &str, task_id: &str) -> String {
    format!("{}/complete", child_task(base, family_id, child_id, task_id))
}
pub fn task_help(base: &str, family_id: &str, child_id: &str, task_id: &str) -> String {
    format!("{}/help", child_task(base, family_id, child_id, task_id))
}
pub fn task_help_resolve(base: &str, family_id: &str, child_id: &str, task_id: &str) -> String {
    format!(
        "{}/help/resolve",
        child_task(base, family_id, child_id, task_id)
    )
}
pub fn task_approve(base: &str, family_id: &str, child_id: &str, task_id: &str) -> String {
    format!("{}/approve", child_task(base, family_id, child_id, task_id))
}
pub fn task_reject(base: &str, family_id: &str, child_id: &str, task_id: &str) -> String {
    format!("{}/reject", child_task(base, family_id, child_id, task_id))
}
pub fn task_delete(base: &str, family_id: &str, child_id: &str, task_id: &str) -> String {
    child_task(base, family_id, child_id, task_id)
}
pub fn approvals(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/approvals", family_scope(family_id)))
}
pub fn rewards(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/rewards", family_scope(family_id)))
}
pub fn reward_deactivate(base: &str, family_id: &str, reward_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/rewards/{}/deactivate",
            family_scope(family_id),
            enc(reward_id)
        ),
    )
}
pub fn reward_suggest(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/rewards/suggest", family_scope(family_id)))
}
pub fn child_redemptions(base: &str, family_id: &str, child_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/children/{}/redemptions",
            family_scope(family_id),
            enc(child_id)
        ),
    )
}
pub fn redemptions(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/redemptions", family_scope(family_id)))
}
pub fn redemption_approve(base: &str, family_id: &str, redemption_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/redemptions/{}/approve",
            family_scope(family_id),
            enc(redemption_id)
        ),
    )
}
pub fn redemption_reject(base: &str, family_id: &str, redemption_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/redemptions/{}/reject",
            family_scope(family_id),
            enc(redemption_id)
        ),
    )
}
pub fn redemption_remind(base: &str, family_id: &str, redemption_id: &str) -> String {
    base_join(
        base,
        &format!(
            "{}/redemptions/{}/remind",
            family_scope(family_id),
            enc(redemption_id)
        ),
    )
}
pub fn notifications(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/notifications", family_scope(family_id)))
}
pub fn notifications_count(base: &str, family_id: &str) -> String {
    base_join(
        base,
        &format!("{}/notifications/count", family_scope(family_id)),
    )
}
pub fn notification_read(base: &str, family_id: &str, id: i32) -> String {
    base_join(
        base,
        &format!("{}/notifications/{}/read", family_scope(family_id), id),
    )
}
pub fn activity(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/activity", family_scope(family_id)))
}
pub fn events(base: &str, family_id: &str) -> String {
    base_join(base, &format!("{}/events", family_scope(family_id)))
}
