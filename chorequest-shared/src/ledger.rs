//! The points ledger: balance, level and household aggregates derived from
//! the approved-task and approved-redemption logs.
//!
//! Nothing here is stored anywhere. The server recomputes these values from
//! rows on every read, so there is no counter to race on and no cache to
//! reconcile; callers that want memoization layer it on top (see the
//! server's per-child cache).

/// Flat experience curve: every level spans the same number of points.
pub const XP_PER_LEVEL: i64 = 100;

/// Aggregates derived for a single child.
///
/// `balance` is the raw ledger value and may be negative when approved
/// redemptions outrun earnings. `level` and `xp_into_level` are computed on
/// the balance clamped to zero, so level never drops below 1 and xp stays in
/// `[0, XP_PER_LEVEL)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSummary {
    pub earned_points: i64,
    pub spent_points: i64,
    pub balance: i64,
    pub level: i32,
    pub xp_into_level: i64,
    pub xp_for_next_level: i64,
}

impl LedgerSummary {
    pub fn from_totals(earned_points: i64, spent_points: i64) -> Self {
        let balance = earned_points - spent_points;
        let display = balance.max(0);
        LedgerSummary {
            earned_points,
            spent_points,
            balance,
            level: level_for_balance(balance),
            xp_into_level: display % XP_PER_LEVEL,
            xp_for_next_level: XP_PER_LEVEL,
        }
    }

    /// Summarize straight from the two logs: point values of approved tasks
    /// and snapshotted costs of approved redemptions. Callers filter to the
    /// approved rows; completion alone never reaches this function.
    pub fn from_logs<T, R>(approved_task_points: T, approved_redemption_costs: R) -> Self
    where
        T: IntoIterator<Item = i64>,
        R: IntoIterator<Item = i64>,
    {
        let earned: i64 = approved_task_points.into_iter().sum();
        let spent: i64 = approved_redemption_costs.into_iter().sum();
        Self::from_totals(earned, spent)
    }

    pub fn zero() -> Self {
        Self::from_totals(0, 0)
    }
}

/// `floor(balance / 100) + 1`, clamped so a negative balance reads as level 1.
pub fn level_for_balance(balance: i64) -> i32 {
    (balance.max(0) / XP_PER_LEVEL) as i32 + 1
}

/// Per-child inputs to the household roll-up, in display order. The order is
/// significant: leader ties break toward the first entry.
#[derive(Debug, Clone)]
pub struct ChildProgress {
    pub child_id: String,
    pub ledger: LedgerSummary,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub total_completed: i64,
}

/// Which child leads each metric; `None` when there are no children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leaders {
    pub highest_level: Option<String>,
    pub best_current_streak: Option<String>,
    pub longest_streak: Option<String>,
}

/// The parent-dashboard roll-up over all children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HouseholdSummary {
    /// Max level across children; xp fields come from the same child.
    pub level: i32,
    pub xp_into_level: i64,
    pub xp_for_next_level: i64,
    pub best_current_streak: i32,
    pub best_longest_streak: i32,
    /// Summed, unlike the other metrics.
    pub total_completed: i64,
    pub leaders: Leaders,
}

pub fn household_summary(children: &[ChildProgress]) -> HouseholdSummary {
    let mut out = HouseholdSummary {
        level: 1,
        xp_into_level: 0,
        xp_for_next_level: XP_PER_LEVEL,
        best_current_streak: 0,
        best_longest_streak: 0,
        total_completed: 0,
        leaders: Leaders::default(),
    };

    for child in children {
        out.total_completed += child.total_completed;

        if out.leaders.highest_level.is_none() || child.ledger.level > out.level {
            out.level = child.ledger.level;
            out.xp_into_level = child.ledger.xp_into_level;
            out.xp_for_next_level = child.ledger.xp_for_next_level;
            out.leaders.highest_level = Some(child.child_id.clone());
        }
        if out.leaders.best_current_streak.is_none() || child.current_streak > out.best_current_streak
        {
            out.best_current_streak = child.current_streak;
            out.leaders.best_current_streak = Some(child.child_id.clone());
        }
        if out.leaders.longest_streak.is_none() || child.longest_streak > out.best_longest_streak {
            out.best_longest_streak = child.longest_streak;
            out.leaders.longest_streak = Some(child.child_id.clone());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(id: &str, earned: i64, current: i32, longest: i32, total: i64) -> ChildProgress {
        ChildProgress {
            child_id: id.to_string(),
            ledger: LedgerSummary::from_totals(earned, 0),
            current_streak: current,
            longest_streak: longest,
            total_completed: total,
        }
    }

    #[test]
    fn balance_is_earned_minus_spent() {
        let s = LedgerSummary::from_logs([30, 70], [40]);
        assert_eq!(s.earned_points, 100);
        assert_eq!(s.spent_points, 40);
        assert_eq!(s.balance, 60);
        assert_eq!(s.level, 1);
        assert_eq!(s.xp_into_level, 60);
        assert_eq!(s.xp_for_next_level, 100);
    }

    #[test]
    fn balance_is_order_independent() {
        let a = LedgerSummary::from_logs([5, 25, 70], [10, 30]);
        let b = LedgerSummary::from_logs([70, 5, 25], [30, 10]);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_logs_yield_zeroes() {
        let s = LedgerSummary::from_logs([], []);
        assert_eq!(s, LedgerSummary::zero());
        assert_eq!(s.balance, 0);
        assert_eq!(s.level, 1);
        assert_eq!(s.xp_into_level, 0);
    }

    #[test]
    fn level_rolls_over_every_hundred() {
        let s = LedgerSummary::from_totals(250, 0);
        assert_eq!(s.balance, 250);
        assert_eq!(s.level, 3);
        assert_eq!(s.xp_into_level, 50);
    }

    #[test]
    fn level_is_monotonic_in_balance() {
        let balances = [-150, -1, 0, 1, 99, 100, 101, 250, 999, 1000];
        for pair in balances.windows(2) {
            assert!(
                level_for_balance(pair[0]) <= level_for_balance(pair[1]),
                "level must not decrease from balance {} to {}",
                pair[0],
                pair[1]
            );
        }
        assert_eq!(level_for_balance(0), 1);
        assert_eq!(level_for_balance(99), 1);
        assert_eq!(level_for_balance(100), 2);
    }

    #[test]
    fn negative_balance_reports_audit_value_but_clamps_progress() {
        let s = LedgerSummary::from_totals(50, 120);
        assert_eq!(s.balance, -70);
        assert_eq!(s.level, 1);
        assert_eq!(s.xp_into_level, 0);
    }

    #[test]
    fn household_takes_max_streaks_and_sums_totals() {
        let children = vec![
            progress("ala", 120, 5, 9, 14),
            progress("bruno", 260, 2, 11, 20),
        ];
        let hh = household_summary(&children);
        assert_eq!(hh.best_current_streak, 5);
        assert_eq!(hh.best_longest_streak, 11);
        assert_eq!(hh.total_completed, 34);
        // Level comes from bruno (260 points => level 3, 60 xp in).
        assert_eq!(hh.level, 3);
        assert_eq!(hh.xp_into_level, 60);
        assert_eq!(hh.leaders.highest_level.as_deref(), Some("bruno"));
        assert_eq!(hh.leaders.best_current_streak.as_deref(), Some("ala"));
        assert_eq!(hh.leaders.longest_streak.as_deref(), Some("bruno"));
    }

    #[test]
    fn household_leader_ties_break_to_first_child() {
        let children = vec![progress("ala", 100, 3, 3, 1), progress("bruno", 100, 3, 3, 1)];
        let hh = household_summary(&children);
        assert_eq!(hh.leaders.highest_level.as_deref(), Some("ala"));
        assert_eq!(hh.leaders.best_current_streak.as_deref(), Some("ala"));
        assert_eq!(hh.leaders.longest_streak.as_deref(), Some("ala"));
    }

    #[test]
    fn household_of_no_children_has_no_leaders() {
        let hh = household_summary(&[]);
        assert_eq!(hh.level, 1);
        assert_eq!(hh.total_completed, 0);
        assert_eq!(hh.leaders, Leaders::default());
    }

    #[test]
    fn zero_streak_child_still_becomes_leader_when_alone() {
        let hh = household_summary(&[progress("ala", 0, 0, 0, 0)]);
        assert_eq!(hh.best_current_streak, 0);
        assert_eq!(hh.leaders.best_current_streak.as_deref(), Some("ala"));
    }
}
