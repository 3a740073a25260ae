use chrono::NaiveDate;

/// Completion-streak state for one child, advanced once per approved task.
///
/// Dates are family-local calendar days; the caller converts "now" using the
/// configured timezone before calling [`StreakState::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreakState {
    pub current: i32,
    pub longest: i32,
    pub last_completed_on: Option<NaiveDate>,
    pub total_completed: i32,
}

impl StreakState {
    pub fn advance(self, today: NaiveDate) -> Self {
        let current = match self.last_completed_on {
            // Another approval on the same day keeps the streak where it is.
            Some(last) if last == today => self.current.max(1),
            Some(last) if last.succ_opt() == Some(today) => self.current + 1,
            // Gap of a day or more (or first approval ever) restarts at 1.
            _ => 1,
        };
        StreakState {
            current,
            longest: self.longest.max(current),
            last_completed_on: Some(today),
            total_completed: self.total_completed + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn first_approval_starts_at_one() {
        let s = StreakState::default().advance(d("2025-03-01"));
        assert_eq!(s.current, 1);
        assert_eq!(s.longest, 1);
        assert_eq!(s.total_completed, 1);
        assert_eq!(s.last_completed_on, Some(d("2025-03-01")));
    }

    #[test]
    fn same_day_keeps_streak_but_counts_completion() {
        let s = StreakState::default()
            .advance(d("2025-03-01"))
            .advance(d("2025-03-01"));
        assert_eq!(s.current, 1);
        assert_eq!(s.total_completed, 2);
    }

    #[test]
    fn consecutive_days_extend_streak() {
        let s = StreakState::default()
            .advance(d("2025-03-01"))
            .advance(d("2025-03-02"))
            .advance(d("2025-03-03"));
        assert_eq!(s.current, 3);
        assert_eq!(s.longest, 3);
        assert_eq!(s.total_completed, 3);
    }

    #[test]
    fn gap_resets_current_but_keeps_longest() {
        let s = StreakState::default()
            .advance(d("2025-03-01"))
            .advance(d("2025-03-02"))
            .advance(d("2025-03-05"));
        assert_eq!(s.current, 1);
        assert_eq!(s.longest, 2);
        assert_eq!(s.total_completed, 3);
    }

    #[test]
    fn crosses_month_boundary() {
        let s = StreakState::default()
            .advance(d("2025-03-31"))
            .advance(d("2025-04-01"));
        assert_eq!(s.current, 2);
    }
}
