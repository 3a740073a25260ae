use serde::{Deserialize, Serialize};

/// Free families can keep at most this many active items per scope (active
/// tasks per child, active rewards per family).
pub const FREE_ACTIVE_LIMIT: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Premium,
}

impl Default for Plan {
    fn default() -> Self {
        Plan::Free
    }
}

impl Plan {
    pub fn is_premium(self) -> bool {
        matches!(self, Plan::Premium)
    }

    /// Whether one more active item may be created given the current count.
    pub fn allows_new_active(self, current_active: i64) -> bool {
        self.is_premium() || current_active < FREE_ACTIVE_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_plan_caps_active_items_at_three() {
        assert!(Plan::Free.allows_new_active(0));
        assert!(Plan::Free.allows_new_active(2));
        assert!(!Plan::Free.allows_new_active(3));
        assert!(!Plan::Free.allows_new_active(10));
    }

    #[test]
    fn premium_plan_has_no_cap() {
        assert!(Plan::Premium.allows_new_active(0));
        assert!(Plan::Premium.allows_new_active(3));
        assert!(Plan::Premium.allows_new_active(1000));
    }
}
