use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Child {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    Pending,
    Approved,
    Rejected,
}

impl RedemptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RedemptionStatus::Pending => "pending",
            RedemptionStatus::Approved => "approved",
            RedemptionStatus::Rejected => "rejected",
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RedemptionStatus::Pending)
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown redemption status: {0}")]
pub struct UnknownRedemptionStatus(pub String);

impl FromStr for RedemptionStatus {
    type Err = UnknownRedemptionStatus;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RedemptionStatus::Pending),
            "approved" => Ok(RedemptionStatus::Approved),
            "rejected" => Ok(RedemptionStatus::Rejected),
            other => Err(UnknownRedemptionStatus(other.to_string())),
        }
    }
}

/// What an achievement measures. Progress for `StreakDays` uses the longest
/// streak so an earned badge cannot regress when a streak breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCriteria {
    TasksCompleted,
    PointsEarned,
    StreakDays,
}

impl AchievementCriteria {
    pub fn as_str(self) -> &'static str {
        match self {
            AchievementCriteria::TasksCompleted => "tasks_completed",
            AchievementCriteria::PointsEarned => "points_earned",
            AchievementCriteria::StreakDays => "streak_days",
        }
    }
}

impl fmt::Display for AchievementCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown achievement criteria: {0}")]
pub struct UnknownAchievementCriteria(pub String);

/// An achievement definition as authored in server config and seeded into
/// the store at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementDef {
    pub id: String,
    pub title: String,
    pub description: String,
    pub criteria: AchievementCriteria,
    pub threshold: i32,
}

impl FromStr for AchievementCriteria {
    type Err = UnknownAchievementCriteria;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tasks_completed" => Ok(AchievementCriteria::TasksCompleted),
            "points_earned" => Ok(AchievementCriteria::PointsEarned),
            "streak_days" => Ok(AchievementCriteria::StreakDays),
            other => Err(UnknownAchievementCriteria(other.to_string())),
        }
    }
}
