use serde::{Deserialize, Serialize};

use crate::domain::{AchievementCriteria, RedemptionStatus};

pub mod endpoints;

pub const API_V1_PREFIX: &str = "/api/v1";

/// Root of all family-scoped routes: `/api/v1/family/{family_id}`.
pub fn family_scope(family_id: &str) -> String {
    format!("{API_V1_PREFIX}/family/{family_id}")
}

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
}

// Children
#[derive(Debug, Serialize, Deserialize)]
pub struct ChildDto {
    pub id: String,
    pub display_name: String,
}

// Tasks
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskDto {
    pub id: String,
    pub child_id: String,
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub category: Option<String>,
    pub created_by: String,
    pub completed: bool,
    pub approved: bool,
    pub help_requested: bool,
    pub help_message: Option<String>,
    pub created_at: String, // RFC3339 UTC
    pub completed_at: Option<String>,
    pub approved_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskReq {
    pub title: String,
    pub description: Option<String>,
    pub points: i32,
    pub category: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HelpRequestReq {
    pub message: String,
}

/// A completion waiting in the parent approval queue.
#[derive(Debug, Serialize, Deserialize)]
pub struct PendingApprovalDto {
    pub task_id: String,
    pub child_id: String,
    pub child_display_name: String,
    pub title: String,
    pub points: i32,
    pub completed_at: Option<String>,
}

// Rewards
#[derive(Debug, Serialize, Deserialize)]
pub struct RewardDto {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub cost: i32,
    pub active: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRewardReq {
    pub title: String,
    pub description: Option<String>,
    pub cost: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestRewardReq {
    pub name: String,
    pub description: Option<String>,
    pub suggested_cost: i32,
}

// Redemptions
#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemReq {
    pub reward_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedemptionDto {
    pub id: String,
    pub reward_id: String,
    pub reward_title: String,
    pub child_id: String,
    pub points_spent: i32,
    pub status: RedemptionStatus,
    pub redeemed_at: String,
    pub approved_at: Option<String>,
    pub approved_by: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingRedemptionDto {
    pub redemption_id: String,
    pub child_id: String,
    pub child_display_name: String,
    pub reward_title: String,
    pub points_spent: i32,
    pub redeemed_at: String,
}

// Ledger / progress
#[derive(Debug, Serialize, Deserialize)]
pub struct LedgerDto {
    pub child_id: String,
    pub earned_points: i64,
    pub spent_points: i64,
    pub balance: i64,
    pub level: i32,
    pub xp_into_level: i64,
    pub xp_for_next_level: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StreakDto {
    pub child_id: String,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub total_completed: i32,
    pub last_completed_on: Option<String>, // YYYY-MM-DD, family-local
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AchievementProgressDto {
    pub id: String,
    pub title: String,
    pub description: String,
    pub criteria: AchievementCriteria,
    pub threshold: i32,
    pub progress: i64,
    pub earned: bool,
    pub earned_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HouseholdChildDto {
    pub child_id: String,
    pub display_name: String,
    pub balance: i64,
    pub level: i32,
    pub xp_into_level: i64,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub total_completed: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HouseholdLeadersDto {
    pub highest_level: Option<String>,
    pub best_current_streak: Option<String>,
    pub longest_streak: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HouseholdSummaryDto {
    pub level: i32,
    pub xp_into_level: i64,
    pub xp_for_next_level: i64,
    pub best_current_streak: i32,
    pub best_longest_streak: i32,
    pub total_completed: i64,
    pub leaders: HouseholdLeadersDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HouseholdProgressDto {
    pub children: Vec<HouseholdChildDto>,
    pub summary: HouseholdSummaryDto,
}

// Notifications & activity
#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationDto {
    pub id: i32,
    pub kind: String,
    pub message: String,
    pub child_id: Option<String>,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationCountDto {
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActivityItemDto {
    pub id: i32,
    pub child_id: String,
    pub actor: String,
    pub kind: String,
    pub message: String,
    pub created_at: String,
}

/// Pushed over the SSE stream; clients refetch whatever the event names
/// rather than patching local state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    LedgerUpdated {
        child_id: String,
        balance: i64,
        level: i32,
    },
    PendingCount {
        count: i64,
    },
    ActivityAdded {
        child_id: String,
    },
}
