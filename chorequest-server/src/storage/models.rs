use crate::storage::schema::{
    achievements, activity_feed, children, notifications, redemptions, rewards, streaks, tasks,
    user_achievements,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = children)]
pub struct Child {
    pub id: String,
    pub display_name: String,
}

#[derive(Insertable)]
#[diesel(table_name = children)]
pub struct NewChild<'a> {
    pub id: &'a str,
    pub display_name: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(belongs_to(Child, foreign_key = child_id))]
pub struct Task {
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
    pub help_requested_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub approved_at: Option<NaiveDateTime>,
    pub approved_by: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask<'a> {
    pub id: &'a str,
    pub child_id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub points: i32,
    pub category: Option<&'a str>,
    pub created_by: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = rewards)]
pub struct Reward {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub cost: i32,
    pub active: bool,
    pub created_by: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = rewards)]
pub struct NewReward<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: Option<&'a str>,
    pub cost: i32,
    pub created_by: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = redemptions)]
#[diesel(belongs_to(Child, foreign_key = child_id))]
#[diesel(belongs_to(Reward, foreign_key = reward_id))]
pub struct Redemption {
    pub id: String,
    pub reward_id: String,
    pub child_id: String,
    pub points_spent: i32,
    pub status: String,
    pub redeemed_at: NaiveDateTime,
    pub approved_at: Option<NaiveDateTime>,
    pub approved_by: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = redemptions)]
pub struct NewRedemption<'a> {
    pub id: &'a str,
    pub reward_id: &'a str,
    pub child_id: &'a str,
    pub points_spent: i32,
    pub status: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = streaks)]
#[diesel(primary_key(child_id))]
pub struct Streak {
    pub child_id: String,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_completed_on: Option<NaiveDate>,
    pub total_completed: i32,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = streaks)]
pub struct NewStreak<'a> {
    pub child_id: &'a str,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_completed_on: Option<NaiveDate>,
    pub total_completed: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = achievements)]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub description: String,
    pub criteria: String,
    pub threshold: i32,
}

#[derive(Insertable)]
#[diesel(table_name = achievements)]
pub struct NewAchievement<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub criteria: &'a str,
    pub threshold: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Selectable)]
#[diesel(table_name = user_achievements)]
#[diesel(belongs_to(Child, foreign_key = child_id))]
#[diesel(belongs_to(Achievement, foreign_key = achievement_id))]
pub struct UserAchievement {
    pub id: i32,
    pub child_id: String,
    pub achievement_id: String,
    pub progress: i64,
    pub earned: bool,
    pub earned_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = activity_feed)]
pub struct ActivityEntry {
    pub id: i32,
    pub child_id: String,
    pub actor: String,
    pub kind: String,
    pub message: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = activity_feed)]
pub struct NewActivityEntry<'a> {
    pub child_id: &'a str,
    pub actor: &'a str,
    pub kind: &'a str,
    pub message: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: i32,
    pub recipient_role: String,
    pub child_id: Option<String>,
    pub kind: String,
    pub message: String,
    pub read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification<'a> {
    pub recipient_role: &'a str,
    pub child_id: Option<&'a str>,
    pub kind: &'a str,
    pub message: &'a str,
}

use crate::storage::schema::sessions;

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub username: &'a str,
}
