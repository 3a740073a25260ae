pub mod models;
pub mod schema;
pub mod streak;

use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{
    Achievement, ActivityEntry, Child, NewAchievement, NewActivityEntry, NewChild, NewNotification,
    NewRedemption, NewReward, NewSession, NewStreak, NewTask, Notification, Redemption, Reward,
    Streak, Task, UserAchievement,
};
use streak::StreakState;
use tracing::trace;

use chorequest_shared::domain::{AchievementCriteria, AchievementDef, RedemptionStatus};

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The referenced row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The row exists but is not in a state the operation accepts.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Which inbox a notification query targets. Parents share one family-wide
/// inbox; each child sees only rows addressed to their id.
#[derive(Debug, Clone)]
pub enum Recipient {
    Parents,
    Child(String),
}

const RECIPIENT_PARENT: &str = "parent";
const RECIPIENT_CHILD: &str = "child";

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;

        // Run pending Diesel migrations on startup (auto-init empty DBs)
        {
            let pool_clone = pool.clone();
            tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
                const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
                let mut conn = pool_clone.get()?;
                configure_sqlite_conn(&mut conn)?;
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await??;
        }

        Ok(Store { pool })
    }

    pub async fn seed_from_config(
        &self,
        cfg_children: &[chorequest_shared::domain::Child],
        cfg_achievements: &[AchievementDef],
    ) -> Result<(), StorageError> {
        use schema::{achievements, children};

        let pool = self.pool.clone();
        let children_owned = cfg_children.to_owned();
        let achievements_owned = cfg_achievements.to_owned();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;

            // Upsert children; balances are always computed from the logs, so
            // there is no counter row to initialize.
            for c in &children_owned {
                let new_child = NewChild {
                    id: &c.id,
                    display_name: &c.display_name,
                };
                diesel::insert_into(children::table)
                    .values(&new_child)
                    .on_conflict(children::id)
                    .do_update()
                    .set(children::display_name.eq(new_child.display_name))
                    .execute(&mut conn)?;
            }

            // Upsert achievement definitions; earned rows survive re-seeding.
            for a in &achievements_owned {
                let criteria = a.criteria.as_str();
                let new_def = NewAchievement {
                    id: &a.id,
                    title: &a.title,
                    description: &a.description,
                    criteria,
                    threshold: a.threshold,
                };
                diesel::insert_into(achievements::table)
                    .values(&new_def)
                    .on_conflict(achievements::id)
                    .do_update()
                    .set((
                        achievements::title.eq(new_def.title),
                        achievements::description.eq(new_def.description),
                        achievements::criteria.eq(new_def.criteria),
                        achievements::threshold.eq(new_def.threshold),
                    ))
                    .execute(&mut conn)?;
            }

            Ok(())
        })
        .await?
    }

    pub async fn list_children(&self) -> Result<Vec<Child>, StorageError> {
        use schema::children::dsl::*;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Child>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(children
                .order(display_name.asc())
                .load::<Child>(&mut conn)?)
        })
        .await?
    }

    pub async fn child_exists(&self, child: &str) -> Result<bool, StorageError> {
        use schema::children::dsl::*;
        let pool = self.pool.clone();
        let child_id = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let count: i64 = children
                .filter(id.eq(&child_id))
                .count()
                .get_result(&mut conn)?;
            Ok(count > 0)
        })
        .await?
    }

    // --- tasks ---

    pub async fn create_task(
        &self,
        child: &str,
        title: &str,
        description: Option<&str>,
        points: i32,
        category: Option<&str>,
        created_by: &str,
    ) -> Result<Task, StorageError> {
        use schema::tasks;
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(StorageError::InvalidInput("task title is empty".into()));
        }
        if points <= 0 {
            return Err(StorageError::InvalidInput(
                "task points must be positive".into(),
            ));
        }
        let pool = self.pool.clone();
        let child = child.to_string();
        let description = description.map(|s| s.to_string());
        let category = category.map(|s| s.to_string());
        let creator = created_by.to_string();
        tokio::task::spawn_blocking(move || -> Result<Task, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let task_id = uuid::Uuid::new_v4().to_string();
            conn.immediate_transaction(|conn| -> Result<Task, StorageError> {
                load_child(conn, &child)?;
                let new_task = NewTask {
                    id: &task_id,
                    child_id: &child,
                    title: &title,
                    description: description.as_deref(),
                    points,
                    category: category.as_deref(),
                    created_by: &creator,
                };
                diesel::insert_into(tasks::table)
                    .values(&new_task)
                    .execute(conn)?;
                notify_child(
                    conn,
                    &child,
                    "task_assigned",
                    &format!("New task: \"{}\" (+{} pts)", title, points),
                )?;
                Ok(tasks::table
                    .filter(tasks::id.eq(&task_id))
                    .first::<Task>(conn)?)
            })
        })
        .await?
    }

    pub async fn list_tasks_for_child(&self, child: &str) -> Result<Vec<Task>, StorageError> {
        use schema::tasks;
        let pool = self.pool.clone();
        let child = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<Task>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(tasks::table
                .filter(tasks::child_id.eq(&child))
                .order(tasks::created_at.desc())
                .load::<Task>(&mut conn)?)
        })
        .await?
    }

    /// Count of a child's tasks that have not yet been approved; this is what
    /// the free-plan gate compares against.
    pub async fn active_task_count(&self, child: &str) -> Result<i64, StorageError> {
        use schema::tasks;
        let pool = self.pool.clone();
        let child = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<i64, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(tasks::table
                .filter(tasks::child_id.eq(&child))
                .filter(tasks::approved.eq(false))
                .count()
                .get_result(&mut conn)?)
        })
        .await?
    }

    pub async fn complete_task(
        &self,
        child: &str,
        task_id: &str,
        by_username: &str,
    ) -> Result<Task, StorageError> {
        use schema::tasks;
        let pool = self.pool.clone();
        let child = child.to_string();
        let tid = task_id.to_string();
        let user = by_username.to_string();
        tokio::task::spawn_blocking(move || -> Result<Task, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Task, StorageError> {
                let task = tasks::table
                    .filter(tasks::id.eq(&tid))
                    .filter(tasks::child_id.eq(&child))
                    .first::<Task>(conn)
                    .optional()?;
                let Some(task) = task else {
                    return Err(StorageError::NotFound(format!("task {tid} not found")));
                };
                if task.approved {
                    return Err(StorageError::Conflict("task is already approved".into()));
                }
                if task.completed {
                    return Err(StorageError::Conflict("task is already completed".into()));
                }
                let now = Utc::now().naive_utc();
                diesel::update(tasks::table.filter(tasks::id.eq(&tid)))
                    .set((
                        tasks::completed.eq(true),
                        tasks::completed_at.eq(Some(now)),
                    ))
                    .execute(conn)?;
                let child_row = load_child(conn, &child)?;
                add_activity(
                    conn,
                    &child,
                    &user,
                    "task_completed",
                    &format!("{} completed \"{}\"", child_row.display_name, task.title),
                )?;
                notify_parents(
                    conn,
                    Some(&child),
                    "task_completed",
                    &format!(
                        "{} finished \"{}\" and is waiting for approval",
                        child_row.display_name, task.title
                    ),
                )?;
                Ok(tasks::table
                    .filter(tasks::id.eq(&tid))
                    .first::<Task>(conn)?)
            })
        })
        .await?
    }

    pub async fn request_help(
        &self,
        child: &str,
        task_id: &str,
        message: &str,
    ) -> Result<Task, StorageError> {
        use schema::tasks;
        // Reject blank messages before touching the database at all.
        let message = message.trim().to_string();
        if message.is_empty() {
            return Err(StorageError::InvalidInput(
                "help message must not be blank".into(),
            ));
        }
        let pool = self.pool.clone();
        let child = child.to_string();
        let tid = task_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Task, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Task, StorageError> {
                let task = tasks::table
                    .filter(tasks::id.eq(&tid))
                    .filter(tasks::child_id.eq(&child))
                    .first::<Task>(conn)
                    .optional()?;
                let Some(task) = task else {
                    return Err(StorageError::NotFound(format!("task {tid} not found")));
                };
                if task.completed || task.approved {
                    return Err(StorageError::Conflict(
                        "help is only available while the task is in progress".into(),
                    ));
                }
                let now = Utc::now().naive_utc();
                diesel::update(tasks::table.filter(tasks::id.eq(&tid)))
                    .set((
                        tasks::help_requested.eq(true),
                        tasks::help_message.eq(Some(message.as_str())),
                        tasks::help_requested_at.eq(Some(now)),
                    ))
                    .execute(conn)?;
                let child_row = load_child(conn, &child)?;
                notify_parents(
                    conn,
                    Some(&child),
                    "help_requested",
                    &format!(
                        "{} needs help with \"{}\": {}",
                        child_row.display_name, task.title, message
                    ),
                )?;
                Ok(tasks::table
                    .filter(tasks::id.eq(&tid))
                    .first::<Task>(conn)?)
            })
        })
        .await?
    }

    pub async fn resolve_help(&self, child: &str, task_id: &str) -> Result<(), StorageError> {
        use schema::tasks;
        let pool = self.pool.clone();
        let child = child.to_string();
        let tid = task_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let updated = diesel::update(
                tasks::table
                    .filter(tasks::id.eq(&tid))
                    .filter(tasks::child_id.eq(&child)),
            )
            .set((
                tasks::help_requested.eq(false),
                tasks::help_message.eq(None::<String>),
                tasks::help_requested_at.eq(None::<chrono::NaiveDateTime>),
            ))
            .execute(&mut conn)?;
            if updated == 0 {
                return Err(StorageError::NotFound(format!("task {tid} not found")));
            }
            Ok(())
        })
        .await?
    }

    /// Approve a completed task. One transaction flips the row, advances the
    /// streak for `today` (family-local date), re-scores achievements and
    /// writes the feed/notification rows. Approving an already-approved task
    /// is a no-op so retries cannot double-award.
    pub async fn approve_task(
        &self,
        child: &str,
        task_id: &str,
        approver: &str,
        today: NaiveDate,
    ) -> Result<Task, StorageError> {
        use schema::tasks;
        let pool = self.pool.clone();
        let child = child.to_string();
        let tid = task_id.to_string();
        let approver = approver.to_string();
        trace!(child_id = %child, task_id = %tid, "approve_task starting");
        tokio::task::spawn_blocking(move || -> Result<Task, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Task, StorageError> {
                let task = tasks::table
                    .filter(tasks::id.eq(&tid))
                    .filter(tasks::child_id.eq(&child))
                    .first::<Task>(conn)
                    .optional()?;
                let Some(task) = task else {
                    return Err(StorageError::NotFound(format!("task {tid} not found")));
                };
                if task.approved {
                    return Ok(task);
                }
                if !task.completed {
                    return Err(StorageError::Conflict(
                        "task has not been completed yet".into(),
                    ));
                }
                let now = Utc::now().naive_utc();
                diesel::update(tasks::table.filter(tasks::id.eq(&tid)))
                    .set((
                        tasks::approved.eq(true),
                        tasks::approved_at.eq(Some(now)),
                        tasks::approved_by.eq(Some(approver.as_str())),
                    ))
                    .execute(conn)?;
                let child_row = load_child(conn, &child)?;
                let state = load_streak_state(conn, &child)?.advance(today);
                upsert_streak(conn, &child, &state)?;
                let newly = update_achievements(conn, &child, &state)?;
                add_activity(
                    conn,
                    &child,
                    &approver,
                    "task_approved",
                    &format!(
                        "{} earned {} pts for \"{}\"",
                        child_row.display_name, task.points, task.title
                    ),
                )?;
                notify_child(
                    conn,
                    &child,
                    "task_approved",
                    &format!("\"{}\" was approved: +{} pts", task.title, task.points),
                )?;
                for a in &newly {
                    add_activity(
                        conn,
                        &child,
                        &approver,
                        "achievement_earned",
                        &format!("{} unlocked \"{}\"", child_row.display_name, a.title),
                    )?;
                    notify_child(
                        conn,
                        &child,
                        "achievement_earned",
                        &format!("Achievement unlocked: {}", a.title),
                    )?;
                }
                Ok(tasks::table
                    .filter(tasks::id.eq(&tid))
                    .first::<Task>(conn)?)
            })
        })
        .await?
    }

    pub async fn reject_task(
        &self,
        child: &str,
        task_id: &str,
    ) -> Result<Task, StorageError> {
        use schema::tasks;
        let pool = self.pool.clone();
        let child = child.to_string();
        let tid = task_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Task, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Task, StorageError> {
                let task = tasks::table
                    .filter(tasks::id.eq(&tid))
                    .filter(tasks::child_id.eq(&child))
                    .first::<Task>(conn)
                    .optional()?;
                let Some(task) = task else {
                    return Err(StorageError::NotFound(format!("task {tid} not found")));
                };
                if task.approved {
                    return Err(StorageError::Conflict("task is already approved".into()));
                }
                if !task.completed {
                    return Err(StorageError::Conflict(
                        "task is not awaiting approval".into(),
                    ));
                }
                diesel::update(tasks::table.filter(tasks::id.eq(&tid)))
                    .set((
                        tasks::completed.eq(false),
                        tasks::completed_at.eq(None::<chrono::NaiveDateTime>),
                    ))
                    .execute(conn)?;
                notify_child(
                    conn,
                    &child,
                    "task_rejected",
                    &format!("\"{}\" was sent back: give it another go", task.title),
                )?;
                Ok(tasks::table
                    .filter(tasks::id.eq(&tid))
                    .first::<Task>(conn)?)
            })
        })
        .await?
    }

    /// Remove a task in any state and return the deleted row; callers use the
    /// `approved` flag to decide whether earned points changed.
    pub async fn delete_task(&self, child: &str, task_id: &str) -> Result<Task, StorageError> {
        use schema::tasks;
        let pool = self.pool.clone();
        let child = child.to_string();
        let tid = task_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Task, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<Task, StorageError> {
                let task = tasks::table
                    .filter(tasks::id.eq(&tid))
                    .filter(tasks::child_id.eq(&child))
                    .first::<Task>(conn)
                    .optional()?;
                let Some(task) = task else {
                    return Err(StorageError::NotFound(format!("task {tid} not found")));
                };
                diesel::delete(tasks::table.filter(tasks::id.eq(&tid))).execute(conn)?;
                Ok(task)
            })
        })
        .await?
    }

    pub async fn list_pending_approvals(&self) -> Result<Vec<(Task, Child)>, StorageError> {
        use schema::{children, tasks};
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<(Task, Child)>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let rows = tasks::table
                .inner_join(children::table.on(children::id.eq(tasks::child_id)))
                .filter(tasks::completed.eq(true))
                .filter(tasks::approved.eq(false))
                .order(tasks::completed_at.desc())
                .select((tasks::all_columns, (children::id, children::display_name)))
                .load::<(Task, Child)>(&mut conn)?;
            Ok(rows)
        })
        .await?
    }

    pub async fn pending_approvals_count(&self) -> Result<i64, StorageError> {
        use schema::tasks;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<i64, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(tasks::table
                .filter(tasks::completed.eq(true))
                .filter(tasks::approved.eq(false))
                .count()
                .get_result(&mut conn)?)
        })
        .await?
    }

    // --- rewards ---

    pub async fn create_reward(
        &self,
        title: &str,
        description: Option<&str>,
        cost: i32,
        created_by: &str,
    ) -> Result<Reward, StorageError> {
        use schema::rewards;
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(StorageError::InvalidInput("reward title is empty".into()));
        }
        if cost <= 0 {
            return Err(StorageError::InvalidInput(
                "reward cost must be positive".into(),
            ));
        }
        let pool = self.pool.clone();
        let description = description.map(|s| s.to_string());
        let creator = created_by.to_string();
        tokio::task::spawn_blocking(move || -> Result<Reward, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let reward_id = uuid::Uuid::new_v4().to_string();
            let new_reward = NewReward {
                id: &reward_id,
                title: &title,
                description: description.as_deref(),
                cost,
                created_by: &creator,
            };
            diesel::insert_into(rewards::table)
                .values(&new_reward)
                .execute(&mut conn)?;
            Ok(rewards::table
                .filter(rewards::id.eq(&reward_id))
                .first::<Reward>(&mut conn)?)
        })
        .await?
    }

    pub async fn list_rewards(&self, active_only: bool) -> Result<Vec<Reward>, StorageError> {
        use schema::rewards;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<Reward>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let mut query = rewards::table.into_boxed();
            if active_only {
                query = query.filter(rewards::active.eq(true));
            }
            Ok(query
                .order(rewards::title.asc())
                .load::<Reward>(&mut conn)?)
        })
        .await?
    }

    pub async fn active_reward_count(&self) -> Result<i64, StorageError> {
        use schema::rewards;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<i64, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(rewards::table
                .filter(rewards::active.eq(true))
                .count()
                .get_result(&mut conn)?)
        })
        .await?
    }

    /// Rewards are deactivated, never deleted, so settled redemptions keep a
    /// valid reference.
    pub async fn deactivate_reward(&self, reward_id: &str) -> Result<(), StorageError> {
        use schema::rewards;
        let pool = self.pool.clone();
        let rid = reward_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let updated = diesel::update(rewards::table.filter(rewards::id.eq(&rid)))
                .set(rewards::active.eq(false))
                .execute(&mut conn)?;
            if updated == 0 {
                return Err(StorageError::NotFound(format!("reward {rid} not found")));
            }
            Ok(())
        })
        .await?
    }

    /// A child's reward proposal lands in the parent inbox only; no reward or
    /// redemption row is created.
    pub async fn suggest_reward(
        &self,
        child: &str,
        name: &str,
        description: Option<&str>,
        suggested_cost: i32,
    ) -> Result<(), StorageError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(StorageError::InvalidInput(
                "suggested reward name is empty".into(),
            ));
        }
        if suggested_cost <= 0 {
            return Err(StorageError::InvalidInput(
                "suggested cost must be positive".into(),
            ));
        }
        let pool = self.pool.clone();
        let child = child.to_string();
        let description = description.map(|s| s.to_string());
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<(), StorageError> {
                let child_row = load_child(conn, &child)?;
                let mut message = format!(
                    "{} suggests a new reward: \"{}\" for {} pts",
                    child_row.display_name, name, suggested_cost
                );
                if let Some(d) = description.as_deref() {
                    message.push_str(&format!(" ({d})"));
                }
                notify_parents(conn, Some(&child), "reward_suggested", &message)?;
                Ok(())
            })
        })
        .await?
    }

    // --- redemptions ---

    /// Request a redemption for an active reward. The reward's current cost is
    /// snapshotted into `points_spent` in the same transaction, so a later
    /// price change cannot alter what this request will deduct. A pending
    /// request reserves nothing; the deduction happens only on approval.
    pub async fn request_redemption(
        &self,
        child: &str,
        reward_id: &str,
    ) -> Result<(Redemption, Reward), StorageError> {
        use schema::{redemptions, rewards};
        let pool = self.pool.clone();
        let child = child.to_string();
        let rid = reward_id.to_string();
        trace!(child_id = %child, reward_id = %rid, "request_redemption starting");
        tokio::task::spawn_blocking(move || -> Result<(Redemption, Reward), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let redemption_id = uuid::Uuid::new_v4().to_string();
            conn.immediate_transaction(|conn| -> Result<(Redemption, Reward), StorageError> {
                let reward = rewards::table
                    .filter(rewards::id.eq(&rid))
                    .first::<Reward>(conn)
                    .optional()?;
                let Some(reward) = reward else {
                    return Err(StorageError::NotFound(format!("reward {rid} not found")));
                };
                if !reward.active {
                    return Err(StorageError::Conflict(
                        "reward is no longer available".into(),
                    ));
                }
                let child_row = load_child(conn, &child)?;
                let new_redemption = NewRedemption {
                    id: &redemption_id,
                    reward_id: &rid,
                    child_id: &child,
                    points_spent: reward.cost,
                    status: RedemptionStatus::Pending.as_str(),
                };
                diesel::insert_into(redemptions::table)
                    .values(&new_redemption)
                    .execute(conn)?;
                add_activity(
                    conn,
                    &child,
                    &child,
                    "redemption_requested",
                    &format!(
                        "{} asked to redeem \"{}\" ({} pts)",
                        child_row.display_name, reward.title, reward.cost
                    ),
                )?;
                notify_parents(
                    conn,
                    Some(&child),
                    "redemption_requested",
                    &format!(
                        "{} wants \"{}\" for {} pts",
                        child_row.display_name, reward.title, reward.cost
                    ),
                )?;
                let redemption = redemptions::table
                    .filter(redemptions::id.eq(&redemption_id))
                    .first::<Redemption>(conn)?;
                Ok((redemption, reward))
            })
        })
        .await?
    }

    pub async fn list_redemptions_for_child(
        &self,
        child: &str,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<(Redemption, Reward)>, StorageError> {
        use schema::{redemptions, rewards};
        let pool = self.pool.clone();
        let child = child.to_string();
        let page = page.max(1);
        let per_page = per_page.clamp(1, 1000) as i64;
        let offset = ((page as i64) - 1) * per_page;
        tokio::task::spawn_blocking(
            move || -> Result<Vec<(Redemption, Reward)>, StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                let rows = redemptions::table
                    .inner_join(rewards::table.on(rewards::id.eq(redemptions::reward_id)))
                    .filter(redemptions::child_id.eq(&child))
                    .order(redemptions::redeemed_at.desc())
                    .offset(offset)
                    .limit(per_page)
                    .select((redemptions::all_columns, rewards::all_columns))
                    .load::<(Redemption, Reward)>(&mut conn)?;
                Ok(rows)
            },
        )
        .await?
    }

    pub async fn list_pending_redemptions(
        &self,
    ) -> Result<Vec<(Redemption, Reward, Child)>, StorageError> {
        use schema::{children, redemptions, rewards};
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(
            move || -> Result<Vec<(Redemption, Reward, Child)>, StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                let rows = redemptions::table
                    .inner_join(rewards::table.on(rewards::id.eq(redemptions::reward_id)))
                    .inner_join(children::table.on(children::id.eq(redemptions::child_id)))
                    .filter(redemptions::status.eq(RedemptionStatus::Pending.as_str()))
                    .order(redemptions::redeemed_at.desc())
                    .select((
                        redemptions::all_columns,
                        rewards::all_columns,
                        (children::id, children::display_name),
                    ))
                    .load::<(Redemption, Reward, Child)>(&mut conn)?;
                Ok(rows)
            },
        )
        .await?
    }

    pub async fn pending_redemptions_count(&self) -> Result<i64, StorageError> {
        use schema::redemptions;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<i64, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(redemptions::table
                .filter(redemptions::status.eq(RedemptionStatus::Pending.as_str()))
                .count()
                .get_result(&mut conn)?)
        })
        .await?
    }

    pub async fn get_redemption(
        &self,
        redemption_id: &str,
    ) -> Result<Option<Redemption>, StorageError> {
        use schema::redemptions;
        let pool = self.pool.clone();
        let rid = redemption_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Redemption>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(redemptions::table
                .filter(redemptions::id.eq(&rid))
                .first::<Redemption>(&mut conn)
                .optional()?)
        })
        .await?
    }

    /// Settle a pending redemption as approved. The deduction is nothing more
    /// than the ledger recomputation seeing the approved row.
    pub async fn approve_redemption(
        &self,
        redemption_id: &str,
        approver: &str,
    ) -> Result<(Redemption, Reward), StorageError> {
        self.settle_redemption(redemption_id, approver, RedemptionStatus::Approved)
            .await
    }

    pub async fn reject_redemption(
        &self,
        redemption_id: &str,
        approver: &str,
    ) -> Result<(Redemption, Reward), StorageError> {
        self.settle_redemption(redemption_id, approver, RedemptionStatus::Rejected)
            .await
    }

    async fn settle_redemption(
        &self,
        redemption_id: &str,
        approver: &str,
        outcome: RedemptionStatus,
    ) -> Result<(Redemption, Reward), StorageError> {
        use schema::{redemptions, rewards};
        let pool = self.pool.clone();
        let rid = redemption_id.to_string();
        let approver = approver.to_string();
        tokio::task::spawn_blocking(move || -> Result<(Redemption, Reward), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<(Redemption, Reward), StorageError> {
                let redemption = redemptions::table
                    .filter(redemptions::id.eq(&rid))
                    .first::<Redemption>(conn)
                    .optional()?;
                let Some(redemption) = redemption else {
                    return Err(StorageError::NotFound(format!(
                        "redemption {rid} not found"
                    )));
                };
                if redemption.status != RedemptionStatus::Pending.as_str() {
                    return Err(StorageError::Conflict(
                        "redemption is already settled".into(),
                    ));
                }
                let reward = rewards::table
                    .filter(rewards::id.eq(&redemption.reward_id))
                    .first::<Reward>(conn)?;
                let child_row = load_child(conn, &redemption.child_id)?;
                let now = Utc::now().naive_utc();
                match outcome {
                    RedemptionStatus::Approved => {
                        diesel::update(redemptions::table.filter(redemptions::id.eq(&rid)))
                            .set((
                                redemptions::status.eq(RedemptionStatus::Approved.as_str()),
                                redemptions::approved_at.eq(Some(now)),
                                redemptions::approved_by.eq(Some(approver.as_str())),
                            ))
                            .execute(conn)?;
                        add_activity(
                            conn,
                            &redemption.child_id,
                            &approver,
                            "redemption_approved",
                            &format!(
                                "{} redeemed \"{}\" for {} pts",
                                child_row.display_name, reward.title, redemption.points_spent
                            ),
                        )?;
                        notify_child(
                            conn,
                            &redemption.child_id,
                            "redemption_approved",
                            &format!(
                                "\"{}\" is yours! {} pts were deducted",
                                reward.title, redemption.points_spent
                            ),
                        )?;
                    }
                    RedemptionStatus::Rejected => {
                        diesel::update(redemptions::table.filter(redemptions::id.eq(&rid)))
                            .set(redemptions::status.eq(RedemptionStatus::Rejected.as_str()))
                            .execute(conn)?;
                        notify_child(
                            conn,
                            &redemption.child_id,
                            "redemption_rejected",
                            &format!("Your request for \"{}\" was declined", reward.title),
                        )?;
                    }
                    RedemptionStatus::Pending => {
                        return Err(StorageError::InvalidInput(
                            "cannot settle a redemption back to pending".into(),
                        ));
                    }
                }
                let updated = redemptions::table
                    .filter(redemptions::id.eq(&rid))
                    .first::<Redemption>(conn)?;
                Ok((updated, reward))
            })
        })
        .await?
    }

    /// Nudge the parents about a still-pending redemption; state is untouched.
    pub async fn remind_redemption(&self, redemption_id: &str) -> Result<(), StorageError> {
        use schema::{redemptions, rewards};
        let pool = self.pool.clone();
        let rid = redemption_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            conn.immediate_transaction(|conn| -> Result<(), StorageError> {
                let redemption = redemptions::table
                    .filter(redemptions::id.eq(&rid))
                    .first::<Redemption>(conn)
                    .optional()?;
                let Some(redemption) = redemption else {
                    return Err(StorageError::NotFound(format!(
                        "redemption {rid} not found"
                    )));
                };
                if redemption.status != RedemptionStatus::Pending.as_str() {
                    return Err(StorageError::Conflict(
                        "redemption is already settled".into(),
                    ));
                }
                let reward = rewards::table
                    .filter(rewards::id.eq(&redemption.reward_id))
                    .first::<Reward>(conn)?;
                let child_row = load_child(conn, &redemption.child_id)?;
                notify_parents(
                    conn,
                    Some(&redemption.child_id),
                    "redemption_reminder",
                    &format!(
                        "{} is still waiting on \"{}\" ({} pts)",
                        child_row.display_name, reward.title, redemption.points_spent
                    ),
                )?;
                Ok(())
            })
        })
        .await?
    }

    // --- ledger / progress ---

    /// Sum the two logs the balance derives from; there is no stored counter.
    pub async fn ledger_totals(&self, child: &str) -> Result<(i64, i64), StorageError> {
        let pool = self.pool.clone();
        let child = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<(i64, i64), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            ledger_totals_conn(&mut conn, &child)
        })
        .await?
    }

    pub async fn get_streak(&self, child: &str) -> Result<Option<Streak>, StorageError> {
        use schema::streaks;
        let pool = self.pool.clone();
        let child = child.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Streak>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(streaks::table
                .filter(streaks::child_id.eq(&child))
                .first::<Streak>(&mut conn)
                .optional()?)
        })
        .await?
    }

    /// Every achievement definition paired with the child's progress row, if
    /// any. Two plain queries merged in memory; no outer join.
    pub async fn achievement_progress(
        &self,
        child: &str,
    ) -> Result<Vec<(Achievement, Option<UserAchievement>)>, StorageError> {
        use schema::{achievements, user_achievements};
        let pool = self.pool.clone();
        let child = child.to_string();
        tokio::task::spawn_blocking(
            move || -> Result<Vec<(Achievement, Option<UserAchievement>)>, StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                let defs = achievements::table
                    .order(achievements::title.asc())
                    .load::<Achievement>(&mut conn)?;
                let rows = user_achievements::table
                    .filter(user_achievements::child_id.eq(&child))
                    .load::<UserAchievement>(&mut conn)?;
                let mut map: std::collections::HashMap<String, UserAchievement> =
                    std::collections::HashMap::new();
                for row in rows {
                    map.insert(row.achievement_id.clone(), row);
                }
                let out = defs
                    .into_iter()
                    .map(|def| {
                        let progress = map.remove(&def.id);
                        (def, progress)
                    })
                    .collect();
                Ok(out)
            },
        )
        .await?
    }

    /// Per-child raw material for the household aggregate: child row, earned
    /// and spent totals, and the streak row when one exists.
    pub async fn household_rows(
        &self,
    ) -> Result<Vec<(Child, i64, i64, Option<Streak>)>, StorageError> {
        use schema::{children, streaks};
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(
            move || -> Result<Vec<(Child, i64, i64, Option<Streak>)>, StorageError> {
                let mut conn = pool.get()?;
                configure_sqlite_conn(&mut conn)?;
                let kids = children::table
                    .order(children::display_name.asc())
                    .load::<Child>(&mut conn)?;
                let mut out = Vec::with_capacity(kids.len());
                for kid in kids {
                    let (earned, spent) = ledger_totals_conn(&mut conn, &kid.id)?;
                    let streak = streaks::table
                        .filter(streaks::child_id.eq(&kid.id))
                        .first::<Streak>(&mut conn)
                        .optional()?;
                    out.push((kid, earned, spent, streak));
                }
                Ok(out)
            },
        )
        .await?
    }

    // --- notifications / activity ---

    pub async fn list_notifications(
        &self,
        recipient: Recipient,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<Notification>, StorageError> {
        use schema::notifications;
        let pool = self.pool.clone();
        let page = page.max(1);
        let per_page = per_page.clamp(1, 1000) as i64;
        let offset = ((page as i64) - 1) * per_page;
        tokio::task::spawn_blocking(move || -> Result<Vec<Notification>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let mut query = notifications::table.into_boxed();
            query = match &recipient {
                Recipient::Parents => {
                    query.filter(notifications::recipient_role.eq(RECIPIENT_PARENT))
                }
                Recipient::Child(child) => query
                    .filter(notifications::recipient_role.eq(RECIPIENT_CHILD))
                    .filter(notifications::child_id.eq(child.clone())),
            };
            Ok(query
                .order((notifications::created_at.desc(), notifications::id.desc()))
                .offset(offset)
                .limit(per_page)
                .load::<Notification>(&mut conn)?)
        })
        .await?
    }

    pub async fn unread_notification_count(
        &self,
        recipient: Recipient,
    ) -> Result<i64, StorageError> {
        use schema::notifications;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<i64, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let mut query = notifications::table.into_boxed();
            query = match &recipient {
                Recipient::Parents => {
                    query.filter(notifications::recipient_role.eq(RECIPIENT_PARENT))
                }
                Recipient::Child(child) => query
                    .filter(notifications::recipient_role.eq(RECIPIENT_CHILD))
                    .filter(notifications::child_id.eq(child.clone())),
            };
            Ok(query
                .filter(notifications::read.eq(false))
                .count()
                .get_result(&mut conn)?)
        })
        .await?
    }

    /// Mark one notification read, but only if it belongs to the caller's
    /// inbox. Returns `false` when no such row was matched.
    pub async fn mark_notification_read(
        &self,
        notification_id: i32,
        recipient: Recipient,
    ) -> Result<bool, StorageError> {
        use schema::notifications;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let updated = match &recipient {
                Recipient::Parents => diesel::update(
                    notifications::table
                        .filter(notifications::id.eq(notification_id))
                        .filter(notifications::recipient_role.eq(RECIPIENT_PARENT)),
                )
                .set(notifications::read.eq(true))
                .execute(&mut conn)?,
                Recipient::Child(child) => diesel::update(
                    notifications::table
                        .filter(notifications::id.eq(notification_id))
                        .filter(notifications::recipient_role.eq(RECIPIENT_CHILD))
                        .filter(notifications::child_id.eq(child.clone())),
                )
                .set(notifications::read.eq(true))
                .execute(&mut conn)?,
            };
            Ok(updated > 0)
        })
        .await?
    }

    pub async fn list_activity(
        &self,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<ActivityEntry>, StorageError> {
        use schema::activity_feed;
        let pool = self.pool.clone();
        let page = page.max(1);
        let per_page = per_page.clamp(1, 1000) as i64;
        let offset = ((page as i64) - 1) * per_page;
        tokio::task::spawn_blocking(move || -> Result<Vec<ActivityEntry>, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            Ok(activity_feed::table
                .order((activity_feed::created_at.desc(), activity_feed::id.desc()))
                .offset(offset)
                .limit(per_page)
                .load::<ActivityEntry>(&mut conn)?)
        })
        .await?
    }

    // Session helpers for JWT inactivity windows
    pub async fn create_session(&self, jti_: &str, username_: &str) -> Result<(), StorageError> {
        use schema::sessions;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        let u = username_.to_string();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let new = NewSession {
                jti: &j,
                username: &u,
            };
            diesel::insert_into(sessions::table)
                .values(&new)
                .on_conflict_do_nothing()
                .execute(&mut conn)?;
            Ok(())
        })
        .await?
    }

    pub async fn delete_session(&self, jti_: &str) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let deleted = diesel::delete(sessions.filter(jti.eq(&j))).execute(&mut conn)?;
            Ok(deleted > 0)
        })
        .await?
    }

    /// Touch session atomically, but only if it hasn't expired.
    /// Returns `true` if the session was found and updated, `false` otherwise.
    ///
    /// This combines the idle timeout check and the `last_used_at` update into
    /// a single atomic UPDATE, eliminating the race condition between checking
    /// and updating the session.
    pub async fn touch_session_with_cutoff(
        &self,
        jti_: &str,
        cutoff: chrono::NaiveDateTime,
    ) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let pool = self.pool.clone();
        let j = jti_.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            let now = Utc::now().naive_utc();
            let updated =
                diesel::update(sessions.filter(jti.eq(&j)).filter(last_used_at.ge(cutoff)))
                    .set(last_used_at.eq(now))
                    .execute(&mut conn)?;
            Ok(updated > 0)
        })
        .await?
    }
}

// --- connection-level helpers shared by the workflow transactions ---

fn load_child(conn: &mut SqliteConnection, child: &str) -> Result<Child, StorageError> {
    use schema::children;
    let row = children::table
        .filter(children::id.eq(child))
        .first::<Child>(conn)
        .optional()?;
    row.ok_or_else(|| StorageError::NotFound(format!("child {child} not found")))
}

fn ledger_totals_conn(
    conn: &mut SqliteConnection,
    child: &str,
) -> Result<(i64, i64), StorageError> {
    use diesel::dsl::sum;
    use schema::{redemptions, tasks};
    let earned: Option<i64> = tasks::table
        .filter(tasks::child_id.eq(child))
        .filter(tasks::approved.eq(true))
        .select(sum(tasks::points))
        .first::<Option<i64>>(conn)?;
    let spent: Option<i64> = redemptions::table
        .filter(redemptions::child_id.eq(child))
        .filter(redemptions::status.eq(RedemptionStatus::Approved.as_str()))
        .select(sum(redemptions::points_spent))
        .first::<Option<i64>>(conn)?;
    Ok((earned.unwrap_or(0), spent.unwrap_or(0)))
}

fn load_streak_state(
    conn: &mut SqliteConnection,
    child: &str,
) -> Result<StreakState, StorageError> {
    use schema::streaks;
    let row = streaks::table
        .filter(streaks::child_id.eq(child))
        .first::<Streak>(conn)
        .optional()?;
    Ok(row
        .map(|s| StreakState {
            current: s.current_streak,
            longest: s.longest_streak,
            last_completed_on: s.last_completed_on,
            total_completed: s.total_completed,
        })
        .unwrap_or_default())
}

fn upsert_streak(
    conn: &mut SqliteConnection,
    child: &str,
    state: &StreakState,
) -> Result<(), StorageError> {
    use schema::streaks;
    let now = Utc::now().naive_utc();
    let new_row = NewStreak {
        child_id: child,
        current_streak: state.current,
        longest_streak: state.longest,
        last_completed_on: state.last_completed_on,
        total_completed: state.total_completed,
    };
    diesel::insert_into(streaks::table)
        .values(&new_row)
        .on_conflict(streaks::child_id)
        .do_update()
        .set((
            streaks::current_streak.eq(state.current),
            streaks::longest_streak.eq(state.longest),
            streaks::last_completed_on.eq(state.last_completed_on),
            streaks::total_completed.eq(state.total_completed),
            streaks::updated_at.eq(now),
        ))
        .execute(conn)?;
    Ok(())
}

/// Re-score every achievement for the child and return the definitions whose
/// thresholds were crossed just now. `earned` is sticky: progress may later
/// drop (an approved task can be deleted) but the badge stays.
fn update_achievements(
    conn: &mut SqliteConnection,
    child: &str,
    state: &StreakState,
) -> Result<Vec<Achievement>, StorageError> {
    use diesel::dsl::sum;
    use schema::{achievements, tasks, user_achievements};

    let earned_points: Option<i64> = tasks::table
        .filter(tasks::child_id.eq(child))
        .filter(tasks::approved.eq(true))
        .select(sum(tasks::points))
        .first::<Option<i64>>(conn)?;
    let earned_points = earned_points.unwrap_or(0);

    let defs = achievements::table.load::<Achievement>(conn)?;
    let existing = user_achievements::table
        .filter(user_achievements::child_id.eq(child))
        .load::<UserAchievement>(conn)?;
    let mut by_achievement: std::collections::HashMap<String, UserAchievement> =
        std::collections::HashMap::new();
    for row in existing {
        by_achievement.insert(row.achievement_id.clone(), row);
    }

    let mut newly = Vec::new();
    for def in defs {
        let criteria = match def.criteria.parse::<AchievementCriteria>() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(achievement_id = %def.id, error = %e, "skipping achievement");
                continue;
            }
        };
        let progress = match criteria {
            AchievementCriteria::TasksCompleted => state.total_completed as i64,
            AchievementCriteria::PointsEarned => earned_points,
            AchievementCriteria::StreakDays => state.longest as i64,
        };
        let hit = progress >= def.threshold as i64;
        let now = Utc::now().naive_utc();
        match by_achievement.get(&def.id) {
            None => {
                diesel::insert_into(user_achievements::table)
                    .values((
                        user_achievements::child_id.eq(child),
                        user_achievements::achievement_id.eq(&def.id),
                        user_achievements::progress.eq(progress),
                        user_achievements::earned.eq(hit),
                        user_achievements::earned_at.eq(hit.then_some(now)),
                    ))
                    .execute(conn)?;
                if hit {
                    newly.push(def);
                }
            }
            Some(row) if row.earned => {
                diesel::update(user_achievements::table.filter(user_achievements::id.eq(row.id)))
                    .set(user_achievements::progress.eq(progress))
                    .execute(conn)?;
            }
            Some(row) => {
                diesel::update(user_achievements::table.filter(user_achievements::id.eq(row.id)))
                    .set((
                        user_achievements::progress.eq(progress),
                        user_achievements::earned.eq(hit),
                        user_achievements::earned_at.eq(hit.then_some(now)),
                    ))
                    .execute(conn)?;
                if hit {
                    newly.push(def);
                }
            }
        }
    }
    Ok(newly)
}

fn add_activity(
    conn: &mut SqliteConnection,
    child: &str,
    actor: &str,
    kind: &str,
    message: &str,
) -> Result<(), StorageError> {
    use schema::activity_feed;
    let entry = NewActivityEntry {
        child_id: child,
        actor,
        kind,
        message,
    };
    diesel::insert_into(activity_feed::table)
        .values(&entry)
        .execute(conn)?;
    Ok(())
}

fn notify_parents(
    conn: &mut SqliteConnection,
    child: Option<&str>,
    kind: &str,
    message: &str,
) -> Result<(), StorageError> {
    use schema::notifications;
    let row = NewNotification {
        recipient_role: RECIPIENT_PARENT,
        child_id: child,
        kind,
        message,
    };
    diesel::insert_into(notifications::table)
        .values(&row)
        .execute(conn)?;
    Ok(())
}

fn notify_child(
    conn: &mut SqliteConnection,
    child: &str,
    kind: &str,
    message: &str,
) -> Result<(), StorageError> {
    use schema::notifications;
    let row = NewNotification {
        recipient_role: RECIPIENT_CHILD,
        child_id: Some(child),
        kind,
        message,
    };
    diesel::insert_into(notifications::table)
        .values(&row)
        .execute(conn)?;
    Ok(())
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    // Ignore the result rows; Diesel's execute is fine for PRAGMAs
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    Ok(())
}
