use chorequest_shared::domain::{AchievementCriteria, AchievementDef, Child};
use chorequest_shared::plan::Plan;
use serde::Deserialize;
use std::{env, fs, path::Path};

pub use chorequest_shared::auth::Role;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub family_id: String,
    /// IANA timezone name used for streak day arithmetic; UTC when absent.
    pub timezone: Option<String>,
    #[serde(default)]
    pub plan: Plan,
    pub children: Vec<Child>,
    pub jwt_secret: String,
    pub users: Vec<UserConfig>,
    /// Overrides the built-in achievement set when non-empty.
    #[serde(default)]
    pub achievements: Vec<AchievementDef>,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password_hash: String, // bcrypt hash
    pub role: Role,
    pub child_id: Option<String>, // required when role == child
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        ConfigError::Yaml(value)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        let cfg: AppConfig = serde_yaml::from_str(&text)?;
        Ok(cfg)
    }

    /// Achievement definitions to seed: the configured list, or the built-in
    /// defaults when the config does not name any.
    pub fn achievement_defs(&self) -> Vec<AchievementDef> {
        if self.achievements.is_empty() {
            default_achievements()
        } else {
            self.achievements.clone()
        }
    }
}

pub fn default_achievements() -> Vec<AchievementDef> {
    fn def(
        id: &str,
        title: &str,
        description: &str,
        criteria: AchievementCriteria,
        threshold: i32,
    ) -> AchievementDef {
        AchievementDef {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            criteria,
            threshold,
        }
    }
    vec![
        def(
            "first-task",
            "First Steps",
            "Finish your first approved task",
            AchievementCriteria::TasksCompleted,
            1,
        ),
        def(
            "task-25",
            "Task Master",
            "Finish 25 approved tasks",
            AchievementCriteria::TasksCompleted,
            25,
        ),
        def(
            "points-100",
            "Centurion",
            "Earn 100 points in total",
            AchievementCriteria::PointsEarned,
            100,
        ),
        def(
            "points-500",
            "Point Collector",
            "Earn 500 points in total",
            AchievementCriteria::PointsEarned,
            500,
        ),
        def(
            "streak-7",
            "Week Warrior",
            "Keep a 7-day completion streak",
            AchievementCriteria::StreakDays,
            7,
        ),
    ]
}
