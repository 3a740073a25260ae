use axum::http::StatusCode;
use chorequest_server::{server, storage};
use chorequest_shared::api::endpoints;
use chorequest_shared::domain::Child;
use chorequest_shared::plan::Plan;
use reqwest::Client;
use serde_json::{Value, json};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

const FAMILY_ID: &str = "testfam";

struct TestServer {
    base: String,
    client: Client,
    handle: tokio::task::JoinHandle<()>,
    _tempdir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Option<Self> {
        Self::spawn_with_plan(Plan::Free).await
    }

    async fn spawn_with_plan(plan: Plan) -> Option<Self> {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let (addr, handle) = match start_server(&db_path, plan).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                eprintln!("Skipping test due to sandbox restrictions: {e}");
                return None;
            }
            Err(e) => panic!("failed to start server: {e}"),
        };
        Some(Self {
            base: format!("http://{}", addr),
            client: Client::new(),
            handle,
            _tempdir: dir,
        })
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let body = self
            .request_expect(
                "POST",
                &endpoints::auth_login(""),
                None,
                Some(json!({"username": username, "password": password})),
                StatusCode::OK,
            )
            .await;
        body.get("token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .expect("token missing from auth response")
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let url = format!("{}{}", self.base, path);
        let mut req = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "DELETE" => self.client.delete(&url),
            other => panic!("unsupported method {other}"),
        };
        if let Some(t) = token {
            req = req.bearer_auth(t);
        }
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status();
        let text = resp.text().await.unwrap();
        let val = if text.is_empty() {
            json!(null)
        } else {
            serde_json::from_str(&text).unwrap_or(json!({"raw": text}))
        };
        (status, val)
    }

    async fn request_expect(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
        expected: StatusCode,
    ) -> Value {
        let (status, value) = self.request(method, path, token, body).await;
        assert_eq!(
            status, expected,
            "{method} {path} returned {status:?} with body {value:?}",
        );
        value
    }

    /// Create a task for the child, complete it as the child, return the id.
    async fn create_and_complete_task(
        &self,
        parent_token: &str,
        child_token: &str,
        child_id: &str,
        title: &str,
        points: i64,
    ) -> String {
        let task = self
            .request_expect(
                "POST",
                &endpoints::child_tasks("", FAMILY_ID, child_id),
                Some(parent_token),
                Some(json!({"title": title, "points": points})),
                StatusCode::OK,
            )
            .await;
        let task_id = task.get("id").and_then(|v| v.as_str()).unwrap().to_string();
        self.request_expect(
            "POST",
            &endpoints::task_complete("", FAMILY_ID, child_id, &task_id),
            Some(child_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
        task_id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_server(
    tmp_db: &Path,
    plan: Plan,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), std::io::Error> {
    let parent_hash = bcrypt::hash("secret123", bcrypt::DEFAULT_COST).unwrap();
    let ala_hash = bcrypt::hash("kidpass", bcrypt::DEFAULT_COST).unwrap();
    let bruno_hash = bcrypt::hash("brunopass", bcrypt::DEFAULT_COST).unwrap();
    let config = server::AppConfig {
        family_id: FAMILY_ID.into(),
        timezone: None,
        plan,
        children: vec![
            Child {
                id: "ala".into(),
                display_name: "Ala".into(),
            },
            Child {
                id: "bruno".into(),
                display_name: "Bruno".into(),
            },
        ],
        jwt_secret: "testsecret".into(),
        users: vec![
            server::UserConfig {
                username: "parent".into(),
                password_hash: parent_hash,
                role: server::Role::Parent,
                child_id: None,
            },
            server::UserConfig {
                username: "ala".into(),
                password_hash: ala_hash,
                role: server::Role::Child,
                child_id: Some("ala".into()),
            },
            server::UserConfig {
                username: "bruno".into(),
                password_hash: bruno_hash,
                role: server::Role::Child,
                child_id: Some("bruno".into()),
            },
        ],
        achievements: vec![],
        dev_cors_origin: None,
        listen_port: None,
    };

    let store = storage::Store::connect_sqlite(tmp_db.to_str().unwrap())
        .await
        .expect("db");
    store
        .seed_from_config(&config.children, &config.achievement_defs())
        .await
        .expect("seed");

    let state = server::AppState::new(config, store);
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok((addr, handle))
}

#[tokio::test]
async fn public_endpoints_work() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    server
        .request_expect("GET", "/healthz", None, None, StatusCode::OK)
        .await;
    let token = server.login("parent", "secret123").await;
    assert!(!token.is_empty());
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let cases: Vec<(&str, String, Option<Value>)> = vec![
        ("GET", endpoints::children("", FAMILY_ID), None),
        ("GET", endpoints::household_progress("", FAMILY_ID), None),
        ("GET", endpoints::child_ledger("", FAMILY_ID, "ala"), None),
        ("GET", endpoints::child_streak("", FAMILY_ID, "ala"), None),
        (
            "GET",
            endpoints::child_achievements("", FAMILY_ID, "ala"),
            None,
        ),
        ("GET", endpoints::child_tasks("", FAMILY_ID, "ala"), None),
        (
            "POST",
            endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(json!({"title": "Dishes", "points": 10})),
        ),
        ("GET", endpoints::approvals("", FAMILY_ID), None),
        ("GET", endpoints::rewards("", FAMILY_ID), None),
        (
            "GET",
            endpoints::child_redemptions("", FAMILY_ID, "ala"),
            None,
        ),
        ("GET", endpoints::redemptions("", FAMILY_ID), None),
        ("GET", endpoints::notifications("", FAMILY_ID), None),
        ("GET", endpoints::notifications_count("", FAMILY_ID), None),
        ("GET", endpoints::activity("", FAMILY_ID), None),
        ("GET", endpoints::events("", FAMILY_ID), None),
        ("POST", endpoints::auth_logout(""), None),
    ];

    for (method, path, body) in cases.iter() {
        server
            .request_expect(method, path, None, body.clone(), StatusCode::UNAUTHORIZED)
            .await;
    }
}

#[tokio::test]
async fn task_lifecycle_awards_points_once() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    let child_token = server.login("ala", "kidpass").await;

    let task = server
        .request_expect(
            "POST",
            &endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(&parent_token),
            Some(json!({
                "title": "Do the dishes",
                "description": "After dinner",
                "points": 60,
                "category": "kitchen"
            })),
            StatusCode::OK,
        )
        .await;
    let task_id = task.get("id").and_then(|v| v.as_str()).unwrap().to_string();
    assert_eq!(task.get("points").unwrap().as_i64().unwrap(), 60);
    assert_eq!(task.get("completed").unwrap().as_bool().unwrap(), false);
    assert_eq!(
        task.get("created_by").and_then(|v| v.as_str()).unwrap(),
        "parent"
    );

    // Completion alone never moves the balance.
    server
        .request_expect(
            "POST",
            &endpoints::task_complete("", FAMILY_ID, "ala", &task_id),
            Some(&child_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    let ledger = server
        .request_expect(
            "GET",
            &endpoints::child_ledger("", FAMILY_ID, "ala"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(ledger.get("balance").unwrap().as_i64().unwrap(), 0);

    let approvals = server
        .request_expect(
            "GET",
            &endpoints::approvals("", FAMILY_ID),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    let approvals = approvals.as_array().unwrap();
    assert_eq!(approvals.len(), 1);
    assert_eq!(
        approvals[0].get("child_id").and_then(|v| v.as_str()),
        Some("ala")
    );
    assert_eq!(
        approvals[0].get("title").and_then(|v| v.as_str()),
        Some("Do the dishes")
    );

    // Second completion of the same task conflicts.
    server
        .request_expect(
            "POST",
            &endpoints::task_complete("", FAMILY_ID, "ala", &task_id),
            Some(&child_token),
            None,
            StatusCode::CONFLICT,
        )
        .await;

    let after_approve = server
        .request_expect(
            "POST",
            &endpoints::task_approve("", FAMILY_ID, "ala", &task_id),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(after_approve.get("balance").unwrap().as_i64().unwrap(), 60);
    assert_eq!(after_approve.get("level").unwrap().as_i64().unwrap(), 1);
    assert_eq!(
        after_approve.get("xp_into_level").unwrap().as_i64().unwrap(),
        60
    );

    // Approving twice is idempotent; the award happens once.
    let after_second = server
        .request_expect(
            "POST",
            &endpoints::task_approve("", FAMILY_ID, "ala", &task_id),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(after_second.get("balance").unwrap().as_i64().unwrap(), 60);

    let streak = server
        .request_expect(
            "GET",
            &endpoints::child_streak("", FAMILY_ID, "ala"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(streak.get("current_streak").unwrap().as_i64().unwrap(), 1);
    assert_eq!(streak.get("longest_streak").unwrap().as_i64().unwrap(), 1);
    assert_eq!(streak.get("total_completed").unwrap().as_i64().unwrap(), 1);

    let achievements = server
        .request_expect(
            "GET",
            &endpoints::child_achievements("", FAMILY_ID, "ala"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    let achievements = achievements.as_array().unwrap();
    let first_task = achievements
        .iter()
        .find(|a| a.get("id").and_then(|v| v.as_str()) == Some("first-task"))
        .expect("first-task definition missing");
    assert_eq!(first_task.get("earned").unwrap().as_bool().unwrap(), true);
    assert!(first_task.get("earned_at").unwrap().is_string());
    let centurion = achievements
        .iter()
        .find(|a| a.get("id").and_then(|v| v.as_str()) == Some("points-100"))
        .expect("points-100 definition missing");
    assert_eq!(centurion.get("earned").unwrap().as_bool().unwrap(), false);
    assert_eq!(centurion.get("progress").unwrap().as_i64().unwrap(), 60);

    let activity = server
        .request_expect(
            "GET",
            &endpoints::activity("", FAMILY_ID),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    let kinds: Vec<&str> = activity
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|a| a.get("kind").and_then(|v| v.as_str()))
        .collect();
    assert!(kinds.contains(&"task_completed"));
    assert!(kinds.contains(&"task_approved"));
    assert!(kinds.contains(&"achievement_earned"));

    // assigned + approved + achievement for the child inbox
    let count = server
        .request_expect(
            "GET",
            &endpoints::notifications_count("", FAMILY_ID),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(count.get("count").unwrap().as_i64().unwrap(), 3);

    let notifications = server
        .request_expect(
            "GET",
            &endpoints::notifications("", FAMILY_ID),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    let first_id = notifications.as_array().unwrap()[0]
        .get("id")
        .and_then(|v| v.as_i64())
        .unwrap() as i32;
    server
        .request_expect(
            "POST",
            &endpoints::notification_read("", FAMILY_ID, first_id),
            Some(&child_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    let count = server
        .request_expect(
            "GET",
            &endpoints::notifications_count("", FAMILY_ID),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(count.get("count").unwrap().as_i64().unwrap(), 2);

    // Rejecting an approved task conflicts; approval is final.
    server
        .request_expect(
            "POST",
            &endpoints::task_reject("", FAMILY_ID, "ala", &task_id),
            Some(&parent_token),
            None,
            StatusCode::CONFLICT,
        )
        .await;
}

#[tokio::test]
async fn rejection_returns_task_to_pending() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    let child_token = server.login("ala", "kidpass").await;

    let task_id = server
        .create_and_complete_task(&parent_token, &child_token, "ala", "Feed the cat", 30)
        .await;

    // Approving or rejecting a task nobody completed conflicts.
    let pending = server
        .request_expect(
            "POST",
            &endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(&parent_token),
            Some(json!({"title": "Water plants", "points": 10})),
            StatusCode::OK,
        )
        .await;
    let pending_id = pending.get("id").and_then(|v| v.as_str()).unwrap();
    server
        .request_expect(
            "POST",
            &endpoints::task_approve("", FAMILY_ID, "ala", pending_id),
            Some(&parent_token),
            None,
            StatusCode::CONFLICT,
        )
        .await;
    server
        .request_expect(
            "POST",
            &endpoints::task_reject("", FAMILY_ID, "ala", pending_id),
            Some(&parent_token),
            None,
            StatusCode::CONFLICT,
        )
        .await;

    server
        .request_expect(
            "POST",
            &endpoints::task_reject("", FAMILY_ID, "ala", &task_id),
            Some(&parent_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;

    let tasks = server
        .request_expect(
            "GET",
            &endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    let rejected = tasks
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t.get("id").and_then(|v| v.as_str()) == Some(task_id.as_str()))
        .unwrap();
    assert_eq!(rejected.get("completed").unwrap().as_bool().unwrap(), false);
    assert_eq!(rejected.get("approved").unwrap().as_bool().unwrap(), false);
    assert!(rejected.get("completed_at").unwrap().is_null());

    let ledger = server
        .request_expect(
            "GET",
            &endpoints::child_ledger("", FAMILY_ID, "ala"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(ledger.get("balance").unwrap().as_i64().unwrap(), 0);

    // The child can redo the task and get it approved this time.
    server
        .request_expect(
            "POST",
            &endpoints::task_complete("", FAMILY_ID, "ala", &task_id),
            Some(&child_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    let after = server
        .request_expect(
            "POST",
            &endpoints::task_approve("", FAMILY_ID, "ala", &task_id),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(after.get("balance").unwrap().as_i64().unwrap(), 30);
}

#[tokio::test]
async fn help_requests_round_trip() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    let child_token = server.login("ala", "kidpass").await;

    let task = server
        .request_expect(
            "POST",
            &endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(&parent_token),
            Some(json!({"title": "Clean room", "points": 20})),
            StatusCode::OK,
        )
        .await;
    let task_id = task.get("id").and_then(|v| v.as_str()).unwrap().to_string();

    // Blank messages are rejected before anything is written.
    server
        .request_expect(
            "POST",
            &endpoints::task_help("", FAMILY_ID, "ala", &task_id),
            Some(&child_token),
            Some(json!({"message": "   "})),
            StatusCode::BAD_REQUEST,
        )
        .await;

    server
        .request_expect(
            "POST",
            &endpoints::task_help("", FAMILY_ID, "ala", &task_id),
            Some(&child_token),
            Some(json!({"message": "Where is the vacuum?"})),
            StatusCode::NO_CONTENT,
        )
        .await;

    let tasks = server
        .request_expect(
            "GET",
            &endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    let flagged = &tasks.as_array().unwrap()[0];
    assert_eq!(
        flagged.get("help_requested").unwrap().as_bool().unwrap(),
        true
    );
    assert_eq!(
        flagged.get("help_message").and_then(|v| v.as_str()),
        Some("Where is the vacuum?")
    );

    let parent_notifications = server
        .request_expect(
            "GET",
            &endpoints::notifications("", FAMILY_ID),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(
        parent_notifications
            .as_array()
            .unwrap()
            .iter()
            .any(|n| n.get("kind").and_then(|v| v.as_str()) == Some("help_requested"))
    );

    server
        .request_expect(
            "POST",
            &endpoints::task_help_resolve("", FAMILY_ID, "ala", &task_id),
            Some(&parent_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    let tasks = server
        .request_expect(
            "GET",
            &endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    let cleared = &tasks.as_array().unwrap()[0];
    assert_eq!(
        cleared.get("help_requested").unwrap().as_bool().unwrap(),
        false
    );
    assert!(cleared.get("help_message").unwrap().is_null());

    // Asking for help after completing the task conflicts.
    server
        .request_expect(
            "POST",
            &endpoints::task_complete("", FAMILY_ID, "ala", &task_id),
            Some(&child_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    server
        .request_expect(
            "POST",
            &endpoints::task_help("", FAMILY_ID, "ala", &task_id),
            Some(&child_token),
            Some(json!({"message": "Too late?"})),
            StatusCode::CONFLICT,
        )
        .await;
}

#[tokio::test]
async fn redemption_lifecycle() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    let child_token = server.login("ala", "kidpass").await;

    let task_id = server
        .create_and_complete_task(&parent_token, &child_token, "ala", "Big project", 250)
        .await;
    let after = server
        .request_expect(
            "POST",
            &endpoints::task_approve("", FAMILY_ID, "ala", &task_id),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(after.get("balance").unwrap().as_i64().unwrap(), 250);
    assert_eq!(after.get("level").unwrap().as_i64().unwrap(), 3);
    assert_eq!(after.get("xp_into_level").unwrap().as_i64().unwrap(), 50);

    let reward = server
        .request_expect(
            "POST",
            &endpoints::rewards("", FAMILY_ID),
            Some(&parent_token),
            Some(json!({"title": "Cinema night", "cost": 100})),
            StatusCode::OK,
        )
        .await;
    let reward_id = reward
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    assert_eq!(reward.get("active").unwrap().as_bool().unwrap(), true);

    let rewards = server
        .request_expect(
            "GET",
            &endpoints::rewards("", FAMILY_ID),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(rewards.as_array().unwrap().len(), 1);

    // Requesting an unknown reward is a 404.
    server
        .request_expect(
            "POST",
            &endpoints::child_redemptions("", FAMILY_ID, "ala"),
            Some(&child_token),
            Some(json!({"reward_id": "no-such-reward"})),
            StatusCode::NOT_FOUND,
        )
        .await;

    let redemption = server
        .request_expect(
            "POST",
            &endpoints::child_redemptions("", FAMILY_ID, "ala"),
            Some(&child_token),
            Some(json!({"reward_id": reward_id})),
            StatusCode::OK,
        )
        .await;
    let redemption_id = redemption
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    assert_eq!(
        redemption.get("status").and_then(|v| v.as_str()),
        Some("pending")
    );
    assert_eq!(
        redemption.get("points_spent").unwrap().as_i64().unwrap(),
        100
    );

    // A pending request holds no points.
    let ledger = server
        .request_expect(
            "GET",
            &endpoints::child_ledger("", FAMILY_ID, "ala"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(ledger.get("balance").unwrap().as_i64().unwrap(), 250);

    let queue = server
        .request_expect(
            "GET",
            &endpoints::redemptions("", FAMILY_ID),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(queue.as_array().unwrap().len(), 1);
    assert_eq!(
        queue.as_array().unwrap()[0]
            .get("reward_title")
            .and_then(|v| v.as_str()),
        Some("Cinema night")
    );

    let after = server
        .request_expect(
            "POST",
            &endpoints::redemption_approve("", FAMILY_ID, &redemption_id),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(after.get("balance").unwrap().as_i64().unwrap(), 150);
    assert_eq!(after.get("spent_points").unwrap().as_i64().unwrap(), 100);

    // Settled redemptions are immutable.
    server
        .request_expect(
            "POST",
            &endpoints::redemption_approve("", FAMILY_ID, &redemption_id),
            Some(&parent_token),
            None,
            StatusCode::CONFLICT,
        )
        .await;
    server
        .request_expect(
            "POST",
            &endpoints::redemption_reject("", FAMILY_ID, &redemption_id),
            Some(&parent_token),
            None,
            StatusCode::CONFLICT,
        )
        .await;

    let history = server
        .request_expect(
            "GET",
            &endpoints::child_redemptions("", FAMILY_ID, "ala"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    let settled = &history.as_array().unwrap()[0];
    assert_eq!(
        settled.get("status").and_then(|v| v.as_str()),
        Some("approved")
    );
    assert!(settled.get("approved_at").unwrap().is_string());
    assert_eq!(
        settled.get("approved_by").and_then(|v| v.as_str()),
        Some("parent")
    );

    // A rejected request costs nothing.
    let second = server
        .request_expect(
            "POST",
            &endpoints::child_redemptions("", FAMILY_ID, "ala"),
            Some(&child_token),
            Some(json!({"reward_id": reward_id})),
            StatusCode::OK,
        )
        .await;
    let second_id = second.get("id").and_then(|v| v.as_str()).unwrap();
    server
        .request_expect(
            "POST",
            &endpoints::redemption_reject("", FAMILY_ID, second_id),
            Some(&parent_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    let ledger = server
        .request_expect(
            "GET",
            &endpoints::child_ledger("", FAMILY_ID, "ala"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(ledger.get("balance").unwrap().as_i64().unwrap(), 150);

    // Reminders only work while the request is pending.
    let third = server
        .request_expect(
            "POST",
            &endpoints::child_redemptions("", FAMILY_ID, "ala"),
            Some(&child_token),
            Some(json!({"reward_id": reward_id})),
            StatusCode::OK,
        )
        .await;
    let third_id = third.get("id").and_then(|v| v.as_str()).unwrap().to_string();
    server
        .request_expect(
            "POST",
            &endpoints::redemption_remind("", FAMILY_ID, &third_id),
            Some(&child_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    let parent_notifications = server
        .request_expect(
            "GET",
            &endpoints::notifications("", FAMILY_ID),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(
        parent_notifications
            .as_array()
            .unwrap()
            .iter()
            .any(|n| n.get("kind").and_then(|v| v.as_str()) == Some("redemption_reminder"))
    );
    server
        .request_expect(
            "POST",
            &endpoints::redemption_approve("", FAMILY_ID, &third_id),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    server
        .request_expect(
            "POST",
            &endpoints::redemption_remind("", FAMILY_ID, &third_id),
            Some(&child_token),
            None,
            StatusCode::CONFLICT,
        )
        .await;

    // Deactivated rewards disappear for children and stop new requests.
    server
        .request_expect(
            "POST",
            &endpoints::reward_deactivate("", FAMILY_ID, &reward_id),
            Some(&parent_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    let child_rewards = server
        .request_expect(
            "GET",
            &endpoints::rewards("", FAMILY_ID),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(child_rewards.as_array().unwrap().is_empty());
    let parent_rewards = server
        .request_expect(
            "GET",
            &endpoints::rewards("", FAMILY_ID),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(parent_rewards.as_array().unwrap().len(), 1);
    server
        .request_expect(
            "POST",
            &endpoints::child_redemptions("", FAMILY_ID, "ala"),
            Some(&child_token),
            Some(json!({"reward_id": reward_id})),
            StatusCode::CONFLICT,
        )
        .await;
}

#[tokio::test]
async fn overdraft_redemption_is_accepted_and_clamped() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    let child_token = server.login("ala", "kidpass").await;

    let reward = server
        .request_expect(
            "POST",
            &endpoints::rewards("", FAMILY_ID),
            Some(&parent_token),
            Some(json!({"title": "Ice cream", "cost": 100})),
            StatusCode::OK,
        )
        .await;
    let reward_id = reward.get("id").and_then(|v| v.as_str()).unwrap();

    // Zero balance does not block the request.
    let redemption = server
        .request_expect(
            "POST",
            &endpoints::child_redemptions("", FAMILY_ID, "ala"),
            Some(&child_token),
            Some(json!({"reward_id": reward_id})),
            StatusCode::OK,
        )
        .await;
    let redemption_id = redemption.get("id").and_then(|v| v.as_str()).unwrap();

    let after = server
        .request_expect(
            "POST",
            &endpoints::redemption_approve("", FAMILY_ID, redemption_id),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    // The raw balance goes negative; level and xp clamp at the floor.
    assert_eq!(after.get("balance").unwrap().as_i64().unwrap(), -100);
    assert_eq!(after.get("level").unwrap().as_i64().unwrap(), 1);
    assert_eq!(after.get("xp_into_level").unwrap().as_i64().unwrap(), 0);
}

#[tokio::test]
async fn free_plan_limits_active_tasks_and_rewards() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    let child_token = server.login("ala", "kidpass").await;

    for title in ["One", "Two", "Three"] {
        server
            .request_expect(
                "POST",
                &endpoints::child_tasks("", FAMILY_ID, "ala"),
                Some(&parent_token),
                Some(json!({"title": title, "points": 10})),
                StatusCode::OK,
            )
            .await;
    }
    let (status, body) = server
        .request(
            "POST",
            &endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(&parent_token),
            Some(json!({"title": "Four", "points": 10})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(
        body.get("error")
            .and_then(|v| v.as_str())
            .unwrap()
            .contains("free plan")
    );

    // The cap is per child; the other child still has headroom.
    server
        .request_expect(
            "POST",
            &endpoints::child_tasks("", FAMILY_ID, "bruno"),
            Some(&parent_token),
            Some(json!({"title": "Bruno task", "points": 10})),
            StatusCode::OK,
        )
        .await;

    // Approving a task frees its slot.
    let tasks = server
        .request_expect(
            "GET",
            &endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    let first_id = tasks.as_array().unwrap()[0]
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    server
        .request_expect(
            "POST",
            &endpoints::task_complete("", FAMILY_ID, "ala", &first_id),
            Some(&child_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    server
        .request_expect(
            "POST",
            &endpoints::task_approve("", FAMILY_ID, "ala", &first_id),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    server
        .request_expect(
            "POST",
            &endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(&parent_token),
            Some(json!({"title": "Four again", "points": 10})),
            StatusCode::OK,
        )
        .await;

    // Same cap for rewards, family-wide.
    for title in ["R1", "R2", "R3"] {
        server
            .request_expect(
                "POST",
                &endpoints::rewards("", FAMILY_ID),
                Some(&parent_token),
                Some(json!({"title": title, "cost": 10})),
                StatusCode::OK,
            )
            .await;
    }
    let (status, _) = server
        .request(
            "POST",
            &endpoints::rewards("", FAMILY_ID),
            Some(&parent_token),
            Some(json!({"title": "R4", "cost": 10})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Premium lifts both caps.
    let Some(premium) = TestServer::spawn_with_plan(Plan::Premium).await else {
        return;
    };
    let parent_token = premium.login("parent", "secret123").await;
    for i in 0..5 {
        premium
            .request_expect(
                "POST",
                &endpoints::child_tasks("", FAMILY_ID, "ala"),
                Some(&parent_token),
                Some(json!({"title": format!("Task {i}"), "points": 5})),
                StatusCode::OK,
            )
            .await;
    }
}

#[tokio::test]
async fn validation_errors_are_rejected_up_front() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    let child_token = server.login("ala", "kidpass").await;

    let cases: Vec<(String, Option<&str>, Value)> = vec![
        (
            endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(parent_token.as_str()),
            json!({"title": "  ", "points": 10}),
        ),
        (
            endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(parent_token.as_str()),
            json!({"title": "Dust shelves", "points": 0}),
        ),
        (
            endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(parent_token.as_str()),
            json!({"title": "Dust shelves", "points": -5}),
        ),
        (
            endpoints::rewards("", FAMILY_ID),
            Some(parent_token.as_str()),
            json!({"title": "", "cost": 10}),
        ),
        (
            endpoints::rewards("", FAMILY_ID),
            Some(parent_token.as_str()),
            json!({"title": "Movie", "cost": 0}),
        ),
        (
            endpoints::reward_suggest("", FAMILY_ID),
            Some(child_token.as_str()),
            json!({"name": "   ", "suggested_cost": 10}),
        ),
        (
            endpoints::reward_suggest("", FAMILY_ID),
            Some(child_token.as_str()),
            json!({"name": "Lego set", "suggested_cost": 0}),
        ),
    ];
    for (path, token, body) in cases {
        server
            .request_expect("POST", &path, token, Some(body), StatusCode::BAD_REQUEST)
            .await;
    }

    // Nothing was created along the way.
    let tasks = server
        .request_expect(
            "GET",
            &endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(tasks.as_array().unwrap().is_empty());
    let rewards = server
        .request_expect(
            "GET",
            &endpoints::rewards("", FAMILY_ID),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(rewards.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn role_and_ownership_access_control() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    let child_token = server.login("ala", "kidpass").await;

    // A task that exists, to prove the denials are not 404s in disguise.
    let task = server
        .request_expect(
            "POST",
            &endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(&parent_token),
            Some(json!({"title": "Walk dog", "points": 10})),
            StatusCode::OK,
        )
        .await;
    let task_id = task.get("id").and_then(|v| v.as_str()).unwrap().to_string();

    let child_denied: Vec<(&str, String, Option<Value>)> = vec![
        ("GET", endpoints::children("", FAMILY_ID), None),
        ("GET", endpoints::household_progress("", FAMILY_ID), None),
        ("GET", endpoints::approvals("", FAMILY_ID), None),
        ("GET", endpoints::redemptions("", FAMILY_ID), None),
        (
            "POST",
            endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(json!({"title": "Self-assigned", "points": 5})),
        ),
        (
            "POST",
            endpoints::task_approve("", FAMILY_ID, "ala", &task_id),
            None,
        ),
        (
            "POST",
            endpoints::task_reject("", FAMILY_ID, "ala", &task_id),
            None,
        ),
        (
            "DELETE",
            endpoints::task_delete("", FAMILY_ID, "ala", &task_id),
            None,
        ),
        (
            "POST",
            endpoints::rewards("", FAMILY_ID),
            Some(json!({"title": "Candy", "cost": 5})),
        ),
        (
            "POST",
            endpoints::reward_deactivate("", FAMILY_ID, "some-reward"),
            None,
        ),
        (
            "POST",
            endpoints::redemption_approve("", FAMILY_ID, "some-id"),
            None,
        ),
        (
            "POST",
            endpoints::redemption_reject("", FAMILY_ID, "some-id"),
            None,
        ),
        ("GET", endpoints::child_ledger("", FAMILY_ID, "bruno"), None),
        ("GET", endpoints::child_streak("", FAMILY_ID, "bruno"), None),
        (
            "GET",
            endpoints::child_achievements("", FAMILY_ID, "bruno"),
            None,
        ),
        ("GET", endpoints::child_tasks("", FAMILY_ID, "bruno"), None),
        (
            "GET",
            endpoints::child_redemptions("", FAMILY_ID, "bruno"),
            None,
        ),
        (
            "POST",
            endpoints::child_redemptions("", FAMILY_ID, "bruno"),
            Some(json!({"reward_id": "whatever"})),
        ),
        (
            "POST",
            endpoints::task_complete("", FAMILY_ID, "bruno", "any"),
            None,
        ),
        (
            "POST",
            endpoints::task_help("", FAMILY_ID, "bruno", "any"),
            Some(json!({"message": "hi"})),
        ),
    ];
    for (method, path, body) in child_denied.iter() {
        server
            .request_expect(
                method,
                path,
                Some(&child_token),
                body.clone(),
                StatusCode::FORBIDDEN,
            )
            .await;
    }

    let parent_denied: Vec<(&str, String, Option<Value>)> = vec![
        (
            "POST",
            endpoints::task_complete("", FAMILY_ID, "ala", &task_id),
            None,
        ),
        (
            "POST",
            endpoints::task_help("", FAMILY_ID, "ala", &task_id),
            Some(json!({"message": "let me"})),
        ),
        (
            "POST",
            endpoints::reward_suggest("", FAMILY_ID),
            Some(json!({"name": "Bike", "suggested_cost": 500})),
        ),
        (
            "POST",
            endpoints::redemption_remind("", FAMILY_ID, "some-id"),
            None,
        ),
        (
            "POST",
            endpoints::child_redemptions("", FAMILY_ID, "ala"),
            Some(json!({"reward_id": "whatever"})),
        ),
    ];
    for (method, path, body) in parent_denied.iter() {
        server
            .request_expect(
                method,
                path,
                Some(&parent_token),
                body.clone(),
                StatusCode::FORBIDDEN,
            )
            .await;
    }

    // Tokens are bound to the family in the path.
    server
        .request_expect(
            "GET",
            &endpoints::children("", "otherfam"),
            Some(&parent_token),
            None,
            StatusCode::FORBIDDEN,
        )
        .await;

    // A child nudging another child's redemption is denied in the handler.
    let reward = server
        .request_expect(
            "POST",
            &endpoints::rewards("", FAMILY_ID),
            Some(&parent_token),
            Some(json!({"title": "Pizza", "cost": 10})),
            StatusCode::OK,
        )
        .await;
    let reward_id = reward.get("id").and_then(|v| v.as_str()).unwrap();
    let bruno_token = server.login("bruno", "brunopass").await;
    let redemption = server
        .request_expect(
            "POST",
            &endpoints::child_redemptions("", FAMILY_ID, "bruno"),
            Some(&bruno_token),
            Some(json!({"reward_id": reward_id})),
            StatusCode::OK,
        )
        .await;
    let redemption_id = redemption.get("id").and_then(|v| v.as_str()).unwrap();
    server
        .request_expect(
            "POST",
            &endpoints::redemption_remind("", FAMILY_ID, redemption_id),
            Some(&child_token),
            None,
            StatusCode::FORBIDDEN,
        )
        .await;
}

#[tokio::test]
async fn same_day_approvals_keep_streak_at_one() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    let child_token = server.login("ala", "kidpass").await;

    for title in ["Morning chores", "Evening chores"] {
        let task_id = server
            .create_and_complete_task(&parent_token, &child_token, "ala", title, 40)
            .await;
        server
            .request_expect(
                "POST",
                &endpoints::task_approve("", FAMILY_ID, "ala", &task_id),
                Some(&parent_token),
                None,
                StatusCode::OK,
            )
            .await;
    }

    let streak = server
        .request_expect(
            "GET",
            &endpoints::child_streak("", FAMILY_ID, "ala"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(streak.get("current_streak").unwrap().as_i64().unwrap(), 1);
    assert_eq!(streak.get("longest_streak").unwrap().as_i64().unwrap(), 1);
    assert_eq!(streak.get("total_completed").unwrap().as_i64().unwrap(), 2);
    assert!(streak.get("last_completed_on").unwrap().is_string());
}

#[tokio::test]
async fn household_progress_aggregates_children() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    let ala_token = server.login("ala", "kidpass").await;
    let bruno_token = server.login("bruno", "brunopass").await;

    let ala_task = server
        .create_and_complete_task(&parent_token, &ala_token, "ala", "Ala chore", 60)
        .await;
    server
        .request_expect(
            "POST",
            &endpoints::task_approve("", FAMILY_ID, "ala", &ala_task),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    let bruno_task = server
        .create_and_complete_task(&parent_token, &bruno_token, "bruno", "Bruno chore", 250)
        .await;
    server
        .request_expect(
            "POST",
            &endpoints::task_approve("", FAMILY_ID, "bruno", &bruno_task),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;

    let progress = server
        .request_expect(
            "GET",
            &endpoints::household_progress("", FAMILY_ID),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    let children = progress.get("children").unwrap().as_array().unwrap();
    assert_eq!(children.len(), 2);
    let ala_row = children
        .iter()
        .find(|c| c.get("child_id").and_then(|v| v.as_str()) == Some("ala"))
        .unwrap();
    assert_eq!(ala_row.get("balance").unwrap().as_i64().unwrap(), 60);
    assert_eq!(ala_row.get("level").unwrap().as_i64().unwrap(), 1);

    let summary = progress.get("summary").unwrap();
    assert_eq!(summary.get("level").unwrap().as_i64().unwrap(), 3);
    assert_eq!(summary.get("xp_into_level").unwrap().as_i64().unwrap(), 50);
    assert_eq!(summary.get("total_completed").unwrap().as_i64().unwrap(), 2);
    assert_eq!(
        summary
            .get("best_current_streak")
            .unwrap()
            .as_i64()
            .unwrap(),
        1
    );
    let leaders = summary.get("leaders").unwrap();
    assert_eq!(
        leaders.get("highest_level").and_then(|v| v.as_str()),
        Some("bruno")
    );
}

#[tokio::test]
async fn suggesting_rewards_only_notifies_parents() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    let child_token = server.login("ala", "kidpass").await;

    server
        .request_expect(
            "POST",
            &endpoints::reward_suggest("", FAMILY_ID),
            Some(&child_token),
            Some(json!({
                "name": "Trampoline park",
                "description": "Saturday trip",
                "suggested_cost": 400
            })),
            StatusCode::NO_CONTENT,
        )
        .await;

    let notifications = server
        .request_expect(
            "GET",
            &endpoints::notifications("", FAMILY_ID),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    let suggestion = notifications
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n.get("kind").and_then(|v| v.as_str()) == Some("reward_suggested"))
        .expect("suggestion notification missing");
    assert!(
        suggestion
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap()
            .contains("Trampoline park")
    );

    // No reward row is created by a suggestion.
    let rewards = server
        .request_expect(
            "GET",
            &endpoints::rewards("", FAMILY_ID),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(rewards.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn deleting_an_approved_task_takes_points_back() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    let child_token = server.login("ala", "kidpass").await;

    let task_id = server
        .create_and_complete_task(&parent_token, &child_token, "ala", "Mow lawn", 50)
        .await;
    let after = server
        .request_expect(
            "POST",
            &endpoints::task_approve("", FAMILY_ID, "ala", &task_id),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(after.get("balance").unwrap().as_i64().unwrap(), 50);

    server
        .request_expect(
            "DELETE",
            &endpoints::task_delete("", FAMILY_ID, "ala", &task_id),
            Some(&parent_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    let ledger = server
        .request_expect(
            "GET",
            &endpoints::child_ledger("", FAMILY_ID, "ala"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert_eq!(ledger.get("balance").unwrap().as_i64().unwrap(), 0);

    server
        .request_expect(
            "DELETE",
            &endpoints::task_delete("", FAMILY_ID, "ala", &task_id),
            Some(&parent_token),
            None,
            StatusCode::NOT_FOUND,
        )
        .await;
    let tasks = server
        .request_expect(
            "GET",
            &endpoints::child_tasks("", FAMILY_ID, "ala"),
            Some(&child_token),
            None,
            StatusCode::OK,
        )
        .await;
    assert!(tasks.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn tampered_tokens_are_rejected() {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let child_token = server.login("ala", "kidpass").await;

    // Upgrade the role claim without re-signing; the signature no longer
    // covers the payload and the token must be refused.
    let parts: Vec<&str> = child_token.split('.').collect();
    let payload = String::from_utf8(URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
    let tampered_payload = payload.replace("\"role\":\"child\"", "\"role\":\"parent\"");
    let tampered = format!(
        "{}.{}.{}",
        parts[0],
        URL_SAFE_NO_PAD.encode(tampered_payload),
        parts[2]
    );
    server
        .request_expect(
            "GET",
            &endpoints::approvals("", FAMILY_ID),
            Some(&tampered),
            None,
            StatusCode::UNAUTHORIZED,
        )
        .await;

    server
        .request_expect(
            "GET",
            &endpoints::children("", FAMILY_ID),
            Some("not-a-token"),
            None,
            StatusCode::UNAUTHORIZED,
        )
        .await;
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    server
        .request_expect(
            "GET",
            &endpoints::children("", FAMILY_ID),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;
    server
        .request_expect(
            "POST",
            &endpoints::auth_logout(""),
            Some(&parent_token),
            None,
            StatusCode::NO_CONTENT,
        )
        .await;
    server
        .request_expect(
            "GET",
            &endpoints::children("", FAMILY_ID),
            Some(&parent_token),
            None,
            StatusCode::UNAUTHORIZED,
        )
        .await;
}

async fn read_sse_events(resp: &mut reqwest::Response, want: usize) -> Vec<Value> {
    let mut events = Vec::new();
    let mut buf = String::new();
    while events.len() < want {
        let chunk = tokio::time::timeout(std::time::Duration::from_secs(10), resp.chunk())
            .await
            .expect("timed out waiting for sse event")
            .expect("sse stream error")
            .expect("sse stream closed early");
        buf.push_str(std::str::from_utf8(&chunk).unwrap());
        while let Some(pos) = buf.find("\n\n") {
            let frame: String = buf.drain(..pos + 2).collect();
            for line in frame.lines() {
                if let Some(data) = line.strip_prefix("data: ") {
                    if let Ok(v) = serde_json::from_str::<Value>(data) {
                        events.push(v);
                    }
                }
            }
        }
    }
    events
}

#[tokio::test]
async fn sse_streams_are_filtered_by_role() {
    let Some(server) = TestServer::spawn().await else {
        return;
    };
    let parent_token = server.login("parent", "secret123").await;
    let child_token = server.login("ala", "kidpass").await;

    // Emit nothing until both streams are connected.
    let task_id = server
        .create_and_complete_task(&parent_token, &child_token, "ala", "Stream test", 70)
        .await;

    let mut parent_stream = server
        .client
        .get(endpoints::events(&server.base, FAMILY_ID))
        .bearer_auth(&parent_token)
        .send()
        .await
        .unwrap();
    assert_eq!(parent_stream.status(), StatusCode::OK);
    let mut child_stream = server
        .client
        .get(endpoints::events(&server.base, FAMILY_ID))
        .bearer_auth(&child_token)
        .send()
        .await
        .unwrap();
    assert_eq!(child_stream.status(), StatusCode::OK);

    server
        .request_expect(
            "POST",
            &endpoints::task_approve("", FAMILY_ID, "ala", &task_id),
            Some(&parent_token),
            None,
            StatusCode::OK,
        )
        .await;

    // Parents get the full firehose in emit order.
    let parent_events = read_sse_events(&mut parent_stream, 3).await;
    assert_eq!(
        parent_events[0].get("type").and_then(|v| v.as_str()),
        Some("ledger_updated")
    );
    assert_eq!(
        parent_events[0].get("child_id").and_then(|v| v.as_str()),
        Some("ala")
    );
    assert_eq!(
        parent_events[0].get("balance").unwrap().as_i64().unwrap(),
        70
    );
    assert_eq!(
        parent_events[1].get("type").and_then(|v| v.as_str()),
        Some("pending_count")
    );
    assert_eq!(
        parent_events[2].get("type").and_then(|v| v.as_str()),
        Some("activity_added")
    );

    // The child never sees the pending counter; their next two events are
    // their own ledger update and activity marker.
    let child_events = read_sse_events(&mut child_stream, 2).await;
    assert_eq!(
        child_events[0].get("type").and_then(|v| v.as_str()),
        Some("ledger_updated")
    );
    assert_eq!(
        child_events[1].get("type").and_then(|v| v.as_str()),
        Some("activity_added")
    );
    assert_eq!(
        child_events[1].get("child_id").and_then(|v| v.as_str()),
        Some("ala")
    );
}
