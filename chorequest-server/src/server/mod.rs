mod acl;
pub mod auth;
mod config;
mod events;

use crate::server::auth::AuthCtx;
use crate::storage::Recipient;
use crate::storage::models::{Redemption, Reward, Streak, Task};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::{Method, StatusCode, header},
    routing::{delete, get, post},
};
use bcrypt::verify;
use chorequest_shared::api;
use chorequest_shared::api::{ChildDto, ServerEvent};
use chorequest_shared::domain::{AchievementCriteria, RedemptionStatus};
use chorequest_shared::ledger::{self, ChildProgress, LedgerSummary};
use chorequest_shared::plan::FREE_ACTIVE_LIMIT;
pub use config::{AppConfig, Role, UserConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, broadcast};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

type LedgerCacheMap = std::sync::Arc<
    Mutex<std::collections::HashMap<String, std::sync::Arc<Mutex<Option<LedgerSummary>>>>>,
>;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: crate::storage::Store,
    tz: chrono_tz::Tz,
    // Cached ledger summary per child. None => recompute from the logs
    ledger_cache: LedgerCacheMap,
    events: broadcast::Sender<ServerEvent>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: crate::storage::Store) -> Self {
        let tz = match config.timezone.as_deref() {
            Some(name) => name.parse::<chrono_tz::Tz>().unwrap_or_else(|_| {
                tracing::warn!(timezone = %name, "unknown timezone in config, using UTC");
                chrono_tz::UTC
            }),
            None => chrono_tz::UTC,
        };
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            store,
            tz,
            ledger_cache: Default::default(),
            events,
            shutdown: CancellationToken::new(),
        }
    }

    /// Today's date on the family's calendar, used for streak arithmetic.
    pub fn today(&self) -> chrono::NaiveDate {
        chrono::Utc::now().with_timezone(&self.tz).date_naive()
    }

    async fn child_mutex(&self, child_id: &str) -> std::sync::Arc<Mutex<Option<LedgerSummary>>> {
        let mut map = self.ledger_cache.lock().await;
        map.entry(child_id.to_string())
            .or_insert_with(Default::default)
            .clone()
    }

    pub async fn reset_ledger(&self, guard: &mut LedgerGuard<'_>) {
        guard.take();
    }

    pub async fn ledger_summary(
        &self,
        child_id: &str,
        guard: &mut LedgerGuard<'_>,
    ) -> Result<LedgerSummary, AppError> {
        if let Some(v) = **guard {
            return Ok(v);
        }

        // Compute and cache

        let (earned, spent) = self.store.ledger_totals(child_id).await?;
        let v = LedgerSummary::from_totals(earned, spent);
        **guard = Some(v);
        Ok(v)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ServerEvent) {
        // Nobody listening is not an error
        let _ = self.events.send(event);
    }

    fn emit_ledger_updated(&self, child_id: &str, summary: LedgerSummary) {
        self.emit(ServerEvent::LedgerUpdated {
            child_id: child_id.to_string(),
            balance: summary.balance,
            level: summary.level,
        });
    }

    /// Recount both approval queues and push the combined number. Count
    /// failures are logged, not surfaced.
    async fn emit_pending_count(&self) {
        let tasks = match self.store.pending_approvals_count().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "pending approvals count failed");
                return;
            }
        };
        let redemptions = match self.store.pending_redemptions_count().await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "pending redemptions count failed");
                return;
            }
        };
        self.emit(ServerEvent::PendingCount {
            count: tasks + redemptions,
        });
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let family = Router::new()
        .route(
            "/api/v1/family/{family_id}/children",
            get(api_list_children),
        )
        .route(
            "/api/v1/family/{family_id}/household/progress",
            get(api_household_progress),
        )
        .route(
            "/api/v1/family/{family_id}/children/{child_id}/ledger",
            get(api_child_ledger),
        )
        .route(
            "/api/v1/family/{family_id}/children/{child_id}/streak",
            get(api_child_streak),
        )
        .route(
            "/api/v1/family/{family_id}/children/{child_id}/achievements",
            get(api_child_achievements),
        )
        .route(
            "/api/v1/family/{family_id}/children/{child_id}/tasks",
            get(api_list_child_tasks).post(api_create_task),
        )
        .route(
            "/api/v1/family/{family_id}/children/{child_id}/tasks/{task_id}",
            delete(api_delete_task),
        )
        .route(
            "/api/v1/family/{family_id}/children/{child_id}/tasks/{task_id}/complete",
            post(api_complete_task),
        )
        .route(
            "/api/v1/family/{family_id}/children/{child_id}/tasks/{task_id}/approve",
            post(api_approve_task),
        )
        .route(
            "/api/v1/family/{family_id}/children/{child_id}/tasks/{task_id}/reject",
            post(api_reject_task),
        )
        .route(
            "/api/v1/family/{family_id}/children/{child_id}/tasks/{task_id}/help",
            post(api_request_help),
        )
        .route(
            "/api/v1/family/{family_id}/children/{child_id}/tasks/{task_id}/help/resolve",
            post(api_resolve_help),
        )
        .route(
            "/api/v1/family/{family_id}/approvals",
            get(api_pending_approvals),
        )
        .route(
            "/api/v1/family/{family_id}/rewards",
            get(api_list_rewards).post(api_create_reward),
        )
        .route(
            "/api/v1/family/{family_id}/rewards/suggest",
            post(api_suggest_reward),
        )
        .route(
            "/api/v1/family/{family_id}/rewards/{reward_id}/deactivate",
            post(api_deactivate_reward),
        )
        .route(
            "/api/v1/family/{family_id}/children/{child_id}/redemptions",
            get(api_list_child_redemptions).post(api_request_redemption),
        )
        .route(
            "/api/v1/family/{family_id}/redemptions",
            get(api_pending_redemptions),
        )
        .route(
            "/api/v1/family/{family_id}/redemptions/{redemption_id}/approve",
            post(api_approve_redemption),
        )
        .route(
            "/api/v1/family/{family_id}/redemptions/{redemption_id}/reject",
            post(api_reject_redemption),
        )
        .route(
            "/api/v1/family/{family_id}/redemptions/{redemption_id}/remind",
            post(api_remind_redemption),
        )
        .route(
            "/api/v1/family/{family_id}/notifications",
            get(api_list_notifications),
        )
        .route(
            "/api/v1/family/{family_id}/notifications/count",
            get(api_notifications_count),
        )
        .route(
            "/api/v1/family/{family_id}/notifications/{id}/read",
            post(api_mark_notification_read),
        )
        .route("/api/v1/family/{family_id}/activity", get(api_list_activity))
        .route("/api/v1/family/{family_id}/events", get(events::api_events))
        .with_state(state.clone())
        // Layers run outside-in: bearer auth first, then the ACL, then span
        // tagging once the AuthCtx exists.
        .layer(middleware::from_fn(set_auth_span_fields))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            acl::enforce_acl,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Logout lives outside the family scope but still needs a bearer token.
    let session = Router::new()
        .route("/api/v1/auth/logout", post(api_auth_logout))
        .with_state(state.clone())
        .layer(middleware::from_fn(set_auth_span_fields))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            username = tracing::field::Empty,
            role = tracing::field::Empty,
            child_id = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/auth/login", post(api_auth_login))
        .merge(family)
        .merge(session)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured

    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    // Put into request extensions for trace layer & handlers
    req.extensions_mut().insert(ReqId(rid.clone()));
    // Call next
    let mut resp = next.run(req).await;
    // Set header on response
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    // General security headers for all responses
    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("SAMEORIGIN"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );
    // HSTS is only honored on HTTPS; harmless otherwise
    headers.insert(
        HeaderName::from_static("strict-transport-security"),
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );

    // Disable caching for API and health endpoints
    if path == "/healthz" || path.starts_with("/api/") || path == "/api" {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(
            HeaderName::from_static("pragma"),
            HeaderValue::from_static("no-cache"),
        );
        headers.insert(
            HeaderName::from_static("expires"),
            HeaderValue::from_static("0"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("username", tracing::field::display(&auth.claims.sub));
        span.record("role", tracing::field::debug(auth.claims.role));
        if let Some(cid) = &auth.claims.child_id {
            span.record("child_id", tracing::field::display(cid));
        }
    }
    Ok(next.run(req).await)
}

async fn api_list_children(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<ChildDto>>, AppError> {
    // ACL enforced by middleware
    let rows = state.store.list_children().await?;
    let items = rows
        .into_iter()
        .map(|c| ChildDto {
            id: c.id,
            display_name: c.display_name,
        })
        .collect();
    Ok(Json(items))
}

// Path params beyond the ones a handler needs (family_id everywhere) are
// simply not named in these structs.
#[derive(Deserialize)]
struct ChildPath {
    child_id: String,
}

#[derive(Deserialize)]
struct ChildTaskPath {
    child_id: String,
    task_id: String,
}

#[derive(Deserialize)]
struct RewardPath {
    reward_id: String,
}

#[derive(Deserialize)]
struct RedemptionPath {
    redemption_id: String,
}

#[derive(Deserialize)]
struct NotificationPath {
    id: i32,
}

#[derive(Deserialize)]
struct PageOpts {
    page: Option<usize>,
    per_page: Option<usize>,
}

async fn api_child_ledger(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<ChildPath>,
) -> Result<Json<api::LedgerDto>, AppError> {
    // ACL enforced by middleware
    let child_mutex = state.child_mutex(&p.child_id).await;
    let mut guard = child_mutex.lock().await;

    let summary = state.ledger_summary(&p.child_id, &mut guard).await?;
    Ok(Json(ledger_dto(&p.child_id, summary)))
}

async fn api_child_streak(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<ChildPath>,
) -> Result<Json<api::StreakDto>, AppError> {
    let row = state.store.get_streak(&p.child_id).await?;
    Ok(Json(streak_dto(p.child_id, row)))
}

async fn api_child_achievements(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<ChildPath>,
) -> Result<Json<Vec<api::AchievementProgressDto>>, AppError> {
    let rows = state.store.achievement_progress(&p.child_id).await?;
    let items = rows
        .into_iter()
        .map(|(def, row)| {
            let criteria = def
                .criteria
                .parse::<AchievementCriteria>()
                .map_err(AppError::internal)?;
            Ok(api::AchievementProgressDto {
                id: def.id,
                title: def.title,
                description: def.description,
                criteria,
                threshold: def.threshold,
                progress: row.as_ref().map(|r| r.progress).unwrap_or(0),
                earned: row.as_ref().map(|r| r.earned).unwrap_or(false),
                earned_at: row.and_then(|r| r.earned_at).map(rfc3339),
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;
    Ok(Json(items))
}

async fn api_household_progress(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<api::HouseholdProgressDto>, AppError> {
    let rows = state.store.household_rows().await?;
    let mut children = Vec::with_capacity(rows.len());
    let mut progress = Vec::with_capacity(rows.len());
    for (child, earned, spent, streak) in rows {
        let summary = LedgerSummary::from_totals(earned, spent);
        let (current, longest, total) = match &streak {
            Some(s) => (s.current_streak, s.longest_streak, s.total_completed),
            None => (0, 0, 0),
        };
        children.push(api::HouseholdChildDto {
            child_id: child.id.clone(),
            display_name: child.display_name,
            balance: summary.balance,
            level: summary.level,
            xp_into_level: summary.xp_into_level,
            current_streak: current,
            longest_streak: longest,
            total_completed: total,
        });
        progress.push(ChildProgress {
            child_id: child.id,
            ledger: summary,
            current_streak: current,
            longest_streak: longest,
            total_completed: total as i64,
        });
    }
    let agg = ledger::household_summary(&progress);
    Ok(Json(api::HouseholdProgressDto {
        children,
        summary: api::HouseholdSummaryDto {
            level: agg.level,
            xp_into_level: agg.xp_into_level,
            xp_for_next_level: agg.xp_for_next_level,
            best_current_streak: agg.best_current_streak,
            best_longest_streak: agg.best_longest_streak,
            total_completed: agg.total_completed,
            leaders: api::HouseholdLeadersDto {
                highest_level: agg.leaders.highest_level,
                best_current_streak: agg.leaders.best_current_streak,
                longest_streak: agg.leaders.longest_streak,
            },
        },
    }))
}

async fn api_list_child_tasks(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<ChildPath>,
) -> Result<Json<Vec<api::TaskDto>>, AppError> {
    // ACL enforced by middleware
    let rows = state.store.list_tasks_for_child(&p.child_id).await?;
    Ok(Json(rows.into_iter().map(task_dto).collect()))
}

async fn api_create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<ChildPath>,
    Json(body): Json<api::CreateTaskReq>,
) -> Result<Json<api::TaskDto>, AppError> {
    let active = state.store.active_task_count(&p.child_id).await?;
    if !state.config.plan.allows_new_active(active) {
        return Err(AppError::plan_limit(format!(
            "free plan allows {} active tasks per child",
            FREE_ACTIVE_LIMIT
        )));
    }
    let task = state
        .store
        .create_task(
            &p.child_id,
            &body.title,
            body.description.as_deref(),
            body.points,
            body.category.as_deref(),
            &auth.claims.sub,
        )
        .await?;
    Ok(Json(task_dto(task)))
}

async fn api_complete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<ChildTaskPath>,
) -> Result<StatusCode, AppError> {
    state
        .store
        .complete_task(&p.child_id, &p.task_id, &auth.claims.sub)
        .await?;
    state.emit_pending_count().await;
    state.emit(ServerEvent::ActivityAdded {
        child_id: p.child_id,
    });
    Ok(StatusCode::NO_CONTENT)
}

async fn api_request_help(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<ChildTaskPath>,
    Json(body): Json<api::HelpRequestReq>,
) -> Result<StatusCode, AppError> {
    state
        .store
        .request_help(&p.child_id, &p.task_id, &body.message)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_resolve_help(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<ChildTaskPath>,
) -> Result<StatusCode, AppError> {
    state.store.resolve_help(&p.child_id, &p.task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

type LedgerGuard<'a> = MutexGuard<'a, Option<LedgerSummary>>;

async fn api_approve_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<ChildTaskPath>,
) -> Result<Json<api::LedgerDto>, AppError> {
    // Lock the child ID to avoid concurrent ledger updates
    let child_mutex = state.child_mutex(&p.child_id).await;
    let mut guard = child_mutex.lock().await;

    // Invalidate cache for this child; compute after DB update
    state.reset_ledger(&mut guard).await;
    state
        .store
        .approve_task(&p.child_id, &p.task_id, &auth.claims.sub, state.today())
        .await?;
    let summary = state.ledger_summary(&p.child_id, &mut guard).await?;
    state.emit_ledger_updated(&p.child_id, summary);
    state.emit_pending_count().await;
    state.emit(ServerEvent::ActivityAdded {
        child_id: p.child_id.clone(),
    });
    Ok(Json(ledger_dto(&p.child_id, summary)))
}

async fn api_reject_task(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<ChildTaskPath>,
) -> Result<StatusCode, AppError> {
    state.store.reject_task(&p.child_id, &p.task_id).await?;
    state.emit_pending_count().await;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_delete_task(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<ChildTaskPath>,
) -> Result<StatusCode, AppError> {
    let child_mutex = state.child_mutex(&p.child_id).await;
    let mut guard = child_mutex.lock().await;
    state.reset_ledger(&mut guard).await;

    let task = state.store.delete_task(&p.child_id, &p.task_id).await?;
    if task.approved {
        // Removing an approved task lowers the earned total
        let summary = state.ledger_summary(&p.child_id, &mut guard).await?;
        state.emit_ledger_updated(&p.child_id, summary);
    }
    state.emit_pending_count().await;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_pending_approvals(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::PendingApprovalDto>>, AppError> {
    let rows = state.store.list_pending_approvals().await?;
    let items = rows
        .into_iter()
        .map(|(t, c)| api::PendingApprovalDto {
            task_id: t.id,
            child_id: c.id,
            child_display_name: c.display_name,
            title: t.title,
            points: t.points,
            completed_at: t.completed_at.map(rfc3339),
        })
        .collect();
    Ok(Json(items))
}

async fn api_list_rewards(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::RewardDto>>, AppError> {
    // Children only see rewards they can still redeem
    let active_only = auth.claims.role == Role::Child;
    let rows = state.store.list_rewards(active_only).await?;
    Ok(Json(rows.into_iter().map(reward_dto).collect()))
}

async fn api_create_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::CreateRewardReq>,
) -> Result<Json<api::RewardDto>, AppError> {
    let active = state.store.active_reward_count().await?;
    if !state.config.plan.allows_new_active(active) {
        return Err(AppError::plan_limit(format!(
            "free plan allows {} active rewards",
            FREE_ACTIVE_LIMIT
        )));
    }
    let reward = state
        .store
        .create_reward(
            &body.title,
            body.description.as_deref(),
            body.cost,
            &auth.claims.sub,
        )
        .await?;
    Ok(Json(reward_dto(reward)))
}

async fn api_deactivate_reward(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<RewardPath>,
) -> Result<StatusCode, AppError> {
    state.store.deactivate_reward(&p.reward_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_suggest_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::SuggestRewardReq>,
) -> Result<StatusCode, AppError> {
    let child_id = auth
        .claims
        .child_id
        .as_deref()
        .ok_or_else(AppError::forbidden)?;
    state
        .store
        .suggest_reward(
            child_id,
            &body.name,
            body.description.as_deref(),
            body.suggested_cost,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_request_redemption(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<ChildPath>,
    Json(body): Json<api::RedeemReq>,
) -> Result<Json<api::RedemptionDto>, AppError> {
    // Accepted regardless of balance; points only move at approval.
    let (redemption, reward) = state
        .store
        .request_redemption(&p.child_id, &body.reward_id)
        .await?;
    state.emit_pending_count().await;
    state.emit(ServerEvent::ActivityAdded {
        child_id: p.child_id,
    });
    Ok(Json(redemption_dto(redemption, reward.title)?))
}

async fn api_list_child_redemptions(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(p): Path<ChildPath>,
    Query(opts): Query<PageOpts>,
) -> Result<Json<Vec<api::RedemptionDto>>, AppError> {
    let page = opts.page.unwrap_or(1);
    let per_page = opts.per_page.unwrap_or(10);
    let rows = state
        .store
        .list_redemptions_for_child(&p.child_id, page, per_page)
        .await?;
    let items = rows
        .into_iter()
        .map(|(r, reward)| redemption_dto(r, reward.title))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(items))
}

async fn api_pending_redemptions(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
) -> Result<Json<Vec<api::PendingRedemptionDto>>, AppError> {
    let rows = state.store.list_pending_redemptions().await?;
    let items = rows
        .into_iter()
        .map(|(r, reward, child)| api::PendingRedemptionDto {
            redemption_id: r.id,
            child_id: child.id,
            child_display_name: child.display_name,
            reward_title: reward.title,
            points_spent: r.points_spent,
            redeemed_at: rfc3339(r.redeemed_at),
        })
        .collect();
    Ok(Json(items))
}

async fn api_approve_redemption(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<RedemptionPath>,
) -> Result<Json<api::LedgerDto>, AppError> {
    let (redemption, _reward) = state
        .store
        .approve_redemption(&p.redemption_id, &auth.claims.sub)
        .await?;

    // The child is only known from the settled row; invalidate and recompute
    // under its lock afterwards.
    let child_mutex = state.child_mutex(&redemption.child_id).await;
    let mut guard = child_mutex.lock().await;
    state.reset_ledger(&mut guard).await;
    let summary = state
        .ledger_summary(&redemption.child_id, &mut guard)
        .await?;
    state.emit_ledger_updated(&redemption.child_id, summary);
    state.emit_pending_count().await;
    state.emit(ServerEvent::ActivityAdded {
        child_id: redemption.child_id.clone(),
    });
    Ok(Json(ledger_dto(&redemption.child_id, summary)))
}

async fn api_reject_redemption(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<RedemptionPath>,
) -> Result<StatusCode, AppError> {
    state
        .store
        .reject_redemption(&p.redemption_id, &auth.claims.sub)
        .await?;
    state.emit_pending_count().await;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_remind_redemption(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<RedemptionPath>,
) -> Result<StatusCode, AppError> {
    let redemption = state
        .store
        .get_redemption(&p.redemption_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!("redemption not found: {}", p.redemption_id))
        })?;
    // Children may only nudge their own requests
    if auth.claims.child_id.as_deref() != Some(redemption.child_id.as_str()) {
        return Err(AppError::forbidden());
    }
    state.store.remind_redemption(&p.redemption_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn api_list_notifications(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Query(opts): Query<PageOpts>,
) -> Result<Json<Vec<api::NotificationDto>>, AppError> {
    let page = opts.page.unwrap_or(1);
    let per_page = opts.per_page.unwrap_or(10);
    let rows = state
        .store
        .list_notifications(recipient_for(&auth), page, per_page)
        .await?;
    let items = rows
        .into_iter()
        .map(|n| api::NotificationDto {
            id: n.id,
            kind: n.kind,
            message: n.message,
            child_id: n.child_id,
            read: n.read,
            created_at: rfc3339(n.created_at),
        })
        .collect();
    Ok(Json(items))
}

async fn api_notifications_count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<api::NotificationCountDto>, AppError> {
    let count = state
        .store
        .unread_notification_count(recipient_for(&auth))
        .await?;
    Ok(Json(api::NotificationCountDto { count }))
}

async fn api_mark_notification_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(p): Path<NotificationPath>,
) -> Result<StatusCode, AppError> {
    let updated = state
        .store
        .mark_notification_read(p.id, recipient_for(&auth))
        .await?;
    if !updated {
        return Err(AppError::not_found(format!(
            "notification not found: {}",
            p.id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn api_list_activity(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Query(opts): Query<PageOpts>,
) -> Result<Json<Vec<api::ActivityItemDto>>, AppError> {
    let page = opts.page.unwrap_or(1);
    let per_page = opts.per_page.unwrap_or(10);
    let rows = state.store.list_activity(page, per_page).await?;
    let items = rows
        .into_iter()
        .map(|a| api::ActivityItemDto {
            id: a.id,
            child_id: a.child_id,
            actor: a.actor,
            kind: a.kind,
            message: a.message,
            created_at: rfc3339(a.created_at),
        })
        .collect();
    Ok(Json(items))
}

async fn api_auth_login(
    State(state): State<AppState>,
    Json(body): Json<api::AuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    // Find user in config
    let user = state
        .config
        .users
        .iter()
        .find(|u| u.username == body.username)
        .ok_or_else(|| {
            tracing::warn!(username=%body.username, "login: unknown username");
            AppError::unauthorized()
        })?;
    if !verify(&body.password, &user.password_hash).map_err(|e| {
        tracing::error!(username=%body.username, error=%e, "login: bcrypt verify failed");
        AppError::internal(e)
    })? {
        tracing::warn!(username=%body.username, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    // For child role, ensure child_id provided
    if user.role == Role::Child && user.child_id.is_none() {
        tracing::error!(username=%body.username, "login: child user missing child_id in config");
        return Err(AppError::internal("child user missing child_id"));
    }
    let family_id = state.config.family_id.clone();
    let token = auth::issue_jwt_for_user(
        &state,
        &user.username,
        user.role,
        user.child_id.clone(),
        &family_id,
    )
    .await?;
    Ok(Json(api::AuthResp { token }))
}

async fn api_auth_logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<StatusCode, AppError> {
    state.store.delete_session(&auth.claims.jti).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn rfc3339(dt: chrono::NaiveDateTime) -> String {
    chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(dt, chrono::Utc).to_rfc3339()
}

fn recipient_for(auth: &AuthCtx) -> Recipient {
    match auth.claims.child_id.clone() {
        Some(cid) if auth.claims.role == Role::Child => Recipient::Child(cid),
        _ => Recipient::Parents,
    }
}

fn ledger_dto(child_id: &str, s: LedgerSummary) -> api::LedgerDto {
    api::LedgerDto {
        child_id: child_id.to_string(),
        earned_points: s.earned_points,
        spent_points: s.spent_points,
        balance: s.balance,
        level: s.level,
        xp_into_level: s.xp_into_level,
        xp_for_next_level: s.xp_for_next_level,
    }
}

fn task_dto(t: Task) -> api::TaskDto {
    api::TaskDto {
        id: t.id,
        child_id: t.child_id,
        title: t.title,
        description: t.description,
        points: t.points,
        category: t.category,
        created_by: t.created_by,
        completed: t.completed,
        approved: t.approved,
        help_requested: t.help_requested,
        help_message: t.help_message,
        created_at: rfc3339(t.created_at),
        completed_at: t.completed_at.map(rfc3339),
        approved_at: t.approved_at.map(rfc3339),
    }
}

fn reward_dto(r: Reward) -> api::RewardDto {
    api::RewardDto {
        id: r.id,
        title: r.title,
        description: r.description,
        cost: r.cost,
        active: r.active,
        created_at: rfc3339(r.created_at),
    }
}

fn redemption_dto(r: Redemption, reward_title: String) -> Result<api::RedemptionDto, AppError> {
    let status = r
        .status
        .parse::<RedemptionStatus>()
        .map_err(AppError::internal)?;
    Ok(api::RedemptionDto {
        id: r.id,
        reward_id: r.reward_id,
        reward_title,
        child_id: r.child_id,
        points_spent: r.points_spent,
        status,
        redeemed_at: rfc3339(r.redeemed_at),
        approved_at: r.approved_at.map(rfc3339),
        approved_by: r.approved_by,
    })
}

fn streak_dto(child_id: String, row: Option<Streak>) -> api::StreakDto {
    match row {
        Some(s) => api::StreakDto {
            child_id,
            current_streak: s.current_streak,
            longest_streak: s.longest_streak,
            total_completed: s.total_completed,
            last_completed_on: s.last_completed_on.map(|d| d.to_string()),
        },
        // No approvals yet; everything starts at zero
        None => api::StreakDto {
            child_id,
            current_streak: 0,
            longest_streak: 0,
            total_completed: 0,
            last_completed_on: None,
        },
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Conflict(String),
    PlanLimit(String),
    Internal(String),
}

impl AppError {
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn plan_limit<T: Into<String>>(msg: T) -> Self {
        Self::PlanLimit(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<crate::storage::StorageError> for AppError {
    fn from(e: crate::storage::StorageError) -> Self {
        use crate::storage::StorageError;
        match e {
            StorageError::NotFound(m) => AppError::NotFound(m),
            StorageError::Conflict(m) => AppError::Conflict(m),
            StorageError::InvalidInput(m) => AppError::BadRequest(m),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, "conflict", None),
            AppError::PlanLimit(m) => (StatusCode::FORBIDDEN, m, "plan_limit", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        // Log any error responses at ERROR level to file for troubleshooting
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::error!(status = %status, kind = kind, message = %msg, "request failed");
        }
        let body = axum::Json(ErrorBody { error: msg });
        (status, body).into_response()
    }
}
