use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::domain::{Actor, DemandDraft, DemandId, DemandRevision, Role, UserId};
use super::engine::Marketplace;
use super::ledger::{HistoryScope, LedgerReason};
use super::lifecycle::LifecycleError;
use super::ErrorKind;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// HTTP endpoints for demands, points, and activity. Callers are identified by the
/// `x-user-*` headers set by the upstream session layer.
pub fn marketplace_router(engine: Arc<Marketplace>) -> Router {
    Router::new()
        .route("/api/v1/demands", post(publish_handler))
        .route(
            "/api/v1/demands/:demand_id",
            get(fetch_handler)
                .patch(revise_handler)
                .delete(delete_handler),
        )
        .route("/api/v1/demands/:demand_id/accept", post(accept_handler))
        .route("/api/v1/demands/:demand_id/complete", post(complete_handler))
        .route(
            "/api/v1/demands/:demand_id/recommendation",
            post(recommend_handler),
        )
        .route("/api/v1/demands/:demand_id/comments", post(comment_handler))
        .route("/api/v1/points/balance", get(balance_handler))
        .route("/api/v1/points/history", get(history_handler))
        .route("/api/v1/points/adjustments", post(adjust_handler))
        .route("/api/v1/activity", post(activity_handler))
        .route("/api/v1/activity/leaderboard", get(leaderboard_handler))
        .route("/api/v1/activity/summary", get(summary_handler))
        .with_state(engine)
}

/// Resolve the caller from the trusted identity headers.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let user_id = read(USER_ID_HEADER).ok_or_else(|| {
        let payload = json!({
            "error": format!("missing {USER_ID_HEADER} header"),
            "kind": "unauthenticated",
            "retryable": false,
        });
        (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
    })?;
    let role = match read(USER_ROLE_HEADER) {
        Some(raw) => Role::parse(raw).ok_or_else(|| {
            failure(ErrorKind::InvalidInput, format!("unknown role '{raw}'"))
        })?,
        None => {
            return Err(failure(
                ErrorKind::InvalidInput,
                format!("missing {USER_ROLE_HEADER} header"),
            ))
        }
    };
    let display_name = read(USER_NAME_HEADER).unwrap_or(user_id);

    Ok(Actor::new(user_id, role, display_name))
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecommendationRequest {
    pub(crate) recommended: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentRequest {
    pub(crate) body: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdjustmentRequest {
    pub(crate) user_id: String,
    pub(crate) delta: i64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryQuery {
    pub(crate) scope: Option<String>,
    pub(crate) user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct LeaderboardQuery {
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SummaryQuery {
    pub(crate) date: Option<String>,
}

pub(crate) async fn publish_handler(
    State(engine): State<Arc<Marketplace>>,
    headers: HeaderMap,
    Json(draft): Json<DemandDraft>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match engine.lifecycle.publish(&actor, draft) {
        Ok(demand) => {
            touch(&engine, &actor);
            (StatusCode::CREATED, Json(demand)).into_response()
        }
        Err(error) => lifecycle_failure(error),
    }
}

pub(crate) async fn fetch_handler(
    State(engine): State<Arc<Marketplace>>,
    Path(demand_id): Path<String>,
) -> Response {
    match engine.lifecycle.get(&DemandId(demand_id)) {
        Ok(demand) => (StatusCode::OK, Json(demand)).into_response(),
        Err(error) => lifecycle_failure(error),
    }
}

pub(crate) async fn revise_handler(
    State(engine): State<Arc<Marketplace>>,
    headers: HeaderMap,
    Path(demand_id): Path<String>,
    Json(revision): Json<DemandRevision>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match engine
        .lifecycle
        .revise(&DemandId(demand_id), &actor, revision)
    {
        Ok(demand) => (StatusCode::OK, Json(demand)).into_response(),
        Err(error) => lifecycle_failure(error),
    }
}

pub(crate) async fn delete_handler(
    State(engine): State<Arc<Marketplace>>,
    headers: HeaderMap,
    Path(demand_id): Path<String>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match engine.lifecycle.delete(&DemandId(demand_id), &actor) {
        Ok(demand) => (StatusCode::OK, Json(demand)).into_response(),
        Err(error) => lifecycle_failure(error),
    }
}

pub(crate) async fn accept_handler(
    State(engine): State<Arc<Marketplace>>,
    headers: HeaderMap,
    Path(demand_id): Path<String>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match engine.lifecycle.accept(&DemandId(demand_id), &actor) {
        Ok(demand) => {
            touch(&engine, &actor);
            (StatusCode::OK, Json(demand)).into_response()
        }
        Err(error) => lifecycle_failure(error),
    }
}

pub(crate) async fn complete_handler(
    State(engine): State<Arc<Marketplace>>,
    headers: HeaderMap,
    Path(demand_id): Path<String>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match engine.lifecycle.complete(&DemandId(demand_id), &actor) {
        Ok(demand) => {
            touch(&engine, &actor);
            (StatusCode::OK, Json(demand)).into_response()
        }
        Err(error) => lifecycle_failure(error),
    }
}

pub(crate) async fn recommend_handler(
    State(engine): State<Arc<Marketplace>>,
    headers: HeaderMap,
    Path(demand_id): Path<String>,
    Json(request): Json<RecommendationRequest>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match engine
        .lifecycle
        .recommend(&DemandId(demand_id), &actor, request.recommended)
    {
        Ok(demand) => (StatusCode::OK, Json(demand)).into_response(),
        Err(error) => lifecycle_failure(error),
    }
}

pub(crate) async fn comment_handler(
    State(engine): State<Arc<Marketplace>>,
    headers: HeaderMap,
    Path(demand_id): Path<String>,
    Json(request): Json<CommentRequest>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match engine
        .lifecycle
        .comment(&DemandId(demand_id), &actor, &request.body)
    {
        Ok(demand) => {
            touch(&engine, &actor);
            (StatusCode::CREATED, Json(demand)).into_response()
        }
        Err(error) => lifecycle_failure(error),
    }
}

pub(crate) async fn balance_handler(
    State(engine): State<Arc<Marketplace>>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match engine.ledger.balance_of(&actor.user_id) {
        Ok(balance) => (
            StatusCode::OK,
            Json(json!({ "user_id": actor.user_id, "balance": balance })),
        )
            .into_response(),
        Err(error) => failure(error.kind(), error.to_string()),
    }
}

pub(crate) async fn history_handler(
    State(engine): State<Arc<Marketplace>>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let scope = match (query.scope.as_deref(), query.user) {
        (Some("all"), _) => HistoryScope::All,
        (_, Some(user)) => HistoryScope::Member(UserId::new(user)),
        _ => HistoryScope::Member(actor.user_id.clone()),
    };
    match engine.ledger.history(&scope, &actor) {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(error) => failure(error.kind(), error.to_string()),
    }
}

pub(crate) async fn adjust_handler(
    State(engine): State<Arc<Marketplace>>,
    headers: HeaderMap,
    Json(request): Json<AdjustmentRequest>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match engine.ledger.adjust(
        &UserId::new(request.user_id),
        request.delta,
        LedgerReason::ManualAdjustment,
        &actor,
    ) {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(error) => failure(error.kind(), error.to_string()),
    }
}

pub(crate) async fn activity_handler(
    State(engine): State<Arc<Marketplace>>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match engine.activity.record_now(&actor.user_id) {
        Ok(count) => (
            StatusCode::OK,
            Json(json!({
                "user_id": actor.user_id,
                "date": engine.activity.today(),
                "count": count,
            })),
        )
            .into_response(),
        Err(error) => failure(error.kind(), error.to_string()),
    }
}

pub(crate) async fn leaderboard_handler(
    State(engine): State<Arc<Marketplace>>,
    Query(query): Query<LeaderboardQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(engine.config.leaderboard_limit);
    match engine
        .activity
        .leaderboard(engine.activity.current_week(), Role::Employee, limit)
    {
        Ok(board) => (StatusCode::OK, Json(board)).into_response(),
        Err(error) => failure(error.kind(), error.to_string()),
    }
}

pub(crate) async fn summary_handler(
    State(engine): State<Arc<Marketplace>>,
    Query(query): Query<SummaryQuery>,
) -> Response {
    let date = match query.date.as_deref() {
        None => engine.activity.today(),
        Some(raw) => match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            Ok(date) => date,
            Err(err) => {
                return failure(
                    ErrorKind::InvalidInput,
                    format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"),
                )
            }
        },
    };
    match engine.activity.summary(date) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => failure(error.kind(), error.to_string()),
    }
}

fn touch(engine: &Marketplace, actor: &Actor) {
    if let Err(error) = engine.activity.record_now(&actor.user_id) {
        warn!(user = %actor.user_id, %error, "failed to record activity");
    }
}

fn lifecycle_failure(error: LifecycleError) -> Response {
    let kind = error.kind();
    let payload = match &error {
        LifecycleError::InvalidTransition {
            demand_id,
            current,
            command,
            reason,
        } => json!({
            "error": error.to_string(),
            "kind": kind,
            "demand_id": demand_id,
            "current_status": current,
            "command": command,
            "reason": reason,
            "retryable": kind.is_retryable(),
        }),
        _ => json!({
            "error": error.to_string(),
            "kind": kind,
            "retryable": kind.is_retryable(),
        }),
    };
    (kind.status_code(), Json(payload)).into_response()
}

fn failure(kind: ErrorKind, message: String) -> Response {
    let payload = json!({
        "error": message,
        "kind": kind,
        "retryable": kind.is_retryable(),
    });
    (kind.status_code(), Json(payload)).into_response()
}
