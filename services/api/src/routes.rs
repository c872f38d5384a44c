use crate::infra::AppState;
use axum::extract::Query;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use collab_exchange::marketplace::router::actor_from_headers;
use collab_exchange::marketplace::{marketplace_router, Marketplace};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct FeedQuery {
    #[serde(default)]
    pub(crate) limit: Option<usize>,
}

pub(crate) fn with_marketplace_routes(engine: Arc<Marketplace>) -> Router {
    marketplace_router(engine)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/notifications", get(notifications_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Newest-first notifications addressed to the caller, by id or by role.
pub(crate) async fn notifications_endpoint(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Query(query): Query<FeedQuery>,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    let mut notifications = state.feed.visible_to(&actor.user_id, actor.role);
    if let Some(limit) = query.limit {
        notifications.truncate(limit);
    }

    (StatusCode::OK, Json(notifications)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{bootstrap, Bootstrap};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use collab_exchange::config::EngineConfig;
    use collab_exchange::marketplace::router::{USER_ID_HEADER, USER_ROLE_HEADER};
    use collab_exchange::marketplace::{
        Actor, DemandDraft, ManualClock, RewardType, Role, Urgency,
    };
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    fn app(ready: bool) -> (Router, Arc<Marketplace>, AppState) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 10, 15, 9, 0, 0)
                .single()
                .expect("valid instant"),
        ));
        let Bootstrap { engine, feed } =
            bootstrap(EngineConfig::default(), clock).expect("bootstrap");
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
            feed,
        };
        let router = with_marketplace_routes(engine.clone()).layer(Extension(state.clone()));
        (router, engine, state)
    }

    fn get_as(uri: &str, user: Option<(&str, &str)>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some((id, role)) = user {
            builder = builder
                .header(USER_ID_HEADER, id)
                .header(USER_ROLE_HEADER, role);
        }
        builder.body(Body::empty()).expect("request")
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    fn publish_and_accept(engine: &Marketplace) {
        let creator = Actor::new("employee1", Role::Employee, "Employee One");
        let helper = Actor::new("employee2", Role::Employee, "Employee Two");
        let demand = engine
            .lifecycle
            .publish(
                &creator,
                DemandDraft {
                    title: "Proofread quarterly report".to_string(),
                    description: String::new(),
                    customer_info: String::new(),
                    tags: Vec::new(),
                    urgency: Urgency::Normal,
                    reward_type: RewardType::Points,
                    reward_value: 150,
                },
            )
            .expect("publish");
        engine.lifecycle.accept(&demand.id, &helper).expect("accept");
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (router, _, _) = app(true);
        let response = router
            .oneshot(get_as("/health", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let (router, _, state) = app(false);
        let pending = router
            .clone()
            .oneshot(get_as("/ready", None))
            .await
            .expect("response");
        assert_eq!(pending.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.readiness.store(true, Ordering::Release);
        let ready = router
            .oneshot(get_as("/ready", None))
            .await
            .expect("response");
        assert_eq!(ready.status(), StatusCode::OK);
        assert_eq!(json_body(ready).await["status"], "ready");
    }

    #[tokio::test]
    async fn notifications_are_scoped_to_the_caller() {
        let (router, engine, _) = app(true);
        publish_and_accept(&engine);

        let creator = router
            .clone()
            .oneshot(get_as(
                "/api/v1/notifications?limit=1",
                Some(("employee1", "employee")),
            ))
            .await
            .expect("response");
        assert_eq!(creator.status(), StatusCode::OK);
        let body = json_body(creator).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["event"]["type"], "demand_accepted");

        let president = router
            .oneshot(get_as(
                "/api/v1/notifications",
                Some(("president", "president")),
            ))
            .await
            .expect("response");
        assert_eq!(json_body(president).await, json!([]));
    }

    #[tokio::test]
    async fn notifications_require_identity() {
        let (router, _, _) = app(true);
        let response = router
            .oneshot(get_as("/api/v1/notifications", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn marketplace_routes_are_mounted() {
        let (router, _, _) = app(true);
        let response = router
            .oneshot(get_as(
                "/api/v1/points/balance",
                Some(("employee2", "employee")),
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
