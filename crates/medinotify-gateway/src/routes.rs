//! API route handlers for the gateway.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use medinotify_core::config::GatewayConfig;
use medinotify_core::{JobState, NotificationFilter, NotifyError, Priority, SortOrder};
use medinotify_scheduler::CreateNotification;

use super::server::AppState;

/// Error body: `{"ok": false, "error": "...", "kind": "validation"}`.
#[derive(Debug)]
pub struct ApiError(pub NotifyError);

impl From<NotifyError> for ApiError {
    fn from(e: NotifyError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            NotifyError::Validation(_) => StatusCode::BAD_REQUEST,
            NotifyError::NotFound(_) => StatusCode::NOT_FOUND,
            NotifyError::Scheduling { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            NotifyError::Dispatch { .. } | NotifyError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("❌ {}", self.0);
        } else {
            tracing::debug!("request rejected: {}", self.0);
        }
        let body = serde_json::json!({
            "ok": false,
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Sender identity from the configured header, else the configured default.
fn sender_from(headers: &HeaderMap, config: &GatewayConfig) -> ApiResult<String> {
    let from_header = headers
        .get(config.sender_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    from_header
        .map(str::to_string)
        .or_else(|| config.default_sender.clone())
        .ok_or_else(|| {
            ApiError(NotifyError::Validation(format!(
                "sender identity missing (set the {} header)",
                config.sender_header
            )))
        })
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "medinotify-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationBody {
    #[serde(default)]
    pub receiver_email: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub future: bool,
    pub date: Option<String>,
    pub time: Option<String>,
    #[serde(default)]
    pub recurring: bool,
    /// `"10"`, `10` or `"2 days"`.
    pub frequency: Option<serde_json::Value>,
    pub priority: Option<String>,
}

impl CreateNotificationBody {
    fn into_input(self) -> ApiResult<CreateNotification> {
        let frequency = match self.frequency {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            Some(other) => {
                return Err(ApiError(NotifyError::Validation(format!(
                    "frequency must be a string or number, got {other}"
                ))));
            }
        };
        let priority = match self.priority.as_deref() {
            None | Some("") => Priority::default(),
            Some(p) => p.parse().map_err(|e| ApiError(NotifyError::Validation(e)))?,
        };
        Ok(CreateNotification {
            recipient: self.receiver_email,
            content: self.content,
            future: self.future,
            date: self.date,
            time: self.time,
            recurring: self.recurring,
            frequency,
            priority,
        })
    }
}

/// POST /api/v1/create-notification
pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CreateNotificationBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let Json(body) = body.map_err(|e| ApiError(NotifyError::Validation(e.body_text())))?;
    let sender = sender_from(&headers, &state.gateway_config)?;
    let created = state.service.create(&sender, body.into_input()?).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "ok": true,
            "notification": created.notification,
            "schedule": created.kind,
            "jobId": created.job_id,
            "delayMs": created.delay.as_millis() as u64,
        })),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub sender: Option<String>,
    pub limit: Option<usize>,
    /// "asc" for oldest first; newest first otherwise.
    pub order: Option<String>,
}

/// GET /api/v1/list-notifications
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let filter = NotificationFilter {
        sender: query.sender.filter(|s| !s.trim().is_empty()),
        limit: query.limit,
        sort: match query.order.as_deref() {
            Some("asc") | Some("oldest") => SortOrder::OldestFirst,
            _ => SortOrder::NewestFirst,
        },
    };
    let notifications = state.service.list(&filter).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "count": notifications.len(),
        "notifications": notifications,
    })))
}

/// GET /api/v1/notification/{id}
pub async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let notification = state.service.get(&id).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "awaitingDispatch": notification.awaiting_dispatch(),
        "notification": notification,
    })))
}

/// DELETE /api/v1/notification/{id}
pub async fn cancel_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let cancelled = state.service.cancel(&id).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "id": cancelled.id,
        "removedJobCount": cancelled.removed_job_count,
    })))
}

/// POST /api/v1/notification/{id}/reenqueue
pub async fn reenqueue_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let job_id = state.service.reenqueue(&id).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "id": id,
        "jobId": job_id,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct JobsQuery {
    /// Comma-separated job states; all states when absent.
    pub state: Option<String>,
}

/// GET /api/v1/queue/jobs
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let states: Vec<JobState> = match query.state.as_deref().map(str::trim) {
        None | Some("") => vec![
            JobState::Waiting,
            JobState::Delayed,
            JobState::Active,
            JobState::Completed,
            JobState::Failed,
        ],
        Some(raw) => raw
            .split(',')
            .map(|s| s.parse::<JobState>())
            .collect::<Result<_, _>>()
            .map_err(|e| ApiError(NotifyError::Validation(e)))?,
    };

    let mut jobs = state.service.dispatcher().queue().get_jobs(&states).await?;
    jobs.sort_by(|a, b| a.ready_at.cmp(&b.ready_at).then_with(|| a.id.cmp(&b.id)));
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for job in &jobs {
        *counts.entry(job.state.as_str()).or_insert(0) += 1;
    }
    Ok(Json(serde_json::json!({
        "ok": true,
        "counts": counts,
        "jobs": jobs,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::FixedOffset;
    use medinotify_core::FrequencyUnit;
    use medinotify_scheduler::{
        DispatchPolicy, JobDispatcher, MemoryQueue, NotificationService, SqliteNotificationStore,
    };

    const SENDER: &str = "reception@hospital.org";

    fn test_state() -> State<Arc<AppState>> {
        let store = Arc::new(SqliteNotificationStore::in_memory().unwrap());
        let dispatcher = JobDispatcher::new(Arc::new(MemoryQueue::default()), DispatchPolicy::default());
        let service = NotificationService::new(
            store,
            dispatcher,
            FrequencyUnit::Minute,
            FixedOffset::east_opt(0).unwrap(),
        );
        State(Arc::new(AppState::new(GatewayConfig::default(), Arc::new(service))))
    }

    fn sender_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-Sender-Email", HeaderValue::from_static(SENDER));
        headers
    }

    fn body(json: serde_json::Value) -> Result<Json<CreateNotificationBody>, JsonRejection> {
        Ok(Json(serde_json::from_value(json).unwrap()))
    }

    async fn create(state: &State<Arc<AppState>>, json: serde_json::Value) -> serde_json::Value {
        let (status, Json(value)) = create_notification(state.clone(), sender_headers(), body(json))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        value
    }

    #[tokio::test]
    async fn test_health_check() {
        let Json(json) = health_check(test_state()).await;
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn test_create_immediate() {
        let state = test_state();
        let json = create(
            &state,
            serde_json::json!({"receiverEmail": "a@b.com", "content": "hi", "future": false}),
        )
        .await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["schedule"], "immediate");
        assert_eq!(json["delayMs"], 0);
        assert_eq!(json["notification"]["senderIdentity"], SENDER);
        assert_eq!(json["notification"]["isFuture"], false);
        assert!(json["notification"]["scheduledDate"].is_null());
    }

    #[tokio::test]
    async fn test_create_recurring_numeric_frequency() {
        let state = test_state();
        let json = create(
            &state,
            serde_json::json!({
                "receiverEmail": "a@b.com",
                "content": "Check blood pressure",
                "recurring": true,
                "frequency": 10,
                "priority": "high",
            }),
        )
        .await;
        assert_eq!(json["schedule"], "recurring");
        assert_eq!(json["notification"]["frequency"]["count"], 10);
        assert_eq!(json["notification"]["frequency"]["unit"], "minute");
    }

    #[tokio::test]
    async fn test_create_validation_is_400() {
        let state = test_state();
        let err = create_notification(
            state.clone(),
            sender_headers(),
            body(serde_json::json!({"receiverEmail": "", "content": "hi"})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = create_notification(
            state.clone(),
            HeaderMap::new(),
            body(serde_json::json!({"receiverEmail": "a@b.com", "content": "hi"})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = create_notification(
            state,
            sender_headers(),
            body(serde_json::json!({"receiverEmail": "a@b.com", "content": "hi", "priority": "asap"})),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_impossible_date_is_422() {
        let err = create_notification(
            test_state(),
            sender_headers(),
            body(serde_json::json!({
                "receiverEmail": "a@b.com",
                "content": "hi",
                "future": true,
                "date": "2025-02-30",
                "time": "09:00",
            })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_list_get_cancel_flow() {
        let state = test_state();
        let created = create(
            &state,
            serde_json::json!({
                "receiverEmail": "a@b.com",
                "content": "Surgery prep",
                "future": true,
                "date": "2099-03-01",
                "time": "07:15",
            }),
        )
        .await;
        let id = created["notification"]["id"].as_str().unwrap().to_string();

        let Json(list) = list_notifications(
            state.clone(),
            Query(ListQuery {
                sender: Some(SENDER.into()),
                ..ListQuery::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(list["count"], 1);

        let Json(one) = get_notification(state.clone(), Path(id.clone())).await.unwrap();
        assert_eq!(one["awaitingDispatch"], true);
        assert_eq!(one["notification"]["scheduleHistory"][0]["status"], "pending");

        let Json(jobs) = list_jobs(
            state.clone(),
            Query(JobsQuery {
                state: Some("delayed".into()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(jobs["counts"]["delayed"], 1);

        let Json(cancelled) = cancel_notification(state.clone(), Path(id.clone())).await.unwrap();
        assert_eq!(cancelled["removedJobCount"], 1);

        let err = get_notification(state.clone(), Path(id.clone())).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err = cancel_notification(state, Path(id)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reenqueue_is_idempotent() {
        let state = test_state();
        let created = create(
            &state,
            serde_json::json!({
                "receiverEmail": "a@b.com",
                "content": "hi",
                "future": true,
                "date": "2099-03-01",
                "time": "07:15",
            }),
        )
        .await;
        let id = created["notification"]["id"].as_str().unwrap().to_string();
        let Json(again) = reenqueue_notification(state, Path(id)).await.unwrap();
        assert_eq!(again["jobId"], created["jobId"]);
    }

    #[tokio::test]
    async fn test_list_jobs_rejects_unknown_state() {
        let err = list_jobs(
            test_state(),
            Query(JobsQuery {
                state: Some("delayed,sleeping".into()),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (NotifyError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (NotifyError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                NotifyError::Scheduling { id: "n".into(), reason: "x".into() },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                NotifyError::Dispatch { id: "n".into(), reason: "x".into() },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (NotifyError::Queue("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (NotifyError::Store("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn test_default_sender_fallback() {
        let mut config = GatewayConfig::default();
        assert!(sender_from(&HeaderMap::new(), &config).is_err());
        config.default_sender = Some("system@hospital.org".into());
        assert_eq!(sender_from(&HeaderMap::new(), &config).unwrap(), "system@hospital.org");
        assert_eq!(sender_from(&sender_headers(), &config).unwrap(), SENDER);
    }
}
