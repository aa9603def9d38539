use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use log::info;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::{
    schedule::{NewSchedule, ScheduleError, ScheduleStore, ScheduleUpdate},
    tracker::PortfolioTracker,
};

pub struct AppState {
    pub tracker: Arc<PortfolioTracker>,
    pub store: Arc<ScheduleStore>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> ApiError {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> ApiError {
        ApiError {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({"status": "error", "message": self.message}));
        (self.status, body).into_response()
    }
}

impl From<ScheduleError> for ApiError {
    fn from(e: ScheduleError) -> ApiError {
        match e {
            ScheduleError::NotFound(_) => ApiError::not_found(e.to_string()),
            ScheduleError::Invalid(_) => ApiError::bad_request(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> ApiError {
        ApiError::bad_request(rejection.body_text())
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/sources", get(list_sources))
        .route("/api/run", post(run_update))
        .route("/api/schedules", get(list_schedules).post(create_schedule))
        .route(
            "/api/schedules/{id}",
            put(update_schedule).delete(delete_schedule),
        )
        .with_state(state)
}

async fn list_sources(State(state): State<Arc<AppState>>) -> Json<JsonValue> {
    Json(json!({
        "status": "success",
        "sources": state.tracker.available_sources(),
    }))
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    #[serde(default)]
    sources: Vec<String>,
}

async fn run_update(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> ApiResult<Json<JsonValue>> {
    let Json(request) = payload?;
    if request.sources.is_empty() {
        return Err(ApiError::bad_request("No sources selected for update"));
    }
    info!("Manual update requested for {}", request.sources.join(", "));
    let report = state.tracker.run_selected(&request.sources).await;
    Ok(Json(json!({
        "status": "success",
        "message": "Portfolio update completed successfully",
        "details": report,
    })))
}

async fn list_schedules(State(state): State<Arc<AppState>>) -> Json<JsonValue> {
    Json(json!({
        "status": "success",
        "schedules": state.store.list().await,
    }))
}

async fn create_schedule(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewSchedule>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JsonValue>)> {
    let Json(new) = payload?;
    let schedule = state.store.create(new).await?;
    info!("Created schedule {} ({})", schedule.id, schedule.name);
    Ok((
        StatusCode::CREATED,
        Json(json!({"status": "success", "schedule": schedule})),
    ))
}

async fn update_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
    payload: Result<Json<ScheduleUpdate>, JsonRejection>,
) -> ApiResult<Json<JsonValue>> {
    let Json(update) = payload?;
    let schedule = state.store.update(id, update).await?;
    Ok(Json(json!({"status": "success", "schedule": schedule})))
}

async fn delete_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> ApiResult<Json<JsonValue>> {
    state.store.delete(id).await?;
    info!("Deleted schedule {}", id);
    Ok(Json(json!({
        "status": "success",
        "message": "Schedule deleted successfully",
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingSource, RecordingSink, StaticSource};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    fn app() -> Router {
        let tracker = PortfolioTracker::new(Arc::new(RecordingSink::default()))
            .register("Trading212", Arc::new(StaticSource::new("Trading212", &[("AAPL", dec!(300))])))
            .register("Binance", Arc::new(FailingSource("Invalid API-key")));
        create_router(Arc::new(AppState {
            tracker: Arc::new(tracker),
            store: Arc::new(ScheduleStore::new()),
        }))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn weekly() -> JsonValue {
        json!({
            "name": "Friday close",
            "schedule_type": "weekly",
            "time": "22:00",
            "day_of_week": 4,
            "selected_sources": ["Trading212"]
        })
    }

    #[tokio::test]
    async fn lists_sources_in_registration_order() {
        let (status, body) = call(&app(), "GET", "/api/sources", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sources"], json!(["Trading212", "Binance"]));
    }

    #[tokio::test]
    async fn run_without_sources_is_rejected() {
        let app = app();
        let (status, body) = call(&app, "POST", "/api/run", Some(json!({"sources": []}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({"status": "error", "message": "No sources selected for update"})
        );

        let (status, body) = call(&app, "POST", "/api/run", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn run_reports_the_tracker_outcome() {
        let (status, body) = call(
            &app(),
            "POST",
            "/api/run",
            Some(json!({"sources": ["Trading212", "Binance"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["details"]["status"], "partial_success");
        assert_eq!(body["details"]["positions"], 1);
        assert!(body["details"]["errors"]["Binance"]
            .as_str()
            .unwrap()
            .contains("Invalid API-key"));
    }

    #[tokio::test]
    async fn malformed_bodies_get_an_error_payload() {
        let (status, body) = call(
            &app(),
            "POST",
            "/api/schedules",
            Some(json!({"name": "Missing fields"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn schedule_lifecycle() {
        let app = app();
        let (status, body) = call(&app, "POST", "/api/schedules", Some(weekly())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["schedule"]["id"], 1);
        assert_eq!(body["schedule"]["time"], "22:00");
        assert_eq!(body["schedule"]["active"], true);

        let (status, body) = call(&app, "GET", "/api/schedules", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["schedules"].as_array().unwrap().len(), 1);

        let (status, body) = call(&app, "PUT", "/api/schedules/1", Some(json!({"active": false}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["schedule"]["active"], false);
        assert_eq!(body["schedule"]["name"], "Friday close");

        let (status, body) = call(&app, "PUT", "/api/schedules/1", Some(json!({"time": "late"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");

        let (status, body) = call(&app, "PUT", "/api/schedules/7", Some(json!({"active": true}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"status": "error", "message": "Schedule not found"}));

        let (status, _) = call(&app, "DELETE", "/api/schedules/1", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "DELETE", "/api/schedules/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_schedule_is_a_bad_request() {
        let mut schedule = weekly();
        schedule["day_of_week"] = json!(null);
        let (status, body) = call(&app(), "POST", "/api/schedules", Some(schedule)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Weekly schedules need a day_of_week");
    }
}
