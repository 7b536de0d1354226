use axum::extract::{Path, Query, State};
use axum::{Json, http::StatusCode, response::IntoResponse};
use axum_extra::extract::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use chrono::NaiveDate;
use http::HeaderMap;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::{
    AppState,
    auth::{verify_token, viewer_from_headers},
    client::EventQuery,
    error::HttpError,
    models::CalendarEvent,
    service::{CreateOutcome, EventForm, EventLifecycleService, EventPatch},
};

type BearerHeader = Option<TypedHeader<Authorization<Bearer>>>;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub token: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RejectForm {
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

/// Authenticates the request and builds a service bound to its viewer.
fn service_for(
    state: &AppState,
    auth: BearerHeader,
    query_token: Option<&str>,
    headers: &HeaderMap,
) -> Result<EventLifecycleService, HttpError> {
    let auth_header = auth.map(|TypedHeader(a)| a);
    verify_token(&state.settings, auth_header, query_token)?;
    let viewer = viewer_from_headers(headers)?;
    Ok(
        EventLifecycleService::new(state.api.clone(), viewer, state.timezone)
            .with_fan_out(state.settings.fan_out),
    )
}

fn created_response(outcome: CreateOutcome) -> impl IntoResponse {
    let status = if outcome.created.is_empty() {
        StatusCode::BAD_GATEWAY
    } else if outcome.is_complete() {
        StatusCode::CREATED
    } else {
        StatusCode::MULTI_STATUS
    };
    let failed: Vec<_> = outcome
        .failed
        .iter()
        .map(|f| {
            json!({
                "class_id": f.class_id,
                "error": f.error.to_string(),
                "retryable": f.error.is_retryable(),
            })
        })
        .collect();
    (
        status,
        Json(json!({
            "message": outcome.message(),
            "status": outcome.status,
            "events": outcome.created,
            "failed": failed,
        })),
    )
}

#[utoipa::path(get, path = "/", tag = "events")]
pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "School Calendar API",
        "endpoints": {
            "/events": "List or create calendar events",
            "/events/pending": "Events awaiting approval",
            "/events.ics": "Download visible events as iCal file"
        }
    }))
}

#[utoipa::path(get, path = "/healthz/live", tag = "events")]
pub async fn healthz_live() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

#[utoipa::path(get, path = "/healthz/ready", tag = "events")]
pub async fn healthz_ready() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

#[utoipa::path(
    get,
    path = "/events",
    params(
        ("start_date" = Option<String>, Query, description = "Range start (YYYY-MM-DD), requires end_date"),
        ("end_date" = Option<String>, Query, description = "Range end (YYYY-MM-DD), requires start_date"),
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "Events visible to the viewer", body = [CalendarEvent]),
        (status = 400, description = "Invalid date range"),
        (status = 401, description = "Invalid authentication token or viewer")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    auth: BearerHeader,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CalendarEvent>>, HttpError> {
    let service = service_for(&state, auth, query.token.as_deref(), &headers)?;
    let events = match (query.start_date, query.end_date) {
        (Some(start), Some(end)) => service.list_range(start, end).await?,
        (None, None) => service.list_all().await?,
        _ => {
            return Err(HttpError::BadRequest(
                "start_date and end_date must be given together".into(),
            ));
        }
    };
    Ok(Json(events))
}

async fn list_with(
    state: AppState,
    auth: BearerHeader,
    headers: HeaderMap,
    token: Option<String>,
    query: EventQuery,
) -> Result<Json<Vec<CalendarEvent>>, HttpError> {
    let service = service_for(&state, auth, token.as_deref(), &headers)?;
    Ok(Json(service.list(&query).await?))
}

#[utoipa::path(
    get,
    path = "/events/today",
    responses((status = 200, description = "Today's visible events", body = [CalendarEvent])),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "events"
)]
pub async fn list_today(
    State(state): State<AppState>,
    auth: BearerHeader,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Vec<CalendarEvent>>, HttpError> {
    list_with(state, auth, headers, query.token, EventQuery::Today).await
}

#[utoipa::path(
    get,
    path = "/events/upcoming",
    responses((status = 200, description = "Upcoming visible events", body = [CalendarEvent])),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "events"
)]
pub async fn list_upcoming(
    State(state): State<AppState>,
    auth: BearerHeader,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Vec<CalendarEvent>>, HttpError> {
    list_with(state, auth, headers, query.token, EventQuery::Upcoming).await
}

#[utoipa::path(
    get,
    path = "/events/class/{class_id}",
    params(("class_id" = String, Path, description = "Class division id")),
    responses((status = 200, description = "Visible events for one class", body = [CalendarEvent])),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "events"
)]
pub async fn list_for_class(
    State(state): State<AppState>,
    auth: BearerHeader,
    headers: HeaderMap,
    Path(class_id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Vec<CalendarEvent>>, HttpError> {
    list_with(state, auth, headers, query.token, EventQuery::Class(class_id)).await
}

#[utoipa::path(
    get,
    path = "/events/teacher",
    responses((status = 200, description = "Visible events for the teaching staff", body = [CalendarEvent])),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "events"
)]
pub async fn list_for_teacher(
    State(state): State<AppState>,
    auth: BearerHeader,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Vec<CalendarEvent>>, HttpError> {
    list_with(state, auth, headers, query.token, EventQuery::Teacher).await
}

#[utoipa::path(
    get,
    path = "/events/pending",
    responses(
        (status = 200, description = "Events awaiting review", body = [CalendarEvent]),
        (status = 403, description = "Viewer cannot review events")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "events"
)]
pub async fn list_pending(
    State(state): State<AppState>,
    auth: BearerHeader,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<Json<Vec<CalendarEvent>>, HttpError> {
    list_with(state, auth, headers, query.token, EventQuery::Pending).await
}

#[utoipa::path(
    post,
    path = "/events",
    request_body = EventForm,
    responses(
        (status = 201, description = "All events created"),
        (status = 207, description = "Some classes failed"),
        (status = 400, description = "Invalid form"),
        (status = 403, description = "Viewer cannot create events"),
        (status = 502, description = "Events API failure, retry")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "events"
)]
pub async fn create_event(
    State(state): State<AppState>,
    auth: BearerHeader,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    Json(form): Json<EventForm>,
) -> Result<impl IntoResponse, HttpError> {
    let service = service_for(&state, auth, query.token.as_deref(), &headers)?;
    let outcome = service.create_event(form).await?;
    Ok(created_response(outcome))
}

#[utoipa::path(
    get,
    path = "/events/{id}",
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "The event", body = CalendarEvent),
        (status = 404, description = "Unknown or hidden event")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "events"
)]
pub async fn get_event(
    State(state): State<AppState>,
    auth: BearerHeader,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<CalendarEvent>, HttpError> {
    let service = service_for(&state, auth, query.token.as_deref(), &headers)?;
    Ok(Json(service.get(&id).await?))
}

#[utoipa::path(
    patch,
    path = "/events/{id}",
    params(("id" = String, Path, description = "Event id")),
    request_body = EventPatch,
    responses(
        (status = 200, description = "Updated event", body = CalendarEvent),
        (status = 400, description = "Invalid change"),
        (status = 409, description = "Event can no longer be edited")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "events"
)]
pub async fn update_event(
    State(state): State<AppState>,
    auth: BearerHeader,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
    Json(patch): Json<EventPatch>,
) -> Result<Json<CalendarEvent>, HttpError> {
    let service = service_for(&state, auth, query.token.as_deref(), &headers)?;
    Ok(Json(service.update_event(&id, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/events/{id}",
    params(("id" = String, Path, description = "Event id")),
    responses((status = 204, description = "Event removed")),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "events"
)]
pub async fn delete_event(
    State(state): State<AppState>,
    auth: BearerHeader,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<StatusCode, HttpError> {
    let service = service_for(&state, auth, query.token.as_deref(), &headers)?;
    service.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/events/{id}/approve",
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "Approved event", body = CalendarEvent),
        (status = 403, description = "Viewer cannot review events"),
        (status = 409, description = "Event is not pending")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "events"
)]
pub async fn approve_event(
    State(state): State<AppState>,
    auth: BearerHeader,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<CalendarEvent>, HttpError> {
    let service = service_for(&state, auth, query.token.as_deref(), &headers)?;
    Ok(Json(service.approve(&id).await?))
}

#[utoipa::path(
    post,
    path = "/events/{id}/reject",
    params(("id" = String, Path, description = "Event id")),
    request_body = RejectForm,
    responses(
        (status = 200, description = "Rejected event", body = CalendarEvent),
        (status = 403, description = "Viewer cannot review events"),
        (status = 409, description = "Event is not pending")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "events"
)]
pub async fn reject_event(
    State(state): State<AppState>,
    auth: BearerHeader,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<TokenQuery>,
    Json(form): Json<RejectForm>,
) -> Result<Json<CalendarEvent>, HttpError> {
    let service = service_for(&state, auth, query.token.as_deref(), &headers)?;
    let reason = form.rejection_reason.as_deref();
    Ok(Json(service.reject(&id, reason).await?))
}

#[utoipa::path(
    get,
    path = "/events.ics",
    params(
        ("token" = Option<String>, Query, description = "Authentication token (alternative to Bearer header)")
    ),
    responses(
        (status = 200, description = "iCal file", content_type = "text/calendar"),
        (status = 401, description = "Invalid authentication token or viewer")
    ),
    security(("bearer_auth" = []), ("query_token" = [])),
    tag = "events"
)]
pub async fn get_ical(
    State(state): State<AppState>,
    auth: BearerHeader,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, HttpError> {
    let service = service_for(&state, auth, query.token.as_deref(), &headers)?;
    let events = service.list_all().await?;
    let body = state.exporter.generate(&events);
    Ok((
        StatusCode::OK,
        [
            ("content-type", "text/calendar"),
            (
                "content-disposition",
                "attachment; filename=school_calendar.ics",
            ),
        ],
        body,
    ))
}
