pub mod approval;
pub mod auth;
pub mod client;
pub mod compose;
pub mod distribution;
pub mod error;
pub mod handlers;
pub mod ical;
pub mod models;
pub mod openapi;
pub mod service;
pub mod settings;
pub mod validation;
pub mod visibility;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use chrono_tz::Tz;
use handlers::{
    approve_event, create_event, delete_event, get_event, get_ical, healthz_live, healthz_ready,
    list_events, list_for_class, list_for_teacher, list_pending, list_today, list_upcoming,
    reject_event, root, update_event,
};
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::client::{EventsApi, HttpEventsApi};
use crate::ical::ICalExporter;
use crate::openapi::ApiDoc;
use crate::settings::Settings;

#[derive(Clone)]
pub struct AppState {
    pub(crate) settings: Settings,
    pub(crate) timezone: Tz,
    pub(crate) api: Arc<dyn EventsApi>,
    pub(crate) exporter: Arc<ICalExporter>,
}

impl AppState {
    pub fn new(settings: Settings, api: Arc<dyn EventsApi>) -> Result<Self, config::ConfigError> {
        let timezone = settings.tz()?;
        let exporter = Arc::new(ICalExporter::new(settings.calendar_name.clone(), timezone));
        Ok(Self {
            settings,
            timezone,
            api,
            exporter,
        })
    }
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;

    let env_filter = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .without_time()
        .init();

    let api = HttpEventsApi::new(
        settings.events_api_url.clone(),
        settings.events_api_token.clone(),
    );
    let state = AppState::new(settings, Arc::new(api))?;

    let app = build_router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], state.settings.port));
    info!(
        events_api = %state.settings.events_api_url,
        timezone = %state.timezone,
        "Starting School Calendar API on {addr}"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        );

    let mut router = Router::new()
        .route("/", get(root))
        .route("/healthz/live", get(healthz_live))
        .route("/healthz/ready", get(healthz_ready))
        .route("/events", get(list_events).post(create_event))
        .route("/events.ics", get(get_ical))
        .route("/events/today", get(list_today))
        .route("/events/upcoming", get(list_upcoming))
        .route("/events/teacher", get(list_for_teacher))
        .route("/events/pending", get(list_pending))
        .route("/events/class/{class_id}", get(list_for_class))
        .route(
            "/events/{id}",
            get(get_event).patch(update_event).delete(delete_event),
        )
        .route("/events/{id}/approve", post(approve_event))
        .route("/events/{id}/reject", post(reject_event))
        .with_state(state.clone());

    if state.settings.enable_swagger {
        let openapi = ApiDoc::openapi();
        let swagger = SwaggerUi::new("/docs").url("/openapi.json", openapi);
        router = router.merge(swagger);
    }

    router.layer(trace_layer)
}
