use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers::RejectForm;
use crate::models::{CalendarEvent, EventCategory, EventStatus, EventType, Role};
use crate::service::{EventForm, EventPatch};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "query_token",
            SecurityScheme::ApiKey(ApiKey::Query(ApiKeyValue::new("token"))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz_live,
        crate::handlers::healthz_ready,
        crate::handlers::list_events,
        crate::handlers::list_today,
        crate::handlers::list_upcoming,
        crate::handlers::list_for_class,
        crate::handlers::list_for_teacher,
        crate::handlers::list_pending,
        crate::handlers::create_event,
        crate::handlers::get_event,
        crate::handlers::update_event,
        crate::handlers::delete_event,
        crate::handlers::approve_event,
        crate::handlers::reject_event,
        crate::handlers::get_ical
    ),
    components(schemas(
        CalendarEvent,
        EventForm,
        EventPatch,
        RejectForm,
        EventType,
        EventCategory,
        EventStatus,
        Role
    )),
    tags(
        (name = "events", description = "School calendar event lifecycle")
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;
