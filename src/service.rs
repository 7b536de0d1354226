use std::sync::Arc;

use chrono::NaiveDate;
use chrono_tz::Tz;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::approval::{self, IllegalTransition, LifecycleAction};
use crate::client::{EventQuery, EventsApi};
use crate::compose::{LocalDate, TimeCompositor, format_clock_time};
use crate::distribution::{self, DistributionPlan};
use crate::error::EventError;
use crate::models::{
    CalendarEvent, EventCategory, EventStatus, EventType, EventUpdateRequest, NewEventRequest,
    Viewer,
};
use crate::validation::{validate_date_range, validate_required};
use crate::visibility;

/// How a multi-class submission reaches the Events API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutMode {
    /// One request carrying every class id.
    #[default]
    Batched,
    /// One request per class, issued concurrently.
    PerClass,
}

/// What the create form submits.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EventForm {
    pub title: String,
    pub description: String,
    #[schema(value_type = String, example = "2025-09-10")]
    pub date: LocalDate,
    #[serde(default)]
    #[schema(example = "09:00")]
    pub start_time: Option<String>,
    #[serde(default)]
    #[schema(example = "10:00")]
    pub end_time: Option<String>,
    #[serde(default)]
    pub is_full_day: bool,
    pub event_type: EventType,
    #[serde(default)]
    pub event_category: EventCategory,
    #[serde(default)]
    pub class_ids: Vec<String>,
}

/// A partial edit. Absent fields keep their stored values.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, example = "2025-09-10")]
    pub date: Option<LocalDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub is_full_day: Option<bool>,
    pub event_type: Option<EventType>,
    pub event_category: Option<EventCategory>,
    pub class_ids: Option<Vec<String>>,
}

impl EventPatch {
    fn touches_schedule(&self) -> bool {
        self.date.is_some()
            || self.start_time.is_some()
            || self.end_time.is_some()
            || self.is_full_day.is_some()
    }

    fn touches_targeting(&self) -> bool {
        self.event_type.is_some() || self.class_ids.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ClassFailure {
    pub class_id: String,
    pub error: EventError,
}

/// Result of one create submission, fan-out included.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub status: EventStatus,
    pub created: Vec<CalendarEvent>,
    pub failed: Vec<ClassFailure>,
}

impl CreateOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// User-facing confirmation for the form.
    pub fn message(&self) -> String {
        let base = match self.status {
            EventStatus::Approved => "Event created and approved",
            _ => "Event created, pending approval",
        };
        if self.created.is_empty() {
            "Event could not be created".to_string()
        } else if self.failed.is_empty() {
            base.to_string()
        } else {
            let classes: Vec<&str> = self.failed.iter().map(|f| f.class_id.as_str()).collect();
            format!("{base}; failed for {}", classes.join(", "))
        }
    }
}

/// Create, edit, review and list calendar events on behalf of one viewer.
///
/// The viewer and the Events API are injected; every guard on the event
/// lifecycle is enforced here rather than by the calling UI.
#[derive(Clone)]
pub struct EventLifecycleService {
    api: Arc<dyn EventsApi>,
    viewer: Viewer,
    compositor: TimeCompositor,
    fan_out: FanOutMode,
}

impl EventLifecycleService {
    pub fn new(api: Arc<dyn EventsApi>, viewer: Viewer, timezone: Tz) -> Self {
        Self {
            api,
            viewer,
            compositor: TimeCompositor::new(timezone),
            fan_out: FanOutMode::default(),
        }
    }

    pub fn with_fan_out(mut self, fan_out: FanOutMode) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub async fn create_event(&self, form: EventForm) -> Result<CreateOutcome, EventError> {
        let role = self.viewer.role;
        if !approval::can_create(role) {
            return Err(EventError::PermissionDenied(format!(
                "{role} accounts cannot create events"
            )));
        }
        let title = validate_required("title", &form.title)?;
        let description = validate_required("description", &form.description)?;
        let time = self.compositor.compose(
            form.date,
            form.start_time.as_deref(),
            form.end_time.as_deref(),
            form.is_full_day,
        )?;
        let plan = distribution::resolve(form.event_type, &form.class_ids)?;
        let expected = approval::initial_status(role);

        let request = NewEventRequest {
            title,
            description,
            event_date: time.event_date,
            event_type: form.event_type,
            event_category: form.event_category,
            is_single_day: true,
            start_time: time.start_time_string(),
            end_time: time.end_time_string(),
            timezone: self.compositor.timezone().name().to_string(),
            class_division_id: None,
            class_division_ids: None,
        };

        let (created, failed) = match plan {
            DistributionPlan::Single(class_id) => {
                let request = NewEventRequest {
                    class_division_id: class_id,
                    ..request
                };
                let created = self.api.create(&request).await?;
                if created.is_empty() {
                    return Err(nothing_stored(None));
                }
                (created, Vec::new())
            }
            DistributionPlan::MultiClass(class_ids) => match self.fan_out {
                FanOutMode::Batched => self.create_batched(request, class_ids).await?,
                FanOutMode::PerClass => self.create_per_class(&request, class_ids).await,
            },
        };

        let status = created.first().map_or(expected, |event| event.status);
        for event in created.iter().filter(|e| e.status != expected) {
            warn!(
                event_id = %event.id,
                expected = %expected,
                actual = %event.status,
                "events API assigned an unexpected initial status"
            );
        }
        if !failed.is_empty() {
            warn!(
                created = created.len(),
                failed = failed.len(),
                "event fan-out partially failed"
            );
        }
        info!(
            viewer = %self.viewer.id,
            created = created.len(),
            %status,
            "event submission processed"
        );

        Ok(CreateOutcome {
            status,
            created,
            failed,
        })
    }

    async fn create_batched(
        &self,
        request: NewEventRequest,
        class_ids: Vec<String>,
    ) -> Result<(Vec<CalendarEvent>, Vec<ClassFailure>), EventError> {
        let request = NewEventRequest {
            class_division_ids: Some(class_ids.clone()),
            ..request
        };
        let created = self.api.create(&request).await?;

        // Events without reported targets cannot be audited per class.
        let reported: Vec<&str> = created.iter().flat_map(|e| e.class_ids()).collect();
        let failed = if reported.is_empty() && !created.is_empty() {
            Vec::new()
        } else {
            class_ids
                .iter()
                .filter(|id| !reported.contains(&id.as_str()))
                .map(|id| ClassFailure {
                    class_id: id.clone(),
                    error: nothing_stored(Some(id)),
                })
                .collect()
        };
        Ok((created, failed))
    }

    async fn create_per_class(
        &self,
        request: &NewEventRequest,
        class_ids: Vec<String>,
    ) -> (Vec<CalendarEvent>, Vec<ClassFailure>) {
        let futures = class_ids.iter().map(|class_id| {
            let request = NewEventRequest {
                class_division_id: Some(class_id.clone()),
                ..request.clone()
            };
            async move { self.api.create(&request).await }
        });
        let results = join_all(futures).await;

        let mut created = Vec::new();
        let mut failed = Vec::new();
        for (class_id, result) in class_ids.into_iter().zip(results) {
            match result {
                Ok(events) if events.is_empty() => {
                    warn!(class_id = %class_id, "events API stored nothing for class");
                    let error = nothing_stored(Some(&class_id));
                    failed.push(ClassFailure { class_id, error });
                }
                Ok(events) => created.extend(events),
                Err(error) => {
                    warn!(class_id = %class_id, "event creation failed: {error}");
                    failed.push(ClassFailure { class_id, error });
                }
            }
        }
        (created, failed)
    }

    /// Applies a partial edit, recomposing the schedule and re-resolving
    /// class targets whenever the patch touches them.
    pub async fn update_event(
        &self,
        id: &str,
        patch: EventPatch,
    ) -> Result<CalendarEvent, EventError> {
        let current = self.api.get(id).await?;
        self.ensure_may_modify(&current)?;
        approval::ensure_editable(&current.id, current.status)
            .map_err(|err| self.illegal(err))?;

        let mut request = EventUpdateRequest::default();
        if let Some(title) = &patch.title {
            request.title = Some(validate_required("title", title)?);
        }
        if let Some(description) = &patch.description {
            request.description = Some(validate_required("description", description)?);
        }
        request.event_category = patch.event_category;

        if patch.touches_schedule() {
            let compositor = self.compositor_for(&current);
            let is_full_day = patch.is_full_day.unwrap_or_else(|| current.is_full_day());
            let date = patch
                .date
                .unwrap_or_else(|| compositor.local_date(current.event_date).into());
            let start = patch
                .start_time
                .clone()
                .unwrap_or_else(|| format_clock_time(current.start_time));
            let end = patch
                .end_time
                .clone()
                .unwrap_or_else(|| format_clock_time(current.end_time));
            let time =
                compositor.compose(date, Some(start.as_str()), Some(end.as_str()), is_full_day)?;
            request.event_date = Some(time.event_date);
            request.start_time = Some(time.start_time_string());
            request.end_time = Some(time.end_time_string());
        }

        if patch.touches_targeting() {
            let event_type = patch.event_type.unwrap_or(current.event_type);
            let classes = match &patch.class_ids {
                Some(ids) => ids.clone(),
                None => current.class_ids().into_iter().map(String::from).collect(),
            };
            match distribution::resolve(event_type, &classes)? {
                DistributionPlan::Single(class_id) => request.retarget(class_id),
                DistributionPlan::MultiClass(mut ids) if ids.len() == 1 => {
                    request.retarget(ids.pop());
                }
                DistributionPlan::MultiClass(ids) => {
                    // One stored event per class; extra classes need a new submission.
                    return Err(EventError::Validation(format!(
                        "an existing event targets a single class, got {}; create a new event for the others",
                        ids.len()
                    )));
                }
            }
            request.event_type = patch.event_type;
        }

        if request.is_empty() {
            return Ok(current);
        }
        if current.status == EventStatus::Approved {
            // Edits keep the approval; product has not asked for re-review.
            info!(event_id = %current.id, "editing an approved event without re-approval");
        }
        let updated = self.api.update(&current.id, &request).await?;
        info!(event_id = %updated.id, viewer = %self.viewer.id, "event updated");
        Ok(updated)
    }

    pub async fn approve(&self, id: &str) -> Result<CalendarEvent, EventError> {
        self.ensure_reviewer()?;
        let current = self.api.get(id).await?;
        let next = approval::review(&current.id, current.status, LifecycleAction::Approve)
            .map_err(|err| self.illegal(err))?;
        let updated = self.api.approve(&current.id).await?;
        self.check_review_result(&updated, next);
        info!(event_id = %updated.id, reviewer = %self.viewer.id, "event approved");
        Ok(updated)
    }

    pub async fn reject(&self, id: &str, reason: Option<&str>) -> Result<CalendarEvent, EventError> {
        self.ensure_reviewer()?;
        let current = self.api.get(id).await?;
        let next = approval::review(&current.id, current.status, LifecycleAction::Reject)
            .map_err(|err| self.illegal(err))?;
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if reason.is_none() {
            warn!(event_id = %current.id, "rejecting event without a reason");
        }
        let updated = self.api.reject(&current.id, reason).await?;
        self.check_review_result(&updated, next);
        info!(event_id = %updated.id, reviewer = %self.viewer.id, "event rejected");
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<(), EventError> {
        let current = self.api.get(id).await?;
        self.ensure_may_modify(&current)?;
        self.api.delete(&current.id).await?;
        info!(event_id = %current.id, viewer = %self.viewer.id, "event deleted");
        Ok(())
    }

    /// Fetches one event, hiding it unless the viewer may see it.
    pub async fn get(&self, id: &str) -> Result<CalendarEvent, EventError> {
        let event = self.api.get(id).await?;
        if visibility::can_view(&event, &self.viewer) {
            Ok(event)
        } else {
            Err(EventError::NotFound(id.to_string()))
        }
    }

    /// Narrows a raw query result to what the viewer may see.
    pub fn list_visible(&self, events: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
        visibility::filter_visible(events, &self.viewer)
    }

    pub async fn list(&self, query: &EventQuery) -> Result<Vec<CalendarEvent>, EventError> {
        if let EventQuery::Range { start, end } = query {
            validate_date_range(*start, *end)?;
        }
        if *query == EventQuery::Pending {
            return self.pending_approvals().await;
        }
        let events = self.api.list(query).await?;
        Ok(self.list_visible(events))
    }

    pub async fn list_all(&self) -> Result<Vec<CalendarEvent>, EventError> {
        self.list(&EventQuery::All).await
    }

    pub async fn list_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CalendarEvent>, EventError> {
        self.list(&EventQuery::Range { start, end }).await
    }

    pub async fn list_today(&self) -> Result<Vec<CalendarEvent>, EventError> {
        self.list(&EventQuery::Today).await
    }

    pub async fn list_upcoming(&self) -> Result<Vec<CalendarEvent>, EventError> {
        self.list(&EventQuery::Upcoming).await
    }

    pub async fn list_for_class(&self, class_id: &str) -> Result<Vec<CalendarEvent>, EventError> {
        self.list(&EventQuery::Class(class_id.to_string())).await
    }

    pub async fn list_for_teacher(&self) -> Result<Vec<CalendarEvent>, EventError> {
        self.list(&EventQuery::Teacher).await
    }

    /// The review queue: every pending event, privileged viewers only.
    pub async fn pending_approvals(&self) -> Result<Vec<CalendarEvent>, EventError> {
        self.ensure_reviewer()?;
        let events = self.api.list(&EventQuery::Pending).await?;
        Ok(visibility::approval_queue(events))
    }

    fn compositor_for(&self, event: &CalendarEvent) -> TimeCompositor {
        match event.timezone.parse::<Tz>() {
            Ok(tz) => TimeCompositor::new(tz),
            Err(_) => {
                warn!(event_id = %event.id, timezone = %event.timezone, "unknown event timezone");
                self.compositor
            }
        }
    }

    fn ensure_reviewer(&self) -> Result<(), EventError> {
        if self.viewer.role.is_privileged() {
            Ok(())
        } else {
            Err(EventError::PermissionDenied(format!(
                "{} accounts cannot review events",
                self.viewer.role
            )))
        }
    }

    fn ensure_may_modify(&self, event: &CalendarEvent) -> Result<(), EventError> {
        if self.viewer.role.is_privileged() || event.created_by == self.viewer.id {
            Ok(())
        } else {
            Err(EventError::PermissionDenied(format!(
                "event {} belongs to another user",
                event.id
            )))
        }
    }

    /// The UI only offers actions that are legal, so reaching this means a
    /// listing handed out an event the viewer should not act on.
    fn illegal(&self, err: IllegalTransition) -> EventError {
        error!(
            event_id = %err.event_id,
            status = %err.from,
            action = %err.action,
            viewer = %self.viewer.id,
            "illegal lifecycle transition requested"
        );
        EventError::IllegalTransition(err)
    }

    fn check_review_result(&self, event: &CalendarEvent, expected: EventStatus) {
        if event.status != expected {
            warn!(
                event_id = %event.id,
                expected = %expected,
                actual = %event.status,
                "events API returned an unexpected status after review"
            );
        }
    }
}

/// The store acknowledged a create but returned no event for it.
fn nothing_stored(class_id: Option<&str>) -> EventError {
    let message = match class_id {
        Some(id) => format!("no event was stored for class {id}"),
        None => "events API stored no event".to_string(),
    };
    EventError::Api {
        status: None,
        message,
    }
}
