use crate::models::{CalendarEvent, EventStatus, Role, Viewer};

/// The one predicate every listing goes through.
///
/// Everyone sees approved events. Teachers additionally see their own pending
/// events. Nobody sees rejected events in a listing, and privileged roles see
/// other people's pending events only through [`approval_queue`].
pub fn can_view(event: &CalendarEvent, viewer: &Viewer) -> bool {
    match event.status {
        EventStatus::Approved => true,
        EventStatus::Pending => viewer.role == Role::Teacher && event.created_by == viewer.id,
        EventStatus::Rejected => false,
    }
}

pub fn filter_visible(events: Vec<CalendarEvent>, viewer: &Viewer) -> Vec<CalendarEvent> {
    events.into_iter().filter(|e| can_view(e, viewer)).collect()
}

/// Pending events awaiting review. A separate view, not a listing filter.
pub fn approval_queue(events: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
    events
        .into_iter()
        .filter(|e| e.status == EventStatus::Pending)
        .collect()
}
