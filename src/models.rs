use std::fmt;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Who an event is addressed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SchoolWide,
    ClassSpecific,
    TeacherSpecific,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventType::SchoolWide => "school_wide",
            EventType::ClassSpecific => "class_specific",
            EventType::TeacherSpecific => "teacher_specific",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    #[default]
    General,
    Academic,
    Sports,
    Cultural,
    Holiday,
    Exam,
    Meeting,
    Other,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            EventCategory::General => "general",
            EventCategory::Academic => "academic",
            EventCategory::Sports => "sports",
            EventCategory::Cultural => "cultural",
            EventCategory::Holiday => "holiday",
            EventCategory::Exam => "exam",
            EventCategory::Meeting => "meeting",
            EventCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Approved,
    Rejected,
}

impl EventStatus {
    /// Approved and rejected events never change status again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, EventStatus::Pending)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventStatus::Pending => "pending",
            EventStatus::Approved => "approved",
            EventStatus::Rejected => "rejected",
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Principal,
    Teacher,
    Parent,
    Student,
    #[serde(other)]
    Other,
}

impl Role {
    /// Admins and principals review events and have their own events auto-approved.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Admin | Role::Principal)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "admin",
            Role::Principal => "principal",
            Role::Teacher => "teacher",
            Role::Parent => "parent",
            Role::Student => "student",
            Role::Other => "other",
        })
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "principal" => Ok(Role::Principal),
            "teacher" => Ok(Role::Teacher),
            "parent" => Ok(Role::Parent),
            "student" => Ok(Role::Student),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// The identity on whose behalf an operation runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Viewer {
    pub id: String,
    pub role: Role,
    pub full_name: Option<String>,
}

impl Viewer {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            full_name: None,
        }
    }
}

/// An event as stored by the Events API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    #[schema(value_type = String, format = "date-time", example = "2025-08-29T03:30:00Z")]
    pub event_date: DateTime<Utc>,
    #[schema(value_type = String, example = "09:00:00")]
    pub start_time: NaiveTime,
    #[schema(value_type = String, example = "10:00:00")]
    pub end_time: NaiveTime,
    pub event_type: EventType,
    #[serde(default)]
    pub event_category: EventCategory,
    #[serde(default)]
    pub class_division_id: Option<String>,
    #[serde(default)]
    pub class_division_ids: Option<Vec<String>>,
    pub status: EventStatus,
    pub created_by: String,
    pub creator_role: Role,
    #[serde(default)]
    pub creator_name: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default = "default_single_day")]
    pub is_single_day: bool,
    pub timezone: String,
}

fn default_single_day() -> bool {
    true
}

impl CalendarEvent {
    /// Full-day events carry the `00:00:00`-`23:59:59` sentinel pair.
    pub fn is_full_day(&self) -> bool {
        self.start_time == crate::compose::full_day_start()
            && self.end_time == crate::compose::full_day_end()
    }

    /// Every class this event targets, whichever field the store populated.
    pub fn class_ids(&self) -> Vec<&str> {
        match (&self.class_division_ids, &self.class_division_id) {
            (Some(ids), _) if !ids.is_empty() => ids.iter().map(String::as_str).collect(),
            (_, Some(id)) => vec![id.as_str()],
            _ => Vec::new(),
        }
    }
}

/// Body of `POST /events`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewEventRequest {
    pub title: String,
    pub description: String,
    pub event_date: DateTime<Utc>,
    pub event_type: EventType,
    pub event_category: EventCategory,
    pub is_single_day: bool,
    pub start_time: String,
    pub end_time: String,
    pub timezone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_division_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_division_ids: Option<Vec<String>>,
}

/// Body of `PATCH /events/:id`. Absent fields are left untouched; a
/// `Some(None)` class target clears it. Class targets are only ever written
/// as a pair, see [`EventUpdateRequest::retarget`].
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EventUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_category: Option<EventCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_division_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_division_ids: Option<Option<Vec<String>>>,
}

impl EventUpdateRequest {
    /// Points the event at one class, or none, clearing any multi-class
    /// target left on the stored record.
    pub fn retarget(&mut self, class_id: Option<String>) {
        self.class_division_id = Some(class_id);
        self.class_division_ids = Some(None);
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_deserializes_from_store_shape() {
        let json = r#"{
            "id": "ev-1",
            "title": "Sports Day",
            "description": "Annual sports day",
            "event_date": "2025-09-10T04:30:00Z",
            "start_time": "10:00:00",
            "end_time": "12:00:00",
            "event_type": "class_specific",
            "event_category": "sports",
            "class_division_id": "g5a",
            "status": "pending",
            "created_by": "t-1",
            "creator_role": "teacher",
            "timezone": "Asia/Kolkata"
        }"#;
        let event: CalendarEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, EventType::ClassSpecific);
        assert_eq!(event.status, EventStatus::Pending);
        assert_eq!(event.class_ids(), vec!["g5a"]);
        assert!(event.is_single_day);
        assert!(!event.is_full_day());
    }

    #[test]
    fn test_unknown_role_falls_back() {
        let role: Role = serde_json::from_str(r#""librarian""#).unwrap();
        assert_eq!(role, Role::Other);
        assert!(!role.is_privileged());
        assert!(Role::Principal.is_privileged());
    }

    #[test]
    fn test_update_request_skips_absent_fields() {
        let clear = EventUpdateRequest {
            class_division_id: Some(None),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&clear).unwrap(),
            serde_json::json!({"class_division_id": null})
        );
        assert!(EventUpdateRequest::default().is_empty());
    }

    #[test]
    fn test_retarget_writes_both_class_fields() {
        let mut school_wide = EventUpdateRequest::default();
        school_wide.retarget(None);
        assert_eq!(
            serde_json::to_value(&school_wide).unwrap(),
            serde_json::json!({"class_division_id": null, "class_division_ids": null})
        );

        let mut one_class = EventUpdateRequest::default();
        one_class.retarget(Some("g5a".to_string()));
        assert_eq!(
            serde_json::to_value(&one_class).unwrap(),
            serde_json::json!({"class_division_id": "g5a", "class_division_ids": null})
        );
    }
}
