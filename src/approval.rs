use std::fmt;

use thiserror::Error;

use crate::models::{EventStatus, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Approve,
    Reject,
    Edit,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleAction::Approve => "approve",
            LifecycleAction::Reject => "reject",
            LifecycleAction::Edit => "edit",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} event {event_id}: it is {from}")]
pub struct IllegalTransition {
    pub event_id: String,
    pub from: EventStatus,
    pub action: LifecycleAction,
}

/// Roles that may author events at all.
pub fn can_create(role: Role) -> bool {
    role.is_privileged() || role == Role::Teacher
}

/// Privileged authors skip the review gate.
pub fn initial_status(creator: Role) -> EventStatus {
    if creator.is_privileged() {
        EventStatus::Approved
    } else {
        EventStatus::Pending
    }
}

/// Applies a review decision. Only pending events can be reviewed.
pub fn review(
    event_id: &str,
    current: EventStatus,
    action: LifecycleAction,
) -> Result<EventStatus, IllegalTransition> {
    match (current, action) {
        (EventStatus::Pending, LifecycleAction::Approve) => Ok(EventStatus::Approved),
        (EventStatus::Pending, LifecycleAction::Reject) => Ok(EventStatus::Rejected),
        (from, action) => Err(IllegalTransition {
            event_id: event_id.to_string(),
            from,
            action,
        }),
    }
}

/// Pending and approved events stay editable; rejected ones are closed.
pub fn ensure_editable(event_id: &str, current: EventStatus) -> Result<(), IllegalTransition> {
    match current {
        EventStatus::Pending | EventStatus::Approved => Ok(()),
        EventStatus::Rejected => Err(IllegalTransition {
            event_id: event_id.to_string(),
            from: current,
            action: LifecycleAction::Edit,
        }),
    }
}
