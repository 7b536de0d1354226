use tracing::warn;

use crate::error::EventError;
use crate::models::EventType;

/// How many stored events one submission turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionPlan {
    /// One event, optionally bound to one class.
    Single(Option<String>),
    /// One stored event per listed class.
    MultiClass(Vec<String>),
}

impl DistributionPlan {
    pub fn class_ids(&self) -> Vec<&str> {
        match self {
            DistributionPlan::Single(Some(id)) => vec![id.as_str()],
            DistributionPlan::Single(None) => Vec::new(),
            DistributionPlan::MultiClass(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

/// Decides the fan-out for an event type and the classes picked in the form.
///
/// Blank ids are dropped and duplicates collapse to their first occurrence,
/// so `class_specific` with only blanks is treated as no selection.
pub fn resolve(event_type: EventType, selected: &[String]) -> Result<DistributionPlan, EventError> {
    let mut classes: Vec<String> = Vec::with_capacity(selected.len());
    for id in selected.iter().map(|id| id.trim()).filter(|id| !id.is_empty()) {
        if !classes.iter().any(|seen| seen == id) {
            classes.push(id.to_string());
        }
    }

    match event_type {
        EventType::SchoolWide | EventType::TeacherSpecific => {
            if !classes.is_empty() {
                warn!(
                    %event_type,
                    ignored = ?classes,
                    "class targets are not allowed for this event type, ignoring them"
                );
            }
            Ok(DistributionPlan::Single(None))
        }
        EventType::ClassSpecific if classes.is_empty() => Err(EventError::MissingTarget),
        EventType::ClassSpecific => Ok(DistributionPlan::MultiClass(classes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_school_wide_ignores_classes() {
        let plan = resolve(EventType::SchoolWide, &ids(&["c1", "c2"])).unwrap();
        assert_eq!(plan, DistributionPlan::Single(None));
        assert!(plan.class_ids().is_empty());
    }

    #[test]
    fn test_teacher_specific_is_untargeted() {
        assert_eq!(
            resolve(EventType::TeacherSpecific, &[]).unwrap(),
            DistributionPlan::Single(None)
        );
        assert_eq!(
            resolve(EventType::TeacherSpecific, &ids(&["c1"])).unwrap(),
            DistributionPlan::Single(None)
        );
    }

    #[test]
    fn test_class_specific_requires_target() {
        let err = resolve(EventType::ClassSpecific, &[]).unwrap_err();
        assert!(matches!(err, EventError::MissingTarget));
        let err = resolve(EventType::ClassSpecific, &ids(&["", "  "])).unwrap_err();
        assert!(matches!(err, EventError::MissingTarget));
    }

    #[test]
    fn test_class_specific_fans_out() {
        assert_eq!(
            resolve(EventType::ClassSpecific, &ids(&["c1", "c2"])).unwrap(),
            DistributionPlan::MultiClass(ids(&["c1", "c2"]))
        );
        assert_eq!(
            resolve(EventType::ClassSpecific, &ids(&["c2", " c1 ", "c2"])).unwrap(),
            DistributionPlan::MultiClass(ids(&["c2", "c1"]))
        );
    }
}
