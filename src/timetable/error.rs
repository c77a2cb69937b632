use crate::store::StoreError;
use crate::timetable::clock::Day;
use crate::timetable::lifecycle::EntryState;
use serde::Serialize;
use serde_json::json;

/// A field-level problem with a submitted entry or settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimetableError {
    /// A mandatory default field is missing; the class grid cannot be rendered.
    #[error("timetable configuration incomplete for class {class_id}: {field}")]
    ConfigurationIncomplete { class_id: String, field: String },

    #[error("validation failed ({} field errors)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("slot {day} period {period} of class {class_id} is already assigned")]
    Conflict {
        class_id: String,
        day: Day,
        period: u32,
        existing_id: Option<String>,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An entry was driven through a lifecycle step the state machine forbids.
    #[error("illegal entry transition {} -> {}", .from.as_str(), .to.as_str())]
    IllegalTransition { from: EntryState, to: EntryState },

    #[error("store request failed: {0}")]
    Transport(String),
}

impl TimetableError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable wire code for the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigurationIncomplete { .. } => "configuration_incomplete",
            Self::Validation(_) => "validation_failed",
            Self::Conflict { .. } => "conflict",
            Self::NotFound { .. } => "not_found",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::Transport(_) => "store_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::ConfigurationIncomplete { class_id, field } => {
                Some(json!({ "classId": class_id, "field": field }))
            }
            Self::Validation(errors) => Some(json!({ "fieldErrors": errors })),
            Self::Conflict {
                class_id,
                day,
                period,
                existing_id,
            } => Some(json!({
                "classId": class_id,
                "day": day,
                "period": period,
                "existingId": existing_id
            })),
            Self::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            Self::IllegalTransition { from, to } => Some(json!({ "from": from, "to": to })),
            Self::Transport(_) => None,
        }
    }
}

impl From<StoreError> for TimetableError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SlotTaken {
                class_id,
                day,
                period,
            } => Self::Conflict {
                class_id,
                day,
                period,
                existing_id: None,
            },
            other => Self::Transport(other.to_string()),
        }
    }
}
