use serde::{Deserialize, Serialize};

/// Lifecycle of a single timetable entry.
///
/// `Draft -> Valid -> Persisted -> (Superseded | Deleted)`. A persisted
/// entry is never edited in place: an edit produces a new draft that has to
/// pass validation again, and the old revision becomes `Superseded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntryState {
    Draft,
    Valid,
    Persisted,
    Superseded,
    Deleted,
}

impl EntryState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Valid => "valid",
            Self::Persisted => "persisted",
            Self::Superseded => "superseded",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "valid" => Some(Self::Valid),
            "persisted" => Some(Self::Persisted),
            "superseded" => Some(Self::Superseded),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: EntryState) -> bool {
        use EntryState::*;
        matches!(
            (self, next),
            (Draft, Valid)
                | (Valid, Draft)
                | (Valid, Persisted)
                | (Persisted, Superseded)
                | (Persisted, Deleted)
        )
    }

    pub fn transition(self, next: EntryState) -> Result<EntryState, String> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(format!(
                "illegal entry transition {} -> {}",
                self.as_str(),
                next.as_str()
            ))
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Superseded | Self::Deleted)
    }
}
