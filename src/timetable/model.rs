use crate::timetable::clock::{ClockTime, Day};
use serde::{Deserialize, Serialize};

/// School-wide start and end of the teaching day.
///
/// Both fields are mandatory for the default tier; they are modelled as
/// optional so a stored document missing them can be loaded and reported
/// instead of rejected at parse time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolTiming {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<ClockTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_periods: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_after_periods: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_duration: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelTimings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_time: Option<BreakTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_config: Option<PeriodConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassLevel {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timings: Option<LevelTimings>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassOverride {
    pub class_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<ClockTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_time: Option<BreakTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_config: Option<PeriodConfig>,
}

/// The per-school timetable settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub default_school_timing: SchoolTiming,
    #[serde(default)]
    pub default_period_config: PeriodConfig,
    #[serde(default)]
    pub class_levels: Vec<ClassLevel>,
    #[serde(default)]
    pub class_wise_overrides: Vec<ClassOverride>,
}

impl TimetableSettings {
    pub fn level(&self, name: &str) -> Option<&ClassLevel> {
        self.class_levels.iter().find(|l| l.name == name)
    }

    pub fn class_override(&self, class_id: &str) -> Option<&ClassOverride> {
        self.class_wise_overrides
            .iter()
            .find(|o| o.class_id == class_id)
    }
}

/// One period assignment: a class, a day and a period number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetableEntry {
    pub id: String,
    pub class_id: String,
    pub day: Day,
    pub period: u32,
    pub subject_id: String,
    /// The teacher actually taking the slot; the substitute when `is_substitute`.
    pub teacher_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_substitute: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_teacher_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl TimetableEntry {
    /// Teacher whose regular load this slot counts toward.
    pub fn regular_teacher(&self) -> &str {
        match (&self.original_teacher_id, self.is_substitute) {
            (Some(original), true) => original,
            _ => &self.teacher_id,
        }
    }

    /// True when the teacher is occupied by this slot, as taker or as the covered teacher.
    pub fn involves(&self, teacher_id: &str) -> bool {
        self.teacher_id == teacher_id || self.original_teacher_id.as_deref() == Some(teacher_id)
    }

    pub fn slot_key(&self) -> (Day, u32) {
        (self.day, self.period)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_teacher_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    pub class_id: String,
}
