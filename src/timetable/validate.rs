use crate::timetable::clock::Day;
use crate::timetable::error::{FieldError, TimetableError};
use crate::timetable::model::{TimetableEntry, TimetableSettings};
use serde::Deserialize;
use std::collections::HashSet;

const MAX_ROOM_LEN: usize = 64;
const MAX_NOTES_LEN: usize = 500;

/// An entry as submitted from the form, before any checks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDraft {
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(default)]
    pub day: Option<String>,
    #[serde(default)]
    pub period: Option<i64>,
    #[serde(default)]
    pub subject_id: Option<String>,
    /// The regularly assigned teacher. Falls back to the subject's default teacher.
    #[serde(default)]
    pub teacher_id: Option<String>,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_substitute: Option<bool>,
    #[serde(default)]
    pub substitute_teacher_id: Option<String>,
    /// `"period"` (default) or `"break"`; breaks are never assignable.
    #[serde(default)]
    pub slot_type: Option<String>,
}

impl EntryDraft {
    /// Draft seeded from a persisted entry, so an update can be validated as a whole.
    pub fn from_entry(e: &TimetableEntry) -> Self {
        let (teacher_id, substitute_teacher_id) = if e.is_substitute {
            (e.original_teacher_id.clone(), Some(e.teacher_id.clone()))
        } else {
            (Some(e.teacher_id.clone()), None)
        };
        Self {
            class_id: Some(e.class_id.clone()),
            day: Some(e.day.abbrev().to_string()),
            period: Some(i64::from(e.period)),
            subject_id: Some(e.subject_id.clone()),
            teacher_id,
            room: e.room.clone(),
            notes: e.notes.clone(),
            is_substitute: Some(e.is_substitute),
            substitute_teacher_id,
            slot_type: None,
        }
    }

    /// Overlays the keys present in a JSON patch; `null` clears optional fields.
    /// A value of the wrong JSON type is reported, never dropped.
    pub fn apply_patch(&mut self, patch: &serde_json::Map<String, serde_json::Value>) -> Result<(), TimetableError> {
        let mut errors = Vec::new();
        for (k, v) in patch {
            let field = k.as_str();
            let applied = match field {
                "classId" => patch_text(v).map(|t| self.class_id = t),
                "day" => patch_text(v).map(|t| self.day = t),
                "period" => patch_int(v).map(|n| self.period = n),
                "subjectId" => patch_text(v).map(|t| self.subject_id = t),
                "teacherId" => patch_text(v).map(|t| self.teacher_id = t),
                "room" => patch_text(v).map(|t| self.room = t),
                "notes" => patch_text(v).map(|t| self.notes = t),
                "isSubstitute" => patch_bool(v).map(|b| self.is_substitute = b),
                "substituteTeacherId" => patch_text(v).map(|t| self.substitute_teacher_id = t),
                "slotType" => patch_text(v).map(|t| self.slot_type = t),
                "id" => Ok(()),
                _ => Err("unknown field"),
            };
            if let Err(message) = applied {
                errors.push(FieldError::new(field, message));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TimetableError::Validation(errors))
        }
    }
}

fn patch_text(v: &serde_json::Value) -> Result<Option<String>, &'static str> {
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s.clone())),
        _ => Err("must be a string"),
    }
}

fn patch_int(v: &serde_json::Value) -> Result<Option<i64>, &'static str> {
    match v {
        serde_json::Value::Null => Ok(None),
        other => other.as_i64().map(Some).ok_or("must be an integer"),
    }
}

fn patch_bool(v: &serde_json::Value) -> Result<Option<bool>, &'static str> {
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Bool(b) => Ok(Some(*b)),
        _ => Err("must be a boolean"),
    }
}

/// What the validator needs to know about the target class and subject.
#[derive(Debug, Clone, Default)]
pub struct SlotContext {
    pub class_exists: bool,
    /// Effective `totalPeriods` of the class, when its configuration resolves.
    pub total_periods: Option<u32>,
    pub subject_exists: bool,
    pub subject_default_teacher: Option<String>,
    pub known_teachers: HashSet<String>,
}

/// A draft that passed field validation; not yet checked for slot conflicts.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidEntry {
    pub class_id: String,
    pub day: Day,
    pub period: u32,
    pub subject_id: String,
    pub teacher_id: String,
    pub room: Option<String>,
    pub notes: Option<String>,
    pub is_substitute: bool,
    pub original_teacher_id: Option<String>,
}

impl ValidEntry {
    pub fn into_entry(self, id: String, updated_at: String) -> TimetableEntry {
        TimetableEntry {
            id,
            class_id: self.class_id,
            day: self.day,
            period: self.period,
            subject_id: self.subject_id,
            teacher_id: self.teacher_id,
            room: self.room,
            notes: self.notes,
            is_substitute: self.is_substitute,
            original_teacher_id: self.original_teacher_id,
            updated_at: Some(updated_at),
        }
    }
}

fn non_blank(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Field checks for one draft. All violations are reported together.
pub fn validate_draft(draft: &EntryDraft, ctx: &SlotContext) -> Result<ValidEntry, TimetableError> {
    let mut errors: Vec<FieldError> = Vec::new();

    if draft
        .slot_type
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case("break"))
    {
        return Err(TimetableError::validation(
            "slotType",
            "break slots cannot be assigned",
        ));
    }

    let class_id = non_blank(&draft.class_id);
    match &class_id {
        None => errors.push(FieldError::new("classId", "class is required")),
        Some(_) if !ctx.class_exists => errors.push(FieldError::new("classId", "class not found")),
        Some(_) => {}
    }

    let day = match draft.day.as_deref() {
        None => {
            errors.push(FieldError::new("day", "day is required"));
            None
        }
        Some(raw) => {
            let d = Day::parse(raw);
            if d.is_none() {
                errors.push(FieldError::new("day", "day must be one of Mon, Tue, Wed, Thu, Fri, Sat"));
            }
            d
        }
    };

    let period = match draft.period {
        None => {
            errors.push(FieldError::new("period", "period is required"));
            None
        }
        Some(p) if p < 1 => {
            errors.push(FieldError::new("period", "period must be a positive integer"));
            None
        }
        Some(p) => match (u32::try_from(p), ctx.total_periods) {
            (Ok(p), Some(total)) if p > total => {
                errors.push(FieldError::new(
                    "period",
                    format!("period must be between 1 and {}", total),
                ));
                None
            }
            (Ok(p), _) => Some(p),
            (Err(_), _) => {
                errors.push(FieldError::new("period", "period is too large"));
                None
            }
        },
    };

    let subject_id = non_blank(&draft.subject_id);
    match &subject_id {
        None => errors.push(FieldError::new("subjectId", "subject is required")),
        Some(_) if !ctx.subject_exists => errors.push(FieldError::new("subjectId", "subject not found")),
        Some(_) => {}
    }

    let regular = non_blank(&draft.teacher_id).or_else(|| ctx.subject_default_teacher.clone());
    match &regular {
        None => errors.push(FieldError::new("teacherId", "teacher is required")),
        Some(t) if !ctx.known_teachers.contains(t) => {
            errors.push(FieldError::new("teacherId", "teacher not found"))
        }
        Some(_) => {}
    }

    let is_substitute = draft.is_substitute.unwrap_or(false);
    let substitute = non_blank(&draft.substitute_teacher_id);
    if is_substitute {
        match (&substitute, &regular) {
            (None, _) => errors.push(FieldError::new(
                "substituteTeacherId",
                "substitute teacher is required for a substitution",
            )),
            (Some(s), _) if !ctx.known_teachers.contains(s) => {
                errors.push(FieldError::new("substituteTeacherId", "teacher not found"))
            }
            (Some(s), Some(r)) if s == r => errors.push(FieldError::new(
                "substituteTeacherId",
                "substitute must differ from the original teacher",
            )),
            _ => {}
        }
    } else if substitute.is_some() {
        errors.push(FieldError::new(
            "substituteTeacherId",
            "only allowed when isSubstitute is true",
        ));
    }

    let room = non_blank(&draft.room);
    if room.as_ref().is_some_and(|r| r.len() > MAX_ROOM_LEN) {
        errors.push(FieldError::new("room", format!("room length must be <= {}", MAX_ROOM_LEN)));
    }
    let notes = non_blank(&draft.notes);
    if notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
        errors.push(FieldError::new("notes", format!("notes length must be <= {}", MAX_NOTES_LEN)));
    }

    if !errors.is_empty() {
        return Err(TimetableError::Validation(errors));
    }
    let (Some(class_id), Some(day), Some(period), Some(subject_id), Some(regular)) =
        (class_id, day, period, subject_id, regular)
    else {
        return Err(TimetableError::validation("entry", "incomplete entry"));
    };

    let (teacher_id, original_teacher_id) = match (is_substitute, substitute) {
        (true, Some(sub)) => (sub, Some(regular)),
        _ => (regular, None),
    };
    Ok(ValidEntry {
        class_id,
        day,
        period,
        subject_id,
        teacher_id,
        room,
        notes,
        is_substitute,
        original_teacher_id,
    })
}

/// Rejects a slot already held by another entry. `updating` names the entry
/// being edited, which may keep its own slot.
pub fn check_slot_free(
    candidate: &ValidEntry,
    occupant: Option<&TimetableEntry>,
    updating: Option<&str>,
) -> Result<(), TimetableError> {
    match occupant {
        Some(existing) if Some(existing.id.as_str()) != updating => Err(TimetableError::Conflict {
            class_id: candidate.class_id.clone(),
            day: candidate.day,
            period: candidate.period,
            existing_id: Some(existing.id.clone()),
        }),
        _ => Ok(()),
    }
}

/// Structural checks on a settings document before it is persisted.
pub fn validate_settings(settings: &TimetableSettings) -> Result<(), TimetableError> {
    let mut errors = Vec::new();
    let positive = |errors: &mut Vec<FieldError>, field: String, v: Option<u32>| {
        if v == Some(0) {
            errors.push(FieldError::new(field, "must be a positive integer"));
        }
    };

    let d = &settings.default_school_timing;
    if d.start_time.is_none() {
        errors.push(FieldError::new("defaultSchoolTiming.startTime", "required"));
    }
    if d.end_time.is_none() {
        errors.push(FieldError::new("defaultSchoolTiming.endTime", "required"));
    }
    if let (Some(s), Some(e)) = (d.start_time, d.end_time) {
        if e <= s {
            errors.push(FieldError::new("defaultSchoolTiming.endTime", "must be after startTime"));
        }
    }
    let pc = &settings.default_period_config;
    if pc.period_duration.is_none() {
        errors.push(FieldError::new("defaultPeriodConfig.periodDuration", "required"));
    }
    if pc.total_periods.is_none() {
        errors.push(FieldError::new("defaultPeriodConfig.totalPeriods", "required"));
    }
    positive(&mut errors, "defaultPeriodConfig.periodDuration".into(), pc.period_duration);
    positive(&mut errors, "defaultPeriodConfig.totalPeriods".into(), pc.total_periods);
    positive(&mut errors, "defaultPeriodConfig.breakAfterPeriods".into(), pc.break_after_periods);

    let mut level_names = HashSet::new();
    for (i, level) in settings.class_levels.iter().enumerate() {
        let prefix = format!("classLevels[{}]", i);
        let name = level.name.trim();
        if name.is_empty() {
            errors.push(FieldError::new(format!("{}.name", prefix), "required"));
        } else if !level_names.insert(name.to_string()) {
            errors.push(FieldError::new(format!("{}.name", prefix), "duplicate level name"));
        }
        if let Some(pc) = level.timings.as_ref().and_then(|t| t.period_config.as_ref()) {
            positive(&mut errors, format!("{}.timings.periodConfig.periodDuration", prefix), pc.period_duration);
            positive(&mut errors, format!("{}.timings.periodConfig.totalPeriods", prefix), pc.total_periods);
            positive(&mut errors, format!("{}.timings.periodConfig.breakAfterPeriods", prefix), pc.break_after_periods);
        }
    }

    let mut class_ids = HashSet::new();
    for (i, o) in settings.class_wise_overrides.iter().enumerate() {
        let prefix = format!("classWiseOverrides[{}]", i);
        if o.class_id.trim().is_empty() {
            errors.push(FieldError::new(format!("{}.classId", prefix), "required"));
        } else if !class_ids.insert(o.class_id.clone()) {
            errors.push(FieldError::new(format!("{}.classId", prefix), "duplicate class override"));
        }
        if let Some(pc) = o.period_config.as_ref() {
            positive(&mut errors, format!("{}.periodConfig.periodDuration", prefix), pc.period_duration);
            positive(&mut errors, format!("{}.periodConfig.totalPeriods", prefix), pc.total_periods);
            positive(&mut errors, format!("{}.periodConfig.breakAfterPeriods", prefix), pc.break_after_periods);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TimetableError::Validation(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timetable::model::{ClassOverride, PeriodConfig, SchoolTiming};

    fn ctx() -> SlotContext {
        SlotContext {
            class_exists: true,
            total_periods: Some(7),
            subject_exists: true,
            subject_default_teacher: Some("t1".into()),
            known_teachers: ["t1", "t2"].into_iter().map(String::from).collect(),
        }
    }

    fn draft() -> EntryDraft {
        EntryDraft {
            class_id: Some("c1".into()),
            day: Some("Mon".into()),
            period: Some(3),
            subject_id: Some("math".into()),
            ..Default::default()
        }
    }

    fn fields(e: TimetableError) -> Vec<String> {
        match e {
            TimetableError::Validation(errs) => errs.into_iter().map(|f| f.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn teacher_falls_back_to_subject_default() {
        let v = validate_draft(&draft(), &ctx()).expect("valid");
        assert_eq!(v.teacher_id, "t1");
        assert_eq!(v.day, Day::Mon);
        assert!(!v.is_substitute);
        assert_eq!(v.original_teacher_id, None);
    }

    #[test]
    fn bad_fields_are_reported_together() {
        let d = EntryDraft {
            class_id: Some("c1".into()),
            day: Some("Sunday".into()),
            period: Some(0),
            subject_id: None,
            ..Default::default()
        };
        let got = fields(validate_draft(&d, &ctx()).expect_err("invalid"));
        assert_eq!(got, vec!["day", "period", "subjectId"]);
    }

    #[test]
    fn period_beyond_effective_total_is_rejected() {
        let d = EntryDraft {
            period: Some(8),
            ..draft()
        };
        assert_eq!(fields(validate_draft(&d, &ctx()).expect_err("invalid")), vec!["period"]);
    }

    #[test]
    fn break_slots_cannot_be_assigned() {
        let d = EntryDraft {
            slot_type: Some("break".into()),
            ..draft()
        };
        assert_eq!(fields(validate_draft(&d, &ctx()).expect_err("invalid")), vec!["slotType"]);
    }

    #[test]
    fn substitution_swaps_teacher_and_keeps_original() {
        let d = EntryDraft {
            teacher_id: Some("t1".into()),
            is_substitute: Some(true),
            substitute_teacher_id: Some("t2".into()),
            ..draft()
        };
        let v = validate_draft(&d, &ctx()).expect("valid");
        assert_eq!(v.teacher_id, "t2");
        assert_eq!(v.original_teacher_id.as_deref(), Some("t1"));

        let same = EntryDraft {
            substitute_teacher_id: Some("t1".into()),
            ..d.clone()
        };
        assert_eq!(
            fields(validate_draft(&same, &ctx()).expect_err("invalid")),
            vec!["substituteTeacherId"]
        );
        let missing = EntryDraft {
            substitute_teacher_id: None,
            ..d
        };
        assert_eq!(
            fields(validate_draft(&missing, &ctx()).expect_err("invalid")),
            vec!["substituteTeacherId"]
        );
    }

    #[test]
    fn occupied_slot_conflicts_unless_it_is_the_entry_being_updated() {
        let v = validate_draft(&draft(), &ctx()).expect("valid");
        let existing = v.clone().into_entry("e1".into(), "now".into());
        assert!(check_slot_free(&v, None, None).is_ok());
        assert!(check_slot_free(&v, Some(&existing), Some("e1")).is_ok());
        let e = check_slot_free(&v, Some(&existing), None).expect_err("conflict");
        assert_eq!(e.code(), "conflict");
        assert!(check_slot_free(&v, Some(&existing), Some("e2")).is_err());
    }

    #[test]
    fn patch_round_trips_through_entry_draft() {
        let v = validate_draft(
            &EntryDraft {
                teacher_id: Some("t1".into()),
                is_substitute: Some(true),
                substitute_teacher_id: Some("t2".into()),
                ..draft()
            },
            &ctx(),
        )
        .expect("valid");
        let e = v.into_entry("e1".into(), "now".into());
        let mut d = EntryDraft::from_entry(&e);
        let patch = serde_json::json!({ "isSubstitute": false, "substituteTeacherId": null, "room": "B12" });
        d.apply_patch(patch.as_object().expect("object")).expect("patch");
        let v = validate_draft(&d, &ctx()).expect("valid");
        assert_eq!(v.teacher_id, "t1");
        assert_eq!(v.room.as_deref(), Some("B12"));
        assert!(!v.is_substitute);

        let bad = serde_json::json!({ "colour": "red" });
        assert!(d.apply_patch(bad.as_object().expect("object")).is_err());
    }

    #[test]
    fn patch_values_of_the_wrong_type_are_reported() {
        let mut d = EntryDraft {
            room: Some("B1".into()),
            is_substitute: Some(false),
            ..draft()
        };
        let patch = serde_json::json!({ "room": 12, "isSubstitute": "false", "period": "4" });
        let e = d.apply_patch(patch.as_object().expect("object")).expect_err("wrong types");
        let mut got = fields(e);
        got.sort();
        assert_eq!(got, vec!["isSubstitute", "period", "room"]);
        assert_eq!(d.room.as_deref(), Some("B1"));
        assert_eq!(d.is_substitute, Some(false));
        assert_eq!(d.period, Some(3));

        let clear = serde_json::json!({ "room": null });
        d.apply_patch(clear.as_object().expect("object")).expect("null clears");
        assert_eq!(d.room, None);
    }

    #[test]
    fn settings_validation_catches_missing_defaults_and_duplicates() {
        let s = TimetableSettings {
            id: None,
            default_school_timing: SchoolTiming {
                start_time: Some("08:00".parse().expect("time")),
                end_time: None,
            },
            default_period_config: PeriodConfig {
                period_duration: Some(0),
                total_periods: Some(6),
                ..Default::default()
            },
            class_levels: Vec::new(),
            class_wise_overrides: vec![
                ClassOverride {
                    class_id: "c1".into(),
                    ..Default::default()
                },
                ClassOverride {
                    class_id: "c1".into(),
                    ..Default::default()
                },
            ],
        };
        let got = fields(validate_settings(&s).expect_err("invalid"));
        assert_eq!(
            got,
            vec![
                "defaultSchoolTiming.endTime",
                "defaultPeriodConfig.periodDuration",
                "classWiseOverrides[1].classId",
            ]
        );
    }
}
