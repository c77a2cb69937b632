//! Fetch-and-compute pipelines behind each timetable request.
//!
//! Every call reads a fresh snapshot from the store and recomputes the
//! derived grid from scratch; nothing derived is cached between requests.

use crate::store::{EntryRevision, TimetableStore};
use crate::timetable::clock::Day;
use crate::timetable::error::TimetableError;
use crate::timetable::grid::{build_day, build_grid, GridWarning, WeeklyGrid, WeeklySlot};
use crate::timetable::lifecycle::EntryState;
use crate::timetable::merge::{merge, IntegrityWarning};
use crate::timetable::model::{
    ClassRecord, StudentRecord, TeacherRecord, TimetableEntry, TimetableSettings,
};
use crate::timetable::resolver::{resolve, EffectiveClassConfig, EffectivePeriodConfig};
use crate::timetable::validate::{
    check_slot_free, validate_draft, validate_settings, EntryDraft, SlotContext, ValidEntry,
};
use crate::timetable::views::{
    self, ClassGrid, EntryView, NameBook, SlotView, TeacherLoad, TeacherSlot,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// A class grid after resolution and merge, still carrying raw entries.
#[derive(Debug, Clone)]
pub struct ResolvedClass {
    pub class: ClassRecord,
    pub config: EffectiveClassConfig,
    pub grid: WeeklyGrid,
    pub grid_warnings: Vec<GridWarning>,
    pub integrity_warnings: Vec<IntegrityWarning>,
}

/// A soft warning returned alongside a view. Never blocks the response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Warning {
    Grid(GridWarning),
    Integrity(IntegrityWarning),
}

impl ResolvedClass {
    pub fn warnings(&self) -> Vec<Warning> {
        self.grid_warnings
            .iter()
            .cloned()
            .map(Warning::Grid)
            .chain(self.integrity_warnings.iter().cloned().map(Warning::Integrity))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTimetable {
    pub class: ClassRecord,
    pub timetable: BTreeMap<Day, Vec<SlotView>>,
    pub period_config: EffectivePeriodConfig,
    pub effective_config: EffectiveClassConfig,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherTimetable {
    pub teacher: TeacherRecord,
    pub timetable: BTreeMap<Day, Vec<TeacherSlot>>,
    pub free_periods: BTreeMap<Day, Vec<u32>>,
    pub regular_classes: Vec<EntryView>,
    pub substitute_classes: Vec<EntryView>,
    pub load: TeacherLoad,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTimetable {
    pub student: StudentRecord,
    pub class: ClassRecord,
    pub timetable: BTreeMap<Day, Vec<SlotView>>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPreview {
    pub class: ClassRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_config: Option<EffectiveClassConfig>,
    pub slots: Vec<WeeklySlot>,
    pub warnings: Vec<GridWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntry {
    pub entry: TimetableEntry,
    pub state: EntryState,
}

fn load_settings(store: &dyn TimetableStore, class_id: &str) -> Result<TimetableSettings, TimetableError> {
    store.load_settings()?.ok_or_else(|| TimetableError::ConfigurationIncomplete {
        class_id: class_id.to_string(),
        field: "defaultSchoolTiming".to_string(),
    })
}

fn names(store: &dyn TimetableStore) -> Result<NameBook, TimetableError> {
    Ok(NameBook::new(
        &store.classes()?,
        &store.subjects()?,
        &store.teachers()?,
    ))
}

fn resolve_class(
    settings: &TimetableSettings,
    class: ClassRecord,
    entries: &[TimetableEntry],
) -> Result<ResolvedClass, TimetableError> {
    let config = resolve(settings, &class.id, class.level_name.as_deref())?;
    let (grid, grid_warnings) = build_grid(&config);
    let merged = merge(
        grid,
        &class.id,
        config.period_config.total_periods,
        entries,
    );
    Ok(ResolvedClass {
        class,
        config,
        grid: merged.grid,
        grid_warnings,
        integrity_warnings: merged.warnings,
    })
}

pub fn resolved_class(store: &dyn TimetableStore, class_id: &str) -> Result<ResolvedClass, TimetableError> {
    let class = store
        .class(class_id)?
        .ok_or_else(|| TimetableError::not_found("class", class_id))?;
    let settings = load_settings(store, class_id)?;
    let entries = store.entries_for_class(class_id)?;
    resolve_class(&settings, class, &entries)
}

pub fn class_timetable(store: &dyn TimetableStore, class_id: &str) -> Result<ClassTimetable, TimetableError> {
    let resolved = resolved_class(store, class_id)?;
    let names = names(store)?;
    Ok(ClassTimetable {
        timetable: views::class_view(&resolved.grid, &names),
        period_config: resolved.config.period_config.clone(),
        warnings: resolved.warnings(),
        class: resolved.class,
        effective_config: resolved.config,
    })
}

/// Resolves and merges every class. A single unresolvable class fails the whole view.
/// Also returns the raw entry snapshot the grids were merged from.
fn all_resolved(
    store: &dyn TimetableStore,
) -> Result<(Vec<ResolvedClass>, Vec<TimetableEntry>), TimetableError> {
    let classes = store.classes()?;
    let entries = store.all_entries()?;
    let Some(first) = classes.first() else {
        return Ok((Vec::new(), entries));
    };
    let settings = load_settings(store, &first.id)?;
    let mut by_class: BTreeMap<&str, Vec<TimetableEntry>> = BTreeMap::new();
    for e in &entries {
        by_class.entry(e.class_id.as_str()).or_default().push(e.clone());
    }
    let resolved = classes
        .into_iter()
        .map(|c| {
            let own = by_class.remove(c.id.as_str()).unwrap_or_default();
            resolve_class(&settings, c, &own)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((resolved, entries))
}

pub fn teacher_timetable(store: &dyn TimetableStore, teacher_id: &str) -> Result<TeacherTimetable, TimetableError> {
    let teacher = store
        .teachers()?
        .into_iter()
        .find(|t| t.id == teacher_id)
        .ok_or_else(|| TimetableError::not_found("teacher", teacher_id))?;
    let (resolved, entries) = all_resolved(store)?;
    let names = names(store)?;

    let grids: Vec<ClassGrid<'_>> = resolved
        .iter()
        .map(|r| ClassGrid {
            class_id: &r.class.id,
            grid: &r.grid,
        })
        .collect();
    // Only entries that made it onto a grid count toward load and obligations.
    let placed: Vec<&TimetableEntry> = resolved.iter().flat_map(|r| r.grid.entries()).collect();

    let to_views = |entries: Vec<&TimetableEntry>| -> Vec<EntryView> {
        entries.into_iter().map(|e| EntryView::new(e, &names)).collect()
    };
    let mine: HashSet<&str> = entries
        .iter()
        .filter(|e| e.involves(teacher_id))
        .map(|e| e.id.as_str())
        .collect();
    let warnings = resolved
        .iter()
        .flat_map(|r| r.integrity_warnings.iter())
        .filter(|w| mine.contains(w.entry_id.as_str()))
        .cloned()
        .map(Warning::Integrity)
        .collect();

    Ok(TeacherTimetable {
        timetable: views::teacher_timetable(teacher_id, &grids, &names),
        free_periods: views::free_periods(teacher_id, &grids),
        regular_classes: to_views(views::regular_classes(teacher_id, placed.iter().copied())),
        substitute_classes: to_views(views::substitute_classes(teacher_id, placed.iter().copied())),
        load: views::teacher_load(teacher_id, placed.iter().copied()),
        teacher,
        warnings,
    })
}

pub fn student_timetable(store: &dyn TimetableStore, student_id: &str) -> Result<StudentTimetable, TimetableError> {
    let student = store
        .student(student_id)?
        .ok_or_else(|| TimetableError::not_found("student", student_id))?;
    let resolved = resolved_class(store, &student.class_id)?;
    let names = names(store)?;
    Ok(StudentTimetable {
        timetable: views::class_view(&resolved.grid, &names),
        warnings: resolved.warnings(),
        class: resolved.class,
        student,
    })
}

fn slot_context(store: &dyn TimetableStore, draft: &EntryDraft) -> Result<SlotContext, TimetableError> {
    let mut ctx = SlotContext {
        known_teachers: store.teachers()?.into_iter().map(|t| t.id).collect::<HashSet<_>>(),
        ..Default::default()
    };
    if let Some(class_id) = draft.class_id.as_deref() {
        if let Some(class) = store.class(class_id)? {
            ctx.class_exists = true;
            let settings = load_settings(store, class_id)?;
            let config = resolve(&settings, &class.id, class.level_name.as_deref())?;
            ctx.total_periods = Some(config.period_config.total_periods);
        }
    }
    if let Some(subject_id) = draft.subject_id.as_deref() {
        if let Some(subject) = store.subject(subject_id)? {
            ctx.subject_exists = true;
            ctx.subject_default_teacher = subject.default_teacher_id;
        }
    }
    Ok(ctx)
}

/// Field validation plus the slot uniqueness check, without persisting.
pub fn check_entry(
    store: &dyn TimetableStore,
    draft: &EntryDraft,
    updating: Option<&str>,
) -> Result<ValidEntry, TimetableError> {
    let ctx = slot_context(store, draft)?;
    let valid = validate_draft(draft, &ctx)?;
    let occupant = store.entry_at(&valid.class_id, valid.day, valid.period)?;
    check_slot_free(&valid, occupant.as_ref(), updating)?;
    Ok(valid)
}

pub fn submit_entry(store: &dyn TimetableStore, draft: &EntryDraft) -> Result<PersistedEntry, TimetableError> {
    let mut state = EntryState::Draft;
    let valid = check_entry(store, draft, None).inspect_err(|e| {
        tracing::debug!(code = e.code(), "timetable entry rejected");
    })?;
    state = advance(state, EntryState::Valid)?;

    let entry = valid.into_entry(Uuid::new_v4().to_string(), now());
    // A racing submission for the same slot surfaces here as a store conflict.
    store.insert_entry(&entry)?;
    state = advance(state, EntryState::Persisted)?;
    tracing::info!(entry_id = %entry.id, class_id = %entry.class_id, day = %entry.day, period = entry.period, "timetable entry created");
    Ok(PersistedEntry { entry, state })
}

pub fn update_entry(
    store: &dyn TimetableStore,
    entry_id: &str,
    patch: &serde_json::Map<String, serde_json::Value>,
) -> Result<PersistedEntry, TimetableError> {
    let existing = store
        .entry(entry_id)?
        .ok_or_else(|| TimetableError::not_found("entry", entry_id))?;
    // Editing starts a fresh draft; the stored revision is only superseded on success.
    let mut draft = EntryDraft::from_entry(&existing);
    draft.apply_patch(patch)?;
    let valid = check_entry(store, &draft, Some(entry_id))?;
    let state = advance(EntryState::Draft, EntryState::Valid)?;

    let entry = valid.into_entry(existing.id.clone(), now());
    store.replace_entry(&entry)?;
    let state = advance(state, EntryState::Persisted)?;
    tracing::info!(entry_id = %entry.id, "timetable entry updated");
    Ok(PersistedEntry { entry, state })
}

pub fn delete_entry(store: &dyn TimetableStore, entry_id: &str) -> Result<PersistedEntry, TimetableError> {
    let removed = store
        .delete_entry(entry_id)?
        .ok_or_else(|| TimetableError::not_found("entry", entry_id))?;
    let state = advance(EntryState::Persisted, EntryState::Deleted)?;
    tracing::info!(entry_id, "timetable entry deleted");
    Ok(PersistedEntry {
        entry: removed,
        state,
    })
}

pub fn entry_history(store: &dyn TimetableStore, entry_id: &str) -> Result<Vec<EntryRevision>, TimetableError> {
    let history = store.entry_history(entry_id)?;
    if history.is_empty() && store.entry(entry_id)?.is_none() {
        return Err(TimetableError::not_found("entry", entry_id));
    }
    Ok(history)
}

/// Validates and persists a full settings document.
pub fn save_settings(store: &dyn TimetableStore, mut settings: TimetableSettings) -> Result<TimetableSettings, TimetableError> {
    validate_settings(&settings)?;
    if settings.id.is_none() {
        settings.id = Some(Uuid::new_v4().to_string());
    }
    store.save_settings(&settings)?;
    tracing::info!(
        levels = settings.class_levels.len(),
        overrides = settings.class_wise_overrides.len(),
        "timetable settings saved"
    );
    Ok(settings)
}

/// Resolved configuration, day template and soft warnings for every class,
/// as shown by the settings editor. Unresolvable classes carry an error instead.
pub fn preview_settings(
    store: &dyn TimetableStore,
    settings: &TimetableSettings,
) -> Result<Vec<ClassPreview>, TimetableError> {
    Ok(store
        .classes()?
        .into_iter()
        .map(|class| match resolve(settings, &class.id, class.level_name.as_deref()) {
            Ok(config) => {
                let day = build_day(&config);
                ClassPreview {
                    class,
                    effective_config: Some(config),
                    slots: day.slots,
                    warnings: day.warnings,
                    error: None,
                }
            }
            Err(e) => ClassPreview {
                class,
                effective_config: None,
                slots: Vec::new(),
                warnings: Vec::new(),
                error: Some(e.to_string()),
            },
        })
        .collect())
}

fn advance(from: EntryState, to: EntryState) -> Result<EntryState, TimetableError> {
    from.transition(to)
        .map_err(|_| TimetableError::IllegalTransition { from, to })
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}
