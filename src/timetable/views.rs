//! Read projections over merged class grids: teacher free periods,
//! substitution obligations, workload and display-ready grids.

use crate::timetable::clock::{ClockTime, Day};
use crate::timetable::grid::{SlotKind, WeeklyGrid};
use crate::timetable::model::{
    ClassRecord, SubjectRecord, TeacherRecord, TimetableEntry,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Column header for one weekday: the wire abbreviation plus its display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayLabel {
    pub day: Day,
    pub day_name: &'static str,
}

pub fn day_labels() -> Vec<DayLabel> {
    Day::ALL
        .into_iter()
        .map(|day| DayLabel {
            day,
            day_name: day.full_name(),
        })
        .collect()
}

/// A merged grid for one class, as consumed by the teacher-facing views.
#[derive(Debug, Clone)]
pub struct ClassGrid<'a> {
    pub class_id: &'a str,
    pub grid: &'a WeeklyGrid,
}

/// Period numbers per day in which the teacher holds no assignment in any class.
///
/// A slot counts as held when the teacher is its `teacher` or its
/// `originalTeacher`; a covered teacher is not free during the cover.
pub fn free_periods(teacher_id: &str, grids: &[ClassGrid<'_>]) -> BTreeMap<Day, Vec<u32>> {
    Day::ALL
        .into_iter()
        .map(|day| {
            let mut all: BTreeSet<u32> = BTreeSet::new();
            let mut busy: BTreeSet<u32> = BTreeSet::new();
            for cg in grids {
                for slot in cg.grid.day(day).iter().filter(|s| s.is_period()) {
                    all.insert(slot.period);
                    if slot.entry.as_ref().is_some_and(|e| e.involves(teacher_id)) {
                        busy.insert(slot.period);
                    }
                }
            }
            (day, all.difference(&busy).copied().collect())
        })
        .collect()
}

/// Entries the teacher covers as a substitute.
pub fn substitute_classes<'e>(
    teacher_id: &str,
    entries: impl IntoIterator<Item = &'e TimetableEntry>,
) -> Vec<&'e TimetableEntry> {
    entries
        .into_iter()
        .filter(|e| e.is_substitute && e.teacher_id == teacher_id)
        .collect()
}

/// Entries that belong to the teacher's regular load, including slots
/// currently covered by someone else.
pub fn regular_classes<'e>(
    teacher_id: &str,
    entries: impl IntoIterator<Item = &'e TimetableEntry>,
) -> Vec<&'e TimetableEntry> {
    entries
        .into_iter()
        .filter(|e| e.regular_teacher() == teacher_id)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayLoad {
    pub regular: usize,
    pub substitute: usize,
    pub covered: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherLoad {
    /// Regular slots, whether taught in person or covered by a substitute.
    pub regular: usize,
    pub substitute: usize,
    /// Regular slots currently handed to a substitute.
    pub covered: usize,
    pub per_day: BTreeMap<Day, DayLoad>,
}

pub fn teacher_load<'e>(
    teacher_id: &str,
    entries: impl IntoIterator<Item = &'e TimetableEntry>,
) -> TeacherLoad {
    let mut load = TeacherLoad::default();
    for e in entries {
        let role = TeacherRole::of(e, teacher_id);
        let Some(role) = role else { continue };
        let day = load.per_day.entry(e.day).or_default();
        match role {
            TeacherRole::Regular => {
                load.regular += 1;
                day.regular += 1;
            }
            TeacherRole::Covered => {
                load.regular += 1;
                load.covered += 1;
                day.regular += 1;
                day.covered += 1;
            }
            TeacherRole::Substitute => {
                load.substitute += 1;
                day.substitute += 1;
            }
        }
    }
    load
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TeacherRole {
    Regular,
    Substitute,
    /// The teacher's own slot, taught by a substitute.
    Covered,
}

impl TeacherRole {
    pub fn of(entry: &TimetableEntry, teacher_id: &str) -> Option<Self> {
        if entry.is_substitute && entry.teacher_id == teacher_id {
            Some(Self::Substitute)
        } else if entry.is_substitute && entry.original_teacher_id.as_deref() == Some(teacher_id) {
            Some(Self::Covered)
        } else if entry.teacher_id == teacher_id {
            Some(Self::Regular)
        } else {
            None
        }
    }
}

/// Display names joined onto entries at the presentation boundary.
#[derive(Debug, Clone, Default)]
pub struct NameBook {
    pub classes: HashMap<String, String>,
    pub subjects: HashMap<String, String>,
    pub teachers: HashMap<String, String>,
}

impl NameBook {
    pub fn new(classes: &[ClassRecord], subjects: &[SubjectRecord], teachers: &[TeacherRecord]) -> Self {
        Self {
            classes: classes.iter().map(|c| (c.id.clone(), c.name.clone())).collect(),
            subjects: subjects.iter().map(|s| (s.id.clone(), s.name.clone())).collect(),
            teachers: teachers.iter().map(|t| (t.id.clone(), t.name.clone())).collect(),
        }
    }

    fn lookup(map: &HashMap<String, String>, id: &str) -> String {
        map.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    pub fn class(&self, id: &str) -> String {
        Self::lookup(&self.classes, id)
    }

    pub fn subject(&self, id: &str) -> String {
        Self::lookup(&self.subjects, id)
    }

    pub fn teacher(&self, id: &str) -> String {
        Self::lookup(&self.teachers, id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    #[serde(rename = "type")]
    pub kind: SlotKind,
    pub period: u32,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<EntryView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    pub id: String,
    pub class_id: String,
    pub class_name: String,
    pub day: Day,
    pub period: u32,
    pub subject_id: String,
    pub subject_name: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub room: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub is_substitute: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_teacher_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_teacher_name: Option<String>,
}

impl EntryView {
    pub fn new(e: &TimetableEntry, names: &NameBook) -> Self {
        Self {
            id: e.id.clone(),
            class_id: e.class_id.clone(),
            class_name: names.class(&e.class_id),
            day: e.day,
            period: e.period,
            subject_id: e.subject_id.clone(),
            subject_name: names.subject(&e.subject_id),
            teacher_id: e.teacher_id.clone(),
            teacher_name: names.teacher(&e.teacher_id),
            room: e.room.clone().unwrap_or_default(),
            notes: e.notes.clone(),
            is_substitute: e.is_substitute,
            original_teacher_id: e.original_teacher_id.clone(),
            original_teacher_name: e.original_teacher_id.as_deref().map(|t| names.teacher(t)),
        }
    }
}

/// The class/student projection: a merged grid with display names joined in.
pub fn class_view(grid: &WeeklyGrid, names: &NameBook) -> BTreeMap<Day, Vec<SlotView>> {
    grid.days
        .iter()
        .map(|(day, slots)| {
            let views = slots
                .iter()
                .map(|s| SlotView {
                    kind: s.kind,
                    period: s.period,
                    start_time: s.start_time,
                    end_time: s.end_time,
                    entry: s.entry.as_ref().map(|e| EntryView::new(e, names)),
                })
                .collect();
            (*day, views)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSlot {
    pub period: u32,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub role: TeacherRole,
    pub class_id: String,
    pub class_name: String,
    pub entry: EntryView,
}

/// A teacher's week across all classes, timed by each owning class's grid.
pub fn teacher_timetable(
    teacher_id: &str,
    grids: &[ClassGrid<'_>],
    names: &NameBook,
) -> BTreeMap<Day, Vec<TeacherSlot>> {
    let mut out: BTreeMap<Day, Vec<TeacherSlot>> =
        Day::ALL.into_iter().map(|d| (d, Vec::new())).collect();
    for cg in grids {
        for (day, slots) in &cg.grid.days {
            for slot in slots {
                let Some(entry) = slot.entry.as_ref() else { continue };
                let Some(role) = TeacherRole::of(entry, teacher_id) else { continue };
                out.entry(*day).or_default().push(TeacherSlot {
                    period: slot.period,
                    start_time: slot.start_time,
                    end_time: slot.end_time,
                    role,
                    class_id: cg.class_id.to_string(),
                    class_name: names.class(cg.class_id),
                    entry: EntryView::new(entry, names),
                });
            }
        }
    }
    for slots in out.values_mut() {
        slots.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.period.cmp(&b.period)));
    }
    out
}
