//! The persistence boundary consumed by the timetable core.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::timetable::clock::Day;
use crate::timetable::lifecycle::EntryState;
use crate::timetable::model::{
    ClassRecord, StudentRecord, SubjectRecord, TeacherRecord, TimetableEntry, TimetableSettings,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("slot {day} period {period} of class {class_id} is taken")]
    SlotTaken {
        class_id: String,
        day: Day,
        period: u32,
    },
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored document is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored row is malformed: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A superseded or deleted revision of an entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRevision {
    pub revision: i64,
    pub state: EntryState,
    pub recorded_at: String,
    pub entry: TimetableEntry,
}

pub trait TimetableStore {
    fn load_settings(&self) -> StoreResult<Option<TimetableSettings>>;
    fn save_settings(&self, settings: &TimetableSettings) -> StoreResult<()>;

    fn class(&self, class_id: &str) -> StoreResult<Option<ClassRecord>>;
    fn classes(&self) -> StoreResult<Vec<ClassRecord>>;
    fn create_class(&self, name: &str, level_name: Option<&str>) -> StoreResult<ClassRecord>;
    fn set_class_level(&self, class_id: &str, level_name: Option<&str>) -> StoreResult<bool>;
    fn delete_class(&self, class_id: &str) -> StoreResult<bool>;

    fn teachers(&self) -> StoreResult<Vec<TeacherRecord>>;
    fn create_teacher(&self, name: &str) -> StoreResult<TeacherRecord>;

    fn subject(&self, subject_id: &str) -> StoreResult<Option<SubjectRecord>>;
    fn subjects(&self) -> StoreResult<Vec<SubjectRecord>>;
    fn create_subject(&self, name: &str, default_teacher_id: Option<&str>) -> StoreResult<SubjectRecord>;

    fn student(&self, student_id: &str) -> StoreResult<Option<StudentRecord>>;
    fn students(&self, class_id: Option<&str>) -> StoreResult<Vec<StudentRecord>>;
    fn create_student(&self, name: &str, class_id: &str) -> StoreResult<StudentRecord>;

    fn entry(&self, entry_id: &str) -> StoreResult<Option<TimetableEntry>>;
    fn entry_at(&self, class_id: &str, day: Day, period: u32) -> StoreResult<Option<TimetableEntry>>;
    fn entries_for_class(&self, class_id: &str) -> StoreResult<Vec<TimetableEntry>>;
    fn all_entries(&self) -> StoreResult<Vec<TimetableEntry>>;
    fn insert_entry(&self, entry: &TimetableEntry) -> StoreResult<()>;
    /// Replaces the row with the same id, recording the previous row as `Superseded`.
    fn replace_entry(&self, entry: &TimetableEntry) -> StoreResult<()>;
    /// Removes the row, recording it as `Deleted`. Returns the removed entry.
    fn delete_entry(&self, entry_id: &str) -> StoreResult<Option<TimetableEntry>>;
    fn entry_history(&self, entry_id: &str) -> StoreResult<Vec<EntryRevision>>;
}
