use super::{EntryRevision, StoreError, StoreResult, TimetableStore};
use crate::db;
use crate::timetable::clock::Day;
use crate::timetable::lifecycle::EntryState;
use crate::timetable::model::{
    ClassRecord, StudentRecord, SubjectRecord, TeacherRecord, TimetableEntry, TimetableSettings,
};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use uuid::Uuid;

const SETTINGS_KEY: &str = "timetable.settings";

const ENTRY_COLUMNS: &str = "id, class_id, day, period, subject_id, teacher_id, room, notes,
     is_substitute, original_teacher_id, updated_at";

/// Weekday order for `day`, which is stored as its abbreviation.
const DAY_ORDER: &str = "CASE day WHEN 'Mon' THEN 1 WHEN 'Tue' THEN 2 WHEN 'Wed' THEN 3
     WHEN 'Thu' THEN 4 WHEN 'Fri' THEN 5 WHEN 'Sat' THEN 6 ELSE 7 END";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_schema(&conn)?;
        Ok(Self { conn })
    }

    fn entries_where(&self, clause: &str, params: impl rusqlite::Params) -> StoreResult<Vec<TimetableEntry>> {
        let sql = format!(
            "SELECT {} FROM timetable_entries {} ORDER BY class_id, {}, period",
            ENTRY_COLUMNS, clause, DAY_ORDER
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    fn record_revision(&self, entry: &TimetableEntry, state: EntryState) -> StoreResult<()> {
        debug_assert!(state.is_terminal(), "only retired revisions are recorded");
        let next: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(revision), 0) + 1 FROM timetable_entry_revisions WHERE entry_id = ?",
            [&entry.id],
            |r| r.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO timetable_entry_revisions(entry_id, revision, state, recorded_at, entry_json)
             VALUES(?, ?, ?, ?, ?)",
            (
                &entry.id,
                next,
                state.as_str(),
                chrono::Utc::now().to_rfc3339(),
                serde_json::to_string(entry)?,
            ),
        )?;
        Ok(())
    }
}

fn map_unique(e: rusqlite::Error, entry: &TimetableEntry) -> StoreError {
    if let rusqlite::Error::SqliteFailure(f, _) = &e {
        if f.code == ErrorCode::ConstraintViolation
            && f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        {
            return StoreError::SlotTaken {
                class_id: entry.class_id.clone(),
                day: entry.day,
                period: entry.period,
            };
        }
    }
    StoreError::Sqlite(e)
}

// Two-stage: rusqlite row errors first, then domain decoding of the day column.
fn entry_from_row(r: &Row<'_>) -> rusqlite::Result<StoreResult<TimetableEntry>> {
    let day_raw: String = r.get(2)?;
    let period: i64 = r.get(3)?;
    let entry = TimetableEntry {
        id: r.get(0)?,
        class_id: r.get(1)?,
        day: Day::Mon,
        period: 0,
        subject_id: r.get(4)?,
        teacher_id: r.get(5)?,
        room: r.get(6)?,
        notes: r.get(7)?,
        is_substitute: r.get::<_, i64>(8)? != 0,
        original_teacher_id: r.get(9)?,
        updated_at: r.get(10)?,
    };
    let Some(day) = Day::parse(&day_raw) else {
        return Ok(Err(StoreError::Corrupt(format!(
            "entry {} has unknown day '{}'",
            entry.id, day_raw
        ))));
    };
    let Ok(period) = u32::try_from(period) else {
        return Ok(Err(StoreError::Corrupt(format!(
            "entry {} has invalid period {}",
            entry.id, period
        ))));
    };
    Ok(Ok(TimetableEntry {
        day,
        period,
        ..entry
    }))
}

fn class_from_row(r: &Row<'_>) -> rusqlite::Result<ClassRecord> {
    Ok(ClassRecord {
        id: r.get(0)?,
        name: r.get(1)?,
        level_name: r.get(2)?,
    })
}

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<SubjectRecord> {
    Ok(SubjectRecord {
        id: r.get(0)?,
        name: r.get(1)?,
        default_teacher_id: r.get(2)?,
    })
}

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<StudentRecord> {
    Ok(StudentRecord {
        id: r.get(0)?,
        name: r.get(1)?,
        class_id: r.get(2)?,
    })
}

impl TimetableStore for SqliteStore {
    fn load_settings(&self) -> StoreResult<Option<TimetableSettings>> {
        let Some(raw) = db::settings_get_json(&self.conn, SETTINGS_KEY)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save_settings(&self, settings: &TimetableSettings) -> StoreResult<()> {
        let raw = serde_json::to_string(settings)?;
        db::settings_set_json(&self.conn, SETTINGS_KEY, &raw)?;
        Ok(())
    }

    fn class(&self, class_id: &str) -> StoreResult<Option<ClassRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, level_name FROM classes WHERE id = ?",
                [class_id],
                class_from_row,
            )
            .optional()?)
    }

    fn classes(&self) -> StoreResult<Vec<ClassRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, level_name FROM classes ORDER BY name")?;
        let rows = stmt
            .query_map([], class_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn create_class(&self, name: &str, level_name: Option<&str>) -> StoreResult<ClassRecord> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO classes(id, name, level_name) VALUES(?, ?, ?)",
            (&id, name, level_name),
        )?;
        Ok(ClassRecord {
            id,
            name: name.to_string(),
            level_name: level_name.map(str::to_string),
        })
    }

    fn set_class_level(&self, class_id: &str, level_name: Option<&str>) -> StoreResult<bool> {
        let n = self.conn.execute(
            "UPDATE classes SET level_name = ? WHERE id = ?",
            (level_name, class_id),
        )?;
        Ok(n > 0)
    }

    fn delete_class(&self, class_id: &str) -> StoreResult<bool> {
        let entries = self.entries_for_class(class_id)?;
        let tx = self.conn.unchecked_transaction()?;
        for e in &entries {
            self.record_revision(e, EntryState::Deleted)?;
        }
        // Explicit dependency order; there is no ON DELETE CASCADE.
        tx.execute("DELETE FROM timetable_entries WHERE class_id = ?", [class_id])?;
        tx.execute("DELETE FROM students WHERE class_id = ?", [class_id])?;
        let n = tx.execute("DELETE FROM classes WHERE id = ?", [class_id])?;
        tx.commit()?;
        Ok(n > 0)
    }

    fn teachers(&self) -> StoreResult<Vec<TeacherRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM teachers ORDER BY name")?;
        let rows = stmt
            .query_map([], |r| {
                Ok(TeacherRecord {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn create_teacher(&self, name: &str) -> StoreResult<TeacherRecord> {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute("INSERT INTO teachers(id, name) VALUES(?, ?)", (&id, name))?;
        Ok(TeacherRecord {
            id,
            name: name.to_string(),
        })
    }

    fn subject(&self, subject_id: &str) -> StoreResult<Option<SubjectRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, default_teacher_id FROM subjects WHERE id = ?",
                [subject_id],
                subject_from_row,
            )
            .optional()?)
    }

    fn subjects(&self) -> StoreResult<Vec<SubjectRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, default_teacher_id FROM subjects ORDER BY name")?;
        let rows = stmt
            .query_map([], subject_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn create_subject(&self, name: &str, default_teacher_id: Option<&str>) -> StoreResult<SubjectRecord> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO subjects(id, name, default_teacher_id) VALUES(?, ?, ?)",
            (&id, name, default_teacher_id),
        )?;
        Ok(SubjectRecord {
            id,
            name: name.to_string(),
            default_teacher_id: default_teacher_id.map(str::to_string),
        })
    }

    fn student(&self, student_id: &str) -> StoreResult<Option<StudentRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, class_id FROM students WHERE id = ?",
                [student_id],
                student_from_row,
            )
            .optional()?)
    }

    fn students(&self, class_id: Option<&str>) -> StoreResult<Vec<StudentRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, class_id FROM students
             WHERE ?1 IS NULL OR class_id = ?1
             ORDER BY name",
        )?;
        let rows = stmt
            .query_map([class_id], student_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn create_student(&self, name: &str, class_id: &str) -> StoreResult<StudentRecord> {
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO students(id, class_id, name) VALUES(?, ?, ?)",
            (&id, class_id, name),
        )?;
        Ok(StudentRecord {
            id,
            name: name.to_string(),
            class_id: class_id.to_string(),
        })
    }

    fn entry(&self, entry_id: &str) -> StoreResult<Option<TimetableEntry>> {
        Ok(self.entries_where("WHERE id = ?", [entry_id])?.into_iter().next())
    }

    fn entry_at(&self, class_id: &str, day: Day, period: u32) -> StoreResult<Option<TimetableEntry>> {
        Ok(self
            .entries_where(
                "WHERE class_id = ? AND day = ? AND period = ?",
                (class_id, day.abbrev(), period),
            )?
            .into_iter()
            .next())
    }

    fn entries_for_class(&self, class_id: &str) -> StoreResult<Vec<TimetableEntry>> {
        self.entries_where("WHERE class_id = ?", [class_id])
    }

    fn all_entries(&self) -> StoreResult<Vec<TimetableEntry>> {
        self.entries_where("", [])
    }

    fn insert_entry(&self, entry: &TimetableEntry) -> StoreResult<()> {
        self.conn
            .execute(
                "INSERT INTO timetable_entries(
                   id, class_id, day, period, subject_id, teacher_id, room, notes,
                   is_substitute, original_teacher_id, updated_at)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    entry.id,
                    entry.class_id,
                    entry.day.abbrev(),
                    entry.period,
                    entry.subject_id,
                    entry.teacher_id,
                    entry.room,
                    entry.notes,
                    i64::from(entry.is_substitute),
                    entry.original_teacher_id,
                    entry.updated_at,
                ],
            )
            .map_err(|e| map_unique(e, entry))?;
        Ok(())
    }

    fn replace_entry(&self, entry: &TimetableEntry) -> StoreResult<()> {
        let Some(previous) = self.entry(&entry.id)? else {
            return Err(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
        };
        let tx = self.conn.unchecked_transaction()?;
        self.record_revision(&previous, EntryState::Superseded)?;
        tx.execute(
            "UPDATE timetable_entries SET
               class_id = ?, day = ?, period = ?, subject_id = ?, teacher_id = ?,
               room = ?, notes = ?, is_substitute = ?, original_teacher_id = ?, updated_at = ?
             WHERE id = ?",
            rusqlite::params![
                entry.class_id,
                entry.day.abbrev(),
                entry.period,
                entry.subject_id,
                entry.teacher_id,
                entry.room,
                entry.notes,
                i64::from(entry.is_substitute),
                entry.original_teacher_id,
                entry.updated_at,
                entry.id,
            ],
        )
        .map_err(|e| map_unique(e, entry))?;
        tx.commit()?;
        Ok(())
    }

    fn delete_entry(&self, entry_id: &str) -> StoreResult<Option<TimetableEntry>> {
        let Some(previous) = self.entry(entry_id)? else {
            return Ok(None);
        };
        let tx = self.conn.unchecked_transaction()?;
        self.record_revision(&previous, EntryState::Deleted)?;
        tx.execute("DELETE FROM timetable_entries WHERE id = ?", [entry_id])?;
        tx.commit()?;
        Ok(Some(previous))
    }

    fn entry_history(&self, entry_id: &str) -> StoreResult<Vec<EntryRevision>> {
        let mut stmt = self.conn.prepare(
            "SELECT revision, state, recorded_at, entry_json
             FROM timetable_entry_revisions
             WHERE entry_id = ?
             ORDER BY revision",
        )?;
        let rows = stmt
            .query_map([entry_id], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(revision, state, recorded_at, entry_json)| {
                let state = EntryState::parse(&state)
                    .ok_or_else(|| StoreError::Corrupt(format!("unknown revision state '{}'", state)))?;
                Ok(EntryRevision {
                    revision,
                    state,
                    recorded_at,
                    entry: serde_json::from_str(&entry_json)?,
                })
            })
            .collect()
    }
}
