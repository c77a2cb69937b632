use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "timetable.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!("failed to create workspace {}", workspace.to_string_lossy())
    })?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    // Workspaces created before class levels existed lack this column.
    ensure_classes_level_name(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            default_teacher_id TEXT,
            FOREIGN KEY(default_teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetable_entries(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            day TEXT NOT NULL,
            period INTEGER NOT NULL,
            subject_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            room TEXT,
            notes TEXT,
            is_substitute INTEGER NOT NULL DEFAULT 0,
            original_teacher_id TEXT,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            UNIQUE(class_id, day, period)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetable_entries_class ON timetable_entries(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetable_entries_teacher ON timetable_entries(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetable_entries_original ON timetable_entries(original_teacher_id)",
        [],
    )?;

    // Revisions outlive their entry, so no foreign key back to timetable_entries.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetable_entry_revisions(
            entry_id TEXT NOT NULL,
            revision INTEGER NOT NULL,
            state TEXT NOT NULL,
            recorded_at TEXT NOT NULL,
            entry_json TEXT NOT NULL,
            PRIMARY KEY(entry_id, revision)
        )",
        [],
    )?;

    Ok(())
}

fn ensure_classes_level_name(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "classes", "level_name")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE classes ADD COLUMN level_name TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value_json FROM settings WHERE key = ?",
        [key],
        |r| r.get(0),
    )
    .optional()
}

pub fn settings_set_json(conn: &Connection, key: &str, value_json: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value_json),
    )?;
    Ok(())
}
