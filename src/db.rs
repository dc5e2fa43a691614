use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "classlist.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    ensure_schema(&conn)?;
    Ok(conn)
}

pub fn ensure_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_lists(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            factors_json TEXT NOT NULL,
            strategy TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            optimized_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            class_list_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_list_id) REFERENCES class_lists(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_class_list ON teachers(class_list_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_list_id TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            gender TEXT NOT NULL,
            academic_level TEXT NOT NULL,
            behavior_level TEXT NOT NULL,
            special_needs INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_list_id) REFERENCES class_lists(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_list ON students(class_list_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            class_list_id TEXT NOT NULL,
            teacher_id TEXT,
            name TEXT NOT NULL,
            capacity INTEGER NOT NULL DEFAULT 30,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_list_id) REFERENCES class_lists(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_class_list ON classes(class_list_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_members(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(class_id, student_id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_members_student ON class_members(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_surveys(
            id TEXT PRIMARY KEY,
            class_list_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            preferred_json TEXT NOT NULL,
            challenging_json TEXT NOT NULL,
            submitted INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(class_list_id) REFERENCES class_lists(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            UNIQUE(class_list_id, teacher_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS parent_requests(
            id TEXT PRIMARY KEY,
            class_list_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            target_teacher_id TEXT,
            target_student_id TEXT,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(class_list_id) REFERENCES class_lists(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_parent_requests_class_list ON parent_requests(class_list_id, status)",
        [],
    )?;

    Ok(())
}
