use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("cyberlearn.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            section_code TEXT,
            role TEXT NOT NULL DEFAULT 'student'
        )",
        [],
    )?;
    // Existing workspaces may have a students table without role. Add and default if needed.
    ensure_students_role(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_section ON students(section_code)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            code TEXT PRIMARY KEY,
            instructor_id TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS modules(
            id TEXT PRIMARY KEY,
            instructor_id TEXT NOT NULL,
            title TEXT NOT NULL,
            ord INTEGER NOT NULL,
            UNIQUE(instructor_id, ord)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_modules_instructor ON modules(instructor_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS quizzes(
            id TEXT PRIMARY KEY,
            module_id TEXT NOT NULL,
            title TEXT NOT NULL,
            ord INTEGER NOT NULL,
            question_count INTEGER NOT NULL DEFAULT 0,
            UNIQUE(module_id, ord),
            FOREIGN KEY(module_id) REFERENCES modules(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quizzes_module ON quizzes(module_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS progress(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL UNIQUE,
            current_module TEXT,
            unlocked_modules TEXT NOT NULL,
            completed_modules TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS module_progress(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            module_id TEXT NOT NULL,
            status TEXT NOT NULL,
            current_quiz TEXT,
            unlocked_quizzes TEXT NOT NULL,
            completed_quizzes TEXT NOT NULL,
            total_xp INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL,
            UNIQUE(student_id, module_id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    // Workspaces created before the question-count scoring rule have no total_xp.
    ensure_module_progress_total_xp(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_module_progress_student ON module_progress(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_module_progress_student_sort ON module_progress(student_id, sort_order)",
        [],
    )?;

    Ok(conn)
}

fn ensure_students_role(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "role")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE students ADD COLUMN role TEXT NOT NULL DEFAULT 'student'",
        [],
    )?;
    Ok(())
}

fn ensure_module_progress_total_xp(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "module_progress", "total_xp")? {
        return Ok(());
    }
    // Backfill to 0; the XP recompute pass derives the real value.
    conn.execute(
        "ALTER TABLE module_progress ADD COLUMN total_xp INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
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
