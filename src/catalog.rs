use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Instructor,
}

impl Role {
    fn parse(raw: &str) -> Role {
        // Older rosters carried free-form role strings; anything unrecognized is a student.
        match raw {
            "instructor" => Role::Instructor,
            _ => Role::Student,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub section_code: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct Section {
    pub code: String,
    pub instructor_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub id: String,
    pub instructor_id: String,
    pub title: String,
    pub ord: i64,
}

#[derive(Debug, Clone)]
pub struct Quiz {
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub ord: i64,
    pub question_count: i64,
}

/// Students enrolled in some section, ordered for stable batch runs.
/// Instructors and unsectioned students are excluded here rather than in the runner.
pub fn list_sectioned_students(conn: &Connection) -> anyhow::Result<Vec<Student>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, section_code, role
         FROM students
         WHERE section_code IS NOT NULL AND section_code != '' AND role != 'instructor'
         ORDER BY id",
    )?;
    let students = stmt
        .query_map([], |r| {
            let role: String = r.get(3)?;
            Ok(Student {
                id: r.get(0)?,
                name: r.get(1)?,
                section_code: r.get(2)?,
                role: Role::parse(&role),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(students)
}

pub fn find_section(conn: &Connection, code: &str) -> anyhow::Result<Option<Section>> {
    let section = conn
        .query_row(
            "SELECT code, instructor_id FROM sections WHERE code = ?",
            [code],
            |r| {
                Ok(Section {
                    code: r.get(0)?,
                    instructor_id: r.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(section)
}

pub fn instructor_exists(conn: &Connection, instructor_id: &str) -> anyhow::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE id = ? AND role = 'instructor'",
            [instructor_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// The order=1 module is the entry point of an instructor's unlock graph.
pub fn find_instructor_entry_module(
    conn: &Connection,
    instructor_id: &str,
) -> anyhow::Result<Option<Module>> {
    let module = conn
        .query_row(
            "SELECT id, instructor_id, title, ord
             FROM modules
             WHERE instructor_id = ? AND ord = 1",
            [instructor_id],
            |r| {
                Ok(Module {
                    id: r.get(0)?,
                    instructor_id: r.get(1)?,
                    title: r.get(2)?,
                    ord: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(module)
}

pub fn find_entry_quiz(conn: &Connection, module_id: &str) -> anyhow::Result<Option<Quiz>> {
    let quiz = conn
        .query_row(
            "SELECT id, module_id, title, ord, question_count
             FROM quizzes
             WHERE module_id = ? AND ord = 1",
            [module_id],
            |r| {
                Ok(Quiz {
                    id: r.get(0)?,
                    module_id: r.get(1)?,
                    title: r.get(2)?,
                    ord: r.get(3)?,
                    question_count: r.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(quiz)
}

/// Question counts for every quiz in the catalog. A quiz absent from the
/// returned map has been deleted and contributes zero XP.
pub fn question_counts(conn: &Connection) -> anyhow::Result<HashMap<String, i64>> {
    let mut stmt = conn.prepare("SELECT id, question_count FROM quizzes")?;
    let mut counts = HashMap::new();
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
    for row in rows {
        let (id, count) = row?;
        counts.insert(id, count.max(0));
    }
    Ok(counts)
}
