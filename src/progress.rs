use chrono::Utc;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModuleStatus {
    Locked,
    Unlocked,
    Completed,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Locked => "locked",
            ModuleStatus::Unlocked => "unlocked",
            ModuleStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> anyhow::Result<ModuleStatus> {
        match raw {
            "locked" => Ok(ModuleStatus::Locked),
            "unlocked" => Ok(ModuleStatus::Unlocked),
            "completed" => Ok(ModuleStatus::Completed),
            other => anyhow::bail!("unknown module status '{}'", other),
        }
    }
}

/// A quiz the student has finished at least once. `ever_passed` survives
/// later failed retakes and is what the XP rule keys on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuizCompletion {
    pub quiz_id: String,
    pub ever_passed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleProgress {
    pub module_id: String,
    pub status: ModuleStatus,
    pub current_quiz: Option<String>,
    pub unlocked_quizzes: Vec<String>,
    pub completed_quizzes: Vec<QuizCompletion>,
    pub total_xp: i64,
}

/// The per-student aggregate. `modules` keeps its stored order; a module id
/// appears at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub student_id: String,
    pub current_module: Option<String>,
    pub unlocked_modules: Vec<String>,
    pub completed_modules: Vec<String>,
    pub modules: Vec<ModuleProgress>,
}

impl ProgressRecord {
    pub fn module_entry(&self, module_id: &str) -> Option<&ModuleProgress> {
        self.modules.iter().find(|m| m.module_id == module_id)
    }

    pub fn has_unlocked_module(&self, module_id: &str) -> bool {
        self.unlocked_modules.iter().any(|m| m == module_id)
    }
}

pub struct ProgressStore<'a> {
    conn: &'a Connection,
}

impl<'a> ProgressStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn find_by_student(&self, student_id: &str) -> anyhow::Result<Option<ProgressRecord>> {
        let head: Option<(Option<String>, String, String)> = self
            .conn
            .query_row(
                "SELECT current_module, unlocked_modules, completed_modules
                 FROM progress
                 WHERE student_id = ?",
                [student_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((current_module, unlocked_raw, completed_raw)) = head else {
            return Ok(None);
        };

        let unlocked_modules: Vec<String> = serde_json::from_str(&unlocked_raw)?;
        let completed_modules: Vec<String> = serde_json::from_str(&completed_raw)?;

        let mut stmt = self.conn.prepare(
            "SELECT module_id, status, current_quiz, unlocked_quizzes, completed_quizzes, total_xp
             FROM module_progress
             WHERE student_id = ?
             ORDER BY sort_order",
        )?;
        let rows = stmt
            .query_map([student_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, i64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut modules = Vec::with_capacity(rows.len());
        for (module_id, status, current_quiz, unlocked_raw, completed_raw, total_xp) in rows {
            modules.push(ModuleProgress {
                module_id,
                status: ModuleStatus::parse(&status)?,
                current_quiz,
                unlocked_quizzes: serde_json::from_str(&unlocked_raw)?,
                completed_quizzes: serde_json::from_str(&completed_raw)?,
                total_xp,
            });
        }

        Ok(Some(ProgressRecord {
            student_id: student_id.to_string(),
            current_module,
            unlocked_modules,
            completed_modules,
            modules,
        }))
    }

    pub fn create(&self, record: &ProgressRecord) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO progress(id, student_id, current_module, unlocked_modules, completed_modules, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &record.student_id,
                &record.current_module,
                serde_json::to_string(&record.unlocked_modules)?,
                serde_json::to_string(&record.completed_modules)?,
                Utc::now().to_rfc3339(),
            ),
        )?;
        insert_module_rows(&tx, record)?;
        tx.commit()?;
        Ok(())
    }

    /// Replaces the whole persisted record in one transaction. Callers are
    /// expected to have loaded via `find_by_student` first.
    pub fn save(&self, record: &ProgressRecord) -> anyhow::Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let updated = tx.execute(
            "UPDATE progress
             SET current_module = ?, unlocked_modules = ?, completed_modules = ?, updated_at = ?
             WHERE student_id = ?",
            (
                &record.current_module,
                serde_json::to_string(&record.unlocked_modules)?,
                serde_json::to_string(&record.completed_modules)?,
                Utc::now().to_rfc3339(),
                &record.student_id,
            ),
        )?;
        if updated == 0 {
            anyhow::bail!("no progress row for student {}", record.student_id);
        }
        upsert_module_rows(&tx, record)?;
        delete_stale_module_rows(&tx, record)?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_student_ids(&self) -> anyhow::Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT student_id FROM progress ORDER BY student_id")?;
        let ids = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

fn insert_module_rows(tx: &rusqlite::Transaction<'_>, record: &ProgressRecord) -> anyhow::Result<()> {
    for (i, m) in record.modules.iter().enumerate() {
        tx.execute(
            "INSERT INTO module_progress(
                id, student_id, module_id, status, current_quiz,
                unlocked_quizzes, completed_quizzes, total_xp, sort_order)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &record.student_id,
                &m.module_id,
                m.status.as_str(),
                &m.current_quiz,
                serde_json::to_string(&m.unlocked_quizzes)?,
                serde_json::to_string(&m.completed_quizzes)?,
                m.total_xp,
                i as i64,
            ),
        )?;
    }
    Ok(())
}

// Existing rows keep their id; only their payload changes.
fn upsert_module_rows(tx: &rusqlite::Transaction<'_>, record: &ProgressRecord) -> anyhow::Result<()> {
    for (i, m) in record.modules.iter().enumerate() {
        tx.execute(
            "INSERT INTO module_progress(
                id, student_id, module_id, status, current_quiz,
                unlocked_quizzes, completed_quizzes, total_xp, sort_order)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, module_id) DO UPDATE SET
                status = excluded.status,
                current_quiz = excluded.current_quiz,
                unlocked_quizzes = excluded.unlocked_quizzes,
                completed_quizzes = excluded.completed_quizzes,
                total_xp = excluded.total_xp,
                sort_order = excluded.sort_order",
            (
                Uuid::new_v4().to_string(),
                &record.student_id,
                &m.module_id,
                m.status.as_str(),
                &m.current_quiz,
                serde_json::to_string(&m.unlocked_quizzes)?,
                serde_json::to_string(&m.completed_quizzes)?,
                m.total_xp,
                i as i64,
            ),
        )?;
    }
    Ok(())
}

fn delete_stale_module_rows(
    tx: &rusqlite::Transaction<'_>,
    record: &ProgressRecord,
) -> anyhow::Result<()> {
    if record.modules.is_empty() {
        tx.execute(
            "DELETE FROM module_progress WHERE student_id = ?",
            [&record.student_id],
        )?;
        return Ok(());
    }
    let placeholders = std::iter::repeat("?")
        .take(record.modules.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "DELETE FROM module_progress WHERE student_id = ? AND module_id NOT IN ({})",
        placeholders
    );
    let mut bind_values: Vec<Value> = Vec::with_capacity(record.modules.len() + 1);
    bind_values.push(Value::Text(record.student_id.clone()));
    for m in &record.modules {
        bind_values.push(Value::Text(m.module_id.clone()));
    }
    tx.execute(&sql, params_from_iter(bind_values))?;
    Ok(())
}
