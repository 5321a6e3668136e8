use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::catalog::{self, Student};
use crate::progress::{ModuleProgress, ModuleStatus, ProgressRecord, ProgressStore};

/// The order=1 module (and its order=1 quiz, when one exists) a student must
/// have unlocked to begin the curriculum.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub module_id: String,
    pub quiz_id: Option<String>,
}

/// What an existing record is missing. The repairs are independent and
/// strictly additive; none touches completion state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairPlan {
    pub unlock_module: bool,
    pub add_module_entry: bool,
    pub unlock_entry_status: bool,
}

impl RepairPlan {
    pub fn is_noop(&self) -> bool {
        !self.unlock_module && !self.add_module_entry && !self.unlock_entry_status
    }
}

pub fn plan_repair(entry: &EntryPoint, record: &ProgressRecord) -> RepairPlan {
    let entry_row = record.module_entry(&entry.module_id);
    RepairPlan {
        unlock_module: !record.has_unlocked_module(&entry.module_id),
        add_module_entry: entry_row.is_none(),
        // A locked entry module bars the student from the curriculum outright.
        // Upgrade to unlocked; completed entries are left alone.
        unlock_entry_status: entry_row
            .map(|m| m.status == ModuleStatus::Locked)
            .unwrap_or(false),
    }
}

pub fn fresh_module_entry(entry: &EntryPoint) -> ModuleProgress {
    ModuleProgress {
        module_id: entry.module_id.clone(),
        status: ModuleStatus::Unlocked,
        current_quiz: entry.quiz_id.clone(),
        unlocked_quizzes: entry.quiz_id.iter().cloned().collect(),
        completed_quizzes: Vec::new(),
        total_xp: 0,
    }
}

pub fn new_record(student_id: &str, entry: &EntryPoint) -> ProgressRecord {
    ProgressRecord {
        student_id: student_id.to_string(),
        current_module: Some(entry.module_id.clone()),
        unlocked_modules: vec![entry.module_id.clone()],
        completed_modules: Vec::new(),
        modules: vec![fresh_module_entry(entry)],
    }
}

pub fn apply_repair(record: &mut ProgressRecord, entry: &EntryPoint, plan: &RepairPlan) {
    if plan.unlock_module {
        record.unlocked_modules.push(entry.module_id.clone());
    }
    if plan.add_module_entry {
        record.modules.push(fresh_module_entry(entry));
    }
    if plan.unlock_entry_status {
        if let Some(m) = record
            .modules
            .iter_mut()
            .find(|m| m.module_id == entry.module_id)
        {
            m.status = ModuleStatus::Unlocked;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub inspected: u64,
    pub created: u64,
    pub repaired: u64,
    pub unchanged: u64,
    pub skipped_missing_section: u64,
    pub skipped_missing_instructor: u64,
    pub skipped_no_entry_module: u64,
    pub failed: u64,
}

enum Outcome {
    Created,
    Repaired,
    Unchanged,
    Skipped(SkipReason),
}

enum SkipReason {
    MissingSection,
    MissingInstructor,
    NoEntryModule,
}

/// Walks every sectioned student and guarantees each a valid entry point into
/// their instructor's unlock graph. One bad student never stops the batch.
pub fn run_reconcile(conn: &Connection) -> anyhow::Result<ReconcileSummary> {
    let students = catalog::list_sectioned_students(conn)?;
    let store = ProgressStore::new(conn);

    let mut summary = ReconcileSummary::default();
    for student in &students {
        summary.inspected += 1;
        match reconcile_student(conn, &store, student) {
            Ok(Outcome::Created) => summary.created += 1,
            Ok(Outcome::Repaired) => summary.repaired += 1,
            Ok(Outcome::Unchanged) => summary.unchanged += 1,
            Ok(Outcome::Skipped(SkipReason::MissingSection)) => {
                summary.skipped_missing_section += 1;
            }
            Ok(Outcome::Skipped(SkipReason::MissingInstructor)) => {
                summary.skipped_missing_instructor += 1;
            }
            Ok(Outcome::Skipped(SkipReason::NoEntryModule)) => {
                summary.skipped_no_entry_module += 1;
            }
            Err(e) => {
                error!(student_id = %student.id, error = %e, "reconcile failed for student");
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}

fn reconcile_student(
    conn: &Connection,
    store: &ProgressStore<'_>,
    student: &Student,
) -> anyhow::Result<Outcome> {
    let Some(code) = student.section_code.as_deref() else {
        // list_sectioned_students excludes these; kept for callers that don't.
        return Ok(Outcome::Skipped(SkipReason::MissingSection));
    };

    let Some(section) = catalog::find_section(conn, code)? else {
        warn!(student_id = %student.id, section = code, "section not found; skipping");
        return Ok(Outcome::Skipped(SkipReason::MissingSection));
    };

    let instructor_id = match section.instructor_id.as_deref() {
        Some(id) if catalog::instructor_exists(conn, id)? => id.to_string(),
        _ => {
            warn!(student_id = %student.id, section = code, "section has no instructor; skipping");
            return Ok(Outcome::Skipped(SkipReason::MissingInstructor));
        }
    };

    let Some(module) = catalog::find_instructor_entry_module(conn, &instructor_id)? else {
        // Instructor has not published content yet.
        debug!(student_id = %student.id, instructor_id = %instructor_id, "no entry module; skipping");
        return Ok(Outcome::Skipped(SkipReason::NoEntryModule));
    };
    let quiz = catalog::find_entry_quiz(conn, &module.id)?;
    let entry = EntryPoint {
        module_id: module.id,
        quiz_id: quiz.map(|q| q.id),
    };

    match store.find_by_student(&student.id)? {
        None => {
            store.create(&new_record(&student.id, &entry))?;
            Ok(Outcome::Created)
        }
        Some(mut record) => {
            let plan = plan_repair(&entry, &record);
            if plan.is_noop() {
                return Ok(Outcome::Unchanged);
            }
            apply_repair(&mut record, &entry, &plan);
            store.save(&record)?;
            Ok(Outcome::Repaired)
        }
    }
}
