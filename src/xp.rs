use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use tracing::error;

use crate::catalog;
use crate::progress::{ProgressRecord, ProgressStore};

/// Current scoring rule: 10 XP per question of every quiz the student has
/// ever passed. Older workspaces were written under a flat-per-quiz rule,
/// which is the drift this pass corrects.
pub const XP_PER_QUESTION: i64 = 10;

/// Recomputes every module's XP total in place. Returns true if any module
/// changed. A quiz missing from the lookup was deleted and contributes 0.
pub fn recompute_record<F>(record: &mut ProgressRecord, question_count: F) -> bool
where
    F: Fn(&str) -> i64,
{
    let mut dirty = false;
    for m in &mut record.modules {
        let new_total: i64 = m
            .completed_quizzes
            .iter()
            .filter(|c| c.ever_passed)
            .map(|c| XP_PER_QUESTION * question_count(&c.quiz_id))
            .sum();
        if new_total != m.total_xp {
            m.total_xp = new_total;
            dirty = true;
        }
    }
    dirty
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XpSummary {
    pub inspected: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub failed: u64,
}

/// Refreshes the derived XP totals of every progress record against the
/// current quiz catalog. At most one write per record; idempotent.
pub fn run_recompute(conn: &Connection) -> anyhow::Result<XpSummary> {
    let counts = catalog::question_counts(conn)?;
    let store = ProgressStore::new(conn);
    let student_ids = store.list_student_ids()?;

    let mut summary = XpSummary::default();
    for student_id in &student_ids {
        summary.inspected += 1;
        match recompute_student(&store, student_id, &counts) {
            Ok(true) => summary.updated += 1,
            Ok(false) => summary.unchanged += 1,
            Err(e) => {
                error!(student_id = %student_id, error = %e, "xp recompute failed for student");
                summary.failed += 1;
            }
        }
    }
    Ok(summary)
}

fn recompute_student(
    store: &ProgressStore<'_>,
    student_id: &str,
    counts: &HashMap<String, i64>,
) -> anyhow::Result<bool> {
    let Some(mut record) = store.find_by_student(student_id)? else {
        // Row vanished between the id listing and the load; nothing to do.
        return Ok(false);
    };
    if !recompute_record(&mut record, |quiz_id| {
        counts.get(quiz_id).copied().unwrap_or(0)
    }) {
        return Ok(false);
    }
    store.save(&record)?;
    Ok(true)
}
