use rusqlite::Connection;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use cyberlearnd::db;
use cyberlearnd::reconcile;

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn seed_student(conn: &Connection, id: &str, section: Option<&str>, role: &str) {
    conn.execute(
        "INSERT INTO students(id, name, section_code, role) VALUES (?, ?, ?, ?)",
        (id, id, section, role),
    )
    .expect("insert student");
}

fn progress_row_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM progress", [], |r| r.get(0))
        .expect("count progress")
}

#[test]
fn section_without_instructor_is_skipped_with_zero_writes() {
    let workspace = temp_dir("cyberlearn-skip-no-instructor");
    let conn = db::open_db(&workspace).expect("open db");

    conn.execute(
        "INSERT INTO sections(code, instructor_id) VALUES ('SEC-A', NULL)",
        [],
    )
    .expect("insert section");
    seed_student(&conn, "alice", Some("SEC-A"), "student");

    let summary = reconcile::run_reconcile(&conn).expect("reconcile");
    assert_eq!(summary.inspected, 1);
    assert_eq!(summary.skipped_missing_instructor, 1);
    assert_eq!(summary.created, 0);
    assert_eq!(summary.repaired, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(progress_row_count(&conn), 0);
}

#[test]
fn dangling_section_code_is_skipped() {
    let workspace = temp_dir("cyberlearn-skip-dangling-section");
    let conn = db::open_db(&workspace).expect("open db");

    seed_student(&conn, "alice", Some("GONE"), "student");

    let summary = reconcile::run_reconcile(&conn).expect("reconcile");
    assert_eq!(summary.skipped_missing_section, 1);
    assert_eq!(progress_row_count(&conn), 0);
}

#[test]
fn instructor_with_no_published_modules_is_skipped() {
    let workspace = temp_dir("cyberlearn-skip-no-module");
    let conn = db::open_db(&workspace).expect("open db");

    seed_student(&conn, "teach1", None, "instructor");
    conn.execute(
        "INSERT INTO sections(code, instructor_id) VALUES ('SEC-A', 'teach1')",
        [],
    )
    .expect("insert section");
    seed_student(&conn, "alice", Some("SEC-A"), "student");

    let summary = reconcile::run_reconcile(&conn).expect("reconcile");
    assert_eq!(summary.skipped_no_entry_module, 1);
    assert_eq!(progress_row_count(&conn), 0);
}

#[test]
fn unsectioned_students_and_instructors_are_not_inspected() {
    let workspace = temp_dir("cyberlearn-skip-roster");
    let conn = db::open_db(&workspace).expect("open db");

    seed_student(&conn, "teach1", None, "instructor");
    seed_student(&conn, "drifter", None, "student");
    seed_student(&conn, "blank", Some(""), "student");

    let summary = reconcile::run_reconcile(&conn).expect("reconcile");
    assert_eq!(summary.inspected, 0);
    assert_eq!(progress_row_count(&conn), 0);
}

#[test]
fn corrupt_record_is_counted_failed_and_batch_continues() {
    let workspace = temp_dir("cyberlearn-failed-isolation");
    let conn = db::open_db(&workspace).expect("open db");

    seed_student(&conn, "teach1", None, "instructor");
    conn.execute(
        "INSERT INTO sections(code, instructor_id) VALUES ('SEC-A', 'teach1')",
        [],
    )
    .expect("insert section");
    conn.execute(
        "INSERT INTO modules(id, instructor_id, title, ord) VALUES ('mod1', 'teach1', 'Intro', 1)",
        [],
    )
    .expect("insert module");
    seed_student(&conn, "alice", Some("SEC-A"), "student");
    seed_student(&conn, "bob", Some("SEC-A"), "student");

    // Alice's stored record is unreadable; bob must still be created.
    conn.execute(
        "INSERT INTO progress(id, student_id, current_module, unlocked_modules, completed_modules)
         VALUES ('p1', 'alice', NULL, 'not-json', '[]')",
        [],
    )
    .expect("insert corrupt progress");

    let summary = reconcile::run_reconcile(&conn).expect("reconcile");
    assert_eq!(summary.inspected, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.created, 1);
    assert_eq!(progress_row_count(&conn), 2);

    let bob_unlocked: String = conn
        .query_row(
            "SELECT unlocked_modules FROM progress WHERE student_id = 'bob'",
            [],
            |r| r.get(0),
        )
        .expect("bob progress row");
    assert_eq!(bob_unlocked, "[\"mod1\"]");
}

#[test]
fn one_bad_student_does_not_stop_the_batch() {
    let workspace = temp_dir("cyberlearn-skip-isolation");
    let conn = db::open_db(&workspace).expect("open db");

    seed_student(&conn, "teach1", None, "instructor");
    conn.execute(
        "INSERT INTO sections(code, instructor_id) VALUES ('SEC-A', 'teach1')",
        [],
    )
    .expect("insert section");
    conn.execute(
        "INSERT INTO modules(id, instructor_id, title, ord) VALUES ('mod1', 'teach1', 'Intro', 1)",
        [],
    )
    .expect("insert module");

    seed_student(&conn, "alice", Some("GONE"), "student");
    seed_student(&conn, "bob", Some("SEC-A"), "student");

    let summary = reconcile::run_reconcile(&conn).expect("reconcile");
    assert_eq!(summary.inspected, 2);
    assert_eq!(summary.skipped_missing_section, 1);
    assert_eq!(summary.created, 1);
    assert_eq!(progress_row_count(&conn), 1);
}
