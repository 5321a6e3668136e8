use rusqlite::Connection;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use cyberlearnd::db;
use cyberlearnd::progress::{ModuleProgress, ModuleStatus, ProgressRecord, ProgressStore};

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

fn seed_student(conn: &Connection, id: &str) {
    conn.execute(
        "INSERT INTO students(id, name, section_code, role) VALUES (?, ?, 'SEC-A', 'student')",
        (id, id),
    )
    .expect("insert student");
}

fn module_entry(module_id: &str, total_xp: i64) -> ModuleProgress {
    ModuleProgress {
        module_id: module_id.into(),
        status: ModuleStatus::Unlocked,
        current_quiz: None,
        unlocked_quizzes: Vec::new(),
        completed_quizzes: Vec::new(),
        total_xp,
    }
}

fn module_row_id(conn: &Connection, student: &str, module: &str) -> String {
    conn.query_row(
        "SELECT id FROM module_progress WHERE student_id = ? AND module_id = ?",
        (student, module),
        |r| r.get(0),
    )
    .expect("module_progress row")
}

#[test]
fn save_preserves_module_row_identity() {
    let workspace = temp_dir("cyberlearn-store-row-identity");
    let conn = db::open_db(&workspace).expect("open db");
    seed_student(&conn, "alice");

    let store = ProgressStore::new(&conn);
    let mut record = ProgressRecord {
        student_id: "alice".into(),
        current_module: Some("mod1".into()),
        unlocked_modules: vec!["mod1".into()],
        completed_modules: Vec::new(),
        modules: vec![module_entry("mod1", 0), module_entry("mod2", 0)],
    };
    store.create(&record).expect("create");

    let mod1_id = module_row_id(&conn, "alice", "mod1");
    let mod2_id = module_row_id(&conn, "alice", "mod2");

    // Touch one module; both rows must keep their ids.
    record.modules[1].total_xp = 40;
    store.save(&record).expect("save");

    assert_eq!(module_row_id(&conn, "alice", "mod1"), mod1_id);
    assert_eq!(module_row_id(&conn, "alice", "mod2"), mod2_id);

    let rec = store
        .find_by_student("alice")
        .expect("load progress")
        .expect("progress exists");
    assert_eq!(rec.module_entry("mod2").expect("mod2").total_xp, 40);
}

#[test]
fn save_drops_rows_for_modules_no_longer_in_record() {
    let workspace = temp_dir("cyberlearn-store-stale-rows");
    let conn = db::open_db(&workspace).expect("open db");
    seed_student(&conn, "alice");

    let store = ProgressStore::new(&conn);
    let mut record = ProgressRecord {
        student_id: "alice".into(),
        current_module: Some("mod1".into()),
        unlocked_modules: vec!["mod1".into()],
        completed_modules: Vec::new(),
        modules: vec![module_entry("mod1", 0), module_entry("mod2", 0)],
    };
    store.create(&record).expect("create");

    record.modules.pop();
    store.save(&record).expect("save");

    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM module_progress WHERE student_id = 'alice'",
            [],
            |r| r.get(0),
        )
        .expect("count rows");
    assert_eq!(count, 1);

    let rec = store
        .find_by_student("alice")
        .expect("load progress")
        .expect("progress exists");
    assert_eq!(rec.modules.len(), 1);
    assert_eq!(rec.modules[0].module_id, "mod1");
}
