mod common;

use backblast_import::import::{ImportCommand, RunOutcome, execute_import, run_pipeline};
use backblast_import::logging::console::RunLog;
use common::{HEADER, count, options, rows, seeded_db};
use rusqlite::Connection;
use std::fs;
use tempfile::tempdir;

#[test]
fn applying_backout_removes_every_tracked_row() {
    let tmp = tempdir().unwrap();
    let db = seeded_db(tmp.path());
    let batch = "\
1,2,7,2024-05-01,0530,Forge,,,10,Q
1,2,7,2024-05-01,0530,Forge,,,11,Co-Q
1,2,,2024-05-02,,Anvil,Hills,,12,Q
1,2,,2024-05-02,,Anvil,Hills,,10,
";
    let report = run_pipeline(
        rows(batch),
        &options(tmp.path(), db.clone(), true),
        &mut RunLog::memory(),
    )
    .unwrap();
    assert!(matches!(report.outcome, RunOutcome::Committed(_)));
    assert_eq!(count(&db, "attendance_x_attendance_types"), 3);

    let script = fs::read_to_string(report.backout_script.as_ref().unwrap()).unwrap();
    let conn = Connection::open(&db).unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    conn.execute_batch(&script).unwrap();

    assert_eq!(count(&db, "event_instances"), 0);
    assert_eq!(count(&db, "attendance"), 0);
    assert_eq!(count(&db, "attendance_x_attendance_types"), 0);
    assert_eq!(count(&db, "users"), 3);
    for id in report.tracker.attendance_ids() {
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM attendance WHERE id = ?1", [id], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(n, 0);
    }
}

#[test]
fn backout_leaves_rows_from_other_imports_untouched() {
    let tmp = tempdir().unwrap();
    let db = seeded_db(tmp.path());
    let first_dir = tmp.path().join("first");
    let second_dir = tmp.path().join("second");
    fs::create_dir_all(&first_dir).unwrap();
    fs::create_dir_all(&second_dir).unwrap();

    run_pipeline(
        rows("1,2,,2024-05-01,,Forge,,,10,Q\n"),
        &options(&first_dir, db.clone(), true),
        &mut RunLog::memory(),
    )
    .unwrap();
    let second = run_pipeline(
        rows("1,2,,2024-05-08,,Forge,,,11,Q\n"),
        &options(&second_dir, db.clone(), true),
        &mut RunLog::memory(),
    )
    .unwrap();

    let script = fs::read_to_string(second.backout_script.as_ref().unwrap()).unwrap();
    Connection::open(&db).unwrap().execute_batch(&script).unwrap();

    assert_eq!(count(&db, "event_instances"), 1);
    assert_eq!(count(&db, "attendance"), 1);
    assert_eq!(count(&db, "attendance_x_attendance_types"), 1);
}

#[test]
fn execute_import_reads_config_and_mirrors_console_to_log() {
    let tmp = tempdir().unwrap();
    let db = seeded_db(tmp.path());
    let config = tmp.path().join("backblast-import.toml");
    fs::write(
        &config,
        format!(
            "version = 1\n[environments.staging]\ndatabase = \"{}\"\n[backout]\ndir = \"backouts\"\n[attendance_types]\nq = 20\nco_q = 30\n",
            db.display()
        ),
    )
    .unwrap();
    let input = tmp.path().join("backblasts.csv");
    fs::write(
        &input,
        format!("{HEADER}\n1,2,,2024-05-01,,Forge,,,10,Q\n1,2,,2024-05-01,,Forge,,,11,Co-Q\n"),
    )
    .unwrap();
    let log_file = tmp.path().join("import.log");

    let report = execute_import(ImportCommand {
        input_csv: input.clone(),
        environment: "staging".to_string(),
        commit: true,
        log_file: log_file.clone(),
        config: Some(config),
        backout_dir: None,
        events_log: None,
    })
    .unwrap();
    assert!(matches!(report.outcome, RunOutcome::Committed(_)));

    let conn = Connection::open(&db).unwrap();
    let mut types: Vec<i64> = conn
        .prepare("SELECT attendance_type_id FROM attendance_x_attendance_types")
        .unwrap()
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    types.sort();
    assert_eq!(types, vec![20, 30]);

    let script_path = report.backout_script.unwrap();
    assert_eq!(script_path.parent().unwrap(), tmp.path().join("backouts"));
    let script = fs::read_to_string(&script_path).unwrap();
    assert!(script.contains(&format!("-- Backout SQL for import from {}", input.display())));
    assert!(script.contains("-- Source SHA-256: "));
    assert!(script.contains("-- Mode: COMMIT"));

    let log = fs::read_to_string(&log_file).unwrap();
    assert!(log.starts_with("Log started: "));
    assert!(log.contains("Mode: COMMIT MODE"));
    assert!(log.contains("[CSV] Loaded 2 row(s)"));
    assert!(log.contains("IMPORT SUMMARY"));
    assert!(log.contains("[BACKOUT] SQL rollback file generated"));
}

#[test]
fn execute_import_fails_without_database_configuration() {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("backblasts.csv");
    fs::write(&input, format!("{HEADER}\n")).unwrap();
    let log_file = tmp.path().join("import.log");

    let config = tmp.path().join("backblast-import.toml");
    fs::write(&config, "version = 1\n").unwrap();
    let err = execute_import(ImportCommand {
        input_csv: input,
        environment: "prod".to_string(),
        commit: false,
        log_file: log_file.clone(),
        config: Some(config),
        backout_dir: Some(tmp.path().to_path_buf()),
        events_log: None,
    })
    .unwrap_err();
    assert!(format!("{err:#}").contains("[environments.prod]"));
    assert!(fs::read_to_string(&log_file).unwrap().contains("[ERROR]"));
}
