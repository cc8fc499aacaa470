mod common;

use backblast_import::import::state::RunState;
use backblast_import::import::{AbortReason, RunOutcome, run_pipeline};
use backblast_import::logging::console::RunLog;
use backblast_import::records::enrich;
use backblast_import::validate::references::Reference;
use backblast_import::validate::validate_local;
use common::{add_attendance_failure, backout_scripts, count, options, rows, seeded_db};
use rusqlite::Connection;
use tempfile::tempdir;

const SHARED_EVENT: &str = "\
1,2,7,2024-05-01,0530,The Forge,Beatdown,Merkins and more,10,Q
1,2,7,2024-05-01,0530,The Forge,Beatdown,Merkins and more,11,
";

#[test]
fn shared_event_key_commits_one_instance_with_two_attendees() {
    let tmp = tempdir().unwrap();
    let db = seeded_db(tmp.path());
    let mut log = RunLog::memory();

    let report = run_pipeline(rows(SHARED_EVENT), &options(tmp.path(), db.clone(), true), &mut log)
        .unwrap();

    let RunOutcome::Committed(summary) = &report.outcome else {
        panic!("expected commit, got {:?}", report.outcome);
    };
    assert_eq!(summary.events_created, 1);
    assert_eq!(summary.attendance_created, 2);
    assert_eq!(summary.q_assignments, 1);
    assert_eq!(
        report.states,
        vec![
            RunState::Validating,
            RunState::Connected,
            RunState::Writing,
            RunState::Committed
        ]
    );

    assert_eq!(count(&db, "event_instances"), 1);
    assert_eq!(count(&db, "attendance"), 2);
    assert_eq!(count(&db, "attendance_x_attendance_types"), 1);

    let conn = Connection::open(&db).unwrap();
    let (pax, series, time, active): (i64, Option<i64>, Option<String>, bool) = conn
        .query_row(
            "SELECT pax_count, series_id, start_time, is_active FROM event_instances",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .unwrap();
    assert_eq!(pax, 2);
    assert_eq!(series, Some(7));
    assert_eq!(time.as_deref(), Some("0530"));
    assert!(active);
    let (user, type_id): (i64, i64) = conn
        .query_row(
            "SELECT a.user_id, t.attendance_type_id
             FROM attendance_x_attendance_types t JOIN attendance a ON a.id = t.attendance_id",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!((user, type_id), (10, 2));

    let script = report.backout_script.as_ref().unwrap();
    assert!(script.exists());
    assert!(log.lines().iter().any(|l| l == "IMPORT SUMMARY"));
}

#[test]
fn one_event_instance_per_distinct_key_and_one_attendance_per_row() {
    let tmp = tempdir().unwrap();
    let db = seeded_db(tmp.path());
    let batch = "\
1,2,,2024-05-01,,Forge,,,10,Q
1,2,,2024-05-01,,Forge,,,11,Co-Q
1,2,,2024-05-02,,Forge,,,10,Q
1,2,,2024-05-02,,Forge,,,12,
1,2,,2024-05-02,,Anvil,,,11,Q
";
    let mut log = RunLog::memory();
    let report = run_pipeline(rows(batch), &options(tmp.path(), db.clone(), true), &mut log).unwrap();

    let summary = report.summary().unwrap();
    assert_eq!(summary.events_created, 3);
    assert_eq!(summary.attendance_created, 5);
    assert_eq!(summary.q_assignments, 3);
    assert_eq!(summary.co_q_assignments, 1);
    assert_eq!(summary.oldest_date.as_deref(), Some("2024-05-01"));
    assert_eq!(summary.newest_date.as_deref(), Some("2024-05-02"));
    assert_eq!(count(&db, "event_instances"), 3);
    assert_eq!(count(&db, "attendance"), 5);
    assert_eq!(report.tracker.event_instance_ids().len(), 3);
    assert_eq!(report.tracker.attendance_ids().len(), 5);
    assert_eq!(report.tracker.attendance_type_links().len(), 4);
}

#[test]
fn duplicate_attendance_aborts_before_connecting() {
    let tmp = tempdir().unwrap();
    let missing_db = tmp.path().join("never-opened.db");
    let batch = "\
1,2,,2024-05-01,,Forge,,,10,Q
1,2,,2024-05-01,,Forge,,,10,
";
    let mut log = RunLog::memory();
    let report = run_pipeline(rows(batch), &options(tmp.path(), missing_db.clone(), true), &mut log)
        .unwrap();

    let RunOutcome::Aborted(AbortReason::Local(local)) = &report.outcome else {
        panic!("expected local abort, got {:?}", report.outcome);
    };
    assert_eq!(local.duplicates.len(), 1);
    assert_eq!(local.duplicates[0].positions, vec![1, 2]);
    assert_eq!(local.duplicates[0].count(), 2);
    assert_eq!(report.states, vec![RunState::Validating, RunState::Aborted]);
    assert!(report.backout_script.is_none());
    assert!(!missing_db.exists());
    assert!(backout_scripts(tmp.path()).is_empty());
    assert!(log.lines().iter().any(|l| l.contains("appears in rows [1, 2] (2 times)")));
}

#[test]
fn padded_or_defaulted_names_still_count_as_duplicate_attendance() {
    let tmp = tempdir().unwrap();
    let db = seeded_db(tmp.path());
    let batch = "\
1,2,,2024-05-01,,Forge,,,10,Q
1,2,,2024-05-01,,Forge ,,,10,
1,2,,2024-05-02,,,,,11,Q
1,2,,2024-05-02,,Imported Event,,,11,
";
    let report = run_pipeline(rows(batch), &options(tmp.path(), db.clone(), true), &mut RunLog::memory())
        .unwrap();

    let RunOutcome::Aborted(AbortReason::Local(local)) = &report.outcome else {
        panic!("expected local abort, got {:?}", report.outcome);
    };
    let positions: Vec<Vec<usize>> = local.duplicates.iter().map(|d| d.positions.clone()).collect();
    assert_eq!(positions, vec![vec![1, 2], vec![3, 4]]);
    assert_eq!(report.states, vec![RunState::Validating, RunState::Aborted]);
    assert_eq!(count(&db, "event_instances"), 0);
    assert_eq!(count(&db, "attendance"), 0);
}

#[test]
fn field_and_leader_failures_are_reported_together() {
    let tmp = tempdir().unwrap();
    let batch = "\
#N/A,2,,2024-05-01,,Forge,,,10,
1,2,,2024-05-02,,Anvil,,,10,Q
1,2,,2024-05-02,,Anvil,,,11,Q
";
    let mut log = RunLog::memory();
    let report = run_pipeline(
        rows(batch),
        &options(tmp.path(), tmp.path().join("none.db"), false),
        &mut log,
    )
    .unwrap();

    let RunOutcome::Aborted(AbortReason::Local(local)) = report.outcome else {
        panic!("expected local abort");
    };
    assert_eq!(local.fields.len(), 1);
    assert_eq!(local.fields[0].position, 1);
    assert_eq!(local.leaders.missing.len(), 1);
    assert_eq!(local.leaders.multiple.len(), 1);
    assert!(log.lines().iter().any(|l| l.contains("user_id 10 (row 2), user_id 11 (row 3)")));
}

#[test]
fn unknown_org_aborts_after_connecting_and_rolls_back() {
    let tmp = tempdir().unwrap();
    let db = seeded_db(tmp.path());
    let batch = "\
999,2,,2024-05-01,,Forge,,,10,Q
";
    let mut log = RunLog::memory();
    let report = run_pipeline(rows(batch), &options(tmp.path(), db.clone(), true), &mut log).unwrap();

    let RunOutcome::Aborted(AbortReason::References(missing)) = &report.outcome else {
        panic!("expected reference abort, got {:?}", report.outcome);
    };
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].reference, Reference::Org);
    assert_eq!(missing[0].ids, vec![999]);
    assert_eq!(
        report.states,
        vec![RunState::Validating, RunState::Connected, RunState::Aborted]
    );
    assert_eq!(count(&db, "event_instances"), 0);
    assert_eq!(count(&db, "attendance"), 0);

    let script = std::fs::read_to_string(report.backout_script.as_ref().unwrap()).unwrap();
    assert!(!script.contains("DELETE"));
    assert!(log.lines().iter().any(|l| l.contains("Missing org_id(s): [999]")));
}

#[test]
fn dry_run_matches_commit_counts_without_persisting() {
    let batch = "\
1,2,,2024-05-01,,Forge,,,10,Q
1,2,,2024-05-01,,Forge,,,11,Co-Q
1,2,,2024-05-03,,Forge,,,12,Q
";
    let dry_tmp = tempdir().unwrap();
    let dry_db = seeded_db(dry_tmp.path());
    let dry = run_pipeline(
        rows(batch),
        &options(dry_tmp.path(), dry_db.clone(), false),
        &mut RunLog::memory(),
    )
    .unwrap();

    let commit_tmp = tempdir().unwrap();
    let commit_db = seeded_db(commit_tmp.path());
    let committed = run_pipeline(
        rows(batch),
        &options(commit_tmp.path(), commit_db.clone(), true),
        &mut RunLog::memory(),
    )
    .unwrap();

    let RunOutcome::RolledBack(dry_summary) = &dry.outcome else {
        panic!("expected rollback, got {:?}", dry.outcome);
    };
    let commit_summary = committed.summary().unwrap();
    assert_eq!(dry_summary.events_created, commit_summary.events_created);
    assert_eq!(dry_summary.attendance_created, commit_summary.attendance_created);
    assert_eq!(dry_summary.q_assignments, commit_summary.q_assignments);
    assert_eq!(dry_summary.co_q_assignments, commit_summary.co_q_assignments);
    assert_eq!(*dry.states.last().unwrap(), RunState::RolledBack);

    assert_eq!(count(&dry_db, "event_instances"), 0);
    assert_eq!(count(&dry_db, "attendance"), 0);
    assert_eq!(count(&dry_db, "attendance_x_attendance_types"), 0);
    assert_eq!(count(&commit_db, "event_instances"), 2);

    let script = std::fs::read_to_string(dry.backout_script.as_ref().unwrap()).unwrap();
    assert!(script.contains("DRY RUN"));
    assert!(script.contains("-- Attendance records deleted: 3"));
}

#[test]
fn unknown_marker_is_accepted_without_type_link() {
    let tmp = tempdir().unwrap();
    let db = seeded_db(tmp.path());
    let batch = "\
1,2,,2024-05-01,,Forge,,,10,Q
1,2,,2024-05-01,,Forge,,,11,FNG
";
    let report = run_pipeline(
        rows(batch),
        &options(tmp.path(), db.clone(), true),
        &mut RunLog::memory(),
    )
    .unwrap();
    assert!(matches!(report.outcome, RunOutcome::Committed(_)));
    assert_eq!(count(&db, "attendance"), 2);
    assert_eq!(count(&db, "attendance_x_attendance_types"), 1);
}

#[test]
fn write_failure_rolls_back_and_still_writes_partial_backout() {
    let tmp = tempdir().unwrap();
    let db = seeded_db(tmp.path());
    add_attendance_failure(&db, 11);
    let mut log = RunLog::memory();

    let err = run_pipeline(rows(SHARED_EVENT), &options(tmp.path(), db.clone(), true), &mut log)
        .unwrap_err();
    assert!(format!("{err:#}").contains("simulated attendance failure"));

    assert_eq!(count(&db, "event_instances"), 0);
    assert_eq!(count(&db, "attendance"), 0);

    let scripts = backout_scripts(tmp.path());
    assert_eq!(scripts.len(), 1);
    let script = std::fs::read_to_string(&scripts[0]).unwrap();
    assert!(script.contains("DELETE FROM event_instances WHERE id IN (1);"));
    assert!(script.contains("-- Attendance records deleted: 1"));
    assert!(script.contains("-- Attendance type assignments deleted: 0"));
    assert!(
        log.lines()
            .iter()
            .any(|l| l.contains("[ERROR] Import failed with exception"))
    );
}

#[test]
fn events_log_records_each_state() {
    let tmp = tempdir().unwrap();
    let db = seeded_db(tmp.path());
    let events_log = tmp.path().join("events.ndjson");
    let mut opts = options(tmp.path(), db, false);
    opts.events_log = Some(events_log.clone());

    run_pipeline(rows(SHARED_EVENT), &opts, &mut RunLog::memory()).unwrap();

    let states = std::fs::read_to_string(&events_log)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
        .map(|v| v["state"].as_str().unwrap().to_string())
        .collect::<Vec<_>>();
    assert_eq!(states, vec!["validating", "connected", "writing", "rolled_back"]);
}

#[test]
fn local_validation_is_repeatable() {
    let batch = "\
1,2,,2024-05-01,,Forge,,,10,
1,2,,2024-05-01,,Forge,,,10,
,2,,2024-05-02,,Anvil,,,11,Q
";
    let enriched = enrich(rows(batch));
    let first = validate_local(&enriched);
    let second = validate_local(&enriched);
    assert!(!first.is_clean());
    assert_eq!(first, second);
}
