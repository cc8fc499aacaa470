#![allow(dead_code)]

use backblast_import::import::PipelineOptions;
use backblast_import::import::executor::AttendanceTypeIds;
use backblast_import::records::{self, SourceRow};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub const SCHEMA: &str = "
    CREATE TABLE orgs (id INTEGER PRIMARY KEY, name TEXT NOT NULL, org_type TEXT NOT NULL);
    CREATE TABLE locations (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE events (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
    CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        f3_name TEXT,
        first_name TEXT,
        last_name TEXT,
        email TEXT NOT NULL UNIQUE,
        home_region_id INTEGER REFERENCES orgs(id),
        status TEXT NOT NULL DEFAULT 'active'
    );
    CREATE TABLE event_instances (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        org_id INTEGER NOT NULL REFERENCES orgs(id),
        location_id INTEGER REFERENCES locations(id),
        series_id INTEGER REFERENCES events(id),
        is_active BOOLEAN NOT NULL,
        highlight BOOLEAN NOT NULL,
        start_date TEXT NOT NULL,
        start_time TEXT,
        name TEXT NOT NULL,
        description TEXT,
        backblast TEXT,
        pax_count INTEGER
    );
    CREATE TABLE attendance (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_instance_id INTEGER NOT NULL REFERENCES event_instances(id),
        user_id INTEGER NOT NULL REFERENCES users(id),
        is_planned BOOLEAN NOT NULL,
        UNIQUE (event_instance_id, user_id, is_planned)
    );
    CREATE TABLE attendance_x_attendance_types (
        attendance_id INTEGER NOT NULL REFERENCES attendance(id),
        attendance_type_id INTEGER NOT NULL,
        PRIMARY KEY (attendance_id, attendance_type_id)
    );
    INSERT INTO orgs (id, name, org_type) VALUES (1, 'The Forge AO', 'ao'), (5, 'Region Five', 'region');
    INSERT INTO locations (id, name) VALUES (2, 'Central Park');
    INSERT INTO events (id, name) VALUES (7, 'Weekly Forge');
    INSERT INTO users (id, f3_name, email) VALUES
        (10, 'Alpha', 'a@example.com'),
        (11, 'Bravo', 'b@example.com'),
        (12, 'Charlie', 'c@example.com');
";

pub const HEADER: &str = "org_id,location_id,series_id,start_date,start_time,name,description,backblast,user_id,post_type";

pub fn seeded_db(dir: &Path) -> PathBuf {
    let path = dir.join("target.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
    path
}

pub fn add_attendance_failure(db: &Path, user_id: i64) {
    let conn = Connection::open(db).unwrap();
    conn.execute_batch(&format!(
        "CREATE TRIGGER fail_attendance BEFORE INSERT ON attendance
         WHEN NEW.user_id = {user_id}
         BEGIN SELECT RAISE(ABORT, 'simulated attendance failure'); END;"
    ))
    .unwrap();
}

pub fn rows(body: &str) -> Vec<SourceRow> {
    let csv = format!("{HEADER}\n{body}");
    records::read_tabular_from(csv.as_bytes()).unwrap().rows
}

pub fn options(dir: &Path, database: PathBuf, commit: bool) -> PipelineOptions {
    PipelineOptions {
        run_id: "test-run".to_string(),
        source: dir.join("backblasts.csv"),
        source_sha256: None,
        environment: "staging".to_string(),
        database,
        commit,
        attendance_types: AttendanceTypeIds::default(),
        backout_dir: dir.join("backouts"),
        events_log: None,
    }
}

pub fn count(db: &Path, table: &str) -> i64 {
    let conn = Connection::open(db).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
        .unwrap()
}

pub fn backout_scripts(dir: &Path) -> Vec<PathBuf> {
    let dir = dir.join("backouts");
    if !dir.exists() {
        return Vec::new();
    }
    let mut out = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "sql"))
        .collect::<Vec<_>>();
    out.sort();
    out
}
