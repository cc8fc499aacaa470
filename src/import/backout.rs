use crate::import::tracker::IdTracker;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BackoutHeader {
    pub run_id: String,
    pub source: PathBuf,
    pub source_sha256: Option<String>,
    pub environment: String,
    pub committed: bool,
    pub generated_at: DateTime<Utc>,
}

pub fn backout_file_name(environment: &str, at: DateTime<Utc>) -> String {
    format!("backout_{}_{}.sql", environment, at.format("%Y%m%d_%H%M%S"))
}

fn id_list(ids: &[i64]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn delete_block(lines: &mut Vec<String>, table: &str, column: &str, ids: &[i64]) {
    if ids.is_empty() {
        return;
    }
    lines.push(format!("-- Delete {table} records"));
    lines.push(format!(
        "DELETE FROM {table} WHERE {column} IN ({});",
        id_list(ids)
    ));
    lines.push(String::new());
}

/// Deletes run children before parents: type links, attendance, then event
/// instances. Only the captured ids are named.
pub fn render_backout_sql(tracker: &IdTracker, header: &BackoutHeader) -> String {
    let mut lines = vec![format!(
        "-- Backout SQL for import from {}",
        header.source.display()
    )];
    if let Some(sha) = &header.source_sha256 {
        lines.push(format!("-- Source SHA-256: {sha}"));
    }
    lines.push(format!("-- Run ID: {}", header.run_id));
    lines.push(format!("-- Generated: {}", header.generated_at.to_rfc3339()));
    lines.push(format!("-- Environment: {}", header.environment));
    if header.committed {
        lines.push("-- Mode: COMMIT".to_string());
        lines.push("-- This file will roll back all inserted data".to_string());
    } else {
        lines.push("-- Mode: DRY RUN or FAILED RUN (transaction was rolled back)".to_string());
        lines.push("-- These ids were never persisted; do not execute this file".to_string());
    }
    lines.push(String::new());

    delete_block(
        &mut lines,
        "attendance_x_attendance_types",
        "attendance_id",
        &tracker.linked_attendance_ids(),
    );
    delete_block(&mut lines, "attendance", "id", tracker.attendance_ids());
    delete_block(
        &mut lines,
        "event_instances",
        "id",
        tracker.event_instance_ids(),
    );

    lines.push("-- Summary of deleted records".to_string());
    lines.push(format!(
        "-- Event instances deleted: {}",
        tracker.event_instance_ids().len()
    ));
    lines.push(format!(
        "-- Attendance records deleted: {}",
        tracker.attendance_ids().len()
    ));
    lines.push(format!(
        "-- Attendance type assignments deleted: {}",
        tracker.attendance_type_links().len()
    ));
    lines.push(String::new());
    lines.join("\n")
}

fn create_script(path: &Path, body: &str) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(body.as_bytes())
}

/// Never replaces an existing script. A name already taken within the same
/// second gets the run id appended.
pub fn write_backout_script(
    dir: &Path,
    tracker: &IdTracker,
    header: &BackoutHeader,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create backout dir {}", dir.display()))?;
    let body = render_backout_sql(tracker, header);
    let name = backout_file_name(&header.environment, header.generated_at);

    let path = dir.join(&name);
    match create_script(&path, &body) {
        Ok(()) => return Ok(path),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
        Err(err) => {
            return Err(err).with_context(|| format!("write backout script {}", path.display()));
        }
    }

    let stem = name.trim_end_matches(".sql");
    let path = dir.join(format!("{stem}_{}.sql", header.run_id));
    create_script(&path, &body)
        .with_context(|| format!("write backout script {}", path.display()))?;
    Ok(path)
}
