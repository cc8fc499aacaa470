use crate::import::executor::ExecutionReport;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTimings {
    pub ingest_and_validate: Duration,
    pub event_instances: Duration,
    pub attendance: Duration,
    pub attendance_types: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub rows_processed: usize,
    pub events_created: usize,
    pub attendance_created: usize,
    pub q_assignments: usize,
    pub co_q_assignments: usize,
    pub skipped_assignments: usize,
    pub unique_orgs: usize,
    pub unique_locations: usize,
    pub oldest_date: Option<String>,
    pub newest_date: Option<String>,
    pub timings: StageTimings,
}

impl ImportSummary {
    pub fn from_report(rows_processed: usize, report: &ExecutionReport) -> Self {
        let orgs: BTreeSet<&str> = report.events.iter().map(|e| e.key.org_id.as_str()).collect();
        let locations: BTreeSet<&str> = report
            .events
            .iter()
            .map(|e| e.key.location_id.as_str())
            .collect();
        let dates: BTreeSet<&str> = report
            .events
            .iter()
            .map(|e| e.key.start_date.as_str())
            .collect();
        Self {
            rows_processed,
            events_created: report.events.len(),
            attendance_created: report.attendance_created,
            q_assignments: report.tags.q,
            co_q_assignments: report.tags.co_q,
            skipped_assignments: report.tags.skipped,
            unique_orgs: orgs.len(),
            unique_locations: locations.len(),
            oldest_date: dates.first().map(|d| d.to_string()),
            newest_date: dates.last().map(|d| d.to_string()),
            timings: report.timings,
        }
    }

    pub fn render(&self, total: Duration) -> Vec<String> {
        let rule = "=".repeat(RULE_WIDTH);
        let na = "N/A".to_string();
        let mut lines = vec![
            String::new(),
            rule.clone(),
            "IMPORT SUMMARY".to_string(),
            rule.clone(),
            format!("Total rows processed: {}", self.rows_processed),
            format!("Unique events created: {}", self.events_created),
            format!("Attendance records created: {}", self.attendance_created),
            format!("Q assignments: {}", self.q_assignments),
            format!("Co-Q assignments: {}", self.co_q_assignments),
        ];
        if self.skipped_assignments > 0 {
            lines.push(format!(
                "Skipped type assignments: {}",
                self.skipped_assignments
            ));
        }
        lines.extend([
            format!("Unique organizations: {}", self.unique_orgs),
            format!("Unique locations: {}", self.unique_locations),
            format!(
                "Oldest event date: {}",
                self.oldest_date.as_ref().unwrap_or(&na)
            ),
            format!(
                "Most recent event date: {}",
                self.newest_date.as_ref().unwrap_or(&na)
            ),
            String::new(),
            "PERFORMANCE METRICS".to_string(),
            "-".repeat(RULE_WIDTH),
            timing_line("Ingest & Validate:", self.timings.ingest_and_validate),
            timing_line("Event Instances:", self.timings.event_instances),
            timing_line("Attendance:", self.timings.attendance),
            timing_line("Attendance Types:", self.timings.attendance_types),
            timing_line("TOTAL:", total),
            rule,
        ]);
        lines
    }
}

fn timing_line(label: &str, elapsed: Duration) -> String {
    format!("{label:<22}{:8.2}s", elapsed.as_secs_f64())
}
