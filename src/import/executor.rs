use crate::import::summary::StageTimings;
use crate::import::tracker::{AttendanceTypeLink, IdTracker};
use crate::logging::console::RunLog;
use crate::records::event_key::or_placeholder;
use crate::records::{EnrichedRow, EventKey, POST_TYPE, PostType, USER_ID, parse_id};
use crate::store::{ImportTx, NewEventInstance};
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

const PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceTypeIds {
    pub q: i64,
    pub co_q: i64,
}

impl Default for AttendanceTypeIds {
    fn default() -> Self {
        Self { q: 2, co_q: 3 }
    }
}

impl AttendanceTypeIds {
    pub fn for_post_type(&self, post_type: PostType) -> i64 {
        match post_type {
            PostType::Q => self.q,
            PostType::CoQ => self.co_q,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedEvent {
    pub key: EventKey,
    pub id: i64,
    pub pax_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagCounts {
    pub q: usize,
    pub co_q: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub events: Vec<CreatedEvent>,
    pub attendance_created: usize,
    pub tags: TagCounts,
    pub timings: StageTimings,
}

pub type EventMap = HashMap<EventKey, i64>;
pub type AttendanceMap = HashMap<(i64, i64), i64>;

fn require_id(row: &EnrichedRow, column: &str, raw: &str) -> Result<i64> {
    parse_id(raw).ok_or_else(|| {
        anyhow!(
            "row {}: {} '{}' is not an integer id",
            row.position(),
            column,
            raw
        )
    })
}

fn optional_id(row: &EnrichedRow, column: &str, raw: &str) -> Result<Option<i64>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    require_id(row, column, raw).map(Some)
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

/// Distinct event keys in order of first appearance, with participant counts.
pub fn plan_events(rows: &[EnrichedRow]) -> Vec<(&EnrichedRow, i64)> {
    let mut order: Vec<(&EnrichedRow, i64)> = Vec::new();
    let mut index: HashMap<&EventKey, usize> = HashMap::new();
    for row in rows {
        if let Some(&i) = index.get(&row.event_key) {
            order[i].1 += 1;
            continue;
        }
        index.insert(&row.event_key, order.len());
        order.push((row, 1));
    }
    order
}

pub fn create_event_instances(
    tx: &ImportTx<'_>,
    rows: &[EnrichedRow],
    tracker: &mut IdTracker,
    log: &mut RunLog,
) -> Result<(EventMap, Vec<CreatedEvent>)> {
    let planned = plan_events(rows);
    log.line(format!(
        "\n[EVENT INSTANCES] Found {} unique event(s) to create:",
        planned.len()
    ));

    let mut map = EventMap::with_capacity(planned.len());
    let mut created = Vec::with_capacity(planned.len());
    for (i, (first, pax_count)) in planned.into_iter().enumerate() {
        let key = &first.event_key;
        log.line(format!(
            "  [{}] org_id={}, location_id={}, series_id={}, date={}, time={}, name={}, pax_count={}",
            i + 1,
            key.org_id,
            key.location_id,
            or_placeholder(&key.series_id, "None"),
            key.start_date,
            or_placeholder(&key.start_time, "N/A"),
            key.name,
            pax_count
        ));
        if !key.description.is_empty() {
            log.line(format!("      description: {}", preview(&key.description)));
        }
        if !key.backblast.is_empty() {
            log.line(format!("      backblast: {}", preview(&key.backblast)));
        }

        let instance = NewEventInstance {
            org_id: require_id(first, "org_id", &key.org_id)?,
            location_id: require_id(first, "location_id", &key.location_id)?,
            series_id: optional_id(first, "series_id", &key.series_id)?,
            is_active: true,
            highlight: false,
            start_date: key.start_date.clone(),
            start_time: non_empty(&key.start_time),
            name: key.name.clone(),
            description: non_empty(&key.description),
            backblast: non_empty(&key.backblast),
            pax_count,
        };
        let id = tx.insert_event_instance(&instance)?;
        tracker.record_event_instance(id);
        log.line(format!("      -> event_instance_id: {id}"));

        map.insert(key.clone(), id);
        created.push(CreatedEvent {
            key: key.clone(),
            id,
            pax_count,
        });
    }
    Ok((map, created))
}

fn resolve_event(events: &EventMap, row: &EnrichedRow) -> Result<i64> {
    events.get(&row.event_key).copied().ok_or_else(|| {
        anyhow!(
            "row {}: no event instance created for {}",
            row.position(),
            row.event_key.label()
        )
    })
}

pub fn create_attendance(
    tx: &ImportTx<'_>,
    rows: &[EnrichedRow],
    events: &EventMap,
    tracker: &mut IdTracker,
    log: &mut RunLog,
) -> Result<AttendanceMap> {
    log.line(format!(
        "\n[ATTENDANCE] Creating {} attendance record(s):",
        rows.len()
    ));
    let mut map = AttendanceMap::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let event_instance_id = resolve_event(events, row)?;
        let user_id = require_id(row, USER_ID, row.get(USER_ID))?;
        log.line(format!(
            "  [{}] event_instance_id={}, user_id={}, post_type={}",
            i + 1,
            event_instance_id,
            user_id,
            or_placeholder(row.get(POST_TYPE), "normal")
        ));
        let id = tx.insert_attendance(event_instance_id, user_id)?;
        tracker.record_attendance(id);
        map.insert((event_instance_id, user_id), id);
    }
    Ok(map)
}

pub fn assign_attendance_types(
    tx: &ImportTx<'_>,
    rows: &[EnrichedRow],
    events: &EventMap,
    attendance: &AttendanceMap,
    type_ids: AttendanceTypeIds,
    tracker: &mut IdTracker,
    log: &mut RunLog,
) -> Result<TagCounts> {
    log.line("\n[ATTENDANCE TYPES] Processing Q/Co-Q assignments:");
    let mut counts = TagCounts::default();
    for row in rows {
        let Some(post_type) = PostType::from_marker(row.get(POST_TYPE)) else {
            continue;
        };
        let event_instance_id = resolve_event(events, row)?;
        let user_id = require_id(row, USER_ID, row.get(USER_ID))?;
        let Some(&attendance_id) = attendance.get(&(event_instance_id, user_id)) else {
            log.error(format!(
                "  [ATTENDANCE TYPES] WARNING: no attendance found for row {} (event_instance_id={}, user_id={}); skipping {}",
                row.position(),
                event_instance_id,
                user_id,
                post_type.marker()
            ));
            counts.skipped += 1;
            continue;
        };

        let attendance_type_id = type_ids.for_post_type(post_type);
        log.line(format!(
            "  [ATTENDANCE TYPES] user_id={}, type={}, attendance_type_id={}",
            user_id,
            post_type.marker(),
            attendance_type_id
        ));
        tx.insert_attendance_type(attendance_id, attendance_type_id)?;
        tracker.record_attendance_type(AttendanceTypeLink {
            attendance_id,
            attendance_type_id,
        });
        match post_type {
            PostType::Q => counts.q += 1,
            PostType::CoQ => counts.co_q += 1,
        }
    }
    log.line(format!(
        "  ✓ Created {} Q assignment(s), {} Co-Q assignment(s)",
        counts.q, counts.co_q
    ));
    Ok(counts)
}

pub fn execute(
    tx: &ImportTx<'_>,
    rows: &[EnrichedRow],
    type_ids: AttendanceTypeIds,
    tracker: &mut IdTracker,
    log: &mut RunLog,
) -> Result<ExecutionReport> {
    let mut report = ExecutionReport::default();

    let started = Instant::now();
    let (events, created) = create_event_instances(tx, rows, tracker, log)?;
    report.timings.event_instances = started.elapsed();
    report.events = created;

    let started = Instant::now();
    let recorded = tracker.attendance_ids().len();
    let attendance = create_attendance(tx, rows, &events, tracker, log)?;
    report.timings.attendance = started.elapsed();
    report.attendance_created = tracker.attendance_ids().len() - recorded;

    let started = Instant::now();
    report.tags = assign_attendance_types(tx, rows, &events, &attendance, type_ids, tracker, log)?;
    report.timings.attendance_types = started.elapsed();

    Ok(report)
}
