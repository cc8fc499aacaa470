use crate::records::{EnrichedRow, USER_ID, parse_id};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttendanceKey {
    pub org_id: String,
    pub location_id: String,
    pub series_id: String,
    pub start_date: String,
    pub name: String,
    pub user_id: String,
}

impl AttendanceKey {
    /// Event fields come from the enriched key so that rows sharing an event
    /// instance share this key too. Users compare by parsed id.
    fn from_row(row: &EnrichedRow) -> Self {
        let key = &row.event_key;
        let raw_user = row.get(USER_ID);
        let user_id = match parse_id(raw_user) {
            Some(id) => id.to_string(),
            None => raw_user.trim().to_string(),
        };
        Self {
            org_id: key.org_id.clone(),
            location_id: key.location_id.clone(),
            series_id: key.series_id.clone(),
            start_date: key.start_date.clone(),
            name: key.name.clone(),
            user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateAttendance {
    pub key: AttendanceKey,
    pub positions: Vec<usize>,
}

impl DuplicateAttendance {
    pub fn count(&self) -> usize {
        self.positions.len()
    }
}

impl fmt::Display for DuplicateAttendance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Org {}, Location {}, Date {}, User {}: appears in rows {:?} ({} times)",
            self.key.org_id,
            self.key.location_id,
            self.key.start_date,
            self.key.user_id,
            self.positions,
            self.count()
        )
    }
}

/// Every group of rows naming the same user at the same event, in order of
/// first appearance.
pub fn find_duplicate_attendance(rows: &[EnrichedRow]) -> Vec<DuplicateAttendance> {
    let mut order: Vec<AttendanceKey> = Vec::new();
    let mut seen: HashMap<AttendanceKey, Vec<usize>> = HashMap::new();

    for row in rows {
        let key = AttendanceKey::from_row(row);
        let positions = seen.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Vec::new()
        });
        positions.push(row.position());
    }

    order
        .into_iter()
        .filter_map(|key| {
            let positions = seen.remove(&key)?;
            (positions.len() > 1).then_some(DuplicateAttendance { key, positions })
        })
        .collect()
}
