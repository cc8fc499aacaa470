use crate::records::{
    BACKBLAST, DESCRIPTION, LOCATION_ID, NAME, ORG_ID, SERIES_ID, START_DATE, START_TIME, SourceRow,
};

pub const DEFAULT_EVENT_NAME: &str = "Imported Event";

/// Identity of one logical event. Rows with equal keys become one event
/// instance. Fields are compared exactly as read; only `name` and
/// `description` are trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub org_id: String,
    pub location_id: String,
    pub series_id: String,
    pub start_date: String,
    pub start_time: String,
    pub name: String,
    pub description: String,
    pub backblast: String,
}

impl EventKey {
    pub fn from_row(row: &SourceRow) -> Self {
        let name = match row.get(NAME).trim() {
            "" => DEFAULT_EVENT_NAME.to_string(),
            trimmed => trimmed.to_string(),
        };
        Self {
            org_id: row.get(ORG_ID).to_string(),
            location_id: row.get(LOCATION_ID).to_string(),
            series_id: row.get(SERIES_ID).to_string(),
            start_date: row.get(START_DATE).to_string(),
            start_time: row.get(START_TIME).to_string(),
            name,
            description: row.get(DESCRIPTION).trim().to_string(),
            backblast: row.get(BACKBLAST).to_string(),
        }
    }

    pub fn label(&self) -> String {
        format!(
            "{} {} - {} (Org {}, Location {})",
            self.start_date,
            or_placeholder(&self.start_time, "N/A"),
            self.name,
            self.org_id,
            self.location_id
        )
    }
}

pub(crate) fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.is_empty() { placeholder } else { value }
}

#[derive(Debug, Clone)]
pub struct EnrichedRow {
    pub row: SourceRow,
    pub event_key: EventKey,
}

impl EnrichedRow {
    pub fn position(&self) -> usize {
        self.row.position
    }

    pub fn get(&self, column: &str) -> &str {
        self.row.get(column)
    }
}

pub fn enrich(rows: Vec<SourceRow>) -> Vec<EnrichedRow> {
    rows.into_iter()
        .map(|row| {
            let event_key = EventKey::from_row(&row);
            EnrichedRow { row, event_key }
        })
        .collect()
}
