use crate::records::{EnrichedRow, LOCATION_ID, NOT_AVAILABLE, ORG_ID, START_DATE, USER_ID};
use std::fmt;

pub const REQUIRED_COLUMNS: [&str; 4] = [ORG_ID, LOCATION_ID, START_DATE, USER_ID];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub position: usize,
    pub column: &'static str,
    pub value: Option<String>,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(
                f,
                "Row {} ERROR: Missing or invalid required column: {} (value: '{}')",
                self.position, self.column, value
            ),
            None => write!(
                f,
                "Row {} ERROR: Missing or invalid required column: {} (column absent)",
                self.position, self.column
            ),
        }
    }
}

pub fn check_row(row: &EnrichedRow) -> Result<(), FieldViolation> {
    for column in REQUIRED_COLUMNS {
        let raw = row.row.raw(column);
        let value = raw.unwrap_or("").trim();
        if value.is_empty() || value == NOT_AVAILABLE {
            return Err(FieldViolation {
                position: row.position(),
                column,
                value: raw.map(ToString::to_string),
            });
        }
    }
    Ok(())
}

pub fn validate_fields(rows: &[EnrichedRow]) -> Vec<FieldViolation> {
    rows.iter().filter_map(|row| check_row(row).err()).collect()
}
