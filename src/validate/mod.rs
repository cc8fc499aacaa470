pub mod duplicates;
pub mod fields;
pub mod leaders;
pub mod references;

use crate::records::EnrichedRow;
use duplicates::DuplicateAttendance;
use fields::FieldViolation;
use leaders::LeaderViolations;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalReport {
    pub fields: Vec<FieldViolation>,
    pub duplicates: Vec<DuplicateAttendance>,
    pub leaders: LeaderViolations,
}

impl LocalReport {
    pub fn is_clean(&self) -> bool {
        self.fields.is_empty() && self.duplicates.is_empty() && self.leaders.is_empty()
    }
}

pub fn validate_local(rows: &[EnrichedRow]) -> LocalReport {
    LocalReport {
        fields: fields::validate_fields(rows),
        duplicates: duplicates::find_duplicate_attendance(rows),
        leaders: leaders::check_leaders(rows),
    }
}
