#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceTypeLink {
    pub attendance_id: i64,
    pub attendance_type_id: i64,
}

/// Generated keys of one run, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdTracker {
    event_instance_ids: Vec<i64>,
    attendance_ids: Vec<i64>,
    attendance_type_links: Vec<AttendanceTypeLink>,
}

impl IdTracker {
    pub fn record_event_instance(&mut self, id: i64) {
        self.event_instance_ids.push(id);
    }

    pub fn record_attendance(&mut self, id: i64) {
        self.attendance_ids.push(id);
    }

    pub fn record_attendance_type(&mut self, link: AttendanceTypeLink) {
        self.attendance_type_links.push(link);
    }

    pub fn event_instance_ids(&self) -> &[i64] {
        &self.event_instance_ids
    }

    pub fn attendance_ids(&self) -> &[i64] {
        &self.attendance_ids
    }

    pub fn attendance_type_links(&self) -> &[AttendanceTypeLink] {
        &self.attendance_type_links
    }

    pub fn linked_attendance_ids(&self) -> Vec<i64> {
        let mut ids = Vec::with_capacity(self.attendance_type_links.len());
        for link in &self.attendance_type_links {
            if !ids.contains(&link.attendance_id) {
                ids.push(link.attendance_id);
            }
        }
        ids
    }
}
