use crate::records::{EnrichedRow, EventKey, POST_TYPE, PostType, USER_ID};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderMark {
    pub position: usize,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLeaders {
    pub key: EventKey,
    pub leaders: Vec<LeaderMark>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaderViolations {
    pub missing: Vec<EventLeaders>,
    pub multiple: Vec<EventLeaders>,
}

impl LeaderViolations {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.multiple.is_empty()
    }
}

pub fn check_leaders(rows: &[EnrichedRow]) -> LeaderViolations {
    let mut order: Vec<EventKey> = Vec::new();
    let mut marks: HashMap<EventKey, Vec<LeaderMark>> = HashMap::new();

    for row in rows {
        let leaders = marks.entry(row.event_key.clone()).or_insert_with(|| {
            order.push(row.event_key.clone());
            Vec::new()
        });
        if PostType::from_marker(row.get(POST_TYPE)) == Some(PostType::Q) {
            leaders.push(LeaderMark {
                position: row.position(),
                user_id: row.get(USER_ID).to_string(),
            });
        }
    }

    let mut out = LeaderViolations::default();
    for key in order {
        let leaders = marks.remove(&key).unwrap_or_default();
        match leaders.len() {
            1 => {}
            0 => out.missing.push(EventLeaders { key, leaders }),
            _ => out.multiple.push(EventLeaders { key, leaders }),
        }
    }
    out
}
