use crate::records::{EnrichedRow, LOCATION_ID, ORG_ID, SERIES_ID, USER_ID, parse_id};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reference {
    Org,
    Location,
    Series,
    User,
}

impl Reference {
    pub const ALL: [Reference; 4] = [
        Reference::Org,
        Reference::Location,
        Reference::Series,
        Reference::User,
    ];

    pub fn table(self) -> &'static str {
        match self {
            Reference::Org => "orgs",
            Reference::Location => "locations",
            Reference::Series => "events",
            Reference::User => "users",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            Reference::Org => ORG_ID,
            Reference::Location => LOCATION_ID,
            Reference::Series => SERIES_ID,
            Reference::User => USER_ID,
        }
    }
}

pub trait ExistenceLookup {
    fn existing_ids(&self, reference: Reference, ids: &BTreeSet<i64>) -> Result<BTreeSet<i64>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingReferences {
    pub reference: Reference,
    pub ids: Vec<i64>,
}

impl fmt::Display for MissingReferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Missing {}(s): {:?}", self.reference.column(), self.ids)
    }
}

pub fn collect_referenced_ids(rows: &[EnrichedRow]) -> BTreeMap<Reference, BTreeSet<i64>> {
    let mut out: BTreeMap<Reference, BTreeSet<i64>> =
        Reference::ALL.iter().map(|r| (*r, BTreeSet::new())).collect();
    for row in rows {
        for reference in Reference::ALL {
            if let Some(id) = parse_id(row.get(reference.column())) {
                out.entry(reference).or_default().insert(id);
            }
        }
    }
    out
}

/// One lookup per entity type; blank and non-integer ids never reach the
/// store. Missing ids come back sorted.
pub fn check_references(
    lookup: &impl ExistenceLookup,
    referenced: &BTreeMap<Reference, BTreeSet<i64>>,
) -> Result<Vec<MissingReferences>> {
    let mut missing = Vec::new();
    for (reference, ids) in referenced {
        if ids.is_empty() {
            continue;
        }
        let found = lookup.existing_ids(*reference, ids)?;
        let absent = ids.difference(&found).copied().collect::<Vec<_>>();
        if !absent.is_empty() {
            missing.push(MissingReferences {
                reference: *reference,
                ids: absent,
            });
        }
    }
    Ok(missing)
}
