pub mod event_key;

pub use event_key::{EnrichedRow, EventKey, enrich};

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

pub const ORG_ID: &str = "org_id";
pub const LOCATION_ID: &str = "location_id";
pub const SERIES_ID: &str = "series_id";
pub const START_DATE: &str = "start_date";
pub const START_TIME: &str = "start_time";
pub const NAME: &str = "name";
pub const DESCRIPTION: &str = "description";
pub const BACKBLAST: &str = "backblast";
pub const USER_ID: &str = "user_id";
pub const POST_TYPE: &str = "post_type";

pub const NOT_AVAILABLE: &str = "#N/A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub position: usize,
    fields: HashMap<String, String>,
}

impl SourceRow {
    pub fn new<I, K, V>(position: usize, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            position,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn raw(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    pub fn get(&self, column: &str) -> &str {
        self.raw(column).unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostType {
    Q,
    CoQ,
}

impl PostType {
    pub const Q_MARKER: &'static str = "Q";
    pub const CO_Q_MARKER: &'static str = "Co-Q";

    pub fn from_marker(raw: &str) -> Option<Self> {
        match raw {
            Self::Q_MARKER => Some(Self::Q),
            Self::CO_Q_MARKER => Some(Self::CoQ),
            _ => None,
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Self::Q => Self::Q_MARKER,
            Self::CoQ => Self::CO_Q_MARKER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tabular {
    pub headers: Vec<String>,
    pub rows: Vec<SourceRow>,
}

pub fn read_tabular(path: &Path) -> Result<Tabular> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("open input csv {}", path.display()))?;
    read_tabular_from(file).with_context(|| format!("parse input csv {}", path.display()))
}

pub fn read_tabular_from<R: Read>(input: R) -> Result<Tabular> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    let headers = reader
        .headers()
        .context("read csv header row")?
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("read csv row {}", idx + 1))?;
        let fields = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()));
        rows.push(SourceRow::new(idx + 1, fields));
    }
    Ok(Tabular { headers, rows })
}

pub fn parse_id(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}
