use crate::validate::references::{ExistenceLookup, Reference};
use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, Transaction, params, params_from_iter};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEventInstance {
    pub org_id: i64,
    pub location_id: i64,
    pub series_id: Option<i64>,
    pub is_active: bool,
    pub highlight: bool,
    pub start_date: String,
    pub start_time: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub backblast: Option<String>,
    pub pax_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub f3_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
    pub home_region_id: Option<i64>,
}

pub struct TargetStore {
    conn: Connection,
}

impl TargetStore {
    /// Opens an existing database. A missing file is an error rather than a
    /// fresh empty store.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open target db {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn begin(&mut self) -> Result<ImportTx<'_>> {
        let tx = self.conn.transaction().context("begin import transaction")?;
        Ok(ImportTx { tx })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

pub struct ImportTx<'c> {
    tx: Transaction<'c>,
}

impl ImportTx<'_> {
    pub fn insert_event_instance(&self, ev: &NewEventInstance) -> Result<i64> {
        self.tx
            .execute(
                "INSERT INTO event_instances (
                    org_id, location_id, series_id, is_active, highlight, start_date, start_time,
                    name, description, backblast, pax_count
                 )
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    ev.org_id,
                    ev.location_id,
                    ev.series_id,
                    ev.is_active,
                    ev.highlight,
                    ev.start_date,
                    ev.start_time,
                    ev.name,
                    ev.description,
                    ev.backblast,
                    ev.pax_count
                ],
            )
            .with_context(|| format!("insert event instance '{}' on {}", ev.name, ev.start_date))?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn insert_attendance(&self, event_instance_id: i64, user_id: i64) -> Result<i64> {
        self.tx
            .execute(
                "INSERT INTO attendance (event_instance_id, user_id, is_planned) VALUES (?1, ?2, ?3)",
                params![event_instance_id, user_id, false],
            )
            .with_context(|| {
                format!("insert attendance event_instance_id={event_instance_id} user_id={user_id}")
            })?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn insert_attendance_type(&self, attendance_id: i64, attendance_type_id: i64) -> Result<()> {
        self.tx
            .execute(
                "INSERT INTO attendance_x_attendance_types (attendance_id, attendance_type_id) VALUES (?1, ?2)",
                params![attendance_id, attendance_type_id],
            )
            .with_context(|| {
                format!(
                    "insert attendance type attendance_id={attendance_id} attendance_type_id={attendance_type_id}"
                )
            })?;
        Ok(())
    }

    pub fn existing_region_ids(&self, ids: &BTreeSet<i64>) -> Result<BTreeSet<i64>> {
        self.select_ids("orgs", Some("org_type = 'region'"), ids)
    }

    pub fn upsert_user(&self, user: &NewUser) -> Result<i64> {
        let id = self
            .tx
            .query_row(
                "INSERT INTO users (f3_name, first_name, last_name, email, home_region_id, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'active')
                 ON CONFLICT (email) DO UPDATE SET
                    f3_name = COALESCE(excluded.f3_name, users.f3_name),
                    first_name = COALESCE(excluded.first_name, users.first_name),
                    last_name = COALESCE(excluded.last_name, users.last_name),
                    home_region_id = COALESCE(excluded.home_region_id, users.home_region_id)
                 RETURNING id",
                params![
                    user.f3_name,
                    user.first_name,
                    user.last_name,
                    user.email,
                    user.home_region_id
                ],
                |row| row.get(0),
            )
            .with_context(|| format!("upsert user {}", user.email))?;
        Ok(id)
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit().context("commit import transaction")
    }

    pub fn rollback(self) -> Result<()> {
        self.tx.rollback().context("roll back import transaction")
    }

    fn select_ids(
        &self,
        table: &str,
        filter: Option<&str>,
        ids: &BTreeSet<i64>,
    ) -> Result<BTreeSet<i64>> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut sql = format!("SELECT id FROM {table} WHERE id IN ({placeholders})");
        if let Some(filter) = filter {
            sql.push_str(" AND ");
            sql.push_str(filter);
        }
        let mut stmt = self.tx.prepare(&sql)?;
        let found = stmt
            .query_map(params_from_iter(ids.iter()), |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()
            .with_context(|| format!("look up ids in {table}"))?;
        Ok(found)
    }
}

impl ExistenceLookup for ImportTx<'_> {
    fn existing_ids(&self, reference: Reference, ids: &BTreeSet<i64>) -> Result<BTreeSet<i64>> {
        self.select_ids(reference.table(), None, ids)
    }
}
