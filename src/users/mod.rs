use crate::config::{self, DATABASE_ENV_VAR, DEFAULT_CONFIG_PATH};
use crate::logging::console::RunLog;
use crate::records::{self, SourceRow, Tabular};
use crate::store::{ImportTx, NewUser, TargetStore};
use anyhow::{Context, Result, anyhow};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

pub const F3_NAME: &str = "f3_name";
pub const FIRST_NAME: &str = "first_name";
pub const LAST_NAME: &str = "last_name";
pub const EMAIL: &str = "email";
pub const HOME_REGION_ID: &str = "home_region_id";
pub const REQUIRED_USER_COLUMNS: [&str; 3] = [F3_NAME, EMAIL, HOME_REGION_ID];

const ID_COLUMN: &str = "id";

#[derive(Debug, Clone)]
pub struct UserImportCommand {
    pub input_csv: PathBuf,
    pub environment: String,
    pub commit: bool,
    pub log_file: PathBuf,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct UserImportOptions {
    pub source: PathBuf,
    pub environment: String,
    pub database: PathBuf,
    pub commit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserImportOutcome {
    Aborted(Vec<String>),
    Committed { users: usize, output: PathBuf },
    RolledBack { users: usize },
}

pub fn validate_user_rows(rows: &[SourceRow]) -> Vec<String> {
    let mut errors = Vec::new();
    for row in rows {
        if let Some(column) = REQUIRED_USER_COLUMNS
            .iter()
            .find(|c| row.get(c).is_empty())
        {
            errors.push(format!(
                "Row {} error: Missing or empty required column: {}",
                row.position, column
            ));
        }
    }
    errors
}

pub fn home_region_ids(rows: &[SourceRow]) -> std::result::Result<BTreeSet<i64>, String> {
    let mut ids = BTreeSet::new();
    for row in rows {
        let raw = row.get(HOME_REGION_ID);
        if raw.is_empty() {
            continue;
        }
        let id = records::parse_id(raw).ok_or_else(|| {
            format!(
                "Invalid home_region_id (must be integer) in row {}: {}",
                row.position, raw
            )
        })?;
        ids.insert(id);
    }
    Ok(ids)
}

pub fn check_home_regions(tx: &ImportTx<'_>, rows: &[SourceRow]) -> Result<Vec<String>> {
    let ids = match home_region_ids(rows) {
        Ok(ids) => ids,
        Err(msg) => return Ok(vec![msg]),
    };
    let found = tx.existing_region_ids(&ids)?;
    let missing = ids.difference(&found).copied().collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(Vec::new())
    } else {
        Ok(vec![format!("Missing home_region_id(s): {missing:?}")])
    }
}

fn optional(row: &SourceRow, column: &str) -> Option<String> {
    Some(row.get(column))
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

pub fn user_from_row(row: &SourceRow) -> Result<NewUser> {
    let home_region_id = match optional(row, HOME_REGION_ID) {
        None => None,
        Some(raw) => Some(records::parse_id(&raw).ok_or_else(|| {
            anyhow!("row {}: invalid home_region_id (must be integer): {raw}", row.position)
        })?),
    };
    Ok(NewUser {
        f3_name: row.get(F3_NAME).to_string(),
        first_name: optional(row, FIRST_NAME),
        last_name: optional(row, LAST_NAME),
        email: row.get(EMAIL).to_string(),
        home_region_id,
    })
}

pub fn output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{stem}_output.{}", ext.to_string_lossy()),
        None => format!("{stem}_output"),
    };
    input.with_file_name(name)
}

pub fn write_output_csv(path: &Path, table: &Tabular, ids: &[i64]) -> Result<()> {
    let columns = table
        .headers
        .iter()
        .filter(|h| h.as_str() != ID_COLUMN)
        .collect::<Vec<_>>();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("create output csv {}", path.display()))?;
    let mut header = columns.iter().map(|c| c.as_str()).collect::<Vec<_>>();
    header.push(ID_COLUMN);
    writer.write_record(&header)?;
    for (row, id) in table.rows.iter().zip(ids) {
        let mut record = columns
            .iter()
            .map(|c| row.get(c).to_string())
            .collect::<Vec<_>>();
        record.push(id.to_string());
        writer.write_record(&record)?;
    }
    writer
        .flush()
        .with_context(|| format!("write output csv {}", path.display()))?;
    Ok(())
}

pub fn execute_user_import(cmd: UserImportCommand) -> Result<UserImportOutcome> {
    let mut log = RunLog::open(&cmd.log_file)?;
    let config_path = cmd
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = config::load_import_config(&config_path)?;
    let database = config::resolve_database(
        config.as_ref(),
        &cmd.environment,
        std::env::var_os(DATABASE_ENV_VAR).map(PathBuf::from),
    )?;

    log.line("=== F3 Nation User Import ===");
    log.line(format!("Environment: {}", cmd.environment));
    log.line(format!("CSV File: {}\n", cmd.input_csv.display()));

    let table = records::read_tabular(&cmd.input_csv)?;
    let opts = UserImportOptions {
        source: cmd.input_csv.clone(),
        environment: cmd.environment.clone(),
        database,
        commit: cmd.commit,
    };
    run_user_import(&table, &opts, &mut log)
}

pub fn run_user_import(
    table: &Tabular,
    opts: &UserImportOptions,
    log: &mut RunLog,
) -> Result<UserImportOutcome> {
    if table.rows.is_empty() {
        let msg = format!("{} is empty.", opts.source.display());
        log.error(format!("Error: {msg}"));
        return Ok(UserImportOutcome::Aborted(vec![msg]));
    }
    log.line(format!("Found {} row(s) in CSV.\n", table.rows.len()));

    log.line("Validating rows...");
    let errors = validate_user_rows(&table.rows);
    if !errors.is_empty() {
        for err in &errors {
            log.error(format!("  ✗ {err}"));
        }
        return Ok(UserImportOutcome::Aborted(errors));
    }
    log.line("  ✓ All rows validated successfully.\n");

    log.line(format!("Connecting to {} database...", opts.environment));
    let mut store = TargetStore::open(&opts.database)?;
    log.line(format!("  ✓ Connected to {}\n", opts.database.display()));
    let tx = store.begin()?;

    log.line("Validating home_region_ids...");
    let region_errors = check_home_regions(&tx, &table.rows)?;
    if !region_errors.is_empty() {
        for err in &region_errors {
            log.error(format!("  ✗ {err}"));
        }
        tx.rollback()?;
        return Ok(UserImportOutcome::Aborted(region_errors));
    }
    log.line("  ✓ All home_region_ids are valid.\n");

    let total = table.rows.len();
    log.line(format!("Processing {total} user(s)..."));
    let mut ids = Vec::with_capacity(total);
    for (idx, row) in table.rows.iter().enumerate() {
        let user = user_from_row(row)?;
        let id = tx.upsert_user(&user)?;
        log.line(format!(
            "  [{}/{}] {} ({}) ✓ (ID: {})",
            idx + 1,
            total,
            user.f3_name,
            user.email,
            id
        ));
        ids.push(id);
    }

    if !opts.commit {
        tx.rollback()?;
        log.line("\nDRY RUN: transaction rolled back. Use --commit to persist users.");
        return Ok(UserImportOutcome::RolledBack { users: ids.len() });
    }

    log.line("\nCommitting transaction...");
    tx.commit()?;
    log.line("  ✓ Transaction committed.\n");

    let output = output_path(&opts.source);
    write_output_csv(&output, table, &ids)?;
    log.line(format!("  ✓ Output written to {}", output.display()));
    log.line("\n=== Import Complete ===");
    log.line(format!("Successfully imported {} user(s).", ids.len()));
    Ok(UserImportOutcome::Committed {
        users: ids.len(),
        output,
    })
}
