pub mod backout;
pub mod executor;
pub mod state;
pub mod summary;
pub mod tracker;

use crate::config::{self, DATABASE_ENV_VAR, DEFAULT_CONFIG_PATH};
use crate::logging::console::RunLog;
use crate::logging::ndjson;
use crate::records::{self, EnrichedRow, SourceRow};
use crate::store::TargetStore;
use crate::validate::references::{self, MissingReferences};
use crate::validate::{self, LocalReport};
use anyhow::{Context, Result};
use backout::BackoutHeader;
use chrono::Utc;
use executor::AttendanceTypeIds;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use state::RunState;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use summary::ImportSummary;
use tracker::IdTracker;
use uuid::Uuid;

const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone)]
pub struct ImportCommand {
    pub input_csv: PathBuf,
    pub environment: String,
    pub commit: bool,
    pub log_file: PathBuf,
    pub config: Option<PathBuf>,
    pub backout_dir: Option<PathBuf>,
    pub events_log: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub run_id: String,
    pub source: PathBuf,
    pub source_sha256: Option<String>,
    pub environment: String,
    pub database: PathBuf,
    pub commit: bool,
    pub attendance_types: AttendanceTypeIds,
    pub backout_dir: PathBuf,
    pub events_log: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    Local(LocalReport),
    References(Vec<MissingReferences>),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Local(report) => write!(
                f,
                "{} field error(s), {} duplicate attendance group(s), {} event(s) without Q, {} event(s) with multiple Qs",
                report.fields.len(),
                report.duplicates.len(),
                report.leaders.missing.len(),
                report.leaders.multiple.len()
            ),
            AbortReason::References(missing) => {
                let parts = missing.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "{}", parts.join("; "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Aborted(AbortReason),
    Committed(ImportSummary),
    RolledBack(ImportSummary),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    pub states: Vec<RunState>,
    pub tracker: IdTracker,
    pub backout_script: Option<PathBuf>,
}

impl RunReport {
    pub fn summary(&self) -> Option<&ImportSummary> {
        match &self.outcome {
            RunOutcome::Committed(s) | RunOutcome::RolledBack(s) => Some(s),
            RunOutcome::Aborted(_) => None,
        }
    }
}

struct RunMachine {
    run_id: String,
    commit: bool,
    events_log: Option<PathBuf>,
    history: Vec<RunState>,
}

impl RunMachine {
    fn start(opts: &PipelineOptions, detail: Value, log: &mut RunLog) -> Self {
        let machine = Self {
            run_id: opts.run_id.clone(),
            commit: opts.commit,
            events_log: opts.events_log.clone(),
            history: vec![RunState::Validating],
        };
        machine.mirror(RunState::Validating, &detail, log);
        machine
    }

    fn current(&self) -> RunState {
        self.history
            .last()
            .copied()
            .unwrap_or(RunState::Validating)
    }

    fn advance(&mut self, to: RunState, detail: Value, log: &mut RunLog) -> Result<()> {
        state::validate_transition(self.current(), to, self.commit)?;
        self.history.push(to);
        self.mirror(to, &detail, log);
        Ok(())
    }

    fn mirror(&self, to: RunState, detail: &Value, log: &mut RunLog) {
        if let Some(path) = self.events_log.as_deref() {
            if let Err(err) = ndjson::mirror_event(path, &self.run_id, to.as_str(), detail) {
                log.error(format!("warning: could not write events log: {err:#}"));
            }
        }
    }
}

enum WritePhase {
    MissingReferences(Vec<MissingReferences>),
    Done {
        committed: bool,
        summary: ImportSummary,
    },
}

pub fn execute_import(cmd: ImportCommand) -> Result<RunReport> {
    let mut log = RunLog::open(&cmd.log_file)?;
    let prepared = prepare(&cmd, &mut log);
    let (rows, opts) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => {
            log.error(format!("\n[ERROR] {err:#}"));
            return Err(err);
        }
    };
    run_pipeline(rows, &opts, &mut log)
}

fn prepare(cmd: &ImportCommand, log: &mut RunLog) -> Result<(Vec<SourceRow>, PipelineOptions)> {
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
    let run_id = Uuid::new_v4().to_string();

    let rule = "=".repeat(RULE_WIDTH);
    log.line(&rule);
    log.line("BACKBLAST IMPORT");
    log.line(&rule);
    log.line(format!("Run ID: {run_id}"));
    log.line(format!("Environment: {}", cmd.environment.to_uppercase()));
    log.line(format!(
        "Mode: {}",
        if cmd.commit {
            "COMMIT MODE"
        } else {
            "DRY RUN (will rollback)"
        }
    ));
    log.line(format!("CSV File: {}", cmd.input_csv.display()));
    log.line(format!("Log File: {}", cmd.log_file.display()));
    log.line(&rule);

    let bytes = std::fs::read(&cmd.input_csv)
        .with_context(|| format!("read input csv {}", cmd.input_csv.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let source_sha256 = format!("{:x}", hasher.finalize());
    let table = records::read_tabular_from(bytes.as_slice())
        .with_context(|| format!("parse input csv {}", cmd.input_csv.display()))?;
    log.line(format!(
        "\n[CSV] Loaded {} row(s) from {}",
        table.rows.len(),
        cmd.input_csv.display()
    ));

    let backout_dir = cmd
        .backout_dir
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.backout_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."));
    let attendance_types = config
        .as_ref()
        .map(|c| c.attendance_types)
        .unwrap_or_default();

    Ok((
        table.rows,
        PipelineOptions {
            run_id,
            source: cmd.input_csv.clone(),
            source_sha256: Some(source_sha256),
            environment: cmd.environment.clone(),
            database,
            commit: cmd.commit,
            attendance_types,
            backout_dir,
            events_log: cmd.events_log.clone(),
        },
    ))
}

/// Validates locally, then connects and runs the whole import in one
/// transaction. Local failures return before the database is opened.
pub fn run_pipeline(
    rows: Vec<SourceRow>,
    opts: &PipelineOptions,
    log: &mut RunLog,
) -> Result<RunReport> {
    let started = Instant::now();
    let mut machine = RunMachine::start(opts, json!({"rows": rows.len()}), log);

    let rows = records::enrich(rows);
    let local = validate::validate_local(&rows);
    report_local(&local, rows.len(), log);
    if !local.is_clean() {
        machine.advance(
            RunState::Aborted,
            json!({
                "field_errors": local.fields.len(),
                "duplicate_groups": local.duplicates.len(),
                "events_without_q": local.leaders.missing.len(),
                "events_with_multiple_q": local.leaders.multiple.len()
            }),
            log,
        )?;
        log.error("\nAbort: Cannot proceed with validation errors. Fix the CSV and retry.");
        return Ok(RunReport {
            run_id: opts.run_id.clone(),
            outcome: RunOutcome::Aborted(AbortReason::Local(local)),
            states: machine.history,
            tracker: IdTracker::default(),
            backout_script: None,
        });
    }
    let ingest_elapsed = started.elapsed();

    log.line(format!(
        "\n[DATABASE] Connecting to {} database...",
        opts.environment
    ));
    let mut store = match TargetStore::open(&opts.database) {
        Ok(store) => store,
        Err(err) => {
            log.error(format!("  ✗ {err:#}"));
            return Err(err);
        }
    };
    machine.advance(
        RunState::Connected,
        json!({"database": opts.database.display().to_string()}),
        log,
    )?;
    log.line("  ✓ Connected");

    let mut tracker = IdTracker::default();
    let phase = write_phase(
        &mut store,
        &rows,
        opts,
        ingest_elapsed,
        started,
        &mut tracker,
        &mut machine,
        log,
    );
    drop(store);

    let committed = matches!(
        phase,
        Ok(WritePhase::Done {
            committed: true,
            ..
        })
    );
    let header = BackoutHeader {
        run_id: opts.run_id.clone(),
        source: opts.source.clone(),
        source_sha256: opts.source_sha256.clone(),
        environment: opts.environment.clone(),
        committed,
        generated_at: Utc::now(),
    };
    let backout = backout::write_backout_script(&opts.backout_dir, &tracker, &header);

    let phase = match phase {
        Ok(phase) => phase,
        Err(err) => {
            log.error(format!("\n[ERROR] Import failed with exception: {err:#}"));
            if let Err(state_err) = machine.advance(
                RunState::Failed,
                json!({"error": format!("{err:#}")}),
                log,
            ) {
                log.error(format!("warning: {state_err:#}"));
            }
            match &backout {
                Ok(path) => announce_backout(path, opts, log),
                Err(backout_err) => log.error(format!(
                    "[BACKOUT] could not write rollback file: {backout_err:#}"
                )),
            }
            return Err(err);
        }
    };

    let backout_path = backout.with_context(|| {
        if committed {
            "import committed but backout script could not be written"
        } else {
            "backout script could not be written"
        }
    })?;
    announce_backout(&backout_path, opts, log);

    let outcome = match phase {
        WritePhase::MissingReferences(missing) => {
            RunOutcome::Aborted(AbortReason::References(missing))
        }
        WritePhase::Done {
            committed: true,
            summary,
        } => RunOutcome::Committed(summary),
        WritePhase::Done {
            committed: false,
            summary,
        } => RunOutcome::RolledBack(summary),
    };

    Ok(RunReport {
        run_id: opts.run_id.clone(),
        outcome,
        states: machine.history,
        tracker,
        backout_script: Some(backout_path),
    })
}

#[allow(clippy::too_many_arguments)]
fn write_phase(
    store: &mut TargetStore,
    rows: &[EnrichedRow],
    opts: &PipelineOptions,
    ingest_elapsed: Duration,
    started: Instant,
    tracker: &mut IdTracker,
    machine: &mut RunMachine,
    log: &mut RunLog,
) -> Result<WritePhase> {
    let tx = store.begin()?;

    let referenced = references::collect_referenced_ids(rows);
    log.line("");
    for (reference, ids) in &referenced {
        log.line(format!(
            "[ID VALIDATION] Checking {} unique {}(s): {:?}",
            ids.len(),
            reference.column(),
            ids
        ));
    }
    let missing = references::check_references(&tx, &referenced)?;
    if !missing.is_empty() {
        log.error("\n[ERROR] ID validation failed:");
        for m in &missing {
            log.error(format!("  ✗ {m}"));
        }
        tx.rollback()?;
        let detail = missing
            .iter()
            .map(|m| (m.reference.column().to_string(), json!(m.ids)))
            .collect::<serde_json::Map<_, _>>();
        machine.advance(RunState::Aborted, Value::Object(detail), log)?;
        return Ok(WritePhase::MissingReferences(missing));
    }
    log.line("\n  ✓ All IDs validated successfully");

    machine.advance(RunState::Writing, Value::Null, log)?;
    let report = match executor::execute(&tx, rows, opts.attendance_types, tracker, log) {
        Ok(report) => report,
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                log.error(format!("[ERROR] rollback failed: {rollback_err:#}"));
            }
            return Err(err);
        }
    };

    let mut summary = ImportSummary::from_report(rows.len(), &report);
    summary.timings.ingest_and_validate = ingest_elapsed;
    for line in summary.render(started.elapsed()) {
        log.line(line);
    }

    let detail = serde_json::to_value(&summary)?;
    if opts.commit {
        tx.commit()?;
        machine.advance(RunState::Committed, detail, log)?;
        log.line("\n✓ SUCCESS: Import completed and COMMITTED to database.");
    } else {
        tx.rollback()?;
        machine.advance(RunState::RolledBack, detail, log)?;
        log.line("\n✓ DRY RUN: Import completed successfully (transaction rolled back).");
        log.line("  Use the --commit flag to persist these changes to the database.");
    }
    Ok(WritePhase::Done {
        committed: opts.commit,
        summary,
    })
}

fn report_local(report: &LocalReport, row_count: usize, log: &mut RunLog) {
    log.line(format!("\n[VALIDATION] Validating {row_count} row(s)..."));
    if report.fields.is_empty() {
        log.line(format!("  ✓ All {row_count} row(s) passed validation"));
    } else {
        for violation in &report.fields {
            log.error(format!("  {violation}"));
        }
        log.error(format!(
            "\n[ERROR] {} validation error(s) found.",
            report.fields.len()
        ));
    }

    log.line("\n[ATTENDANCE DUPLICATES] Checking for duplicate attendance records...");
    if report.duplicates.is_empty() {
        log.line("  ✓ No duplicate attendance records found");
    } else {
        log.error(format!(
            "[ERROR] Found {} duplicate attendance record(s):",
            report.duplicates.len()
        ));
        for dup in &report.duplicates {
            log.error(format!("  {dup}"));
        }
    }

    log.line("\n[Q VALIDATION] Checking that each event has exactly 1 Q (leader)...");
    let leaders = &report.leaders;
    if leaders.is_empty() {
        log.line("  ✓ All events have exactly 1 Q");
        return;
    }
    if !leaders.missing.is_empty() {
        log.error(format!(
            "[ERROR] Found {} event(s) with NO Q (leader):",
            leaders.missing.len()
        ));
        for event in &leaders.missing {
            log.error(format!("  {}", event.key.label()));
            if !event.key.description.is_empty() {
                let description: String = event.key.description.chars().take(80).collect();
                log.error(format!("    Description: {description}"));
            }
        }
    }
    if !leaders.multiple.is_empty() {
        log.error(format!(
            "[ERROR] Found {} event(s) with MULTIPLE Qs (leaders):",
            leaders.multiple.len()
        ));
        for event in &leaders.multiple {
            let qs = event
                .leaders
                .iter()
                .map(|q| format!("user_id {} (row {})", q.user_id, q.position))
                .collect::<Vec<_>>()
                .join(", ");
            log.error(format!("  {}", event.key.label()));
            log.error(format!("    Qs: {qs}"));
        }
    }
}

fn announce_backout(path: &Path, opts: &PipelineOptions, log: &mut RunLog) {
    log.line(format!(
        "\n[BACKOUT] SQL rollback file generated: {}",
        path.display()
    ));
    if opts.commit {
        log.line(format!(
            "  To rollback this import, execute: sqlite3 {} < {}",
            opts.database.display(),
            path.display()
        ));
    } else {
        log.line("  Transaction was rolled back; this file is a record only.");
    }
}
