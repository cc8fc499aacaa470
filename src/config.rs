use crate::import::executor::AttendanceTypeIds;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "backblast-import.toml";
pub const DATABASE_ENV_VAR: &str = "BACKBLAST_IMPORT_DATABASE";
const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    pub version: u32,
    pub environments: BTreeMap<String, EnvironmentConfig>,
    pub attendance_types: AttendanceTypeIds,
    pub backout_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentConfig {
    pub database: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
struct RawImportConfig {
    version: Option<u32>,
    environments: Option<BTreeMap<String, RawEnvironmentConfig>>,
    attendance_types: Option<RawAttendanceTypes>,
    backout: Option<RawBackoutConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEnvironmentConfig {
    database: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawAttendanceTypes {
    q: Option<i64>,
    co_q: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawBackoutConfig {
    dir: Option<String>,
}

pub fn load_import_config(path: &Path) -> Result<Option<ImportConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read import config {}", path.display()))?;
    let parsed: RawImportConfig =
        toml::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(validate_import_config(parsed, path)?))
}

fn validate_import_config(raw: RawImportConfig, path: &Path) -> Result<ImportConfig> {
    let version = raw
        .version
        .ok_or_else(|| anyhow::anyhow!("{} missing required `version`", path.display()))?;
    if version != SUPPORTED_VERSION {
        bail!(
            "{} has unsupported version {version}; expected version = {SUPPORTED_VERSION}",
            path.display()
        );
    }

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let mut environments = BTreeMap::new();
    for (name, env) in raw.environments.unwrap_or_default() {
        let database = sanitize_optional(env.database).ok_or_else(|| {
            anyhow::anyhow!(
                "{} missing `database` for `[environments.{name}]`",
                path.display()
            )
        })?;
        environments.insert(
            name,
            EnvironmentConfig {
                database: base.join(database),
            },
        );
    }

    let defaults = AttendanceTypeIds::default();
    let attendance_types = match raw.attendance_types {
        None => defaults,
        Some(types) => AttendanceTypeIds {
            q: types.q.unwrap_or(defaults.q),
            co_q: types.co_q.unwrap_or(defaults.co_q),
        },
    };
    if attendance_types.q <= 0 || attendance_types.co_q <= 0 {
        bail!(
            "{} has non-positive `[attendance_types]` id",
            path.display()
        );
    }
    if attendance_types.q == attendance_types.co_q {
        bail!(
            "{} maps `q` and `co_q` to the same attendance type {}",
            path.display(),
            attendance_types.q
        );
    }

    let backout_dir = raw
        .backout
        .and_then(|b| sanitize_optional(b.dir))
        .map(|dir| base.join(dir));

    Ok(ImportConfig {
        version,
        environments,
        attendance_types,
        backout_dir,
    })
}

fn sanitize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `env_override` (normally `BACKBLAST_IMPORT_DATABASE`) wins over the
/// configured environment.
pub fn resolve_database(
    config: Option<&ImportConfig>,
    environment: &str,
    env_override: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(path) = env_override.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(path);
    }
    let Some(config) = config else {
        bail!(
            "no import config found and {DATABASE_ENV_VAR} is unset; cannot locate the {environment} database"
        );
    };
    config
        .environments
        .get(environment)
        .map(|env| env.database.clone())
        .ok_or_else(|| {
            anyhow::anyhow!("no `[environments.{environment}]` section in import config")
        })
}
