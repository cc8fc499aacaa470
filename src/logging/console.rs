use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::Path;

/// Console output mirrored line by line into the run log file.
pub struct RunLog {
    file: Option<LineWriter<File>>,
    echo: bool,
    captured: Option<Vec<String>>,
}

impl RunLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create log dir {}", parent.display()))?;
            }
        }
        let file =
            File::create(path).with_context(|| format!("create log file {}", path.display()))?;
        let mut file = LineWriter::new(file);
        writeln!(file, "Log started: {}", Utc::now().to_rfc3339())
            .with_context(|| format!("write log file {}", path.display()))?;
        Ok(Self {
            file: Some(file),
            echo: true,
            captured: None,
        })
    }

    pub fn memory() -> Self {
        Self {
            file: None,
            echo: false,
            captured: Some(Vec::new()),
        }
    }

    pub fn line(&mut self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        if self.echo {
            println!("{msg}");
        }
        self.record(msg);
    }

    pub fn error(&mut self, msg: impl AsRef<str>) {
        let msg = msg.as_ref();
        if self.echo {
            eprintln!("{msg}");
        }
        self.record(msg);
    }

    pub fn lines(&self) -> &[String] {
        self.captured.as_deref().unwrap_or(&[])
    }

    fn record(&mut self, msg: &str) {
        if let Some(file) = self.file.as_mut() {
            // A failing log write must not abort an import mid-transaction.
            if writeln!(file, "{msg}").is_err() {
                self.file = None;
                eprintln!("warning: run log write failed; continuing without log file");
            }
        }
        if let Some(captured) = self.captured.as_mut() {
            captured.extend(msg.lines().map(ToString::to_string));
        }
    }
}
