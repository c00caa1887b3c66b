//! Append-only, delimiter-separated history of screenings.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::screening::ScreeningReport;

pub const DEFAULT_DELIMITER: char = '-';

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Local>,
    pub case_id: String,
    pub label: String,
    pub confidence: f32,
    pub tier: String,
}

impl HistoryRecord {
    pub fn from_report(case_id: &str, report: &ScreeningReport) -> Self {
        Self {
            timestamp: Local::now(),
            case_id: case_id.to_string(),
            label: report.label().to_string(),
            confidence: report.confidence(),
            tier: report.tier.as_str().to_string(),
        }
    }

    /// One line, without the trailing newline. Delimiter characters inside the
    /// free-text case id are replaced with `_` so the field count stays fixed.
    pub fn to_line(&self, delimiter: char) -> String {
        let case_id: String = self
            .case_id
            .chars()
            .map(|c| if c == delimiter || c == '\n' || c == '\r' { '_' } else { c })
            .collect();

        [
            self.timestamp.format("%Y%m%dT%H%M%S").to_string(),
            case_id,
            self.label.clone(),
            format!("{:.2}%", self.confidence),
            self.tier.clone(),
        ]
        .join(&delimiter.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
    delimiter: char,
}

impl HistoryLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            delimiter: DEFAULT_DELIMITER,
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &HistoryRecord) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", record.to_line(self.delimiter))?;
        log::debug!("History record appended to {}", self.path.display());
        Ok(())
    }
}
