//! The human-readable, append-only audit trail of a cleaning run.
//!
//! Stages never share a mutable log: each returns its own [`CleaningLog`] delta and the
//! orchestrator appends deltas in execution order.

use serde::Serialize;
use std::fmt;

/// How much trust to place in a corrective action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

/// What an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Progress of the run itself (file loaded, schema inferred, score improved).
    Info,
    /// A finding that did not change the data.
    Audit,
    /// A change made to the data.
    Correction,
}

/// One line of the cleaning log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub kind: EntryKind,
    pub action: String,
    pub details: String,
    pub confidence: Option<Confidence>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.details.is_empty() {
            write!(f, "{}", self.action)?;
        } else {
            write!(f, "{}: {}", self.action, self.details)?;
        }
        if let Some(confidence) = self.confidence {
            write!(f, " (confidence: {confidence})")?;
        }
        Ok(())
    }
}

/// Ordered sequence of log entries. Entries can be appended but never edited or removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CleaningLog {
    entries: Vec<LogEntry>,
}

impl CleaningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, action: impl Into<String>, details: impl Into<String>) {
        self.push(EntryKind::Info, action.into(), details.into(), None);
    }

    pub fn audit(
        &mut self,
        action: impl Into<String>,
        details: impl Into<String>,
        confidence: Confidence,
    ) {
        self.push(EntryKind::Audit, action.into(), details.into(), Some(confidence));
    }

    pub fn correction(
        &mut self,
        action: impl Into<String>,
        details: impl Into<String>,
        confidence: Confidence,
    ) {
        self.push(
            EntryKind::Correction,
            action.into(),
            details.into(),
            Some(confidence),
        );
    }

    fn push(
        &mut self,
        kind: EntryKind,
        action: String,
        details: String,
        confidence: Option<Confidence>,
    ) {
        tracing::info!(
            action = %action,
            details = %details,
            confidence = confidence.map(|c| c.to_string()).as_deref(),
            "cleaning_step"
        );
        self.entries.push(LogEntry {
            kind,
            action,
            details,
            confidence,
        });
    }

    /// Append another stage's delta, preserving its order.
    pub fn extend(&mut self, other: CleaningLog) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn corrections(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::Correction)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rendered lines, one per entry.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.to_string()).collect()
    }

    /// The plain-text log artifact: one entry per line.
    pub fn to_text(&self) -> String {
        self.lines().join("\n")
    }
}
