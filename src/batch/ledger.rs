use super::BatchError;
use super::discover::ConversionUnit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    DryRun,
    AlreadyConverted,
    Deadline,
}

impl SkipReason {
    pub fn describe(&self) -> &'static str {
        match self {
            SkipReason::DryRun => "would process",
            SkipReason::AlreadyConverted => "already converted",
            SkipReason::Deadline => "deadline reached",
        }
    }
}

/// Result of one unit. `skip_reason` is set iff skipped, `error_*` iff failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub unit_id: String,
    pub subject_id: String,
    pub signal_name: String,
    pub source_path: PathBuf,
    pub table_path: PathBuf,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub elapsed_ms: u64,
}

impl ConversionOutcome {
    fn base(unit: &ConversionUnit, status: OutcomeStatus, elapsed: Duration) -> Self {
        Self {
            unit_id: unit.unit_id(),
            subject_id: unit.subject_id.clone(),
            signal_name: unit.signal_name.clone(),
            source_path: unit.source.clone(),
            table_path: unit.table.clone(),
            status,
            skip_reason: None,
            error_kind: None,
            error_detail: None,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    pub fn success(unit: &ConversionUnit, elapsed: Duration) -> Self {
        Self::base(unit, OutcomeStatus::Success, elapsed)
    }

    pub fn skipped(unit: &ConversionUnit, reason: SkipReason, elapsed: Duration) -> Self {
        Self {
            skip_reason: Some(reason),
            ..Self::base(unit, OutcomeStatus::Skipped, elapsed)
        }
    }

    pub fn failed(unit: &ConversionUnit, kind: &str, detail: String, elapsed: Duration) -> Self {
        Self {
            error_kind: Some(kind.to_string()),
            error_detail: Some(detail),
            ..Self::base(unit, OutcomeStatus::Failed, elapsed)
        }
    }

    /// Short status text for console / verbose output.
    pub fn message(&self) -> String {
        match self.status {
            OutcomeStatus::Success => "converted".to_string(),
            OutcomeStatus::Skipped => self
                .skip_reason
                .map(|r| r.describe().to_string())
                .unwrap_or_else(|| "skipped".to_string()),
            OutcomeStatus::Failed => self.error_detail.clone().unwrap_or_default(),
        }
    }
}

/// Options that shape the output. Thread count and verbosity are left out so
/// runs differing only in those produce the same ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerOptions {
    pub subjects: Option<BTreeSet<String>>,
    pub normalize: bool,
    pub mono: bool,
    pub average_block_size: usize,
    pub float_format: String,
    pub include_header: bool,
    pub dry_run: bool,
    pub resume: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

/// Persisted record of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResultLedger {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub options: LedgerOptions,
    pub summary: BatchSummary,
    pub outcomes: Vec<ConversionOutcome>,
}

impl BatchResultLedger {
    /// Sort outcomes by subject then signal and count them.
    pub fn new(
        input_root: &Path,
        output_root: &Path,
        options: LedgerOptions,
        mut outcomes: Vec<ConversionOutcome>,
        elapsed: Duration,
    ) -> Self {
        outcomes.sort_by(|a, b| {
            (a.subject_id.as_str(), a.signal_name.as_str())
                .cmp(&(b.subject_id.as_str(), b.signal_name.as_str()))
        });
        let count = |status: OutcomeStatus| outcomes.iter().filter(|o| o.status == status).count();
        let summary = BatchSummary {
            total: outcomes.len(),
            succeeded: count(OutcomeStatus::Success),
            skipped: count(OutcomeStatus::Skipped),
            failed: count(OutcomeStatus::Failed),
            elapsed_ms: elapsed.as_millis() as u64,
        };
        Self {
            input_root: input_root.to_path_buf(),
            output_root: output_root.to_path_buf(),
            options,
            summary,
            outcomes,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &ConversionOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
    }

    pub fn persist(&self, path: &Path) -> Result<(), BatchError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| BatchError::Ledger {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let text = std::fs::read_to_string(path).map_err(|source| BatchError::Ledger {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Copy with every elapsed-time field zeroed, for run-to-run comparison.
    pub fn without_timings(&self) -> Self {
        let mut copy = self.clone();
        copy.summary.elapsed_ms = 0;
        for o in &mut copy.outcomes {
            o.elapsed_ms = 0;
        }
        copy
    }
}
