//! Multi-stage band tracing
//!
//! A band is walked through an ordered list of stage predicates. The
//! first failing configuration stage filters the band and every later
//! configuration stage is skipped; terminal observation stages are always
//! evaluated so that a band seen on the air despite being filtered is
//! flagged as anomalous. The engine knows nothing about document formats;
//! [`pipeline`] builds the standard stage list from decoded sources.

pub mod pipeline;

pub use pipeline::{BandPipeline, PipelineStage, StageDocument, StageKind};

use rf_parsers::Band;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Outcome of one stage predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredicateResult {
    Pass,
    Fail,
    /// The stage's source document was not supplied
    NotApplicable,
}

/// Recorded status of a stage in a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pass,
    Fail,
    NotApplicable,
    Skipped,
}

impl From<PredicateResult> for StageStatus {
    fn from(result: PredicateResult) -> Self {
        match result {
            PredicateResult::Pass => StageStatus::Pass,
            PredicateResult::Fail => StageStatus::Fail,
            PredicateResult::NotApplicable => StageStatus::NotApplicable,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Pass => write!(f, "PASS"),
            StageStatus::Fail => write!(f, "FAIL"),
            StageStatus::NotApplicable => write!(f, "N/A"),
            StageStatus::Skipped => write!(f, "SKIP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage_name: String,
    pub status: StageStatus,
    pub terminal: bool,
    pub detail: Option<String>,
}

impl StageResult {
    pub fn passed(&self) -> bool {
        matches!(self.status, StageStatus::Pass)
    }

    pub fn failed(&self) -> bool {
        matches!(self.status, StageStatus::Fail)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, StageStatus::Skipped)
    }
}

/// Final disposition of a traced band
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinalStatus {
    Enabled,
    FilteredAt(String),
    AnomalousPresence,
}

impl fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalStatus::Enabled => write!(f, "ENABLED"),
            FinalStatus::FilteredAt(stage) => write!(f, "FILTERED at {}", stage),
            FinalStatus::AnomalousPresence => write!(f, "ANOMALOUS PRESENCE"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("{band}: stage '{stage}' was evaluated after '{filtering_stage}' filtered the band")]
    EvaluatedAfterFailure {
        band: Band,
        stage: String,
        filtering_stage: String,
    },

    #[error("{band}: stage '{stage}' is skipped without an earlier failure")]
    SkippedWithoutFailure { band: Band, stage: String },

    #[error("{band}: terminal stage '{stage}' was skipped")]
    SkippedTerminal { band: Band, stage: String },

    #[error("{band}: final status {actual} does not follow from stages (expected {expected})")]
    StatusMismatch {
        band: Band,
        expected: FinalStatus,
        actual: FinalStatus,
    },
}

/// A named stage predicate
pub struct Stage<'a> {
    name: String,
    predicate: Box<dyn Fn(&Band) -> PredicateResult + Send + Sync + 'a>,
    failure_detail: Option<String>,
}

impl<'a> Stage<'a> {
    pub fn new(
        name: impl Into<String>,
        predicate: impl Fn(&Band) -> PredicateResult + Send + Sync + 'a,
    ) -> Self {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            failure_detail: None,
        }
    }

    pub fn with_failure_detail(mut self, detail: impl Into<String>) -> Self {
        self.failure_detail = Some(detail.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn evaluate(&self, band: &Band) -> PredicateResult {
        (self.predicate)(band)
    }
}

/// Per-band stage sequence and its final status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub band: Band,
    pub stages: Vec<StageResult>,
    pub final_status: FinalStatus,
}

impl Trace {
    pub fn is_enabled(&self) -> bool {
        matches!(self.final_status, FinalStatus::Enabled)
    }

    pub fn is_anomalous(&self) -> bool {
        matches!(self.final_status, FinalStatus::AnomalousPresence)
    }

    /// First failing configuration stage, if any
    pub fn filtering_stage(&self) -> Option<&str> {
        self.stages
            .iter()
            .find(|s| !s.terminal && s.failed())
            .map(|s| s.stage_name.as_str())
    }

    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage_name == name)
    }

    /// Check the stage sequence against the skip rules and the final
    /// status against the stage outcomes.
    pub fn validate(&self) -> Result<(), ConsistencyError> {
        let mut filtering: Option<&str> = None;

        for stage in &self.stages {
            if stage.terminal {
                if stage.is_skipped() {
                    return Err(ConsistencyError::SkippedTerminal {
                        band: self.band,
                        stage: stage.stage_name.clone(),
                    });
                }
                continue;
            }

            match (filtering, stage.status) {
                (Some(_), StageStatus::Skipped) => {}
                (Some(filter), _) => {
                    return Err(ConsistencyError::EvaluatedAfterFailure {
                        band: self.band,
                        stage: stage.stage_name.clone(),
                        filtering_stage: filter.to_string(),
                    });
                }
                (None, StageStatus::Skipped) => {
                    return Err(ConsistencyError::SkippedWithoutFailure {
                        band: self.band,
                        stage: stage.stage_name.clone(),
                    });
                }
                (None, StageStatus::Fail) => filtering = Some(&stage.stage_name),
                (None, _) => {}
            }
        }

        let expected = derive_final_status(&self.stages);
        if expected != self.final_status {
            return Err(ConsistencyError::StatusMismatch {
                band: self.band,
                expected,
                actual: self.final_status.clone(),
            });
        }
        Ok(())
    }
}

fn derive_final_status(stages: &[StageResult]) -> FinalStatus {
    let filtering = stages.iter().find(|s| !s.terminal && s.failed());
    let observed = stages.iter().any(|s| s.terminal && s.passed());

    match filtering {
        Some(_) if observed => FinalStatus::AnomalousPresence,
        Some(stage) => FinalStatus::FilteredAt(stage.stage_name.clone()),
        None => match stages.iter().find(|s| s.terminal && s.failed()) {
            Some(unobserved) => FinalStatus::FilteredAt(unobserved.stage_name.clone()),
            None => FinalStatus::Enabled,
        },
    }
}

/// Trace one band through `stages`.
///
/// Stages whose index is in `terminal` are observation stages and are
/// evaluated even after the band has been filtered. The first failing
/// configuration stage is the one reported in `FilteredAt`.
pub fn trace(band: &Band, stages: &[Stage<'_>], terminal: &BTreeSet<usize>) -> Trace {
    let mut results = Vec::with_capacity(stages.len());
    let mut filtered_by: Option<&str> = None;

    for (index, stage) in stages.iter().enumerate() {
        let is_terminal = terminal.contains(&index);

        if let (false, Some(filter)) = (is_terminal, filtered_by) {
            results.push(StageResult {
                stage_name: stage.name.clone(),
                status: StageStatus::Skipped,
                terminal: false,
                detail: Some(format!("not evaluated, filtered at {}", filter)),
            });
            continue;
        }

        let result = stage.evaluate(band);
        let detail = match result {
            PredicateResult::Pass => None,
            PredicateResult::Fail => stage.failure_detail.clone(),
            PredicateResult::NotApplicable => Some("source document not supplied".to_string()),
        };
        if result == PredicateResult::Fail && !is_terminal {
            filtered_by = Some(stage.name());
        }

        results.push(StageResult {
            stage_name: stage.name.clone(),
            status: result.into(),
            terminal: is_terminal,
            detail,
        });
    }

    let final_status = derive_final_status(&results);
    tracing::debug!("{} -> {}", band, final_status);

    Trace {
        band: *band,
        stages: results,
        final_status,
    }
}
