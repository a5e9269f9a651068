//! Standard band configuration pipeline
//!
//! RF card → hardware filter → carrier policy → generic restrictions →
//! NV band preference, followed by the two observation stages (runtime
//! band log and advertised UE capability).

use super::{trace, PredicateResult, Stage, Trace};
use rf_parsers::{Band, Rat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    Rfc,
    HwFilter,
    Carrier,
    Generic,
    NvPref,
    RuntimeLog,
    Advertised,
}

/// How a stage's documents are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageKind {
    /// Listed bands pass
    AllowList,
    /// Listed bands fail
    ExcludeList,
    /// Listed bands were observed; always evaluated
    Observation,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 7] = [
        PipelineStage::Rfc,
        PipelineStage::HwFilter,
        PipelineStage::Carrier,
        PipelineStage::Generic,
        PipelineStage::NvPref,
        PipelineStage::RuntimeLog,
        PipelineStage::Advertised,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Rfc => "RFC",
            PipelineStage::HwFilter => "HWFilter",
            PipelineStage::Carrier => "Carrier",
            PipelineStage::Generic => "Generic",
            PipelineStage::NvPref => "NVPref",
            PipelineStage::RuntimeLog => "RuntimeLog",
            PipelineStage::Advertised => "Advertised",
        }
    }

    pub fn kind(&self) -> StageKind {
        match self {
            PipelineStage::Rfc | PipelineStage::HwFilter | PipelineStage::NvPref => StageKind::AllowList,
            PipelineStage::Carrier | PipelineStage::Generic => StageKind::ExcludeList,
            PipelineStage::RuntimeLog | PipelineStage::Advertised => StageKind::Observation,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind() == StageKind::Observation
    }

    fn failure_detail(&self) -> &'static str {
        match self {
            PipelineStage::Rfc => "not supported by the RF card",
            PipelineStage::HwFilter => "removed by the hardware band filter",
            PipelineStage::Carrier => "excluded by carrier policy",
            PipelineStage::Generic => "excluded by generic restrictions",
            PipelineStage::NvPref => "disabled in NV band preference",
            PipelineStage::RuntimeLog => "absent from the runtime band log",
            PipelineStage::Advertised => "not advertised in UE capability",
        }
    }

    /// Stages whose bands seed the traced universe. Allow-list stages
    /// after the RF card enumerate whole ranges and are left out.
    fn seeds_universe(&self) -> bool {
        !matches!(self, PipelineStage::HwFilter | PipelineStage::NvPref)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decoded band list from one source document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDocument {
    pub name: String,
    pub rat: Rat,
    /// Inclusive band-number range the document speaks for
    pub coverage: Option<(u32, u32)>,
    pub bands: BTreeSet<Band>,
}

impl StageDocument {
    pub fn new(name: impl Into<String>, rat: Rat, bands: BTreeSet<Band>) -> Self {
        Self {
            name: name.into(),
            rat,
            coverage: None,
            bands,
        }
    }

    pub fn with_coverage(mut self, coverage: Option<(u32, u32)>) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn covers(&self, band: &Band) -> bool {
        if band.rat != self.rat {
            return false;
        }
        match self.coverage {
            Some((low, high)) => band.number >= low && band.number <= high,
            None => true,
        }
    }
}

/// Source documents attached to the standard stages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BandPipeline {
    documents: BTreeMap<PipelineStage, Vec<StageDocument>>,
}

impl BandPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, stage: PipelineStage, document: StageDocument) {
        self.documents.entry(stage).or_default().push(document);
    }

    pub fn with_document(mut self, stage: PipelineStage, document: StageDocument) -> Self {
        self.add(stage, document);
        self
    }

    pub fn documents(&self, stage: PipelineStage) -> &[StageDocument] {
        self.documents.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Predicate for one stage; `NotApplicable` when no document of the
    /// stage covers the band.
    pub fn evaluate(&self, stage: PipelineStage, band: &Band) -> PredicateResult {
        let mut covering = self.documents(stage).iter().filter(|d| d.covers(band)).peekable();
        if covering.peek().is_none() {
            return PredicateResult::NotApplicable;
        }
        let listed = covering.any(|d| d.bands.contains(band));

        match (stage.kind(), listed) {
            (StageKind::AllowList, true) | (StageKind::Observation, true) => PredicateResult::Pass,
            (StageKind::AllowList, false) | (StageKind::Observation, false) => PredicateResult::Fail,
            (StageKind::ExcludeList, true) => PredicateResult::Fail,
            (StageKind::ExcludeList, false) => PredicateResult::Pass,
        }
    }

    pub fn stages(&self) -> Vec<Stage<'_>> {
        PipelineStage::ALL
            .iter()
            .map(|&stage| {
                Stage::new(stage.name(), move |band: &Band| self.evaluate(stage, band))
                    .with_failure_detail(stage.failure_detail())
            })
            .collect()
    }

    pub fn terminal_indices() -> BTreeSet<usize> {
        PipelineStage::ALL
            .iter()
            .enumerate()
            .filter(|(_, stage)| stage.is_terminal())
            .map(|(index, _)| index)
            .collect()
    }

    /// Bands worth tracing: everything declared, excluded or observed
    pub fn universe(&self) -> BTreeSet<Band> {
        self.documents
            .iter()
            .filter(|(stage, _)| stage.seeds_universe())
            .flat_map(|(_, docs)| docs.iter().flat_map(|d| d.bands.iter().copied()))
            .collect()
    }

    pub fn trace_band(&self, band: &Band) -> Trace {
        trace(band, &self.stages(), &Self::terminal_indices())
    }

    /// Trace every band of the universe, LTE first then by number
    pub fn trace_all(&self) -> Vec<Trace> {
        let stages = self.stages();
        let terminal = Self::terminal_indices();
        self.universe()
            .iter()
            .map(|band| trace(band, &stages, &terminal))
            .collect()
    }
}
