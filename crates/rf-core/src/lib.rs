//! Band/Combo Tracing Core
//!
//! This crate traces bands through the device configuration pipeline,
//! compares combo collections from independent sources, and explains the
//! differences against a rule base.

pub mod compare;
pub mod discrepancy;
pub mod normalize;
pub mod provenance;
pub mod reasoning;
pub mod report;
pub mod trace;

use chrono::{DateTime, Utc};
use rf_parsers::efs::{ControlFile, EfsControls};
use rf_parsers::prune::parse_prune_list;
use rf_parsers::{capability, notation, xml, BandEncoding, Combo, DecodeError, ParseError, Parsed};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub use compare::{compare, compare_by_category, compare_chain, ComparisonResult};
pub use discrepancy::{Discrepancy, DiscrepancyCategory, Severity, Subject};
pub use normalize::{normalize_combo, ComboSet};
pub use provenance::SourceDocument;
pub use reasoning::{AnalysisContext, ActionItem, PruneMatch, ReasoningEngine, RuleBase, StaticRuleBase};
pub use trace::{BandPipeline, ConsistencyError, FinalStatus, PipelineStage, Trace};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Trace consistency error: {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Rule base error: {0}")]
    Rules(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Analysis run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Active geography and carrier
    pub context: AnalysisContext,
    /// Report UL class, MIMO and bandwidth differences on shared combos
    pub check_attributes: bool,
    /// Emit discrepancies for bands configured but not observed, or
    /// observed despite being filtered
    pub band_discrepancies: bool,
    /// Fail the run when a trace breaks the skip rules
    pub validate_traces: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            context: AnalysisContext::default(),
            check_attributes: true,
            band_discrepancies: true,
            validate_traces: true,
        }
    }
}

/// A band-list document bound to a pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandSource {
    pub stage: PipelineStage,
    pub name: String,
    pub encoding: BandEncoding,
    pub text: String,
}

/// Position of a combo source in the declared → advertised chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComboRole {
    /// Combos the RF card declares
    Declared,
    /// Combos left after software filtering
    Filtered,
    /// Combos advertised in UE capability
    Advertised,
}

impl ComboRole {
    pub const CHAIN: [ComboRole; 3] = [ComboRole::Declared, ComboRole::Filtered, ComboRole::Advertised];
}

impl fmt::Display for ComboRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComboRole::Declared => write!(f, "declared"),
            ComboRole::Filtered => write!(f, "filtered"),
            ComboRole::Advertised => write!(f, "advertised"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComboFormat {
    /// One combo per line in vendor or legacy notation
    #[default]
    Notation,
    /// Runtime combo report (blocks, table or labeled lines)
    CapabilityReport,
    /// `ca_combo` entries of an RF card XML file
    RfcXml,
    /// Band combinations of a UE capability XML dump
    UeCapabilityXml,
}

impl ComboFormat {
    pub fn parse(&self, text: &str, source_tag: &str) -> Parsed<Combo> {
        match self {
            ComboFormat::Notation => notation::parse_lines(text, source_tag),
            ComboFormat::CapabilityReport => capability::parse_report(text, source_tag),
            ComboFormat::RfcXml => xml::parse_rfc_combos(text, source_tag),
            ComboFormat::UeCapabilityXml => xml::parse_ue_capability(text, source_tag),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComboSource {
    pub role: ComboRole,
    pub name: String,
    #[serde(default)]
    pub format: ComboFormat,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneSource {
    pub name: String,
    pub text: String,
}

/// One EFS control file. Binary contents go in `bytes`; `text` is the
/// alternative for files holding band lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSource {
    pub name: String,
    pub file: ControlFile,
    #[serde(default)]
    pub bytes: Vec<u8>,
    #[serde(default)]
    pub text: Option<String>,
}

impl ControlSource {
    pub fn new(file: ControlFile, bytes: Vec<u8>) -> Self {
        Self {
            name: file.file_name().to_string(),
            file,
            bytes,
            text: None,
        }
    }

    pub fn data(&self) -> &[u8] {
        match &self.text {
            Some(text) => text.as_bytes(),
            None => &self.bytes,
        }
    }
}

/// Everything an analysis run consumes, already loaded as text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisInput {
    #[serde(default)]
    pub band_sources: Vec<BandSource>,
    #[serde(default)]
    pub combo_sources: Vec<ComboSource>,
    #[serde(default)]
    pub prune_lists: Vec<PruneSource>,
    #[serde(default)]
    pub controls: Vec<ControlSource>,
}

impl AnalysisInput {
    pub fn from_json(text: &str) -> CoreResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| CoreError::Serialization(format!("Invalid analysis manifest: {}", e)))
    }
}

/// A per-item failure collected during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    /// Line or entry number, when the failure is local to one
    pub line: Option<usize>,
    pub message: String,
}

/// Comparison between two consecutive combo roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComboComparison {
    pub reference: ComboRole,
    pub target: ComboRole,
    pub overall: ComparisonResult,
    pub by_category: Vec<ComparisonResult>,
}

/// Complete analysis report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub context: AnalysisContext,
    pub documents: Vec<SourceDocument>,
    pub traces: Vec<Trace>,
    pub comparisons: Vec<ComboComparison>,
    pub discrepancies: Vec<Discrepancy>,
    pub action_items: Vec<ActionItem>,
    pub failures: Vec<SourceFailure>,
    /// Combined EFS control state, when control files were supplied
    pub controls: Option<EfsControls>,
    pub summary: AnalysisSummary,
}

/// Run summary for quick overview
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub bands_traced: usize,
    pub bands_enabled: usize,
    pub bands_filtered: usize,
    pub bands_anomalous: usize,
    pub filtered_by_stage: BTreeMap<String, usize>,
    pub combos_by_role: BTreeMap<String, usize>,
    pub total_discrepancies: usize,
    pub unexplained: usize,
    pub category_counts: BTreeMap<String, usize>,
    pub severity_counts: BTreeMap<String, usize>,
    pub failures: usize,
}

/// Main analysis interface
pub struct Analyzer {
    config: AnalysisConfig,
    rules: Box<dyn RuleBase>,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig, rules: Box<dyn RuleBase>) -> Self {
        Self { config, rules }
    }

    /// Analyzer with an empty rule base
    pub fn with_config(config: AnalysisConfig) -> Self {
        Self::new(config, Box::new(StaticRuleBase::default()))
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn run(&self, input: &AnalysisInput) -> CoreResult<AnalysisReport> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            "Starting analysis {} ({} band sources, {} combo sources, {} prune lists)",
            id,
            input.band_sources.len(),
            input.combo_sources.len(),
            input.prune_lists.len()
        );

        let documents = fingerprint_all(input);
        let mut failures = Vec::new();

        // Bands
        let pipeline = build_pipeline(&input.band_sources, &mut failures);
        let traces = pipeline.trace_all();
        if self.config.validate_traces {
            for trace in &traces {
                trace.validate()?;
            }
        }
        tracing::info!("Traced {} bands", traces.len());

        // Combos
        let sets = build_combo_sets(&input.combo_sources, &mut failures);
        let mut pruned = Vec::new();
        for prune in &input.prune_lists {
            let parsed = parse_prune_list(&prune.text, &prune.name);
            collect_failures(&prune.name, &parsed, &mut failures);
            pruned.extend(parsed.items);
        }
        let controls = build_controls(&input.controls, &mut failures);
        let mut rules = reasoning::PruneOverlay::new(self.rules.as_ref(), &pruned);
        if let Some(controls) = &controls {
            rules = rules.with_controls(controls.clone());
        }

        let present: Vec<(ComboRole, &ComboSet)> = ComboRole::CHAIN
            .iter()
            .filter_map(|role| sets.get(role).map(|set| (*role, set)))
            .collect();
        let comparisons: Vec<ComboComparison> = present
            .windows(2)
            .map(|pair| {
                let ((reference, a), (target, b)) = (pair[0], pair[1]);
                ComboComparison {
                    reference,
                    target,
                    overall: compare(a, b),
                    by_category: compare_by_category(a, b).into_values().collect(),
                }
            })
            .collect();

        // Discrepancies
        let traced: BTreeSet<_> = traces.iter().map(|t| t.band).collect();
        let enabled: BTreeSet<_> = traces.iter().filter(|t| t.is_enabled()).map(|t| t.band).collect();
        let mut raw = Vec::new();
        for comparison in &comparisons {
            raw.extend(comparison.overall.discrepancies_with(self.config.check_attributes, |combo| {
                unavailable_bands(combo, &traced, &enabled)
            }));
        }
        if self.config.band_discrepancies {
            raw.extend(band_discrepancies(&traces));
        }

        let engine = ReasoningEngine::new(&rules, self.config.context.clone());
        let discrepancies = engine.enrich_all(&raw);
        let action_items = reasoning::action_items(&discrepancies);

        for failure in &failures {
            tracing::warn!("{}: {}", failure.source, failure.message);
        }

        let summary = summarize(&traces, &sets, &discrepancies, failures.len());
        let completed_at = Utc::now();
        tracing::info!(
            "Analysis {} complete: {} discrepancies, {} unexplained, {} failures",
            id,
            summary.total_discrepancies,
            summary.unexplained,
            summary.failures
        );

        Ok(AnalysisReport {
            id,
            started_at,
            completed_at,
            context: self.config.context.clone(),
            documents,
            traces,
            comparisons,
            discrepancies,
            action_items,
            failures,
            controls,
            summary,
        })
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::with_config(AnalysisConfig::default())
    }
}

fn fingerprint_all(input: &AnalysisInput) -> Vec<SourceDocument> {
    let bands = input
        .band_sources
        .iter()
        .map(|s| SourceDocument::fingerprint(&s.name, s.stage.name(), &s.text));
    let combos = input
        .combo_sources
        .iter()
        .map(|s| SourceDocument::fingerprint(&s.name, s.role.to_string(), &s.text));
    let prunes = input
        .prune_lists
        .iter()
        .map(|s| SourceDocument::fingerprint(&s.name, "prune", &s.text));
    let controls = input
        .controls
        .iter()
        .map(|s| SourceDocument::fingerprint_bytes(&s.name, "control", s.data()));
    bands.chain(combos).chain(prunes).chain(controls).collect()
}

/// Fold control files into one state; `None` when none were supplied
fn build_controls(sources: &[ControlSource], failures: &mut Vec<SourceFailure>) -> Option<EfsControls> {
    if sources.is_empty() {
        return None;
    }

    let mut controls = EfsControls::new();
    for source in sources {
        if let Err(e) = controls.apply(source.file, source.data()) {
            failures.push(SourceFailure {
                source: source.name.clone(),
                line: None,
                message: e.to_string(),
            });
        }
    }
    tracing::debug!(
        "EFS controls: ca_disabled={} nrca_enabled={} nrdc_enabled={} disable_4l={}",
        controls.ca_disabled,
        controls.nrca_enabled,
        controls.nrdc_enabled,
        controls.disabled_4l_bands.len()
    );
    Some(controls)
}

fn build_pipeline(sources: &[BandSource], failures: &mut Vec<SourceFailure>) -> BandPipeline {
    let mut pipeline = BandPipeline::new();

    for source in sources {
        match source.encoding.decode(&source.text) {
            Ok(bands) => {
                tracing::debug!("{} ({}): {} bands", source.name, source.stage, bands.len());
                let document = trace::StageDocument::new(&source.name, source.encoding.rat(), bands)
                    .with_coverage(source.encoding.coverage());
                pipeline.add(source.stage, document);
            }
            Err(e) => failures.push(SourceFailure {
                source: source.name.clone(),
                line: None,
                message: e.to_string(),
            }),
        }
    }

    pipeline
}

fn build_combo_sets(
    sources: &[ComboSource],
    failures: &mut Vec<SourceFailure>,
) -> BTreeMap<ComboRole, ComboSet> {
    let mut sets: BTreeMap<ComboRole, ComboSet> = BTreeMap::new();

    for source in sources {
        let parsed = source.format.parse(&source.text, &source.name);
        collect_failures(&source.name, &parsed, failures);
        tracing::debug!("{} ({}): {} combos", source.name, source.role, parsed.items.len());

        let set = sets
            .entry(source.role)
            .or_insert_with(|| ComboSet::new(source.role.to_string()));
        for combo in parsed.items {
            set.insert(combo);
        }
    }

    sets
}

fn collect_failures<T>(source: &str, parsed: &Parsed<T>, failures: &mut Vec<SourceFailure>) {
    failures.extend(parsed.failures.iter().map(|f| SourceFailure {
        source: source.to_string(),
        line: Some(f.line),
        message: f.error.to_string(),
    }));
}

/// Traced-but-not-enabled bands of a combo missing from a target
fn unavailable_bands(
    combo: &Combo,
    traced: &BTreeSet<rf_parsers::Band>,
    enabled: &BTreeSet<rf_parsers::Band>,
) -> Option<String> {
    let unavailable: BTreeSet<String> = compare::components_outside(combo, enabled)
        .into_iter()
        .filter(|c| traced.contains(&c.band))
        .map(|c| c.band.to_string())
        .collect();
    if unavailable.is_empty() {
        return None;
    }
    Some(format!(
        "bands not enabled: {}",
        unavailable.into_iter().collect::<Vec<_>>().join(", ")
    ))
}

/// Bands configured but never observed, and bands observed despite
/// being filtered
fn band_discrepancies(traces: &[Trace]) -> Vec<Discrepancy> {
    let mut out = Vec::new();

    for trace in traces {
        match &trace.final_status {
            FinalStatus::FilteredAt(stage) if trace.stage(stage).map_or(false, |s| s.terminal) => {
                out.push(
                    Discrepancy::new(
                        Subject::Band(trace.band),
                        DiscrepancyCategory::MissingInTarget,
                        "configuration",
                        stage,
                    )
                    .with_detail(format!("enabled by configuration but absent from {}", stage)),
                );
            }
            FinalStatus::AnomalousPresence => {
                let filter = trace.filtering_stage().unwrap_or("configuration");
                out.push(
                    Discrepancy::new(
                        Subject::Band(trace.band),
                        DiscrepancyCategory::ExtraInTarget,
                        filter,
                        "observation",
                    )
                    .with_detail(format!("filtered at {} but observed", filter)),
                );
            }
            _ => {}
        }
    }

    out
}

fn summarize(
    traces: &[Trace],
    sets: &BTreeMap<ComboRole, ComboSet>,
    discrepancies: &[Discrepancy],
    failures: usize,
) -> AnalysisSummary {
    let mut summary = AnalysisSummary {
        bands_traced: traces.len(),
        total_discrepancies: discrepancies.len(),
        unexplained: discrepancies.iter().filter(|d| !d.is_explained()).count(),
        failures,
        ..Default::default()
    };

    for trace in traces {
        match &trace.final_status {
            FinalStatus::Enabled => summary.bands_enabled += 1,
            FinalStatus::AnomalousPresence => summary.bands_anomalous += 1,
            FinalStatus::FilteredAt(stage) => {
                summary.bands_filtered += 1;
                *summary.filtered_by_stage.entry(stage.clone()).or_insert(0) += 1;
            }
        }
    }
    for (role, set) in sets {
        summary.combos_by_role.insert(role.to_string(), set.len());
    }
    for d in discrepancies {
        *summary.category_counts.entry(d.category.to_string()).or_insert(0) += 1;
    }
    for (severity, group) in reasoning::by_severity(discrepancies) {
        summary.severity_counts.insert(severity.to_string(), group.len());
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_parsers::{IndexBase, Rat};

    fn index_source(stage: PipelineStage, name: &str, text: &str) -> BandSource {
        BandSource {
            stage,
            name: name.to_string(),
            encoding: BandEncoding::IndexList {
                rat: Rat::Lte,
                index_base: IndexBase::OneBased,
            },
            text: text.to_string(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert!(config.check_attributes);
        assert!(config.validate_traces);
        assert!(config.context.carrier.is_none());
    }

    #[test]
    fn test_band_discrepancies_from_traces() {
        let input = AnalysisInput {
            band_sources: vec![
                index_source(PipelineStage::Rfc, "rfc", "2 4 12"),
                index_source(PipelineStage::RuntimeLog, "log", "2 4 30"),
            ],
            ..Default::default()
        };
        let report = Analyzer::default().run(&input).unwrap();

        assert_eq!(report.summary.bands_traced, 4);
        assert_eq!(report.summary.bands_enabled, 2);
        assert_eq!(report.summary.filtered_by_stage["RuntimeLog"], 1);
        assert_eq!(report.summary.bands_anomalous, 1);

        let subjects: Vec<String> = report.discrepancies.iter().map(|d| d.subject.to_string()).collect();
        assert_eq!(subjects, vec!["B12", "B30"]);
        assert_eq!(report.discrepancies[1].category, DiscrepancyCategory::ExtraInTarget);
        assert_eq!(report.discrepancies[1].reference, "RFC");
    }

    #[test]
    fn test_decode_failure_is_collected() {
        let input = AnalysisInput {
            band_sources: vec![index_source(PipelineStage::Rfc, "rfc", "2 x 4")],
            ..Default::default()
        };
        let report = Analyzer::default().run(&input).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source, "rfc");
        assert!(report.traces.is_empty());
        assert_eq!(report.documents.len(), 1);
    }

    #[test]
    fn test_control_files_and_xml_combos() {
        let rfc = "<rfc>\n<ca_combos>\n<ca_combo>B2A+B4A</ca_combo>\n\
                   <ca_combo>N77A+N260A</ca_combo>\n<ca_combo>B66A+N77A</ca_combo>\n\
                   </ca_combos>\n</rfc>";
        let mut disable_4l = ControlSource::new(ControlFile::Disable4lPerBand, Vec::new());
        disable_4l.text = Some("0\n".to_string());
        let input = AnalysisInput {
            combo_sources: vec![
                ComboSource {
                    role: ComboRole::Declared,
                    name: "rfc".to_string(),
                    format: ComboFormat::RfcXml,
                    text: rfc.to_string(),
                },
                ComboSource {
                    role: ComboRole::Filtered,
                    name: "rrc".to_string(),
                    format: ComboFormat::Notation,
                    text: "B66A+N77A".to_string(),
                },
            ],
            controls: vec![
                ControlSource::new(ControlFile::CaDisable, vec![1]),
                ControlSource::new(ControlFile::CapControlNrdcEnabled, vec![0]),
                disable_4l,
            ],
            ..Default::default()
        };
        let report = Analyzer::default().run(&input).unwrap();

        let controls = report.controls.as_ref().unwrap();
        assert!(controls.ca_disabled);
        assert!(!controls.nrdc_enabled);
        assert_eq!(report.documents.len(), 5);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source, "disable_4l_per_band");

        assert_eq!(report.discrepancies.len(), 2);
        assert!(report.discrepancies.iter().all(|d| {
            d.category == DiscrepancyCategory::PrunedBySoftwareRule
                && d.reason_type.as_deref() == Some("software_control")
        }));
        assert_eq!(report.summary.unexplained, 0);
    }

    #[test]
    fn test_manifest_json() {
        let manifest = r#"{
            "band_sources": [
                {"stage": "NvPref", "name": "nv_65633",
                 "encoding": {"kind": "decimal_bytes",
                              "layout": {"rat": "Lte", "word_bit_width": 8, "range_start": 1,
                                         "index_base": "ZeroBased", "band_count": 64}},
                 "text": "3 0 0 0 0 0 0 0"}
            ],
            "combo_sources": [
                {"role": "declared", "name": "rfc", "text": "B66A+N77A"}
            ]
        }"#;
        let input = AnalysisInput::from_json(manifest).unwrap();
        assert_eq!(input.band_sources[0].stage, PipelineStage::NvPref);
        assert_eq!(input.combo_sources[0].format, ComboFormat::Notation);
        assert!(input.prune_lists.is_empty());
        assert!(input.controls.is_empty());
        assert!(matches!(
            AnalysisInput::from_json("{\"band_sources\": 3}"),
            Err(CoreError::Serialization(_))
        ));
    }
}
