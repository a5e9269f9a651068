//! Discrepancy reasoning
//!
//! Rules are tried in a fixed order and the first match wins:
//! software pruning, EFS control files, regional/regulatory restriction,
//! carrier policy, band heuristics. A discrepancy nothing explains is
//! left unexplained at High severity.
//!
//! Pruning and control files only explain combos missing from a later
//! stage. A pruned combo that shows up where it should not, or whose
//! attributes differ, stays in its own category.

pub mod heuristics;
pub mod rules;

pub use rules::{BandRestriction, ComboRestriction, PruneOverlay, StaticRuleBase};

use crate::discrepancy::{Discrepancy, DiscrepancyCategory, Severity, Subject};
use rf_parsers::efs::{ControlFile, EfsControls};
use rf_parsers::{Band, Combo, Rat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Active analysis context, fixed for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub geography: Option<String>,
    pub carrier: Option<String>,
}

impl AnalysisContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_geography(mut self, geography: impl Into<String>) -> Self {
        self.geography = Some(geography.into());
        self
    }

    pub fn with_carrier(mut self, carrier: impl Into<String>) -> Self {
        self.carrier = Some(carrier.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictionKind {
    Regional,
    Regulatory,
    HardwareVariant,
}

impl RestrictionKind {
    pub fn reason_type(&self) -> &'static str {
        match self {
            RestrictionKind::Regional => "regional",
            RestrictionKind::Regulatory => "regulatory",
            RestrictionKind::HardwareVariant => "hw_variant",
        }
    }

    fn severity(&self) -> Severity {
        match self {
            RestrictionKind::Regional | RestrictionKind::Regulatory => Severity::Expected,
            RestrictionKind::HardwareVariant => Severity::Low,
        }
    }

    fn recommended_action(&self) -> &'static str {
        match self {
            RestrictionKind::Regional => "No action - regional restriction",
            RestrictionKind::Regulatory => "No action - regulatory requirement",
            RestrictionKind::HardwareVariant => "Verify hardware variant matches the build",
        }
    }
}

/// A restriction record from the rule base
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restriction {
    pub kind: RestrictionKind,
    pub reason: String,
    /// Regions the restriction applies to; empty means everywhere
    #[serde(default)]
    pub regions: Vec<String>,
}

impl Restriction {
    /// Applies when it names no region, no geography is active, or the
    /// active geography is one of its regions.
    pub fn applies_in(&self, geography: Option<&str>) -> bool {
        match geography {
            _ if self.regions.is_empty() => true,
            None => true,
            Some(geo) => self.regions.iter().any(|r| r.eq_ignore_ascii_case(geo)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyWeight {
    Strict,
    Advisory,
}

/// Carrier band/combo policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierPolicy {
    pub name: String,
    pub weight: PolicyWeight,
    #[serde(default)]
    pub excluded_bands: BTreeSet<Band>,
    #[serde(default)]
    pub required_bands: BTreeSet<Band>,
    /// Canonical combo keys
    #[serde(default)]
    pub excluded_combos: BTreeSet<String>,
    #[serde(default)]
    pub required_combos: BTreeSet<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CarrierPolicy {
    pub fn new(name: impl Into<String>, weight: PolicyWeight) -> Self {
        Self {
            name: name.into(),
            weight,
            excluded_bands: BTreeSet::new(),
            required_bands: BTreeSet::new(),
            excluded_combos: BTreeSet::new(),
            required_combos: BTreeSet::new(),
            notes: None,
        }
    }

    pub fn excludes(&self, subject: &Subject) -> bool {
        match subject {
            Subject::Band(band) => self.excluded_bands.contains(band),
            Subject::Combo(combo) => {
                self.excluded_combos.contains(combo.canonical_key())
                    || combo.bands().iter().any(|b| self.excluded_bands.contains(b))
            }
        }
    }

    pub fn requires(&self, subject: &Subject) -> bool {
        match subject {
            Subject::Band(band) => self.required_bands.contains(band),
            Subject::Combo(combo) => self.required_combos.contains(combo.canonical_key()),
        }
    }
}

/// Outcome of looking a subject up in the prune lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneMatch {
    NotListed,
    /// Listed for every BCS, or for one the subject uses
    Pruned,
    /// Listed only for bandwidth combination sets the subject does not use
    BcsMismatch {
        listed: BTreeSet<u32>,
        actual: BTreeSet<u32>,
    },
}

impl PruneMatch {
    /// Check a subject's BCS against the sets its key is listed for.
    /// A subject that states no BCS matches any listed set.
    pub fn for_bcs(listed: &BTreeSet<u32>, actual: &BTreeSet<u32>) -> Self {
        if listed.is_empty() || actual.is_empty() || !listed.is_disjoint(actual) {
            PruneMatch::Pruned
        } else {
            PruneMatch::BcsMismatch {
                listed: listed.clone(),
                actual: actual.clone(),
            }
        }
    }

    /// The stronger of two outcomes
    pub fn or(self, other: PruneMatch) -> PruneMatch {
        match (self, other) {
            (PruneMatch::Pruned, _) | (_, PruneMatch::Pruned) => PruneMatch::Pruned,
            (PruneMatch::NotListed, other) => other,
            (mismatch, _) => mismatch,
        }
    }
}

/// Read-only rule lookups consulted by the reasoning engine
pub trait RuleBase: Send + Sync {
    fn prune_status(&self, subject: &Subject) -> PruneMatch;

    fn is_pruned(&self, subject: &Subject) -> bool {
        self.prune_status(subject) == PruneMatch::Pruned
    }

    fn restriction_for(&self, band: &Band, geography: Option<&str>) -> Option<Restriction>;

    fn policy_for(&self, carrier: &str) -> Option<CarrierPolicy>;

    /// Restriction recorded against a whole combo key
    fn combo_restriction_for(&self, _key: &str, _geography: Option<&str>) -> Option<Restriction> {
        None
    }

    /// EFS control file state of the device under analysis
    fn controls(&self) -> Option<&EfsControls> {
        None
    }
}

/// What a rule decided about a discrepancy
struct Verdict {
    category: Option<DiscrepancyCategory>,
    severity: Severity,
    reason_type: &'static str,
    explanation: String,
    action: String,
}

/// Enrich one discrepancy, returning a new value.
///
/// An already enriched discrepancy is returned unchanged.
pub fn explain(discrepancy: &Discrepancy, rules: &dyn RuleBase, context: &AnalysisContext) -> Discrepancy {
    let mut enriched = discrepancy.clone();
    if discrepancy.is_enriched() {
        return enriched;
    }

    let verdict = pruning_rule(discrepancy, rules)
        .or_else(|| control_rule(discrepancy, rules))
        .or_else(|| restriction_rule(discrepancy, rules, context))
        .or_else(|| carrier_rule(discrepancy, rules, context))
        .or_else(|| heuristic_rule(discrepancy));

    match verdict {
        Some(verdict) => {
            if let Some(category) = verdict.category {
                enriched.category = category;
            }
            enriched.severity = verdict.severity;
            enriched.reason_type = Some(verdict.reason_type.to_string());
            enriched.explanation = Some(verdict.explanation);
            enriched.recommended_action = Some(verdict.action);
        }
        None => {
            enriched.severity = Severity::High;
            enriched.explanation = None;
            enriched.reason_type = None;
            enriched.recommended_action = Some("Investigate - no rule explains this difference".to_string());
        }
    }
    enriched.mark_enriched();
    enriched
}

fn join_bcs(sets: &BTreeSet<u32>) -> String {
    sets.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(",")
}

fn pruning_rule(discrepancy: &Discrepancy, rules: &dyn RuleBase) -> Option<Verdict> {
    if discrepancy.category != DiscrepancyCategory::MissingInTarget {
        return None;
    }

    match rules.prune_status(&discrepancy.subject) {
        PruneMatch::NotListed => None,
        PruneMatch::Pruned => Some(Verdict {
            category: Some(DiscrepancyCategory::PrunedBySoftwareRule),
            severity: Severity::Expected,
            reason_type: "software_pruning",
            explanation: format!("{} is disabled by the software prune list", discrepancy.subject),
            action: "No action - intentionally pruned".to_string(),
        }),
        PruneMatch::BcsMismatch { listed, actual } => Some(Verdict {
            category: None,
            severity: Severity::Medium,
            reason_type: "bcs_mismatch",
            explanation: format!(
                "{} is pruned for BCS {} but {} lists BCS {}",
                discrepancy.subject,
                join_bcs(&listed),
                discrepancy.reference,
                join_bcs(&actual)
            ),
            action: "Verify the BCS of the prune list entry".to_string(),
        }),
    }
}

/// First FR2 NR band number
const NR_FR2_START: u32 = 257;

/// Control file that switches off the family this combo belongs to
fn disabling_control(combo: &Combo, controls: &EfsControls) -> Option<ControlFile> {
    let components = combo.components();
    if components.len() < 2 {
        return None;
    }

    let all = |rat: Rat| components.iter().all(|c| c.band.rat == rat);
    if all(Rat::Lte) && controls.ca_disabled {
        return Some(ControlFile::CaDisable);
    }
    if all(Rat::Nr) {
        let fr2 = components.iter().filter(|c| c.band.number >= NR_FR2_START).count();
        let dual = fr2 > 0 && fr2 < components.len();
        if dual && !controls.nrdc_enabled {
            return Some(ControlFile::CapControlNrdcEnabled);
        }
        if !dual && !controls.nrca_enabled {
            return Some(ControlFile::CapControlNrcaEnabled);
        }
    }
    None
}

fn control_rule(discrepancy: &Discrepancy, rules: &dyn RuleBase) -> Option<Verdict> {
    let controls = rules.controls()?;
    let combo = match &discrepancy.subject {
        Subject::Combo(combo) => combo,
        Subject::Band(_) => return None,
    };

    match discrepancy.category {
        DiscrepancyCategory::MissingInTarget => {
            let file = disabling_control(combo, controls)?;
            Some(Verdict {
                category: Some(DiscrepancyCategory::PrunedBySoftwareRule),
                severity: Severity::Expected,
                reason_type: "software_control",
                explanation: format!("{} is switched off by {}", combo, file.file_name()),
                action: "No action - disabled by an EFS control file".to_string(),
            })
        }
        DiscrepancyCategory::AttributeMismatch => {
            // reference says 4 layers, a disable_4l band caps the target at 2
            let detail = discrepancy.detail.as_deref()?;
            let component = combo.components().iter().find(|c| {
                controls.disabled_4l_bands.contains(&c.band)
                    && detail.contains(&format!("{} dl_mimo: 4 vs", c.key_fragment()))
            })?;
            Some(Verdict {
                category: None,
                severity: Severity::Expected,
                reason_type: "software_control",
                explanation: format!(
                    "{} is limited to 2 DL layers by {}",
                    component.band,
                    ControlFile::Disable4lPerBand.file_name()
                ),
                action: "No action - disabled by an EFS control file".to_string(),
            })
        }
        _ => None,
    }
}

fn restriction_rule(
    discrepancy: &Discrepancy,
    rules: &dyn RuleBase,
    context: &AnalysisContext,
) -> Option<Verdict> {
    let geography = context.geography.as_deref();

    let (label, restriction) = discrepancy
        .subject
        .bands()
        .into_iter()
        .find_map(|band| {
            rules
                .restriction_for(&band, geography)
                .map(|r| (band.to_string(), r))
        })
        .or_else(|| match &discrepancy.subject {
            Subject::Combo(combo) => rules
                .combo_restriction_for(combo.canonical_key(), geography)
                .map(|r| (combo.canonical_key().to_string(), r)),
            Subject::Band(_) => None,
        })?;

    let mut severity = restriction.kind.severity();
    if discrepancy.category == DiscrepancyCategory::ExtraInTarget {
        severity = severity.raised();
    }

    Some(Verdict {
        category: None,
        severity,
        reason_type: restriction.kind.reason_type(),
        explanation: format!("{}: {}", label, restriction.reason),
        action: restriction.kind.recommended_action().to_string(),
    })
}

fn carrier_rule(
    discrepancy: &Discrepancy,
    rules: &dyn RuleBase,
    context: &AnalysisContext,
) -> Option<Verdict> {
    let policy = rules.policy_for(context.carrier.as_deref()?)?;
    let notes = policy
        .notes
        .as_ref()
        .map(|n| format!(" ({})", n))
        .unwrap_or_default();

    if policy.excludes(&discrepancy.subject) {
        let severity = match policy.weight {
            PolicyWeight::Strict => Severity::Expected,
            PolicyWeight::Advisory => Severity::Low,
        };
        return Some(Verdict {
            category: None,
            severity,
            reason_type: "carrier_exclusion",
            explanation: format!("Excluded by {} policy{}", policy.name, notes),
            action: "No action - carrier exclusion".to_string(),
        });
    }

    if policy.requires(&discrepancy.subject)
        && discrepancy.category == DiscrepancyCategory::MissingInTarget
    {
        let severity = match policy.weight {
            PolicyWeight::Strict => Severity::High,
            PolicyWeight::Advisory => Severity::Medium,
        };
        return Some(Verdict {
            category: None,
            severity,
            reason_type: "carrier_requirement",
            explanation: format!(
                "Required by {} policy but missing from {}{}",
                policy.name, discrepancy.target, notes
            ),
            action: "Investigate - carrier-required entry is missing".to_string(),
        });
    }

    None
}

fn heuristic_rule(discrepancy: &Discrepancy) -> Option<Verdict> {
    discrepancy.subject.bands().iter().find_map(|band| {
        heuristics::lookup(band).map(|h| Verdict {
            category: None,
            severity: Severity::Low,
            reason_type: "heuristic",
            explanation: format!("{}: {}", band, h.explanation),
            action: h.action.to_string(),
        })
    })
}

/// Reasoning bound to one rule base and context for a run
pub struct ReasoningEngine<'r> {
    rules: &'r dyn RuleBase,
    context: AnalysisContext,
}

impl<'r> ReasoningEngine<'r> {
    pub fn new(rules: &'r dyn RuleBase, context: AnalysisContext) -> Self {
        Self { rules, context }
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.context
    }

    pub fn explain(&self, discrepancy: &Discrepancy) -> Discrepancy {
        explain(discrepancy, self.rules, &self.context)
    }

    pub fn enrich_all(&self, discrepancies: &[Discrepancy]) -> Vec<Discrepancy> {
        discrepancies.iter().map(|d| self.explain(d)).collect()
    }
}

/// Group discrepancies by severity
pub fn by_severity(discrepancies: &[Discrepancy]) -> BTreeMap<Severity, Vec<&Discrepancy>> {
    let mut groups: BTreeMap<Severity, Vec<&Discrepancy>> = BTreeMap::new();
    for d in discrepancies {
        groups.entry(d.severity).or_default().push(d);
    }
    groups
}

/// One actionable discrepancy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub severity: Severity,
    pub subject: String,
    pub category: DiscrepancyCategory,
    pub action: String,
    pub explanation: Option<String>,
}

/// Everything not `Expected`, most severe first
pub fn action_items(discrepancies: &[Discrepancy]) -> Vec<ActionItem> {
    let mut items: Vec<ActionItem> = discrepancies
        .iter()
        .filter(|d| d.severity != Severity::Expected)
        .map(|d| ActionItem {
            severity: d.severity,
            subject: d.subject.to_string(),
            category: d.category,
            action: d
                .recommended_action
                .clone()
                .unwrap_or_else(|| "Review manually".to_string()),
            explanation: d.explanation.clone(),
        })
        .collect();
    items.sort_by(|a, b| b.severity.cmp(&a.severity).then_with(|| a.subject.cmp(&b.subject)));
    items
}
