//! JSON-loadable rule base

use super::{CarrierPolicy, PruneMatch, Restriction, RuleBase};
use crate::discrepancy::Subject;
use crate::{CoreError, CoreResult};
use rf_parsers::efs::EfsControls;
use rf_parsers::prune::{self, PrunedEntry};
use rf_parsers::{notation, Band};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandRestriction {
    pub band: Band,
    #[serde(flatten)]
    pub restriction: Restriction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboRestriction {
    /// Combo in any accepted notation; canonicalized on load
    pub combo: String,
    #[serde(flatten)]
    pub restriction: Restriction,
}

/// Rule base held in memory, read-only for the duration of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticRuleBase {
    /// Keys pruned for every bandwidth combination set. A `-<n>` suffix
    /// in the JSON form moves the entry to `pruned_bcs`.
    #[serde(default)]
    pub pruned_combos: BTreeSet<String>,
    /// Keys pruned only for the listed bandwidth combination sets
    #[serde(default)]
    pub pruned_bcs: BTreeMap<String, BTreeSet<u32>>,
    #[serde(default)]
    pub pruned_bands: BTreeSet<Band>,
    #[serde(default)]
    pub band_restrictions: Vec<BandRestriction>,
    #[serde(default)]
    pub combo_restrictions: Vec<ComboRestriction>,
    #[serde(default)]
    pub carriers: Vec<CarrierPolicy>,
}

impl StaticRuleBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from JSON. Every combo string is re-keyed through the
    /// notation parser so lookups match normalized combos.
    pub fn from_json(text: &str) -> CoreResult<Self> {
        let mut rules: StaticRuleBase = serde_json::from_str(text)
            .map_err(|e| CoreError::Rules(format!("Invalid rule base: {}", e)))?;
        rules.canonicalize()?;

        tracing::debug!(
            "Loaded rule base: {} pruned combos, {} band restrictions, {} carriers",
            rules.pruned_combos.len(),
            rules.band_restrictions.len(),
            rules.carriers.len()
        );
        Ok(rules)
    }

    fn canonicalize(&mut self) -> CoreResult<()> {
        let mut pruned_combos = BTreeSet::new();
        let mut pruned_bcs: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
        for raw in &self.pruned_combos {
            match prune::split_bcs(raw) {
                (head, Some(bcs)) => {
                    pruned_bcs.entry(canonical(head)?).or_default().insert(bcs);
                }
                (head, None) => {
                    pruned_combos.insert(canonical(head)?);
                }
            }
        }
        for (raw, sets) in &self.pruned_bcs {
            pruned_bcs.entry(canonical(raw)?).or_default().extend(sets);
        }
        self.pruned_combos = pruned_combos;
        self.pruned_bcs = pruned_bcs;

        for restriction in &mut self.combo_restrictions {
            restriction.combo = canonical(&restriction.combo)?;
        }
        for policy in &mut self.carriers {
            policy.excluded_combos = canonical_keys(&policy.excluded_combos)?;
            policy.required_combos = canonical_keys(&policy.required_combos)?;
        }
        Ok(())
    }

    /// Merge entries of a parsed prune list
    pub fn with_pruned(mut self, entries: &[PrunedEntry]) -> Self {
        self.merge_pruned(entries);
        self
    }

    /// Entries without a BCS prune the key outright; the others only
    /// prune it for the sets they name.
    pub fn merge_pruned(&mut self, entries: &[PrunedEntry]) {
        for entry in entries {
            let combo = crate::normalize::normalize_combo(entry.combo.clone());
            let key = combo.canonical_key().to_string();
            match entry.bcs {
                None => {
                    self.pruned_combos.insert(key);
                }
                Some(bcs) => {
                    self.pruned_bcs.entry(key).or_default().insert(bcs);
                }
            }
        }
    }

    /// Distinct keys named by either prune table
    pub fn pruned_key_count(&self) -> usize {
        self.pruned_combos
            .iter()
            .chain(self.pruned_bcs.keys())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

fn canonical(raw: &str) -> CoreResult<String> {
    let combo = notation::parse(raw)
        .map_err(|e| CoreError::Rules(format!("Invalid combo '{}': {}", raw, e)))?;
    Ok(crate::normalize::normalize_combo(combo).canonical_key().to_string())
}

fn canonical_keys(raws: &BTreeSet<String>) -> CoreResult<BTreeSet<String>> {
    raws.iter().map(|raw| canonical(raw)).collect()
}

impl RuleBase for StaticRuleBase {
    fn prune_status(&self, subject: &Subject) -> PruneMatch {
        match subject {
            Subject::Band(band) if self.pruned_bands.contains(band) => PruneMatch::Pruned,
            Subject::Band(_) => PruneMatch::NotListed,
            Subject::Combo(combo) => {
                let key = combo.canonical_key();
                if self.pruned_combos.contains(key) {
                    return PruneMatch::Pruned;
                }
                match self.pruned_bcs.get(key) {
                    Some(listed) => PruneMatch::for_bcs(listed, combo.bcs()),
                    None => PruneMatch::NotListed,
                }
            }
        }
    }

    fn restriction_for(&self, band: &Band, geography: Option<&str>) -> Option<Restriction> {
        self.band_restrictions
            .iter()
            .find(|r| r.band == *band && r.restriction.applies_in(geography))
            .map(|r| r.restriction.clone())
    }

    fn policy_for(&self, carrier: &str) -> Option<CarrierPolicy> {
        self.carriers
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(carrier))
            .cloned()
    }

    fn combo_restriction_for(&self, key: &str, geography: Option<&str>) -> Option<Restriction> {
        self.combo_restrictions
            .iter()
            .find(|r| r.combo == key && r.restriction.applies_in(geography))
            .map(|r| r.restriction.clone())
    }
}

/// Prune entries and EFS control state of one device, layered over
/// another rule base
pub struct PruneOverlay<'a> {
    base: &'a dyn RuleBase,
    pruned: StaticRuleBase,
    controls: Option<EfsControls>,
}

impl<'a> PruneOverlay<'a> {
    pub fn new(base: &'a dyn RuleBase, entries: &[PrunedEntry]) -> Self {
        Self {
            base,
            pruned: StaticRuleBase::new().with_pruned(entries),
            controls: None,
        }
    }

    pub fn with_controls(mut self, controls: EfsControls) -> Self {
        self.controls = Some(controls);
        self
    }

    pub fn pruned_count(&self) -> usize {
        self.pruned.pruned_key_count()
    }
}

impl RuleBase for PruneOverlay<'_> {
    fn prune_status(&self, subject: &Subject) -> PruneMatch {
        self.pruned
            .prune_status(subject)
            .or(self.base.prune_status(subject))
    }

    fn controls(&self) -> Option<&EfsControls> {
        self.controls.as_ref().or_else(|| self.base.controls())
    }

    fn restriction_for(&self, band: &Band, geography: Option<&str>) -> Option<Restriction> {
        self.base.restriction_for(band, geography)
    }

    fn policy_for(&self, carrier: &str) -> Option<CarrierPolicy> {
        self.base.policy_for(carrier)
    }

    fn combo_restriction_for(&self, key: &str, geography: Option<&str>) -> Option<Restriction> {
        self.base.combo_restriction_for(key, geography)
    }
}
