//! Multi-source combo comparison
//!
//! Membership is always decided by canonical key. Chained comparisons
//! (declared → filtered → advertised) are consecutive pairwise compares
//! over the same normalized sets.

use crate::discrepancy::{Discrepancy, DiscrepancyCategory, Subject};
use crate::normalize::ComboSet;
use rf_parsers::{BandComponent, Combo, ComboCategory};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Attribute differences on a combo both sources list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeMismatch {
    pub key: String,
    pub differences: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub reference: String,
    pub target: String,
    pub category: Option<ComboCategory>,
    pub only_in_a: ComboSet,
    pub only_in_b: ComboSet,
    /// Shared combos, as described by the reference source
    pub common: ComboSet,
    pub match_ratio: f64,
    pub attribute_mismatches: Vec<AttributeMismatch>,
}

impl ComparisonResult {
    pub fn is_identical(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty()
    }

    pub fn union_size(&self) -> usize {
        self.common.len() + self.only_in_a.len() + self.only_in_b.len()
    }

    /// Match ratio as a percentage rounded to one decimal
    pub fn match_percentage(&self) -> f64 {
        (self.match_ratio * 1000.0).round() / 10.0
    }

    /// Raw discrepancies: combos missing from the target, combos only the
    /// target has, and attribute differences on shared combos.
    pub fn discrepancies(&self, include_attributes: bool) -> Vec<Discrepancy> {
        self.discrepancies_with(include_attributes, |_| None)
    }

    /// Like [`Self::discrepancies`], with `missing_detail` supplying the
    /// detail of each combo missing from the target
    pub fn discrepancies_with<F>(&self, include_attributes: bool, missing_detail: F) -> Vec<Discrepancy>
    where
        F: Fn(&Combo) -> Option<String>,
    {
        let mut out = Vec::new();

        for combo in self.only_in_a.iter() {
            let discrepancy = Discrepancy::new(
                Subject::Combo(combo.clone()),
                DiscrepancyCategory::MissingInTarget,
                &self.reference,
                &self.target,
            );
            out.push(match missing_detail(combo) {
                Some(detail) => discrepancy.with_detail(detail),
                None => discrepancy,
            });
        }
        for combo in self.only_in_b.iter() {
            out.push(Discrepancy::new(
                Subject::Combo(combo.clone()),
                DiscrepancyCategory::ExtraInTarget,
                &self.reference,
                &self.target,
            ));
        }
        if include_attributes {
            for mismatch in &self.attribute_mismatches {
                if let Some(combo) = self.common.get(&mismatch.key) {
                    out.push(
                        Discrepancy::new(
                            Subject::Combo(combo.clone()),
                            DiscrepancyCategory::AttributeMismatch,
                            &self.reference,
                            &self.target,
                        )
                        .with_detail(mismatch.differences.join("; ")),
                    );
                }
            }
        }

        out
    }
}

/// Compare two normalized combo sets
pub fn compare(source_a: &ComboSet, source_b: &ComboSet) -> ComparisonResult {
    let mut only_in_a = ComboSet::new(source_a.source_tag());
    let mut only_in_b = ComboSet::new(source_b.source_tag());
    let mut common = ComboSet::new(source_a.source_tag());
    let mut attribute_mismatches = Vec::new();

    for combo in source_a.iter() {
        match source_b.get(combo.canonical_key()) {
            Some(other) => {
                let differences = attribute_differences(combo, other);
                if !differences.is_empty() {
                    attribute_mismatches.push(AttributeMismatch {
                        key: combo.canonical_key().to_string(),
                        differences,
                    });
                }
                common.insert_normalized(combo.clone());
            }
            None => only_in_a.insert_normalized(combo.clone()),
        }
    }
    for combo in source_b.iter() {
        if !source_a.contains_key(combo.canonical_key()) {
            only_in_b.insert_normalized(combo.clone());
        }
    }

    let union = common.len() + only_in_a.len() + only_in_b.len();
    let match_ratio = common.len() as f64 / union.max(1) as f64;

    tracing::debug!(
        "{} vs {}: {} common, {} only in reference, {} only in target",
        source_a.source_tag(),
        source_b.source_tag(),
        common.len(),
        only_in_a.len(),
        only_in_b.len()
    );

    ComparisonResult {
        reference: source_a.source_tag().to_string(),
        target: source_b.source_tag().to_string(),
        category: None,
        only_in_a,
        only_in_b,
        common,
        match_ratio,
        attribute_mismatches,
    }
}

/// Consecutive pairwise comparisons along a source chain
pub fn compare_chain(sources: &[&ComboSet]) -> Vec<ComparisonResult> {
    sources.windows(2).map(|pair| compare(pair[0], pair[1])).collect()
}

/// Compare restricted to one combo category
pub fn compare_category(
    source_a: &ComboSet,
    source_b: &ComboSet,
    category: ComboCategory,
) -> ComparisonResult {
    let mut result = compare(&source_a.of_category(category), &source_b.of_category(category));
    result.category = Some(category);
    result
}

/// One comparison per category present in either source
pub fn compare_by_category(
    source_a: &ComboSet,
    source_b: &ComboSet,
) -> BTreeMap<ComboCategory, ComparisonResult> {
    let categories: BTreeSet<ComboCategory> = source_a
        .categories()
        .union(&source_b.categories())
        .copied()
        .collect();

    categories
        .into_iter()
        .map(|category| (category, compare_category(source_a, source_b, category)))
        .collect()
}

/// Field differences between two combos with the same key. Both are
/// normalized, so components line up positionally. A field only counts
/// when both sides state a value.
fn attribute_differences(a: &Combo, b: &Combo) -> Vec<String> {
    let mut differences = Vec::new();

    for (left, right) in a.components().iter().zip(b.components()) {
        let fragment = left.key_fragment();
        let mut check = |field: &str, l: Option<String>, r: Option<String>| {
            if let (Some(l), Some(r)) = (l, r) {
                if l != r {
                    differences.push(format!("{} {}: {} vs {}", fragment, field, l, r));
                }
            }
        };
        let text = |v: Option<u32>| v.map(|n| n.to_string());
        let class = |c: Option<char>| c.map(|c| c.to_string());

        check("ul_class", class(left.ul_class), class(right.ul_class));
        check("dl_mimo", text(left.dl_mimo_layers), text(right.dl_mimo_layers));
        check("ul_mimo", text(left.ul_mimo_layers), text(right.ul_mimo_layers));
        check("dl_bandwidth", text(left.dl_bandwidth_mhz), text(right.dl_bandwidth_mhz));
        check("ul_bandwidth", text(left.ul_bandwidth_mhz), text(right.ul_bandwidth_mhz));
    }

    differences
}

/// Components of a combo whose band is not listed in `bands`
pub fn components_outside<'a>(
    combo: &'a Combo,
    bands: &BTreeSet<rf_parsers::Band>,
) -> Vec<&'a BandComponent> {
    combo
        .components()
        .iter()
        .filter(|c| !bands.contains(&c.band))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_parsers::notation;

    fn set(tag: &str, raws: &[&str]) -> ComboSet {
        ComboSet::from_combos(tag, raws.iter().map(|r| notation::parse(r).unwrap()))
    }

    fn keys(set: &ComboSet) -> Vec<String> {
        set.keys().map(str::to_string).collect()
    }

    #[test]
    fn test_duplicate_after_normalization_scenario() {
        let a = set("a", &["1A-3A", "3A-1A"]);
        let b = set("b", &["1A-3A-7A"]);
        let result = compare(&a, &b);

        assert!(result.common.is_empty());
        assert_eq!(keys(&result.only_in_a), vec!["1A-3A"]);
        assert_eq!(keys(&result.only_in_b), vec!["1A-3A-7A"]);
        assert_eq!(result.match_ratio, 0.0);
    }

    #[test]
    fn test_symmetry() {
        let a = set("a", &["B1A+B3A", "B66A+N77A", "B2A+B12A"]);
        let b = set("b", &["B3A+B1A", "N77A+B66A[4]", "B5A+B7A", "B41C"]);

        let ab = compare(&a, &b);
        let ba = compare(&b, &a);
        assert_eq!(keys(&ab.only_in_a), keys(&ba.only_in_b));
        assert_eq!(keys(&ab.only_in_b), keys(&ba.only_in_a));
        assert_eq!(ab.match_ratio, ba.match_ratio);
        assert_eq!(ab.union_size(), 5);
        assert!((ab.match_ratio - 2.0 / 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_sources() {
        let result = compare(&ComboSet::new("a"), &ComboSet::new("b"));
        assert_eq!(result.match_ratio, 0.0);
        assert!(result.is_identical());
    }

    #[test]
    fn test_chain() {
        let declared = set("rfc", &["1A-3A", "1A-7A", "B66A+N77A"]);
        let filtered = set("rrc", &["1A-3A", "B66A+N77A"]);
        let advertised = set("uecap", &["1A-3A"]);

        let chain = compare_chain(&[&declared, &filtered, &advertised]);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].reference, "rfc");
        assert_eq!(chain[0].target, "rrc");
        assert_eq!(keys(&chain[0].only_in_a), vec!["1A-7A"]);
        assert_eq!(keys(&chain[1].only_in_a), vec!["66A-n77A"]);
        assert_eq!(chain[1].match_percentage(), 50.0);
    }

    #[test]
    fn test_by_category() {
        let a = set("a", &["1A-3A", "B66A+N77A", "B2A+N5A"]);
        let b = set("b", &["1A-3A", "B66A+N77A"]);
        let results = compare_by_category(&a, &b);

        let ca = &results[&ComboCategory::SingleRatAggregation];
        assert_eq!(ca.category, Some(ComboCategory::SingleRatAggregation));
        assert!(ca.is_identical());
        assert_eq!(ca.match_ratio, 1.0);

        let dc = &results[&ComboCategory::DualConnectivity];
        assert_eq!(keys(&dc.only_in_a), vec!["2A-n5A"]);
    }

    #[test]
    fn test_attribute_mismatch() {
        let a = set("a", &["B66A[4];A[1]+N77A[100x4]"]);
        let b = set("b", &["B66A[2];A[1]+N77A[100x4]"]);
        let result = compare(&a, &b);

        assert_eq!(result.match_ratio, 1.0);
        assert_eq!(result.attribute_mismatches.len(), 1);
        assert_eq!(result.attribute_mismatches[0].differences, vec!["66A dl_mimo: 4 vs 2"]);

        let found = result.discrepancies(true);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].category, DiscrepancyCategory::AttributeMismatch);
        assert!(result.discrepancies(false).is_empty());
    }

    #[test]
    fn test_unstated_attributes_ignored() {
        let a = set("a", &["B66A[4]+B2A"]);
        let b = set("b", &["66A-2A"]);
        assert!(compare(&a, &b).attribute_mismatches.is_empty());
    }

    #[test]
    fn test_discrepancy_categories() {
        let a = set("rfc", &["1A-3A", "1A-7A"]);
        let b = set("uecap", &["1A-3A", "2A-4A"]);
        let found = compare(&a, &b).discrepancies(true);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].category, DiscrepancyCategory::MissingInTarget);
        assert_eq!(found[0].subject.to_string(), "1A-7A");
        assert_eq!(found[0].reference, "rfc");
        assert_eq!(found[1].category, DiscrepancyCategory::ExtraInTarget);
        assert_eq!(found[1].target, "uecap");
    }

    #[test]
    fn test_missing_detail_set_at_construction() {
        let a = set("rfc", &["1A-3A", "1A-7A"]);
        let b = set("rrc", &["1A-3A", "2A-4A"]);
        let result = compare(&a, &b);

        let found = result.discrepancies_with(true, |combo| {
            combo
                .bands()
                .contains(&rf_parsers::Band::lte(7))
                .then(|| "bands not enabled: B7".to_string())
        });
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].detail.as_deref(), Some("bands not enabled: B7"));
        // only missing combos get the detail
        assert!(found[1].detail.is_none());
        assert!(result.discrepancies(true).iter().all(|d| d.detail.is_none()));
    }

    #[test]
    fn test_components_outside() {
        let combo = notation::parse("B66A+N77A").unwrap();
        let bands = [rf_parsers::Band::lte(66)].into_iter().collect();
        let outside = components_outside(&combo, &bands);
        assert_eq!(outside.len(), 1);
        assert_eq!(outside[0].band, rf_parsers::Band::nr(77));
    }
}
