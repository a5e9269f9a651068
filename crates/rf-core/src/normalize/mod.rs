//! Canonical normalization of bands and combos
//!
//! Everything downstream compares combos by canonical key, so two
//! descriptions of the same configuration must land on the same key
//! whatever their component order or class letter case.

use rf_parsers::model::canonical_key_of;
use rf_parsers::{Band, BandComponent, Combo, ComboCategory};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Uppercase class letters, sort components and rebuild key and category
pub fn normalize_combo(combo: Combo) -> Combo {
    let source_tag = combo.source_tag().to_string();
    let mut components = combo.into_components();

    for component in &mut components {
        component.dl_class = component.dl_class.to_ascii_uppercase();
        component.ul_class = component.ul_class.map(|c| c.to_ascii_uppercase());
    }
    components.sort_by_key(|c| c.sort_key());

    Combo::new(components, source_tag)
}

/// Bands already carry canonical numbering once decoded. Kept as the
/// single place for future RAT-specific renumbering.
pub fn normalize_band(band: Band) -> Band {
    band
}

pub fn canonical_key(components: &[BandComponent]) -> String {
    canonical_key_of(components)
}

/// Combos from one source, deduplicated by canonical key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComboSet {
    source_tag: String,
    combos: BTreeMap<String, Combo>,
}

impl ComboSet {
    pub fn new(source_tag: impl Into<String>) -> Self {
        Self {
            source_tag: source_tag.into(),
            combos: BTreeMap::new(),
        }
    }

    pub fn from_combos(source_tag: impl Into<String>, combos: impl IntoIterator<Item = Combo>) -> Self {
        let mut set = Self::new(source_tag);
        for combo in combos {
            set.insert(combo);
        }
        set
    }

    /// Insert after normalizing. Returns false when the key was already
    /// present; the first description seen is kept.
    pub fn insert(&mut self, combo: Combo) -> bool {
        let combo = normalize_combo(combo);
        if self.combos.contains_key(combo.canonical_key()) {
            return false;
        }
        self.combos.insert(combo.canonical_key().to_string(), combo);
        true
    }

    /// Insert a combo that is already normalized
    pub(crate) fn insert_normalized(&mut self, combo: Combo) {
        self.combos
            .entry(combo.canonical_key().to_string())
            .or_insert(combo);
    }

    pub fn source_tag(&self) -> &str {
        &self.source_tag
    }

    pub fn len(&self) -> usize {
        self.combos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combos.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.combos.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Combo> {
        self.combos.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.combos.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Combo> {
        self.combos.values()
    }

    /// Restrict to one category. Combos are already normalized, so they
    /// are copied as they are.
    pub fn of_category(&self, category: ComboCategory) -> ComboSet {
        ComboSet {
            source_tag: self.source_tag.clone(),
            combos: self
                .combos
                .iter()
                .filter(|(_, combo)| combo.category() == category)
                .map(|(key, combo)| (key.clone(), combo.clone()))
                .collect(),
        }
    }

    pub fn categories(&self) -> BTreeSet<ComboCategory> {
        self.combos.values().map(|c| c.category()).collect()
    }

    pub fn category_counts(&self) -> BTreeMap<ComboCategory, usize> {
        let mut counts = BTreeMap::new();
        for combo in self.combos.values() {
            *counts.entry(combo.category()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of combos per component count
    pub fn size_histogram(&self) -> BTreeMap<usize, usize> {
        let mut counts = BTreeMap::new();
        for combo in self.combos.values() {
            *counts.entry(combo.component_count()).or_insert(0) += 1;
        }
        counts
    }

    /// Every band used by any combo
    pub fn unique_bands(&self) -> BTreeSet<Band> {
        self.combos
            .values()
            .flat_map(|c| c.components().iter().map(|comp| normalize_band(comp.band)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_parsers::notation;

    fn combo(raw: &str) -> Combo {
        notation::parse(raw).unwrap()
    }

    #[test]
    fn test_normalization_idempotent() {
        for raw in ["N77A[100x4]+B66a[4];a[1]", "3c-1a-7A", "B41AA", "N78A+N77C[100x4][80x2]"] {
            let once = normalize_combo(combo(raw));
            let twice = normalize_combo(once.clone());
            assert_eq!(once.canonical_key(), twice.canonical_key());
            assert_eq!(once.components(), twice.components());
        }
    }

    #[test]
    fn test_order_and_case_invariance() {
        let variants = [
            "B1A+B3C+N77A",
            "B3c+B1a+N77a",
            "N77A+B3C+B1A",
            "n77a+b1a+b3c",
            "B1A+N77A+B3C",
        ];
        let keys: BTreeSet<String> = variants
            .iter()
            .map(|raw| normalize_combo(combo(raw)).canonical_key().to_string())
            .collect();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys.iter().next().unwrap(), "1A-3C-n77A");
    }

    #[test]
    fn test_normalized_components_sorted() {
        let normalized = normalize_combo(combo("N77A+B66a;a+B2A"));
        let bands: Vec<Band> = normalized.components().iter().map(|c| c.band).collect();
        assert_eq!(bands, vec![Band::lte(2), Band::lte(66), Band::nr(77)]);
        assert_eq!(normalized.components()[1].dl_class, 'A');
        assert_eq!(normalized.components()[1].ul_class, Some('A'));
    }

    #[test]
    fn test_combo_set_dedup() {
        let set = ComboSet::from_combos("a", vec![combo("1A-3A"), combo("3A-1A"), combo("1A-3A-7A")]);
        assert_eq!(set.len(), 2);
        assert!(set.contains_key("1A-3A"));
        assert!(set.contains_key("1A-3A-7A"));
    }

    #[test]
    fn test_category_view_and_stats() {
        let set = ComboSet::from_combos(
            "rfc",
            vec![combo("B66A+N77A"), combo("B2A+B66A"), combo("B2A+B12A+B66A")],
        );
        let dc = set.of_category(ComboCategory::DualConnectivity);
        assert_eq!(dc.len(), 1);
        assert_eq!(dc.source_tag(), "rfc");
        assert_eq!(set.category_counts()[&ComboCategory::SingleRatAggregation], 2);
        assert_eq!(set.size_histogram()[&2], 2);
        assert_eq!(set.size_histogram()[&3], 1);

        let bands = set.unique_bands();
        assert!(bands.contains(&Band::nr(77)));
        assert_eq!(bands.len(), 4);
    }

    #[test]
    fn test_band_identity() {
        assert_eq!(normalize_band(Band::nr(78)), Band::nr(78));
    }
}
