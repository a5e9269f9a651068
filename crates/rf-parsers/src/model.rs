//! Canonical band and combo model
//!
//! Every decoder in this crate produces these types. Band numbers are
//! always stored in the canonical 1-based numbering used by 3GPP band
//! designations; no source-specific offset survives decoding.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Radio access technology
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rat {
    Lte,
    Nr,
}

impl Rat {
    /// Sort rank inside a combo. LTE is the anchor of a dual-connectivity
    /// combo and always precedes NR legs.
    pub fn anchor_rank(&self) -> u8 {
        match self {
            Rat::Lte => 0,
            Rat::Nr => 1,
        }
    }

    /// Prefix used in canonical keys (LTE legs are bare).
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Rat::Lte => "",
            Rat::Nr => "n",
        }
    }
}

impl fmt::Display for Rat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rat::Lte => write!(f, "LTE"),
            Rat::Nr => write!(f, "NR"),
        }
    }
}

/// A single band in canonical numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Band {
    pub rat: Rat,
    pub number: u32,
}

impl Band {
    pub fn new(rat: Rat, number: u32) -> Self {
        Self { rat, number }
    }

    pub fn lte(number: u32) -> Self {
        Self::new(Rat::Lte, number)
    }

    pub fn nr(number: u32) -> Self {
        Self::new(Rat::Nr, number)
    }

    pub fn is_lte(&self) -> bool {
        matches!(self.rat, Rat::Lte)
    }

    pub fn is_nr(&self) -> bool {
        matches!(self.rat, Rat::Nr)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rat {
            Rat::Lte => write!(f, "B{}", self.number),
            Rat::Nr => write!(f, "n{}", self.number),
        }
    }
}

/// One radio leg of a combo
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BandComponent {
    pub band: Band,
    pub dl_class: char,
    pub ul_class: Option<char>,
    pub dl_mimo_layers: Option<u32>,
    pub ul_mimo_layers: Option<u32>,
    /// NR only
    pub dl_bandwidth_mhz: Option<u32>,
    pub ul_bandwidth_mhz: Option<u32>,
}

impl BandComponent {
    pub fn new(band: Band, dl_class: char) -> Self {
        Self {
            band,
            dl_class,
            ul_class: None,
            dl_mimo_layers: None,
            ul_mimo_layers: None,
            dl_bandwidth_mhz: None,
            ul_bandwidth_mhz: None,
        }
    }

    pub fn with_uplink(mut self, ul_class: char) -> Self {
        self.ul_class = Some(ul_class);
        self
    }

    pub fn with_dl_mimo(mut self, layers: u32) -> Self {
        self.dl_mimo_layers = Some(layers);
        self
    }

    pub fn with_ul_mimo(mut self, layers: u32) -> Self {
        self.ul_mimo_layers = Some(layers);
        self
    }

    pub fn with_dl_bandwidth(mut self, mhz: u32) -> Self {
        self.dl_bandwidth_mhz = Some(mhz);
        self
    }

    /// Text form used inside a canonical key, e.g. `66A` or `n77C`
    pub fn key_fragment(&self) -> String {
        format!(
            "{}{}{}",
            self.band.rat.key_prefix(),
            self.band.number,
            self.dl_class.to_ascii_uppercase()
        )
    }

    /// Ordering used by the normalizer. The trailing bandwidth and MIMO
    /// fields only break ties between legs with identical keys so that
    /// intra-band legs line up the same way from every source.
    pub fn sort_key(&self) -> (u8, u32, char, Option<u32>, Option<u32>) {
        (
            self.band.rat.anchor_rank(),
            self.band.number,
            self.dl_class.to_ascii_uppercase(),
            self.dl_bandwidth_mhz,
            self.dl_mimo_layers,
        )
    }
}

/// Combo category, derived from the RATs present
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComboCategory {
    SingleRatAggregation,
    DualConnectivity,
}

impl ComboCategory {
    pub fn of(components: &[BandComponent]) -> Self {
        let mut rats = components.iter().map(|c| c.band.rat);
        match rats.next() {
            Some(first) if rats.any(|r| r != first) => ComboCategory::DualConnectivity,
            _ => ComboCategory::SingleRatAggregation,
        }
    }
}

impl fmt::Display for ComboCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComboCategory::SingleRatAggregation => write!(f, "SingleRatAggregation"),
            ComboCategory::DualConnectivity => write!(f, "DualConnectivity"),
        }
    }
}

/// Separator between component fragments in a canonical key
pub const KEY_SEPARATOR: &str = "-";

/// Build the canonical key for a component list without reordering it
/// in place.
pub fn canonical_key_of(components: &[BandComponent]) -> String {
    let mut sorted: Vec<&BandComponent> = components.iter().collect();
    sorted.sort_by_key(|c| c.sort_key());
    sorted
        .iter()
        .map(|c| c.key_fragment())
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR)
}

/// A carrier-aggregation or dual-connectivity configuration.
///
/// Category and key are derived on construction; two combos are equal
/// when their canonical keys are equal. Deserialization goes through
/// [`ComboRecord`] so stored keys and categories are always re-derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ComboRecord")]
pub struct Combo {
    components: Vec<BandComponent>,
    category: ComboCategory,
    canonical_key: String,
    source_tag: String,
    /// Bandwidth combination sets the source lists for this combo
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    bcs: BTreeSet<u32>,
}

/// Serialized fields of a [`Combo`] that are not derived
#[derive(Debug, Clone, Deserialize)]
pub struct ComboRecord {
    pub components: Vec<BandComponent>,
    #[serde(default)]
    pub source_tag: String,
    #[serde(default)]
    pub bcs: BTreeSet<u32>,
}

impl TryFrom<ComboRecord> for Combo {
    type Error = String;

    fn try_from(record: ComboRecord) -> Result<Self, Self::Error> {
        if record.components.is_empty() {
            return Err("combo has no components".to_string());
        }
        Ok(Combo::new(record.components, record.source_tag).with_bcs(record.bcs))
    }
}

impl Combo {
    pub fn new(components: Vec<BandComponent>, source_tag: impl Into<String>) -> Self {
        let category = ComboCategory::of(&components);
        let canonical_key = canonical_key_of(&components);
        Self {
            components,
            category,
            canonical_key,
            source_tag: source_tag.into(),
            bcs: BTreeSet::new(),
        }
    }

    pub fn with_bcs(mut self, bcs: impl IntoIterator<Item = u32>) -> Self {
        self.bcs.extend(bcs);
        self
    }

    /// Empty when the source does not state a BCS
    pub fn bcs(&self) -> &BTreeSet<u32> {
        &self.bcs
    }

    pub fn components(&self) -> &[BandComponent] {
        &self.components
    }

    pub fn category(&self) -> ComboCategory {
        self.category
    }

    pub fn canonical_key(&self) -> &str {
        &self.canonical_key
    }

    pub fn source_tag(&self) -> &str {
        &self.source_tag
    }

    pub fn with_source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = tag.into();
        self
    }

    /// Distinct bands in component order
    pub fn bands(&self) -> Vec<Band> {
        let mut bands = Vec::new();
        for component in &self.components {
            if !bands.contains(&component.band) {
                bands.push(component.band);
            }
        }
        bands
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    pub fn into_components(self) -> Vec<BandComponent> {
        self.components
    }
}

impl PartialEq for Combo {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_key == other.canonical_key
    }
}

impl Eq for Combo {}

impl std::hash::Hash for Combo {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical_key.hash(state);
    }
}

impl fmt::Display for Combo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_key)
    }
}
