//! Discrepancy model

use rf_parsers::{Band, Combo, ComboCategory};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a discrepancy is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subject {
    Band(Band),
    Combo(Combo),
}

impl Subject {
    /// Bands involved, in component order
    pub fn bands(&self) -> Vec<Band> {
        match self {
            Subject::Band(band) => vec![*band],
            Subject::Combo(combo) => combo.bands(),
        }
    }

    pub fn combo_category(&self) -> Option<ComboCategory> {
        match self {
            Subject::Band(_) => None,
            Subject::Combo(combo) => Some(combo.category()),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Band(band) => write!(f, "{}", band),
            Subject::Combo(combo) => write!(f, "{}", combo.canonical_key()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiscrepancyCategory {
    MissingInTarget,
    ExtraInTarget,
    PrunedBySoftwareRule,
    AttributeMismatch,
}

impl fmt::Display for DiscrepancyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscrepancyCategory::MissingInTarget => write!(f, "MissingInTarget"),
            DiscrepancyCategory::ExtraInTarget => write!(f, "ExtraInTarget"),
            DiscrepancyCategory::PrunedBySoftwareRule => write!(f, "PrunedBySoftwareRule"),
            DiscrepancyCategory::AttributeMismatch => write!(f, "AttributeMismatch"),
        }
    }
}

/// Severity of a discrepancy, `Expected` meaning "working as configured"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Expected,
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Expected, Severity::Low, Severity::Medium, Severity::High];

    /// One level up, saturating at `High`
    pub fn raised(self) -> Self {
        match self {
            Severity::Expected => Severity::Low,
            Severity::Low => Severity::Medium,
            Severity::Medium | Severity::High => Severity::High,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Expected => write!(f, "Expected"),
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
        }
    }
}

/// A difference between a reference source and a target source.
///
/// Built by the comparator (or from a band trace), then enriched once by
/// the reasoning engine, which always returns a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub subject: Subject,
    pub category: DiscrepancyCategory,
    pub severity: Severity,
    pub explanation: Option<String>,
    pub reason_type: Option<String>,
    pub recommended_action: Option<String>,
    /// Reference side of the comparison
    pub reference: String,
    /// Target side of the comparison
    pub target: String,
    /// Free-form difference detail (attribute mismatches)
    pub detail: Option<String>,
    enriched: bool,
}

impl Discrepancy {
    pub fn new(
        subject: Subject,
        category: DiscrepancyCategory,
        reference: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            subject,
            category,
            severity: default_severity(category),
            explanation: None,
            reason_type: None,
            recommended_action: None,
            reference: reference.into(),
            target: target.into(),
            detail: None,
            enriched: false,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_enriched(&self) -> bool {
        self.enriched
    }

    pub(crate) fn mark_enriched(&mut self) {
        self.enriched = true;
    }

    pub fn is_explained(&self) -> bool {
        self.explanation.is_some()
    }
}

/// Severity before any rule has been applied
pub fn default_severity(category: DiscrepancyCategory) -> Severity {
    match category {
        DiscrepancyCategory::MissingInTarget => Severity::High,
        DiscrepancyCategory::ExtraInTarget => Severity::Medium,
        DiscrepancyCategory::AttributeMismatch => Severity::Medium,
        DiscrepancyCategory::PrunedBySoftwareRule => Severity::Expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rf_parsers::notation;

    #[test]
    fn test_new_discrepancy_defaults() {
        let combo = notation::parse("B66A+N77A").unwrap();
        let d = Discrepancy::new(
            Subject::Combo(combo),
            DiscrepancyCategory::MissingInTarget,
            "rfc",
            "uecap",
        );
        assert_eq!(d.severity, Severity::High);
        assert!(!d.is_enriched());
        assert!(!d.is_explained());
        assert_eq!(d.subject.to_string(), "66A-n77A");
        assert_eq!(d.subject.bands(), vec![Band::lte(66), Band::nr(77)]);
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Expected < Severity::Low);
        assert!(Severity::Medium < Severity::High);
        assert_eq!(Severity::Expected.raised(), Severity::Low);
        assert_eq!(Severity::High.raised(), Severity::High);
    }
}
