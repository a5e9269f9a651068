//! Band and combo source decoders
//!
//! This crate turns raw source encodings (fixed-width band bitmasks,
//! index lists, vendor combo notation, capability report text, RF card
//! and UE capability XML, EFS control files) into the canonical
//! band/combo model.

pub mod bitmask;
pub mod capability;
pub mod efs;
pub mod model;
pub mod notation;
pub mod prune;
pub mod words;
pub mod xml;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bitmask::{BitmaskLayout, IndexBase};
pub use model::{Band, BandComponent, Combo, ComboCategory, Rat};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Word count mismatch for declared range: expected {expected} words, got {actual}")]
    RangeWidthMismatch { expected: usize, actual: usize },

    #[error("Unsupported word width: {0} bits")]
    UnsupportedWidth(usize),

    #[error("Word {index} value {value:#x} does not fit in {width} bits")]
    WordOverflow { index: usize, value: u64, width: usize },

    #[error("Bit ordinal {ordinal} maps to band {number}, outside the declared range")]
    BitOutOfRange { ordinal: u64, number: u64 },

    #[error("Bit ordinal {ordinal} falls on a reserved slot outside the band range")]
    ReservedOrdinal { ordinal: u64 },

    #[error("Invalid word token: {0}")]
    InvalidWord(String),

    #[error("Label not found in report: {0}")]
    MissingLabel(String),

    #[error("Malformed XML: {0}")]
    MalformedXml(String),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown RAT prefix in '{fragment}'")]
    UnknownRat { fragment: String },

    #[error("Unbalanced brackets in '{fragment}'")]
    MalformedBrackets { fragment: String },

    #[error("Unexpected end of input in '{fragment}'")]
    UnexpectedEnd { fragment: String },

    #[error("Invalid token in '{fragment}': {reason}")]
    InvalidToken { fragment: String, reason: String },

    #[error("Missing field '{field}' in '{fragment}'")]
    MissingField { field: String, fragment: String },

    #[error("Malformed XML: {0}")]
    MalformedXml(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Failure for one line of a multi-item document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFailure {
    /// 1-based line (or entry) number
    pub line: usize,
    pub error: ParseError,
}

/// Partial results of a batch parse. One bad item never hides the rest.
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub items: Vec<T>,
    pub failures: Vec<LineFailure>,
}

impl<T> Parsed<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn push(&mut self, line: usize, result: ParseResult<T>) {
        match result {
            Ok(item) => self.items.push(item),
            Err(error) => {
                tracing::debug!("Line {} rejected: {}", line, error);
                self.failures.push(LineFailure { line, error });
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Encoding of a band-list source document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BandEncoding {
    /// Space/comma separated decimal bytes, one bit per band
    DecimalBytes { layout: BitmaskLayout },
    /// `0x` hex words, one bit per band
    HexWords { layout: BitmaskLayout },
    /// Hex words following a label inside a larger report
    LabeledHex { label: String, layout: BitmaskLayout },
    /// Index or range list such as `0-10 14-16 30`
    IndexList { rat: Rat, index_base: IndexBase },
    /// One 64-bit word per line with its band range, `Lte Bands 1_64 = 0x...`
    RangedHex { label: String, rat: Rat },
    /// `band_name` entries of an RF card XML file
    RfcXml { rat: Rat },
    /// Band elements of a UE capability XML dump
    UeCapabilityXml { rat: Rat },
}

impl BandEncoding {
    pub fn rat(&self) -> Rat {
        match self {
            BandEncoding::DecimalBytes { layout }
            | BandEncoding::HexWords { layout }
            | BandEncoding::LabeledHex { layout, .. } => layout.rat,
            BandEncoding::IndexList { rat, .. }
            | BandEncoding::RangedHex { rat, .. }
            | BandEncoding::RfcXml { rat }
            | BandEncoding::UeCapabilityXml { rat } => *rat,
        }
    }

    /// Band-number range covered by the document, when bounded
    pub fn coverage(&self) -> Option<(u32, u32)> {
        match self {
            BandEncoding::DecimalBytes { layout }
            | BandEncoding::HexWords { layout }
            | BandEncoding::LabeledHex { layout, .. } => layout.coverage(),
            BandEncoding::IndexList { .. }
            | BandEncoding::RangedHex { .. }
            | BandEncoding::RfcXml { .. }
            | BandEncoding::UeCapabilityXml { .. } => None,
        }
    }

    /// Decode a document's text into a band set
    pub fn decode(&self, text: &str) -> DecodeResult<std::collections::BTreeSet<Band>> {
        match self {
            BandEncoding::DecimalBytes { layout } => {
                let words = words::parse_decimal_words(text)?;
                bitmask::decode(&words, layout)
            }
            BandEncoding::HexWords { layout } => {
                let words = words::parse_hex_words(text)?;
                bitmask::decode(&words, layout)
            }
            BandEncoding::LabeledHex { label, layout } => {
                let words = capability::labeled_hex_words(text, label)?;
                bitmask::decode(&words, layout)
            }
            BandEncoding::IndexList { rat, index_base } => {
                words::parse_index_list(text, *rat, *index_base)
            }
            BandEncoding::RangedHex { label, rat } => {
                let words = capability::ranged_hex_words(text, label)?;
                capability::decode_ranged(&words, *rat)
            }
            BandEncoding::RfcXml { rat } => xml::rfc_bands(text, *rat),
            BandEncoding::UeCapabilityXml { rat } => xml::ue_capability_bands(text, *rat),
        }
    }
}
