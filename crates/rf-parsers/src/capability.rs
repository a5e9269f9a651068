//! Capability report text parsing
//!
//! Runtime combo tables are exported as text in three shapes:
//!
//! - labeled blocks (`Combo Index = 0`, `[Band 0]`, `RAT Type = LTE`, ...)
//! - pipe-separated tables (`Index | RAT | Band | DL BW | UL BW | DL MIMO | UL MIMO`)
//! - labeled notation lines (`ENDC: B66A+N77A`)
//!
//! Band capability logs additionally carry hex words that feed the
//! bitmask decoder, either all on one labeled line
//! (`LTE Bands: 0x0000000F 0x00000000`) or one 64-bit word per line with
//! its band range (`Lte Bands 65_128 = 0x000000000000004A`).

use crate::bitmask::{self, BitmaskLayout, IndexBase};
use crate::model::{Band, BandComponent, Combo, Rat};
use crate::words::parse_hex_token;
use crate::{notation, DecodeError, DecodeResult, ParseError, ParseResult, Parsed};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

static COMBO_INDEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)combo\s*index\s*[=:]\s*(\d+)").unwrap());
static BAND_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\[band\s*\d+\]$").unwrap());
static RAT_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^rat\s*(?:type)?\s*[=:]\s*([\w-]+)").unwrap());
static BAND_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^band\s*[=:]\s*(\d+)").unwrap());
static DL_CLASS_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^dl\s*(?:bw\s*)?class\s*[=:]\s*([a-z])").unwrap());
static UL_CLASS_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^ul\s*(?:bw\s*)?class\s*[=:]\s*([a-z])").unwrap());
static DL_MIMO_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^dl\s*(?:mimo|layers?)\s*[=:]\s*(\d+)").unwrap());
static UL_MIMO_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^ul\s*(?:mimo|layers?)\s*[=:]\s*(\d+)").unwrap());
static TABLE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)index\s*\|\s*rat\s*\|\s*band").unwrap());
static LABELED_COMBO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:en-?dc|lte[-_]?ca|nr[-_]?ca|nr[-_]?dc)\s*[:=]\s*(\S+)").unwrap()
});
static BCS_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bbcs\s*[=:]\s*(\d+(?:\s*,\s*\d+)*)").unwrap());
static RANGED_HEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?)\s*(\d+)_(\d+)\s*=\s*(0x[0-9a-f]+)\s*$").unwrap()
});

/// Report shape detected in a capability document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportShape {
    Blocks,
    Table,
    LabeledLines,
}

/// Detect which shape a report uses
pub fn detect_shape(text: &str) -> ReportShape {
    if COMBO_INDEX.is_match(text) {
        ReportShape::Blocks
    } else if TABLE_HEADER.is_match(text) {
        ReportShape::Table
    } else {
        ReportShape::LabeledLines
    }
}

/// Parse a runtime combo report in any supported shape
pub fn parse_report(text: &str, source_tag: &str) -> Parsed<Combo> {
    match detect_shape(text) {
        ReportShape::Blocks => parse_blocks(text, source_tag),
        ReportShape::Table => parse_table(text, source_tag),
        ReportShape::LabeledLines => parse_labeled_lines(text, source_tag),
    }
}

/// Leg fields gathered from a report before validation
#[derive(Debug, Clone, Default)]
struct RawLeg {
    rat: Option<String>,
    band: Option<u32>,
    dl_class: Option<char>,
    ul_class: Option<char>,
    dl_mimo: Option<u32>,
    ul_mimo: Option<u32>,
}

impl RawLeg {
    fn is_empty(&self) -> bool {
        self.rat.is_none() && self.band.is_none() && self.dl_class.is_none()
    }

    fn into_component(self, fragment: &str) -> ParseResult<BandComponent> {
        let missing = |field: &str| ParseError::MissingField {
            field: field.to_string(),
            fragment: fragment.to_string(),
        };
        let rat = parse_rat_name(self.rat.as_deref().ok_or_else(|| missing("RAT Type"))?)?;
        let number = self.band.ok_or_else(|| missing("Band"))?;
        let dl_class = self.dl_class.ok_or_else(|| missing("DL BW Class"))?;

        let mut component = BandComponent::new(Band::new(rat, number), dl_class.to_ascii_uppercase());
        component.ul_class = self.ul_class.map(|c| c.to_ascii_uppercase());
        component.dl_mimo_layers = self.dl_mimo;
        component.ul_mimo_layers = self.ul_mimo;
        Ok(component)
    }
}

/// Map a RAT name used in report text
pub fn parse_rat_name(name: &str) -> ParseResult<Rat> {
    match name.trim().to_ascii_uppercase().as_str() {
        "LTE" | "EUTRA" | "E-UTRA" => Ok(Rat::Lte),
        "NR" | "NR5G" | "5G" => Ok(Rat::Nr),
        _ => Err(ParseError::UnknownRat {
            fragment: name.to_string(),
        }),
    }
}

/// Legs of one combo with the line its first field appeared on
struct RawCombo {
    line: usize,
    legs: Vec<RawLeg>,
    bcs: BTreeSet<u32>,
}

impl RawCombo {
    fn new(line: usize) -> Self {
        Self {
            line,
            legs: Vec::new(),
            bcs: BTreeSet::new(),
        }
    }
}

/// BCS values stated on a line, e.g. `BCS = 0,1`
fn bcs_values(line: &str) -> Option<BTreeSet<u32>> {
    let caps = BCS_FIELD.captures(line)?;
    caps[1]
        .split(',')
        .map(|v| v.trim().parse::<u32>().ok())
        .collect()
}

fn build_combos(raw: BTreeMap<u32, RawCombo>, source_tag: &str) -> Parsed<Combo> {
    let mut parsed = Parsed::new();
    for (index, combo) in raw {
        let fragment = format!("Combo Index = {}", index);
        let result = combo
            .legs
            .into_iter()
            .map(|leg| leg.into_component(&fragment))
            .collect::<ParseResult<Vec<_>>>()
            .and_then(|components| {
                if components.is_empty() {
                    Err(ParseError::UnexpectedEnd {
                        fragment: fragment.clone(),
                    })
                } else {
                    Ok(Combo::new(components, source_tag).with_bcs(combo.bcs))
                }
            });
        parsed.push(combo.line, result);
    }
    parsed
}

/// Close the leg being filled and attach it to its combo
fn flush(raw: &mut BTreeMap<u32, RawCombo>, index: Option<u32>, leg: &mut RawLeg) {
    let leg = std::mem::take(leg);
    if leg.is_empty() {
        return;
    }
    if let Some(combo) = index.and_then(|i| raw.get_mut(&i)) {
        combo.legs.push(leg);
    }
}

fn parse_blocks(text: &str, source_tag: &str) -> Parsed<Combo> {
    let mut raw: BTreeMap<u32, RawCombo> = BTreeMap::new();
    let mut parsed = Parsed::new();
    let mut current: Option<u32> = None;
    let mut leg = RawLeg::default();

    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = COMBO_INDEX.captures(line) {
            flush(&mut raw, current, &mut leg);
            current = match caps[1].parse::<u32>() {
                Ok(index) => {
                    raw.entry(index).or_insert_with(|| RawCombo::new(number + 1));
                    Some(index)
                }
                Err(_) => {
                    // legs up to the next index line belong to the rejected combo
                    parsed.push(number + 1, Err(index_out_of_range(line)));
                    None
                }
            };
            continue;
        }
        if current.is_none() {
            continue;
        }
        if BAND_HEADER.is_match(line) {
            flush(&mut raw, current, &mut leg);
            continue;
        }

        if let Some(caps) = RAT_FIELD.captures(line) {
            leg.rat = Some(caps[1].to_string());
        } else if let Some(caps) = BAND_FIELD.captures(line) {
            leg.band = caps[1].parse().ok();
        } else if let Some(caps) = DL_CLASS_FIELD.captures(line) {
            leg.dl_class = caps[1].chars().next();
        } else if let Some(caps) = UL_CLASS_FIELD.captures(line) {
            leg.ul_class = caps[1].chars().next();
        } else if let Some(caps) = DL_MIMO_FIELD.captures(line) {
            leg.dl_mimo = caps[1].parse().ok();
        } else if let Some(caps) = UL_MIMO_FIELD.captures(line) {
            leg.ul_mimo = caps[1].parse().ok();
        } else if let Some(values) = bcs_values(line) {
            if let Some(combo) = current.and_then(|i| raw.get_mut(&i)) {
                combo.bcs.extend(values);
            }
        }
    }
    flush(&mut raw, current, &mut leg);

    let built = build_combos(raw, source_tag);
    parsed.items.extend(built.items);
    parsed.failures.extend(built.failures);
    parsed
}

fn index_out_of_range(fragment: &str) -> ParseError {
    ParseError::InvalidToken {
        fragment: fragment.to_string(),
        reason: "combo index out of range".to_string(),
    }
}

fn parse_table(text: &str, source_tag: &str) -> Parsed<Combo> {
    let mut raw: BTreeMap<u32, RawCombo> = BTreeMap::new();
    let mut parsed = Parsed::new();

    for (number, line) in text.lines().enumerate() {
        let cells: Vec<&str> = line.split('|').map(str::trim).collect();
        let first = cells.first().copied().unwrap_or_default();
        if first.is_empty() || !first.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let index = match first.parse::<u32>() {
            Ok(index) => index,
            Err(_) => {
                parsed.push(number + 1, Err(index_out_of_range(line.trim())));
                continue;
            }
        };
        if cells.len() < 4 {
            parsed.push(
                number + 1,
                Err(ParseError::MissingField {
                    field: "DL BW".to_string(),
                    fragment: line.trim().to_string(),
                }),
            );
            continue;
        }

        let cell = |i: usize| cells.get(i).copied().filter(|c| !c.is_empty());
        let leg = RawLeg {
            rat: cell(1).map(str::to_string),
            band: cell(2).and_then(|c| c.parse().ok()),
            dl_class: cell(3).and_then(|c| c.chars().next()),
            ul_class: cell(4).and_then(|c| c.chars().next()),
            dl_mimo: cell(5).and_then(|c| c.parse().ok()),
            ul_mimo: cell(6).and_then(|c| c.parse().ok()),
        };
        raw.entry(index)
            .or_insert_with(|| RawCombo::new(number + 1))
            .legs
            .push(leg);
    }

    let built = build_combos(raw, source_tag);
    parsed.items.extend(built.items);
    parsed.failures.extend(built.failures);
    parsed
}

fn parse_labeled_lines(text: &str, source_tag: &str) -> Parsed<Combo> {
    let mut parsed = Parsed::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if let Some(caps) = LABELED_COMBO.captures(line) {
            let bcs = bcs_values(line).unwrap_or_default();
            let result = notation::parse_tagged(&caps[1], source_tag).map(|c| c.with_bcs(bcs));
            parsed.push(number + 1, result);
        }
    }
    parsed
}

/// Hex words that follow `label` (case-insensitive) on its line, e.g.
/// `LTE Bands: 0x0000000F 0x00000000`.
pub fn labeled_hex_words(text: &str, label: &str) -> DecodeResult<Vec<u64>> {
    let wanted = label.trim().to_ascii_lowercase();

    for line in text.lines() {
        let line = line.trim();
        let lowered = line.to_ascii_lowercase();
        if !lowered.starts_with(&wanted) {
            continue;
        }
        let rest = line[wanted.len()..].trim_start();
        let values = match rest.strip_prefix(':').or_else(|| rest.strip_prefix('=')) {
            Some(values) => values,
            None => continue,
        };
        return values
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(parse_hex_token)
            .collect();
    }

    Err(DecodeError::MissingLabel(label.to_string()))
}

/// One 64-bit word of a ranged band log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangedWord {
    pub first: u32,
    pub last: u32,
    pub value: u64,
}

fn squash(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Words of every `<label> <first>_<last> = 0x...` line, e.g.
/// `Lte Bands 1_64 = 0x000087C0BB08389F`. Label whitespace and case are
/// ignored.
pub fn ranged_hex_words(text: &str, label: &str) -> DecodeResult<Vec<RangedWord>> {
    let wanted = squash(label);
    let mut words = Vec::new();

    for line in text.lines() {
        let caps = match RANGED_HEX.captures(line.trim()) {
            Some(caps) if squash(&caps[1]) == wanted => caps,
            _ => continue,
        };
        let bound = |digits: &str| {
            digits
                .parse::<u32>()
                .map_err(|_| DecodeError::InvalidWord(caps[0].to_string()))
        };
        let (first, last) = (bound(&caps[2])?, bound(&caps[3])?);
        if first == 0 || last < first {
            return Err(DecodeError::InvalidWord(caps[0].to_string()));
        }
        words.push(RangedWord {
            first,
            last,
            value: parse_hex_token(&caps[4])?,
        });
    }

    if words.is_empty() {
        return Err(DecodeError::MissingLabel(label.to_string()));
    }
    Ok(words)
}

/// Decode ranged words into bands; bit 0 of each word is its first band
pub fn decode_ranged(words: &[RangedWord], rat: Rat) -> DecodeResult<BTreeSet<Band>> {
    let mut bands = BTreeSet::new();
    for word in words {
        let layout = BitmaskLayout::new(rat, 64, word.first, IndexBase::ZeroBased)
            .with_band_count(word.last - word.first + 1);
        bands.extend(bitmask::decode(&[word.value], &layout)?);
    }
    Ok(bands)
}
