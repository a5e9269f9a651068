//! RF card and UE capability XML
//!
//! RF card files list bands as `<band_name>B66</band_name>` and combos as
//! `<ca_combo>` text in vendor notation, grouped under `ca_combos`,
//! `ca_4g_5g_combos`, `nrca_combos`/`nr_ca_combos` and `nrdc_combos`.
//!
//! UE capability dumps carry one element per band combination
//! (`BandCombinationParameters-r10` for LTE CA, `BandCombination` for
//! MR-DC and NR) holding `BandParameters` legs. Release suffixes such as
//! `-r10` and namespaces are ignored when matching element names.

use crate::model::{Band, BandComponent, Combo, Rat};
use crate::{notation, DecodeError, DecodeResult, ParseError, ParseResult, Parsed};
use roxmltree::{Document, Node};
use std::collections::BTreeSet;

const RFC_COMBO_SECTIONS: [&str; 5] = [
    "ca_combos",
    "ca_4g_5g_combos",
    "nrca_combos",
    "nr_ca_combos",
    "nrdc_combos",
];

/// GSM bands share the `B` prefix in RF card band lists
const GSM_BAND_NAMES: [&str; 4] = ["850", "900", "1800", "1900"];

/// Class assumed for a capability leg that does not state one
const DEFAULT_CLASS: char = 'A';

fn malformed(e: &roxmltree::Error) -> ParseError {
    ParseError::MalformedXml(e.to_string())
}

/// Lowercase local name with any `-rNN`/`-vNNNN` release suffix removed
fn element_name(node: &Node) -> String {
    let name = node.tag_name().name().to_ascii_lowercase();
    match name.rsplit_once('-') {
        Some((head, tail))
            if tail.len() > 1
                && (tail.starts_with('r') || tail.starts_with('v'))
                && tail[1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            head.to_string()
        }
        _ => name,
    }
}

fn line_of(doc: &Document, node: &Node) -> usize {
    doc.text_pos_at(node.range().start).row as usize
}

fn trimmed_text<'a>(node: &Node<'a, '_>) -> Option<&'a str> {
    node.text().map(str::trim).filter(|t| !t.is_empty())
}

/// Combos of every `ca_combo` element inside a known section
pub fn parse_rfc_combos(text: &str, source_tag: &str) -> Parsed<Combo> {
    let mut parsed = Parsed::new();
    let doc = match Document::parse(text) {
        Ok(doc) => doc,
        Err(e) => {
            parsed.push(e.pos().row as usize, Err(malformed(&e)));
            return parsed;
        }
    };

    for node in doc.descendants().filter(|n| n.is_element()) {
        if element_name(&node) != "ca_combo" {
            continue;
        }
        let in_section = node
            .ancestors()
            .skip(1)
            .any(|a| a.is_element() && RFC_COMBO_SECTIONS.contains(&element_name(&a).as_str()));
        if !in_section {
            continue;
        }

        let result = match trimmed_text(&node) {
            Some(combo) => notation::parse_tagged(combo, source_tag),
            None => Err(ParseError::UnexpectedEnd {
                fragment: "<ca_combo/>".to_string(),
            }),
        };
        parsed.push(line_of(&doc, &node), result);
    }

    tracing::debug!("{}: {} RF card combos", source_tag, parsed.items.len());
    parsed
}

/// Band named by an RF card `band_name` entry, if it is LTE or NR
fn rfc_band_name(name: &str) -> Option<Band> {
    let name = name.trim().to_ascii_uppercase();
    let (prefix, digits) = (name.get(..1)?, name.get(1..)?);
    let rat = match prefix {
        "B" if !GSM_BAND_NAMES.contains(&digits) => Rat::Lte,
        "N" => Rat::Nr,
        _ => return None,
    };
    digits.parse().ok().map(|number| Band::new(rat, number))
}

/// Bands of one RAT listed in `band_name` elements
pub fn rfc_bands(text: &str, rat: Rat) -> DecodeResult<BTreeSet<Band>> {
    let doc = Document::parse(text).map_err(|e| DecodeError::MalformedXml(e.to_string()))?;

    let mut bands = BTreeSet::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        if element_name(&node) != "band_name" {
            continue;
        }
        match trimmed_text(&node).and_then(rfc_band_name) {
            Some(band) if band.rat == rat => {
                bands.insert(band);
            }
            Some(_) => {}
            None => tracing::debug!("Skipping band_name {:?}", node.text()),
        }
    }
    Ok(bands)
}

fn band_of(node: &Node) -> Option<(Rat, Option<u32>)> {
    let name = element_name(node);
    let rat = if name.starts_with("bandeutra") {
        Rat::Lte
    } else if name.starts_with("bandnr") || name == "freqbandindicatornr" {
        Rat::Nr
    } else {
        return None;
    };
    Some((rat, trimmed_text(node).and_then(|t| t.parse().ok())))
}

/// Class letter from values like `a`, `classA` or `bwClass-C`
fn class_letter(text: &str) -> Option<char> {
    text.chars()
        .rev()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
}

/// Layer count from values like `4`, `fourLayers` or `twoLayers`
fn layer_count(text: &str) -> Option<u32> {
    const WORDS: [(&str, u32); 8] = [
        ("one", 1),
        ("two", 2),
        ("three", 3),
        ("four", 4),
        ("five", 5),
        ("six", 6),
        ("seven", 7),
        ("eight", 8),
    ];
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if let Ok(layers) = digits.parse::<u32>() {
        return Some(layers).filter(|l| (1..=8).contains(l));
    }
    let lowered = text.to_ascii_lowercase();
    WORDS
        .iter()
        .find(|(word, _)| lowered.starts_with(word))
        .map(|(_, layers)| *layers)
}

fn capability_leg(leg: &Node, fragment: &str) -> ParseResult<BandComponent> {
    let mut band = None;
    let mut dl_class = None;
    let mut ul_class = None;
    let mut dl_mimo = None;

    for node in leg.descendants().filter(|n| n.is_element()) {
        if band.is_none() {
            band = band_of(&node);
            if band.is_some() {
                continue;
            }
        }
        let name = element_name(&node);
        let value = match trimmed_text(&node) {
            Some(value) => value,
            None => continue,
        };
        if name.contains("bandwidthclassdl") {
            dl_class = dl_class.or_else(|| class_letter(value));
        } else if name.contains("bandwidthclassul") {
            ul_class = ul_class.or_else(|| class_letter(value));
        } else if name.contains("mimo") && name.contains("dl") {
            dl_mimo = dl_mimo.or_else(|| layer_count(value));
        }
    }

    let (rat, number) = band.ok_or_else(|| ParseError::MissingField {
        field: "band".to_string(),
        fragment: fragment.to_string(),
    })?;
    let number = number.ok_or_else(|| ParseError::InvalidToken {
        fragment: fragment.to_string(),
        reason: "band number is not numeric".to_string(),
    })?;

    let mut component = BandComponent::new(Band::new(rat, number), dl_class.unwrap_or(DEFAULT_CLASS));
    component.ul_class = ul_class;
    component.dl_mimo_layers = dl_mimo;
    Ok(component)
}

fn capability_combo(combo: &Node, fragment: &str, source_tag: &str) -> ParseResult<Combo> {
    let elements = || combo.descendants().skip(1).filter(|n| n.is_element());

    let mut legs: Vec<Node> = elements()
        .filter(|n| element_name(n) == "bandparameters")
        .collect();
    if legs.is_empty() {
        // bare band elements, one leg each
        legs = elements().filter(|n| band_of(n).is_some()).collect();
    }
    if legs.is_empty() {
        return Err(ParseError::UnexpectedEnd {
            fragment: fragment.to_string(),
        });
    }

    let components = legs
        .iter()
        .map(|leg| capability_leg(leg, fragment))
        .collect::<ParseResult<Vec<_>>>()?;

    let bcs: BTreeSet<u32> = elements()
        .filter(|n| element_name(n).contains("supportedbandwidthcombinationset"))
        .filter_map(|n| trimmed_text(&n))
        .flat_map(|t| t.split(|c: char| c == ',' || c.is_whitespace()))
        .filter_map(|v| v.parse().ok())
        .collect();

    Ok(Combo::new(components, source_tag).with_bcs(bcs))
}

/// Band combinations of a UE capability dump
pub fn parse_ue_capability(text: &str, source_tag: &str) -> Parsed<Combo> {
    let mut parsed = Parsed::new();
    let doc = match Document::parse(text) {
        Ok(doc) => doc,
        Err(e) => {
            parsed.push(e.pos().row as usize, Err(malformed(&e)));
            return parsed;
        }
    };

    for node in doc.descendants().filter(|n| n.is_element()) {
        let name = element_name(&node);
        if name != "bandcombination" && name != "bandcombinationparameters" {
            continue;
        }
        let line = line_of(&doc, &node);
        let fragment = format!("{} at line {}", node.tag_name().name(), line);
        parsed.push(line, capability_combo(&node, &fragment, source_tag));
    }

    tracing::debug!("{}: {} capability combos", source_tag, parsed.items.len());
    parsed
}

/// Bands of one RAT named anywhere in a UE capability dump
pub fn ue_capability_bands(text: &str, rat: Rat) -> DecodeResult<BTreeSet<Band>> {
    let doc = Document::parse(text).map_err(|e| DecodeError::MalformedXml(e.to_string()))?;

    let mut bands = BTreeSet::new();
    for node in doc.descendants().filter(|n| n.is_element()) {
        match band_of(&node) {
            Some((found, Some(number))) if found == rat => {
                bands.insert(Band::new(rat, number));
            }
            Some((_, None)) => tracing::debug!("Skipping non-numeric {}", node.tag_name().name()),
            _ => {}
        }
    }
    Ok(bands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComboCategory;

    const RFC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<rfc xmlns="http://www.qualcomm.com/qti/rf/rfc">
  <card_properties>
    <name>SDR_CARD_A</name>
    <hwid>0x42</hwid>
  </card_properties>
  <bands>
    <band_name>B2</band_name>
    <band_name>B66</band_name>
    <band_name>B1900</band_name>
    <band_name>N77</band_name>
    <band_name>L1</band_name>
  </bands>
  <ca_combos>
    <ca_combo>B2A[4];A[1]+B66A[4]</ca_combo>
    <ca_combo>B2A+Q5A</ca_combo>
  </ca_combos>
  <ca_4g_5g_combos>
    <ca_combo>B66A[4];A[1]+N77A[100x4];A[100x1]</ca_combo>
  </ca_4g_5g_combos>
  <notes>
    <ca_combo>B7A+B12A</ca_combo>
  </notes>
</rfc>
"#;

    #[test]
    fn test_rfc_combos() {
        let parsed = parse_rfc_combos(RFC, "rfc");
        let keys: Vec<&str> = parsed.items.iter().map(|c| c.canonical_key()).collect();
        assert_eq!(keys, vec!["2A-66A", "66A-n77A"]);
        assert_eq!(parsed.items[1].category(), ComboCategory::DualConnectivity);
        assert_eq!(parsed.items[1].components()[1].dl_bandwidth_mhz, Some(100));

        assert_eq!(parsed.failures.len(), 1);
        assert_eq!(parsed.failures[0].line, 16);
        assert!(matches!(parsed.failures[0].error, ParseError::UnknownRat { .. }));
    }

    #[test]
    fn test_rfc_bands() {
        let lte = rfc_bands(RFC, Rat::Lte).unwrap();
        assert_eq!(lte.into_iter().collect::<Vec<_>>(), vec![Band::lte(2), Band::lte(66)]);
        let nr = rfc_bands(RFC, Rat::Nr).unwrap();
        assert_eq!(nr.into_iter().collect::<Vec<_>>(), vec![Band::nr(77)]);
    }

    #[test]
    fn test_malformed_xml() {
        let parsed = parse_rfc_combos("<rfc><ca_combos></rfc>", "rfc");
        assert!(parsed.items.is_empty());
        assert!(matches!(parsed.failures[0].error, ParseError::MalformedXml(_)));
        assert!(matches!(rfc_bands("<rfc>", Rat::Lte), Err(DecodeError::MalformedXml(_))));
    }

    const UECAP: &str = r#"<UECapabilityInformation>
  <rf-Parameters-v1020>
    <supportedBandCombination-r10>
      <BandCombinationParameters-r10>
        <BandParameters-r10>
          <bandEUTRA-r10>2</bandEUTRA-r10>
          <bandParametersDL-r10>
            <ca-BandwidthClassDL-r10>a</ca-BandwidthClassDL-r10>
            <supportedMIMO-CapabilityDL-r10>fourLayers</supportedMIMO-CapabilityDL-r10>
          </bandParametersDL-r10>
        </BandParameters-r10>
        <BandParameters-r10>
          <bandEUTRA-r10>66</bandEUTRA-r10>
          <bandParametersDL-r10>
            <ca-BandwidthClassDL-r10>c</ca-BandwidthClassDL-r10>
          </bandParametersDL-r10>
        </BandParameters-r10>
        <supportedBandwidthCombinationSet-r10>0, 1</supportedBandwidthCombinationSet-r10>
      </BandCombinationParameters-r10>
    </supportedBandCombination-r10>
  </rf-Parameters-v1020>
  <UE-MRDC-Capability>
    <supportedBandCombinationList>
      <BandCombination>
        <bandList>
          <BandParameters>
            <bandEUTRA>66</bandEUTRA>
            <ca-BandwidthClassDL-EUTRA>a</ca-BandwidthClassDL-EUTRA>
            <ca-BandwidthClassUL-EUTRA>a</ca-BandwidthClassUL-EUTRA>
          </BandParameters>
          <BandParameters>
            <bandNR>77</bandNR>
            <ca-BandwidthClassDL-NR>a</ca-BandwidthClassDL-NR>
          </BandParameters>
        </bandList>
      </BandCombination>
      <BandCombination>
        <bandList>
          <BandParameters>
            <ca-BandwidthClassDL-NR>a</ca-BandwidthClassDL-NR>
          </BandParameters>
        </bandList>
      </BandCombination>
    </supportedBandCombinationList>
  </UE-MRDC-Capability>
</UECapabilityInformation>
"#;

    #[test]
    fn test_ue_capability_combos() {
        let parsed = parse_ue_capability(UECAP, "uecap");
        let keys: Vec<&str> = parsed.items.iter().map(|c| c.canonical_key()).collect();
        assert_eq!(keys, vec!["2A-66C", "66A-n77A"]);

        let lte_ca = &parsed.items[0];
        assert_eq!(lte_ca.components()[0].dl_mimo_layers, Some(4));
        assert_eq!(lte_ca.bcs().iter().copied().collect::<Vec<_>>(), vec![0, 1]);

        let endc = &parsed.items[1];
        assert_eq!(endc.components()[0].ul_class, Some('A'));
        assert!(endc.bcs().is_empty());

        assert_eq!(parsed.failures.len(), 1);
        assert_eq!(parsed.failures[0].line, 37);
        assert!(matches!(
            &parsed.failures[0].error,
            ParseError::MissingField { field, .. } if field == "band"
        ));
    }

    #[test]
    fn test_ue_capability_bands() {
        let lte = ue_capability_bands(UECAP, Rat::Lte).unwrap();
        assert_eq!(lte.into_iter().collect::<Vec<_>>(), vec![Band::lte(2), Band::lte(66)]);
        let nr = ue_capability_bands(UECAP, Rat::Nr).unwrap();
        assert_eq!(nr.into_iter().collect::<Vec<_>>(), vec![Band::nr(77)]);
    }

    #[test]
    fn test_element_names_and_values() {
        let doc = Document::parse("<a><ca-BandwidthClassDL-r10/><bandNR-v1530/><x-y/></a>").unwrap();
        let names: Vec<String> = doc
            .descendants()
            .filter(|n| n.is_element())
            .map(|n| element_name(&n))
            .collect();
        assert_eq!(names, vec!["a", "ca-bandwidthclassdl", "bandnr", "x-y"]);

        assert_eq!(class_letter("bwClass-C"), Some('C'));
        assert_eq!(layer_count("twoLayers"), Some(2));
        assert_eq!(layer_count("12"), None);
    }
}
