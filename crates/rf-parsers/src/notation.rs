//! Vendor combo notation parser
//!
//! Accepts the RF-card notation (`B1A[4];A[1]+N77A[100x4];A[100x1]`) and
//! the legacy dash form used by prune lists and capability dumps
//! (`1A-3A-7A`). Some RF card exports list legs with commas
//! (`B1A[4],B3A[4]`), so a comma separates legs as well. Grammar:
//!
//! ```text
//! combo   := leg (sep leg)*
//! sep     := '+' | '-' | ','
//! leg     := rat? number dl_groups (';' ul_groups)?
//! rat     := 'B' | 'b' | 'N' | 'n'          (absent = LTE)
//! groups  := (class bracket*)+
//! bracket := '[' layers ']' | '[' bandwidth 'x' layers ']'
//! ```
//!
//! A class letter followed by k >= 2 brackets, or k consecutive class
//! letters, describes k legs on the same band.

use crate::model::{Band, BandComponent, Combo, Rat};
use crate::{ParseError, ParseResult, Parsed};

/// Separators accepted between legs
pub const LEG_SEPARATORS: [char; 3] = ['+', '-', ','];

/// Source tag used by [`parse`]
pub const UNTAGGED: &str = "notation";

/// Parse a combo string
pub fn parse(raw: &str) -> ParseResult<Combo> {
    parse_tagged(raw, UNTAGGED)
}

/// Parse a combo string and stamp it with a source tag
pub fn parse_tagged(raw: &str, source_tag: &str) -> ParseResult<Combo> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::UnexpectedEnd {
            fragment: raw.to_string(),
        });
    }

    let mut components = Vec::new();
    for leg in split_legs(trimmed)? {
        let leg = leg.trim();
        if leg.is_empty() {
            return Err(ParseError::UnexpectedEnd {
                fragment: trimmed.to_string(),
            });
        }
        components.extend(parse_leg(leg)?);
    }

    Ok(Combo::new(components, source_tag))
}

/// Parse one combo per non-empty, non-comment line
pub fn parse_lines(text: &str, source_tag: &str) -> Parsed<Combo> {
    let mut parsed = Parsed::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        parsed.push(index + 1, parse_tagged(line, source_tag));
    }
    parsed
}

/// Split at top-level separators, rejecting unbalanced brackets
fn split_legs(raw: &str) -> ParseResult<Vec<&str>> {
    let mut legs = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (pos, ch) in raw.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1).ok_or_else(|| ParseError::MalformedBrackets {
                    fragment: raw.to_string(),
                })?;
            }
            c if depth == 0 && LEG_SEPARATORS.contains(&c) => {
                legs.push(&raw[start..pos]);
                start = pos + c.len_utf8();
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(ParseError::MalformedBrackets {
            fragment: raw.to_string(),
        });
    }
    legs.push(&raw[start..]);
    Ok(legs)
}

/// One class letter with the attributes from at most one bracket
#[derive(Debug, Clone, Copy)]
struct ClassSpec {
    class: char,
    layers: Option<u32>,
    bandwidth: Option<u32>,
}

struct Cursor<'a> {
    leg: &'a str,
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(leg: &'a str) -> Self {
        Self {
            leg,
            chars: leg.chars().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn unexpected_end(&self) -> ParseError {
        ParseError::UnexpectedEnd {
            fragment: self.leg.to_string(),
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> ParseError {
        ParseError::InvalidToken {
            fragment: self.leg.to_string(),
            reason: reason.into(),
        }
    }

    fn malformed(&self) -> ParseError {
        ParseError::MalformedBrackets {
            fragment: self.leg.to_string(),
        }
    }

    fn rat(&mut self) -> ParseResult<Rat> {
        match self.peek() {
            Some('B') | Some('b') => {
                self.bump();
                Ok(Rat::Lte)
            }
            Some('N') | Some('n') => {
                self.bump();
                Ok(Rat::Nr)
            }
            Some(c) if c.is_ascii_digit() => Ok(Rat::Lte),
            Some(_) => Err(ParseError::UnknownRat {
                fragment: self.leg.to_string(),
            }),
            None => Err(self.unexpected_end()),
        }
    }

    fn number(&mut self) -> ParseResult<u32> {
        let mut digits = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
            digits.push(c);
            self.bump();
        }
        if digits.is_empty() {
            return match self.peek() {
                None => Err(self.unexpected_end()),
                Some(c) => Err(self.invalid(format!("expected band number, found '{}'", c))),
            };
        }
        digits
            .parse::<u32>()
            .map_err(|_| self.invalid(format!("band number '{}' out of range", digits)))
    }

    /// Class letters and their brackets, up to `;` or the end of the leg
    fn groups(&mut self, rat: Rat) -> ParseResult<Vec<ClassSpec>> {
        let mut specs: Vec<ClassSpec> = Vec::new();

        while let Some(c) = self.peek() {
            if c == ';' {
                break;
            }
            if !c.is_ascii_alphabetic() {
                return Err(self.invalid(format!("expected bandwidth class, found '{}'", c)));
            }
            self.bump();
            let class = c.to_ascii_uppercase();

            let mut bracketed = 0;
            while self.peek() == Some('[') {
                self.bump();
                let (layers, bandwidth) = self.bracket(rat)?;
                specs.push(ClassSpec {
                    class,
                    layers: Some(layers),
                    bandwidth,
                });
                bracketed += 1;
            }
            if bracketed == 0 {
                specs.push(ClassSpec {
                    class,
                    layers: None,
                    bandwidth: None,
                });
            }
        }

        if specs.is_empty() {
            return Err(self.unexpected_end());
        }
        Ok(specs)
    }

    /// Body of a bracket after `[`, consuming the closing `]`
    fn bracket(&mut self, rat: Rat) -> ParseResult<(u32, Option<u32>)> {
        let mut body = String::new();
        loop {
            match self.bump() {
                Some(']') => break,
                Some('[') | None => return Err(self.malformed()),
                Some(c) => body.push(c),
            }
        }

        let parse_num = |text: &str| -> ParseResult<u32> {
            text.trim()
                .parse::<u32>()
                .map_err(|_| self.invalid(format!("bad bracket value '[{}]'", body)))
        };

        match body.split_once(|c: char| c == 'x' || c == 'X') {
            Some((bandwidth, layers)) => {
                if rat != Rat::Nr {
                    return Err(self.invalid("bandwidth is only valid on NR legs"));
                }
                Ok((parse_num(layers)?, Some(parse_num(bandwidth)?)))
            }
            None => Ok((parse_num(&body)?, None)),
        }
    }
}

fn parse_leg(leg: &str) -> ParseResult<Vec<BandComponent>> {
    let mut cursor = Cursor::new(leg);
    let rat = cursor.rat()?;
    let number = cursor.number()?;
    if number == 0 {
        return Err(cursor.invalid("band number 0"));
    }
    let band = Band::new(rat, number);

    let downlink = cursor.groups(rat)?;
    let uplink = if cursor.peek() == Some(';') {
        cursor.bump();
        cursor.groups(rat)?
    } else {
        Vec::new()
    };

    if uplink.len() > downlink.len() {
        return Err(cursor.invalid(format!(
            "{} uplink entries for {} downlink components",
            uplink.len(),
            downlink.len()
        )));
    }

    let components = downlink
        .iter()
        .enumerate()
        .map(|(i, dl)| {
            let mut component = BandComponent::new(band, dl.class);
            component.dl_mimo_layers = dl.layers;
            component.dl_bandwidth_mhz = dl.bandwidth;
            if let Some(ul) = uplink.get(i) {
                component.ul_class = Some(ul.class);
                component.ul_mimo_layers = ul.layers;
                component.ul_bandwidth_mhz = ul.bandwidth;
            }
            component
        })
        .collect();

    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComboCategory;

    #[test]
    fn test_vendor_endc() {
        let combo = parse("B1A[4];A[1]+N77A[100x4];A[100x1]").unwrap();
        assert_eq!(combo.canonical_key(), "1A-n77A");
        assert_eq!(combo.category(), ComboCategory::DualConnectivity);

        let lte = &combo.components()[0];
        assert_eq!(lte.band, Band::lte(1));
        assert_eq!(lte.dl_mimo_layers, Some(4));
        assert_eq!(lte.ul_class, Some('A'));
        assert_eq!(lte.ul_mimo_layers, Some(1));

        let nr = &combo.components()[1];
        assert_eq!(nr.band, Band::nr(77));
        assert_eq!(nr.dl_bandwidth_mhz, Some(100));
        assert_eq!(nr.dl_mimo_layers, Some(4));
        assert_eq!(nr.ul_bandwidth_mhz, Some(100));
    }

    #[test]
    fn test_uplink_optional() {
        let combo = parse("B66A[4];A[1]+B66A[4]+N77A[100x4];A[100x1]").unwrap();
        assert_eq!(combo.canonical_key(), "66A-66A-n77A");
        assert_eq!(combo.components()[1].ul_class, None);
    }

    #[test]
    fn test_legacy_dash_form() {
        let combo = parse("3a-1A-7A").unwrap();
        assert_eq!(combo.canonical_key(), "1A-3A-7A");
        assert_eq!(combo.category(), ComboCategory::SingleRatAggregation);
    }

    #[test]
    fn test_comma_separated_legs() {
        let combo = parse("B3A[4],B1A[4];A[1]").unwrap();
        assert_eq!(combo.canonical_key(), "1A-3A");
        assert_eq!(combo, parse("B1A[4];A[1]+B3A[4]").unwrap());
        assert!(matches!(parse("B1A,"), Err(ParseError::UnexpectedEnd { .. })));
    }

    #[test]
    fn test_doubled_brackets_split_components() {
        let combo = parse("N77C[100x4][80x2];C[100x1]").unwrap();
        assert_eq!(combo.component_count(), 2);
        assert!(combo.components().iter().all(|c| c.band == Band::nr(77)));
        assert_eq!(combo.components()[0].ul_class, Some('C'));
        assert_eq!(combo.components()[1].ul_class, None);
        assert_eq!(combo.canonical_key(), "n77C-n77C");
    }

    #[test]
    fn test_doubled_class_letters() {
        let combo = parse("B41AA").unwrap();
        assert_eq!(combo.canonical_key(), "41A-41A");
    }

    #[test]
    fn test_unknown_rat() {
        assert_eq!(
            parse("B1A+X7A").unwrap_err(),
            ParseError::UnknownRat {
                fragment: "X7A".to_string()
            }
        );
    }

    #[test]
    fn test_unbalanced_brackets() {
        assert!(matches!(
            parse("B1A[4+B3A[2]"),
            Err(ParseError::MalformedBrackets { .. })
        ));
        assert!(matches!(
            parse("B1A4]"),
            Err(ParseError::MalformedBrackets { .. })
        ));
    }

    #[test]
    fn test_unexpected_end() {
        assert!(matches!(parse(""), Err(ParseError::UnexpectedEnd { .. })));
        assert!(matches!(parse("B1A+"), Err(ParseError::UnexpectedEnd { .. })));
        assert!(matches!(parse("B66"), Err(ParseError::UnexpectedEnd { .. })));
        assert!(matches!(parse("B66A;"), Err(ParseError::UnexpectedEnd { .. })));
        assert!(matches!(parse("N"), Err(ParseError::UnexpectedEnd { .. })));
    }

    #[test]
    fn test_bandwidth_on_lte_rejected() {
        assert!(matches!(
            parse("B1A[20x4]"),
            Err(ParseError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_too_many_uplinks() {
        assert!(matches!(
            parse("B1A;AA"),
            Err(ParseError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_parse_lines_collects_partial_results() {
        let text = "# declared\nB1A+B3A\n\nB2A+Q5A\n1A-7A\n";
        let parsed = parse_lines(text, "rfc");
        assert_eq!(parsed.items.len(), 2);
        assert_eq!(parsed.items[0].source_tag(), "rfc");
        assert_eq!(parsed.failures.len(), 1);
        assert_eq!(parsed.failures[0].line, 4);
    }
}
