//! Textual word and index-list decoding

use crate::bitmask::IndexBase;
use crate::model::{Band, Rat};
use crate::{DecodeError, DecodeResult};
use std::collections::BTreeSet;

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == ',' || c == '[' || c == ']')
        .filter(|t| !t.is_empty())
}

/// Decimal words, e.g. an NV item dump `"255 0 16 0"`
pub fn parse_decimal_words(text: &str) -> DecodeResult<Vec<u64>> {
    tokens(text)
        .map(|t| t.parse::<u64>().map_err(|_| DecodeError::InvalidWord(t.to_string())))
        .collect()
}

/// Hex words, with or without a `0x` prefix
pub fn parse_hex_words(text: &str) -> DecodeResult<Vec<u64>> {
    tokens(text).map(parse_hex_token).collect()
}

pub(crate) fn parse_hex_token(token: &str) -> DecodeResult<u64> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u64::from_str_radix(digits, 16).map_err(|_| DecodeError::InvalidWord(token.to_string()))
}

/// Widest range a single index-list token may span
const MAX_RANGE_SPAN: u64 = 4096;

/// Index or range list such as `"0-10 14-16 30"`.
///
/// Indices are interpreted with `index_base` against band 1.
pub fn parse_index_list(text: &str, rat: Rat, index_base: IndexBase) -> DecodeResult<BTreeSet<Band>> {
    let mut bands = BTreeSet::new();

    for token in tokens(text) {
        let (low, high) = match token.split_once('-') {
            Some((a, b)) => (parse_index(a, token)?, parse_index(b, token)?),
            None => {
                let index = parse_index(token, token)?;
                (index, index)
            }
        };
        if low > high {
            return Err(DecodeError::InvalidWord(token.to_string()));
        }
        let max = index_base.max_ordinal(1);
        if high > max {
            return Err(DecodeError::BitOutOfRange {
                ordinal: high,
                number: high.saturating_add(1),
            });
        }
        if high - low >= MAX_RANGE_SPAN {
            return Err(DecodeError::InvalidWord(token.to_string()));
        }

        for ordinal in low..=high {
            let number = index_base.to_canonical(1, ordinal)?;
            bands.insert(Band::new(rat, number));
        }
    }

    Ok(bands)
}

fn parse_index(digits: &str, token: &str) -> DecodeResult<u64> {
    digits
        .trim()
        .parse::<u64>()
        .map_err(|_| DecodeError::InvalidWord(token.to_string()))
}
