//! Fixed-width band bitmask decoding
//!
//! Sources disagree on whether the first bit of a mask denotes the first
//! band of the range or an unused slot. That convention is always passed
//! in explicitly through [`IndexBase`]; nothing here infers it from the
//! source name.

use crate::model::{Band, Rat};
use crate::{DecodeError, DecodeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Index convention of a source encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexBase {
    /// Ordinal 0 denotes the first band of the range
    ZeroBased,
    /// Ordinal 1 denotes the first band of the range; ordinal 0 is unused
    OneBased,
}

impl IndexBase {
    /// Canonical band number for a raw ordinal.
    ///
    /// One-based sources never use ordinal 0, whatever the range start.
    /// A number that does not fit a band number is `BitOutOfRange`.
    pub fn to_canonical(&self, range_start: u32, ordinal: u64) -> DecodeResult<u32> {
        let number = match self {
            IndexBase::ZeroBased => (range_start as u64).checked_add(ordinal),
            IndexBase::OneBased if ordinal == 0 => {
                return Err(DecodeError::ReservedOrdinal { ordinal })
            }
            IndexBase::OneBased => (range_start as u64).checked_add(ordinal - 1),
        };
        match number {
            Some(0) => Err(DecodeError::ReservedOrdinal { ordinal }),
            Some(n) if n <= u32::MAX as u64 => Ok(n as u32),
            _ => Err(DecodeError::BitOutOfRange {
                ordinal,
                number: number.unwrap_or(u64::MAX),
            }),
        }
    }

    /// Largest ordinal whose band number still fits in `u32`
    pub fn max_ordinal(&self, range_start: u32) -> u64 {
        let span = (u32::MAX - range_start) as u64;
        match self {
            IndexBase::ZeroBased => span,
            IndexBase::OneBased => span + 1,
        }
    }

    /// Number of ordinal slots needed to address `band_count` bands
    fn slots_for(&self, band_count: u32) -> u64 {
        match self {
            IndexBase::ZeroBased => band_count as u64,
            IndexBase::OneBased => band_count as u64 + 1,
        }
    }
}

/// Per-source bitmask configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitmaskLayout {
    pub rat: Rat,
    pub word_bit_width: usize,
    pub range_start: u32,
    pub index_base: IndexBase,
    /// Declared number of bands covered, when the source fixes it
    #[serde(default)]
    pub band_count: Option<u32>,
}

impl BitmaskLayout {
    pub fn new(rat: Rat, word_bit_width: usize, range_start: u32, index_base: IndexBase) -> Self {
        Self {
            rat,
            word_bit_width,
            range_start,
            index_base,
            band_count: None,
        }
    }

    pub fn with_band_count(mut self, band_count: u32) -> Self {
        self.band_count = Some(band_count);
        self
    }

    /// NV LTE band preference, bands 1..=64, one byte per word
    pub fn nv_lte_low() -> Self {
        Self::new(Rat::Lte, 8, 1, IndexBase::ZeroBased).with_band_count(64)
    }

    /// NV LTE band preference extension, bands 65..=256
    pub fn nv_lte_extended() -> Self {
        Self::new(Rat::Lte, 8, 65, IndexBase::ZeroBased).with_band_count(192)
    }

    /// NV NR band preference (SA or NSA), open-ended
    pub fn nv_nr() -> Self {
        Self::new(Rat::Nr, 8, 1, IndexBase::ZeroBased)
    }

    /// Runtime band-capability log, 32-bit hex words
    pub fn log_hex_words(rat: Rat) -> Self {
        Self::new(rat, 32, 1, IndexBase::ZeroBased)
    }

    /// Inclusive canonical band range, when bounded
    pub fn coverage(&self) -> Option<(u32, u32)> {
        self.band_count
            .filter(|count| *count > 0)
            .map(|count| (self.range_start, self.range_start + count - 1))
    }

    fn expected_words(&self, band_count: u32) -> usize {
        let slots = self.index_base.slots_for(band_count);
        let width = self.word_bit_width as u64;
        ((slots + width - 1) / width) as usize
    }
}

/// Decode a word sequence into the set of enabled bands.
///
/// Bit `p` of word `w` has raw ordinal `w * width + p`; the layout's
/// index base and range start map that ordinal to a canonical number.
pub fn decode(words: &[u64], layout: &BitmaskLayout) -> DecodeResult<BTreeSet<Band>> {
    let width = layout.word_bit_width;
    if width == 0 || width > 64 {
        return Err(DecodeError::UnsupportedWidth(width));
    }

    if let Some(count) = layout.band_count {
        let expected = layout.expected_words(count);
        if words.len() != expected {
            return Err(DecodeError::RangeWidthMismatch {
                expected,
                actual: words.len(),
            });
        }
    }

    let upper = layout
        .band_count
        .map(|count| layout.range_start as u64 + count as u64);

    let mut bands = BTreeSet::new();
    for (index, &value) in words.iter().enumerate() {
        if width < 64 && value >> width != 0 {
            return Err(DecodeError::WordOverflow { index, value, width });
        }

        for bit in 0..width {
            if value & (1u64 << bit) == 0 {
                continue;
            }
            let ordinal = (index * width + bit) as u64;
            let number = layout.index_base.to_canonical(layout.range_start, ordinal)?;

            let out_of_range = match upper {
                Some(limit) => number as u64 >= limit,
                None => false,
            };
            if out_of_range || number < layout.range_start {
                return Err(DecodeError::BitOutOfRange {
                    ordinal,
                    number: number as u64,
                });
            }

            bands.insert(Band::new(layout.rat, number));
        }
    }

    Ok(bands)
}
