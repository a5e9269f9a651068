//! EFS capability control files
//!
//! Besides the `prune_ca_combos` list (see [`crate::prune`]) the modem
//! file system carries small control files that switch whole combo
//! families off:
//!
//! - `ca_disable`: one byte, non-zero disables LTE CA
//! - `cap_control_nrca_enabled` / `cap_control_nrdc_enabled`: one byte,
//!   zero disables NR CA / NR-DC
//! - `disable_4l_per_band`: LTE bands limited to two DL layers, either as
//!   decimal band numbers one per line or as a bitmap (bit 0 = band 1)

use crate::bitmask::{self, BitmaskLayout, IndexBase};
use crate::model::{Band, Rat};
use crate::{DecodeError, DecodeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// File name of the software prune list
pub const PRUNE_FILE: &str = "prune_ca_combos";

/// Directories, relative to an EFS root, holding the LTE capability files
pub const LTE_CAP_DIRS: [&str; 4] = [
    "nv/item_files/modem/lte/rrc/cap",
    "modem/lte/rrc/cap",
    "lte/rrc/cap",
    "",
];

/// Directories, relative to an EFS root, holding the NR RRC control files
pub const NR_RRC_DIRS: [&str; 4] = [
    "nv/item_files/modem/nr5g/rrc",
    "modem/nr5g/rrc",
    "nr5g/rrc",
    "",
];

/// Bands addressable by the `disable_4l_per_band` bitmap
const DISABLE_4L_BAND_COUNT: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlFile {
    CaDisable,
    #[serde(rename = "disable_4l_per_band")]
    Disable4lPerBand,
    CapControlNrcaEnabled,
    CapControlNrdcEnabled,
}

impl ControlFile {
    pub const ALL: [ControlFile; 4] = [
        ControlFile::CaDisable,
        ControlFile::Disable4lPerBand,
        ControlFile::CapControlNrcaEnabled,
        ControlFile::CapControlNrdcEnabled,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            ControlFile::CaDisable => "ca_disable",
            ControlFile::Disable4lPerBand => "disable_4l_per_band",
            ControlFile::CapControlNrcaEnabled => "cap_control_nrca_enabled",
            ControlFile::CapControlNrdcEnabled => "cap_control_nrdc_enabled",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.file_name() == name)
    }

    /// Where to look for the file, most specific first
    pub fn search_dirs(&self) -> &'static [&'static str] {
        match self {
            ControlFile::CaDisable | ControlFile::Disable4lPerBand => &LTE_CAP_DIRS,
            ControlFile::CapControlNrcaEnabled | ControlFile::CapControlNrdcEnabled => &NR_RRC_DIRS,
        }
    }
}

/// Combined state of the control files of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EfsControls {
    pub ca_disabled: bool,
    pub nrca_enabled: bool,
    pub nrdc_enabled: bool,
    pub disabled_4l_bands: BTreeSet<Band>,
    /// Files that contributed to this state
    pub files: BTreeSet<ControlFile>,
}

impl Default for EfsControls {
    fn default() -> Self {
        Self {
            ca_disabled: false,
            nrca_enabled: true,
            nrdc_enabled: true,
            disabled_4l_bands: BTreeSet::new(),
            files: BTreeSet::new(),
        }
    }
}

impl EfsControls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one control file's contents into the state
    pub fn apply(&mut self, file: ControlFile, data: &[u8]) -> DecodeResult<()> {
        match file {
            ControlFile::CaDisable => self.ca_disabled = parse_flag(data),
            ControlFile::CapControlNrcaEnabled => self.nrca_enabled = parse_flag(data),
            ControlFile::CapControlNrdcEnabled => self.nrdc_enabled = parse_flag(data),
            ControlFile::Disable4lPerBand => {
                self.disabled_4l_bands.extend(parse_disable_4l_per_band(data)?)
            }
        }
        self.files.insert(file);
        Ok(())
    }

    pub fn with(mut self, file: ControlFile, data: &[u8]) -> DecodeResult<Self> {
        self.apply(file, data)?;
        Ok(self)
    }

    /// True when no file changed the defaults
    pub fn is_default(&self) -> bool {
        !self.ca_disabled
            && self.nrca_enabled
            && self.nrdc_enabled
            && self.disabled_4l_bands.is_empty()
    }
}

/// A one-byte flag file; an empty file reads as zero
pub fn parse_flag(data: &[u8]) -> bool {
    data.first().map_or(false, |b| *b != 0)
}

/// Band numbers as text lines, if the whole file reads that way
fn band_lines(data: &[u8]) -> Option<DecodeResult<BTreeSet<Band>>> {
    let text = std::str::from_utf8(data).ok()?;
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() || !lines.iter().all(|l| l.chars().all(|c| c.is_ascii_digit())) {
        return None;
    }

    Some(
        lines
            .into_iter()
            .map(|line| match line.parse::<u32>() {
                Ok(number) if number > 0 => Ok(Band::lte(number)),
                _ => Err(DecodeError::InvalidWord(line.to_string())),
            })
            .collect(),
    )
}

/// LTE bands listed in `disable_4l_per_band`
pub fn parse_disable_4l_per_band(data: &[u8]) -> DecodeResult<BTreeSet<Band>> {
    if let Some(bands) = band_lines(data) {
        return bands;
    }

    let layout = BitmaskLayout::new(Rat::Lte, 8, 1, IndexBase::ZeroBased);
    let max_bytes = (DISABLE_4L_BAND_COUNT / 8) as usize;
    if data.len() > max_bytes {
        return Err(DecodeError::RangeWidthMismatch {
            expected: max_bytes,
            actual: data.len(),
        });
    }
    let words: Vec<u64> = data.iter().map(|b| *b as u64).collect();
    bitmask::decode(&words, &layout)
}
