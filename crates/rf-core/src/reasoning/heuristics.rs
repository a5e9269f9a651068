//! Built-in band heuristics, used when no rule base entry matches

use once_cell::sync::Lazy;
use rf_parsers::{Band, Rat};

pub struct BandHeuristic {
    pub name: &'static str,
    pub matches: fn(&Band) -> bool,
    pub explanation: &'static str,
    pub action: &'static str,
}

static HEURISTICS: Lazy<Vec<BandHeuristic>> = Lazy::new(|| {
    vec![
        BandHeuristic {
            name: "mmwave",
            matches: |band| band.rat == Rat::Nr && band.number >= 257,
            explanation: "mmWave band needs dedicated antenna modules and is usually limited to specific SKUs",
            action: "Verify mmWave support for the target market",
        },
        BandHeuristic {
            name: "public_safety",
            matches: |band| band.number == 14,
            explanation: "band 14 is reserved for public-safety (FirstNet) use in the US",
            action: "Verify public-safety enablement for the target carrier",
        },
        BandHeuristic {
            name: "band_71",
            matches: |band| band.number == 71,
            explanation: "600 MHz band 71 is typically enabled for specific carriers only",
            action: "Verify carrier requirements",
        },
        BandHeuristic {
            name: "unlicensed",
            matches: |band| match band.rat {
                Rat::Lte => band.number == 46,
                Rat::Nr => band.number == 46 || band.number == 96,
            },
            explanation: "unlicensed spectrum, availability depends on LAA/NR-U enablement",
            action: "Verify unlicensed access is enabled for the build",
        },
    ]
});

/// First heuristic matching the band
pub fn lookup(band: &Band) -> Option<&'static BandHeuristic> {
    HEURISTICS.iter().find(|h| (h.matches)(band))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup(&Band::nr(260)).map(|h| h.name), Some("mmwave"));
        assert_eq!(lookup(&Band::nr(257)).map(|h| h.name), Some("mmwave"));
        assert_eq!(lookup(&Band::lte(14)).map(|h| h.name), Some("public_safety"));
        assert_eq!(lookup(&Band::nr(71)).map(|h| h.name), Some("band_71"));
        assert_eq!(lookup(&Band::nr(96)).map(|h| h.name), Some("unlicensed"));
        assert!(lookup(&Band::lte(96)).is_none());
        assert!(lookup(&Band::nr(78)).is_none());
    }
}
