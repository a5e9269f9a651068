//! Software prune list parsing
//!
//! Entries look like `1A-3A-0;` where the optional trailing number is the
//! bandwidth combination set. Entries may share a line or sit one per
//! line; `#` starts a comment line.

use crate::model::Combo;
use crate::{notation, Parsed};
use serde::{Deserialize, Serialize};

/// One pruned combo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrunedEntry {
    pub combo: Combo,
    /// Bandwidth combination set, when the entry names one
    pub bcs: Option<u32>,
}

impl PrunedEntry {
    pub fn key(&self) -> &str {
        self.combo.canonical_key()
    }
}

/// Split a trailing `-<digits>` BCS suffix off an entry
pub fn split_bcs(entry: &str) -> (&str, Option<u32>) {
    if let Some((head, tail)) = entry.rsplit_once('-') {
        if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) {
            return (head, tail.parse().ok());
        }
    }
    (entry, None)
}

/// Parse a prune list; failures are reported with their line number
pub fn parse_prune_list(text: &str, source_tag: &str) -> Parsed<PrunedEntry> {
    let mut parsed = Parsed::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        for entry in line.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (combo_text, bcs) = split_bcs(entry);
            let result = notation::parse_tagged(combo_text, source_tag)
                .map(|combo| PrunedEntry { combo, bcs });
            parsed.push(index + 1, result);
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParseError;

    #[test]
    fn test_entries_with_and_without_bcs() {
        let parsed = parse_prune_list("1A-3A-0;3a-1a;66A-71A-2;\n", "efs");
        assert!(parsed.is_clean());
        let entries: Vec<(&str, Option<u32>)> =
            parsed.items.iter().map(|e| (e.key(), e.bcs)).collect();
        assert_eq!(
            entries,
            vec![("1A-3A", Some(0)), ("1A-3A", None), ("66A-71A", Some(2))]
        );
    }

    #[test]
    fn test_comments_and_bad_entries() {
        let text = "# pruned for carrier X\n7A-20A-1;\nQ1A-3A;\n";
        let parsed = parse_prune_list(text, "efs");
        assert_eq!(parsed.items.len(), 1);
        assert_eq!(parsed.items[0].key(), "7A-20A");
        assert_eq!(parsed.failures.len(), 1);
        assert_eq!(parsed.failures[0].line, 3);
        assert!(matches!(parsed.failures[0].error, ParseError::UnknownRat { .. }));
    }

    #[test]
    fn test_bcs_only_entry_rejected() {
        let parsed = parse_prune_list("-0;", "efs");
        assert_eq!(parsed.failures.len(), 1);
    }
}
