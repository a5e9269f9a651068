//! Source document fingerprints

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One supplied document, as listed in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub name: String,
    /// Role the document played in the run (stage or combo role)
    pub role: String,
    pub sha256: String,
    pub byte_len: usize,
}

impl SourceDocument {
    pub fn fingerprint(name: impl Into<String>, role: impl Into<String>, text: &str) -> Self {
        Self::fingerprint_bytes(name, role, text.as_bytes())
    }

    /// Fingerprint of a binary document such as an EFS control file
    pub fn fingerprint_bytes(name: impl Into<String>, role: impl Into<String>, data: &[u8]) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            sha256: sha256_hex(data),
            byte_len: data.len(),
        }
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint() {
        let doc = SourceDocument::fingerprint("nv_65633", "NVPref", "abc");
        assert_eq!(
            doc.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(doc.byte_len, 3);
        assert_eq!(doc.role, "NVPref");

        let control = SourceDocument::fingerprint_bytes("ca_disable", "control", &[1]);
        assert_eq!(control.byte_len, 1);
        assert_eq!(control.sha256, sha256_hex(&[1]));
    }
}
