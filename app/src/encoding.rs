// ==============================================================================
// encoding.rs - Transport Encoding of Tabix Artifacts
// ==============================================================================
// Description: Base64 encoding of a bgzipped subset and its .tbi index for
//              downstream stores that only accept text
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================
// Sidecar: <artifact>.gz.b64.json
//   { "data_file": "...gz", "index_file": "...gz.tbi",
//     "data_base64": "...", "index_base64": "...",
//     "data_sha256": "...", "index_sha256": "...", "encoded_at": "..." }
// ==============================================================================

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::validator::compute_sha256;

/// Text-safe copy of a compressed artifact and its positional index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedArtifact {
    pub data_file: String,
    pub index_file: String,
    pub data_base64: String,
    pub index_base64: String,
    pub data_sha256: String,
    pub index_sha256: String,
    pub encoded_at: DateTime<Utc>,
}

impl EncodedArtifact {
    /// Read both files and encode them (standard alphabet, padded)
    pub fn from_files(data_path: &Path, index_path: &Path) -> Result<Self> {
        let data = std::fs::read(data_path)
            .with_context(|| format!("Failed to read artifact {:?}", data_path))?;
        let index = std::fs::read(index_path)
            .with_context(|| format!("Failed to read index {:?}", index_path))?;

        Ok(Self {
            data_file: file_name_string(data_path),
            index_file: file_name_string(index_path),
            data_base64: STANDARD.encode(&data),
            index_base64: STANDARD.encode(&index),
            data_sha256: compute_sha256(&data),
            index_sha256: compute_sha256(&index),
            encoded_at: Utc::now(),
        })
    }

    /// Sidecar path for an artifact: `<artifact>.b64.json`
    pub fn sidecar_path(data_path: &Path) -> PathBuf {
        let mut name = data_path.as_os_str().to_os_string();
        name.push(".b64.json");
        PathBuf::from(name)
    }

    pub fn write_sidecar(&self, path: &Path) -> Result<PathBuf> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create encoding sidecar {:?}", path))?;
        serde_json::to_writer(file, self).context("Failed to write encoding sidecar")?;
        Ok(path.to_path_buf())
    }
}

fn file_name_string(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_encode_matches_standard_base64() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("height.UKBB.mrmega_pval_up_to_0.1.gz");
        let index = dir.path().join("height.UKBB.mrmega_pval_up_to_0.1.gz.tbi");
        std::fs::write(&data, b"hello").unwrap();
        std::fs::write(&index, [0u8, 255, 1]).unwrap();

        let encoded = EncodedArtifact::from_files(&data, &index).unwrap();

        assert_eq!(encoded.data_file, "height.UKBB.mrmega_pval_up_to_0.1.gz");
        assert_eq!(encoded.index_file, "height.UKBB.mrmega_pval_up_to_0.1.gz.tbi");
        assert_eq!(encoded.data_base64, "aGVsbG8=");
        assert_eq!(encoded.index_base64, "AP8B");

        assert_eq!(STANDARD.decode(&encoded.data_base64).unwrap(), b"hello");
        assert_eq!(encoded.data_sha256, compute_sha256(b"hello"));
        assert_eq!(encoded.index_sha256, compute_sha256(&[0u8, 255, 1]));
    }

    #[test]
    fn test_sidecar_written() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("a.gz");
        let index = dir.path().join("a.gz.tbi");
        std::fs::write(&data, b"payload").unwrap();
        std::fs::write(&index, b"index").unwrap();

        let encoded = EncodedArtifact::from_files(&data, &index).unwrap();
        let sidecar = EncodedArtifact::sidecar_path(&data);
        assert_eq!(sidecar, dir.path().join("a.gz.b64.json"));

        encoded.write_sidecar(&sidecar).unwrap();
        let parsed: EncodedArtifact =
            serde_json::from_str(&std::fs::read_to_string(&sidecar).unwrap()).unwrap();
        assert_eq!(parsed, encoded);
    }
}
