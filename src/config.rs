//! JSON configuration file for the whole tool.
//!
//! ```json
//! {
//!   "hasher": {
//!     "chunker": { "min_chunk": 2048, "max_chunk": 65536, "window_size": 64, "trigger_bits": 13 },
//!     "digest": "blake3",
//!     "metric": "sequence",
//!     "allow_empty": true
//!   },
//!   "consolidate": { "threshold": 0.8, "mode": "manual" },
//!   "scan_threshold": 0.5
//! }
//! ```
//!
//! Every field is optional and falls back to its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consolidate::ConsolidateConfig;
use crate::error::{GlacierError, Result};
use crate::hasher::HasherConfig;
use crate::scan::DEFAULT_SCAN_THRESHOLD;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlacierConfig {
    pub hasher: HasherConfig,
    pub consolidate: ConsolidateConfig,
    pub scan_threshold: f64,
}

impl Default for GlacierConfig {
    fn default() -> Self {
        Self {
            hasher: HasherConfig::default(),
            consolidate: ConsolidateConfig::default(),
            scan_threshold: DEFAULT_SCAN_THRESHOLD,
        }
    }
}

impl GlacierConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GlacierError::config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
            .map_err(|e| GlacierError::config(format!("{}: {e}", path.display())))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: GlacierConfig = serde_json::from_str(json)
            .map_err(|e| GlacierError::config(format!("failed to parse JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.hasher.chunker.validate()?;
        self.consolidate.validate()?;
        if !(self.scan_threshold > 0.0 && self.scan_threshold <= 1.0) {
            return Err(GlacierError::config(format!(
                "scan_threshold must be in (0, 1], got {}",
                self.scan_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::ConsolidateMode;
    use crate::digest::DigestKind;
    use crate::similarity::SimilarityMetric;

    #[test]
    fn empty_object_is_default() {
        assert_eq!(GlacierConfig::from_json("{}").unwrap(), GlacierConfig::default());
    }

    #[test]
    fn partial_override() {
        let config = GlacierConfig::from_json(
            r#"{
                "hasher": { "chunker": { "min_chunk": 512 }, "digest": "poly31", "metric": "jaccard" },
                "consolidate": { "mode": "auto" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.hasher.chunker.min_chunk, 512);
        assert_eq!(config.hasher.chunker.max_chunk, 65536);
        assert_eq!(config.hasher.digest, DigestKind::Poly31);
        assert_eq!(config.hasher.metric, SimilarityMetric::Jaccard);
        assert_eq!(config.consolidate.mode, ConsolidateMode::Auto);
        assert_eq!(config.consolidate.threshold, 0.8);
        assert_eq!(config.scan_threshold, 0.5);
    }

    #[test]
    fn invalid_values_rejected() {
        for json in [
            r#"{ "hasher": { "chunker": { "min_chunk": 9000, "max_chunk": 4096 } } }"#,
            r#"{ "consolidate": { "threshold": 1.5 } }"#,
            r#"{ "scan_threshold": 0 }"#,
            r#"{ "hasher": "#,
        ] {
            assert!(matches!(GlacierConfig::from_json(json), Err(GlacierError::Config(_))), "{json}");
        }
    }

    #[test]
    fn reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glacier.json");
        std::fs::write(&path, r#"{ "scan_threshold": 0.75 }"#).unwrap();
        assert_eq!(GlacierConfig::from_json_file(&path).unwrap().scan_threshold, 0.75);

        let err = GlacierConfig::from_json_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }
}
