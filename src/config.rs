use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::filter::LengthWindow;
use crate::data::idmap::AmbiguityPolicy;
use crate::data::schema::RecordSchema;
use crate::error::{PipelineError, Result};
use crate::tool::ToolConfig;

pub const DEFAULT_MAX_MALFORMED_RATIO: f64 = 0.5;
pub const DEFAULT_PREFIX: &str = "predictions";

/// Run configuration. Every field has a default, so a JSON config file only
/// needs the keys it changes; command line flags are applied on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Layout of the prediction tables.
    pub schema: RecordSchema,
    /// Abort a file when more than this share of its rows is malformed.
    pub max_malformed_ratio: f64,
    pub ambiguity: AmbiguityPolicy,
    pub lengths: LengthWindow,
    /// Add a `gene_id` column to the Class II table.
    pub class_ii_gene_ids: bool,
    /// File name prefix of every output.
    pub output_prefix: String,
    /// Worker threads for per-file reads; `None` lets rayon decide.
    pub threads: Option<usize>,
    /// Predictor to run over each input before reading its output.
    pub predictor: Option<ToolConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            schema: RecordSchema::default(),
            max_malformed_ratio: DEFAULT_MAX_MALFORMED_RATIO,
            ambiguity: AmbiguityPolicy::default(),
            lengths: LengthWindow::default(),
            class_ii_gene_ids: false,
            output_prefix: DEFAULT_PREFIX.to_string(),
            threads: None,
            predictor: None,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(PipelineError::Config(msg));

        if !(0.0..=1.0).contains(&self.max_malformed_ratio) {
            return bad(format!(
                "max_malformed_ratio must be within [0, 1], got {}",
                self.max_malformed_ratio
            ));
        }
        if let (Some(min), Some(max)) = (self.lengths.min, self.lengths.max) {
            if min > max {
                return bad(format!("minimum peptide length {min} exceeds maximum {max}"));
            }
        }
        if self.output_prefix.is_empty()
            || self.output_prefix.contains(['/', '\\'])
        {
            return bad(format!("invalid output prefix '{}'", self.output_prefix));
        }
        if let Some(d) = self.schema.delimiter {
            if !d.is_ascii() {
                return bad(format!("delimiter must be a single ASCII character, got {d:?}"));
            }
        }
        if self.threads == Some(0) {
            return bad("threads must be at least 1".to_string());
        }
        if let Some(tool) = &self.predictor {
            tool.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::Layout;

    #[test]
    fn empty_json_is_the_default() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.max_malformed_ratio, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_overrides() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{
                "max_malformed_ratio": 0.1,
                "ambiguity": "keep-all",
                "lengths": {"min": 8, "max": 11},
                "schema": {"layout": "wide", "peptide_column": "Sequence"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_malformed_ratio, 0.1);
        assert_eq!(config.ambiguity, AmbiguityPolicy::KeepAll);
        assert_eq!(config.lengths, LengthWindow::new(Some(8), Some(11)));
        assert_eq!(config.schema.layout, Layout::Wide);
        assert_eq!(config.output_prefix, DEFAULT_PREFIX);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<PipelineConfig>(r#"{"max_malformed": 0.1}"#).is_err());
    }

    #[test]
    fn validation() {
        let mut config = PipelineConfig {
            max_malformed_ratio: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.max_malformed_ratio = 0.5;
        config.lengths = LengthWindow::new(Some(12), Some(8));
        assert!(config.validate().is_err());

        config.lengths = LengthWindow::default();
        config.output_prefix = "../x".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = PipelineConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("cfg.json"));
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"schema": {"delimiter": "Ĭ"}}"#).unwrap();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let config: PipelineConfig =
            serde_json::from_str(r#"{"schema": {"delimiter": ";"}}"#).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.schema.delimiter_for(Path::new("x.csv")), b';');
    }
}
