use std::path::Path;

use serde::{Deserialize, Serialize};

/// Column names written by the result writer and read by the `generic` preset.
pub const PEPTIDE_COL: &str = "peptide";
pub const ALLELE_COL: &str = "allele";
pub const SAMPLE_COL: &str = "sample_id";
pub const SCORE_COL: &str = "binding_score";
pub const GENE_COL: &str = "gene_id";

// ---------------------------------------------------------------------------
// Layout / presets
// ---------------------------------------------------------------------------

/// How predictions are laid out in a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// One prediction per row.
    Long,
    /// One peptide per row, one score column per allele.
    Wide,
}

/// Known predictor output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    /// `peptide`, `allele`, `sample_id`, `binding_score`, `gene_id`.
    Generic,
    /// mhcflurry-predict CSV output.
    Mhcflurry,
    /// FRED2 epitope prediction table (allele scores as columns).
    Fred2,
}

// ---------------------------------------------------------------------------
// RecordSchema
// ---------------------------------------------------------------------------

/// Declares where each [`PeptideRecord`](super::model::PeptideRecord) field
/// lives in an input table. Columns are matched by (trimmed) header name, so
/// column order does not matter and unknown columns are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordSchema {
    pub layout: Layout,
    /// Field delimiter. `None` infers from the file extension.
    pub delimiter: Option<char>,
    pub peptide_column: String,
    pub allele_column: Option<String>,
    pub sample_column: Option<String>,
    /// Score column (long layout only).
    pub score_column: String,
    pub gene_column: Option<String>,
    /// Allele used when the table has no allele column.
    pub fixed_allele: Option<String>,
    /// Sample used when the table has no sample column. Defaults to the file stem.
    pub fixed_sample: Option<String>,
    /// Non-allele columns of a wide table.
    pub ignored_columns: Vec<String>,
}

impl Default for RecordSchema {
    fn default() -> Self {
        RecordSchema::preset(Preset::Generic)
    }
}

impl RecordSchema {
    pub fn preset(preset: Preset) -> Self {
        match preset {
            Preset::Generic => RecordSchema {
                layout: Layout::Long,
                delimiter: None,
                peptide_column: PEPTIDE_COL.to_string(),
                allele_column: Some(ALLELE_COL.to_string()),
                sample_column: Some(SAMPLE_COL.to_string()),
                score_column: SCORE_COL.to_string(),
                gene_column: Some(GENE_COL.to_string()),
                fixed_allele: None,
                fixed_sample: None,
                ignored_columns: Vec::new(),
            },
            Preset::Mhcflurry => RecordSchema {
                layout: Layout::Long,
                delimiter: Some(','),
                peptide_column: "peptide".to_string(),
                allele_column: Some("allele".to_string()),
                sample_column: None,
                score_column: "mhcflurry_presentation_score".to_string(),
                gene_column: None,
                fixed_allele: None,
                fixed_sample: None,
                ignored_columns: Vec::new(),
            },
            Preset::Fred2 => RecordSchema {
                layout: Layout::Wide,
                delimiter: Some('\t'),
                peptide_column: "Sequence".to_string(),
                allele_column: None,
                sample_column: None,
                score_column: String::new(),
                gene_column: Some("Antigen ID".to_string()),
                fixed_allele: None,
                fixed_sample: None,
                ignored_columns: vec!["Method".to_string(), "Variants".to_string()],
            },
        }
    }

    /// Delimiter for `path`: the declared one, else `,` for `.csv` and tab
    /// for everything else.
    pub fn delimiter_for(&self, path: &Path) -> u8 {
        match self.delimiter.and_then(|d| u8::try_from(d).ok()) {
            Some(d) => d,
            None => delimiter_from_extension(path),
        }
    }

    /// Sample id for rows of `path` that carry none.
    pub fn sample_for(&self, path: &Path) -> String {
        self.fixed_sample.clone().unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("sample")
                .to_string()
        })
    }
}

pub fn delimiter_from_extension(path: &Path) -> u8 {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext == "csv" {
        b','
    } else {
        b'\t'
    }
}
