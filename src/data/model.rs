use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PeptideRecord – one prediction (peptide × allele × sample)
// ---------------------------------------------------------------------------

/// A single binding prediction, one row of a predictor's output.
#[derive(Debug, Clone, PartialEq)]
pub struct PeptideRecord {
    /// Amino-acid sequence, upper-cased.
    pub peptide: String,
    /// HLA allele name as written by the predictor.
    pub allele: String,
    pub sample_id: String,
    /// Predicted binding score; finite and never negative.
    pub binding_score: f64,
    /// Gene / transcript the peptide was derived from, if known.
    pub source_gene_id: Option<String>,
}

/// Unique key of a [`PeptideRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub peptide: String,
    pub allele: String,
    pub sample_id: String,
}

impl PeptideRecord {
    /// Build a record, normalising and validating every field.
    ///
    /// The error string is the human-readable reason used in
    /// `MalformedRecord` errors.
    pub fn new(
        peptide: &str,
        allele: &str,
        sample_id: &str,
        binding_score: f64,
        source_gene_id: Option<&str>,
    ) -> Result<Self, String> {
        let peptide = normalize_peptide(peptide)?;
        let allele = allele.trim();
        if allele.is_empty() {
            return Err("empty allele".to_string());
        }
        let sample_id = sample_id.trim();
        if sample_id.is_empty() {
            return Err("empty sample id".to_string());
        }
        check_score(binding_score)?;

        let source_gene_id = source_gene_id
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string);

        Ok(PeptideRecord {
            peptide,
            allele: allele.to_string(),
            sample_id: sample_id.to_string(),
            binding_score,
            source_gene_id,
        })
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            peptide: self.peptide.clone(),
            allele: self.allele.clone(),
            sample_id: self.sample_id.clone(),
        }
    }

    /// Output order: peptide, then allele, then sample id.
    pub fn cmp_output_order(&self, other: &Self) -> Ordering {
        self.peptide
            .cmp(&other.peptide)
            .then_with(|| self.allele.cmp(&other.allele))
            .then_with(|| self.sample_id.cmp(&other.sample_id))
    }
}

/// Trim and upper-case a peptide, rejecting anything that is not letters.
pub fn normalize_peptide(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty peptide".to_string());
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!("peptide '{trimmed}' contains non-letter characters"));
    }
    Ok(trimmed.to_ascii_uppercase())
}

fn check_score(score: f64) -> Result<(), String> {
    if !score.is_finite() {
        return Err(format!("score {score} is not finite"));
    }
    if score < 0.0 {
        return Err(format!("score {score} is negative"));
    }
    Ok(())
}

/// Parse a score cell.
pub fn parse_score(raw: &str) -> Result<f64, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("missing score".to_string());
    }
    let score = raw
        .parse::<f64>()
        .map_err(|_| format!("score '{raw}' is not a number"))?;
    check_score(score)?;
    Ok(score)
}

// ---------------------------------------------------------------------------
// MhcClass
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MhcClass {
    ClassI,
    ClassII,
}

impl MhcClass {
    /// Classify an allele by name: `HLA-A/B/C*` is Class I, `HLA-DP/DQ/DR*`
    /// is Class II. Matching is case-insensitive.
    pub fn of_allele(allele: &str) -> Option<MhcClass> {
        let upper = allele.trim().to_ascii_uppercase();
        let rest = upper.strip_prefix("HLA-")?;
        let mut chars = rest.chars();
        match (chars.next(), chars.next()) {
            (Some('A' | 'B' | 'C'), _) => Some(MhcClass::ClassI),
            (Some('D'), Some('P' | 'Q' | 'R')) => Some(MhcClass::ClassII),
            _ => None,
        }
    }

    /// File-name fragment for this class.
    pub fn file_tag(self) -> &'static str {
        match self {
            MhcClass::ClassI => "class_i",
            MhcClass::ClassII => "class_ii",
        }
    }
}

impl fmt::Display for MhcClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MhcClass::ClassI => write!(f, "Class I"),
            MhcClass::ClassII => write!(f, "Class II"),
        }
    }
}

// ---------------------------------------------------------------------------
// SampleMetadata – one samplesheet row
// ---------------------------------------------------------------------------

/// Per-sample metadata. Read once from the samplesheet and only ever used to
/// pick an output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub sample_id: String,
    pub condition: String,
    pub condition_group: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peptide_is_upper_cased_and_trimmed() {
        let rec = PeptideRecord::new(" aaaggg ", "HLA-A*02:01", "s1", 0.9, None).unwrap();
        assert_eq!(rec.peptide, "AAAGGG");
    }

    #[test]
    fn rejects_bad_peptides_and_scores() {
        assert!(PeptideRecord::new("", "HLA-A*02:01", "s1", 0.1, None).is_err());
        assert!(PeptideRecord::new("AAG-K", "HLA-A*02:01", "s1", 0.1, None).is_err());
        assert!(PeptideRecord::new("AAGK", "HLA-A*02:01", "s1", -0.1, None).is_err());
        assert!(PeptideRecord::new("AAGK", "HLA-A*02:01", "s1", f64::NAN, None).is_err());
        assert!(PeptideRecord::new("AAGK", "", "s1", 0.1, None).is_err());
    }

    #[test]
    fn blank_gene_id_becomes_none() {
        let rec = PeptideRecord::new("AAGK", "HLA-A*02:01", "s1", 0.1, Some("  ")).unwrap();
        assert_eq!(rec.source_gene_id, None);
    }

    #[test]
    fn parse_score_reports_reason() {
        assert_eq!(parse_score("0.25"), Ok(0.25));
        assert_eq!(parse_score(""), Err("missing score".to_string()));
        assert!(parse_score("high").unwrap_err().contains("not a number"));
    }

    #[test]
    fn allele_classes() {
        assert_eq!(MhcClass::of_allele("HLA-A*02:01"), Some(MhcClass::ClassI));
        assert_eq!(MhcClass::of_allele("HLA-C*07:02"), Some(MhcClass::ClassI));
        assert_eq!(MhcClass::of_allele("hla-b*07:02"), Some(MhcClass::ClassI));
        assert_eq!(MhcClass::of_allele("HLA-DRB1*01:01"), Some(MhcClass::ClassII));
        assert_eq!(MhcClass::of_allele("HLA-DQA1*01:02"), Some(MhcClass::ClassII));
        assert_eq!(MhcClass::of_allele("HLA-DPB1*04:01"), Some(MhcClass::ClassII));
        assert_eq!(MhcClass::of_allele("HLA-DMA*01:01"), None);
        assert_eq!(MhcClass::of_allele("XYZ"), None);
        assert_eq!(MhcClass::of_allele("H-2-Kb"), None);
    }
}
