use std::borrow::Cow;
use std::collections::BTreeMap;

use super::model::{MhcClass, PeptideRecord};
use super::schema::{ALLELE_COL, GENE_COL, PEPTIDE_COL, SAMPLE_COL, SCORE_COL};
use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Output columns
// ---------------------------------------------------------------------------

/// A column of a result file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Peptide,
    Allele,
    Sample,
    Score,
    Gene,
}

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::Peptide => PEPTIDE_COL,
            Column::Allele => ALLELE_COL,
            Column::Sample => SAMPLE_COL,
            Column::Score => SCORE_COL,
            Column::Gene => GENE_COL,
        }
    }

    /// Cell text. Scores use the shortest representation that parses back
    /// to the same `f64`.
    pub fn value(self, rec: &PeptideRecord) -> Cow<'_, str> {
        match self {
            Column::Peptide => Cow::Borrowed(&rec.peptide),
            Column::Allele => Cow::Borrowed(&rec.allele),
            Column::Sample => Cow::Borrowed(&rec.sample_id),
            Column::Score => Cow::Owned(rec.binding_score.to_string()),
            Column::Gene => Cow::Borrowed(rec.source_gene_id.as_deref().unwrap_or("")),
        }
    }
}

/// Column layout for one class. Class I always carries the gene; Class II only
/// when asked to.
pub fn output_columns(class: MhcClass, class_ii_gene_ids: bool) -> Vec<Column> {
    let mut columns = vec![Column::Peptide, Column::Allele, Column::Sample, Column::Score];
    if class == MhcClass::ClassI || class_ii_gene_ids {
        columns.push(Column::Gene);
    }
    columns
}

// ---------------------------------------------------------------------------
// ClassAggregator
// ---------------------------------------------------------------------------

/// Merged records split by MHC class.
#[derive(Debug, Default)]
pub struct ClassPartition {
    pub class_i: Vec<PeptideRecord>,
    pub class_ii: Vec<PeptideRecord>,
    /// Excluded alleles and how many records carried each.
    pub unknown: BTreeMap<String, usize>,
}

impl ClassPartition {
    pub fn get(&self, class: MhcClass) -> &[PeptideRecord] {
        match class {
            MhcClass::ClassI => &self.class_i,
            MhcClass::ClassII => &self.class_ii,
        }
    }

    pub fn unknown_records(&self) -> usize {
        self.unknown.values().sum()
    }
}

/// Route each record to Class I or Class II by allele name. Records whose
/// allele belongs to neither are dropped, counted and logged once per allele.
pub fn partition_by_class<I>(records: I) -> ClassPartition
where
    I: IntoIterator<Item = PeptideRecord>,
{
    let mut out = ClassPartition::default();
    for rec in records {
        match MhcClass::of_allele(&rec.allele) {
            Some(MhcClass::ClassI) => out.class_i.push(rec),
            Some(MhcClass::ClassII) => out.class_ii.push(rec),
            None => *out.unknown.entry(rec.allele).or_default() += 1,
        }
    }

    for (allele, count) in &out.unknown {
        let err = PipelineError::UnknownAlleleClass {
            allele: allele.clone(),
        };
        log::warn!("{err}; excluded {count} records");
    }

    log::info!(
        "{} Class I and {} Class II records, {} excluded",
        out.class_i.len(),
        out.class_ii.len(),
        out.unknown_records()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(allele: &str) -> PeptideRecord {
        PeptideRecord::new("SIINFEKL", allele, "s1", 0.5, Some("G1")).unwrap()
    }

    #[test]
    fn routes_by_allele() {
        let part = partition_by_class(vec![
            rec("HLA-DRB1*01:01"),
            rec("HLA-A*02:01"),
            rec("XYZ"),
            rec("XYZ"),
            rec("HLA-B*07:02"),
        ]);
        assert_eq!(part.class_i.len(), 2);
        assert_eq!(part.class_ii.len(), 1);
        assert_eq!(part.class_ii[0].allele, "HLA-DRB1*01:01");
        assert_eq!(part.unknown.get("XYZ"), Some(&2));
        assert_eq!(part.unknown_records(), 2);
        assert_eq!(part.get(MhcClass::ClassI)[0].allele, "HLA-A*02:01");
    }

    #[test]
    fn class_shapes() {
        let names = |cols: Vec<Column>| cols.into_iter().map(Column::name).collect::<Vec<_>>();
        assert_eq!(
            names(output_columns(MhcClass::ClassI, false)),
            ["peptide", "allele", "sample_id", "binding_score", "gene_id"]
        );
        assert_eq!(
            names(output_columns(MhcClass::ClassII, false)),
            ["peptide", "allele", "sample_id", "binding_score"]
        );
        assert_eq!(output_columns(MhcClass::ClassII, true).len(), 5);
    }

    #[test]
    fn cell_values() {
        let mut r = rec("HLA-A*02:01");
        r.binding_score = 0.1 + 0.2;
        assert_eq!(Column::Score.value(&r), "0.30000000000000004");
        assert_eq!(Column::Gene.value(&r), "G1");
        r.source_gene_id = None;
        assert_eq!(Column::Gene.value(&r), "");
    }
}
