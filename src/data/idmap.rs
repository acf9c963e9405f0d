use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::model::{normalize_peptide, PeptideRecord};
use super::schema::{delimiter_from_extension, GENE_COL, PEPTIDE_COL};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// AmbiguityPolicy
// ---------------------------------------------------------------------------

/// What to do when one peptide maps to more than one gene.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    /// Keep the first gene seen.
    #[default]
    FirstSeen,
    /// Refuse to load the map.
    Error,
    /// Keep every distinct gene, comma-joined in first-seen order.
    KeepAll,
}

// ---------------------------------------------------------------------------
// IdentifierMap
// ---------------------------------------------------------------------------

/// Peptide → gene/transcript lookup table.
#[derive(Debug, Clone, Default)]
pub struct IdentifierMap {
    genes: HashMap<String, Vec<String>>,
    policy: AmbiguityPolicy,
    ambiguous: usize,
}

impl IdentifierMap {
    pub fn new(policy: AmbiguityPolicy) -> Self {
        IdentifierMap {
            policy,
            ..Default::default()
        }
    }

    /// Add a mapping. Under [`AmbiguityPolicy::Error`] a second, different gene
    /// for the same peptide is rejected and the already-mapped gene returned.
    pub fn insert(&mut self, peptide: &str, gene: &str) -> std::result::Result<(), String> {
        let genes = self
            .genes
            .entry(peptide.trim().to_ascii_uppercase())
            .or_default();
        if genes.iter().any(|g| g == gene) {
            return Ok(());
        }
        if let Some(first) = genes.first() {
            self.ambiguous += 1;
            match self.policy {
                AmbiguityPolicy::Error => return Err(first.clone()),
                AmbiguityPolicy::FirstSeen => {
                    log::debug!("{peptide}: ignoring gene {gene}, already mapped to {first}");
                    return Ok(());
                }
                AmbiguityPolicy::KeepAll => {}
            }
        }
        genes.push(gene.to_string());
        Ok(())
    }

    /// Load a delimited file with `peptide` and `gene_id` columns; other
    /// columns are ignored. Rows with an invalid peptide or no gene are
    /// skipped.
    pub fn load(path: &Path, policy: AmbiguityPolicy) -> Result<Self> {
        let csv_err = |source| PipelineError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter_from_extension(path))
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_err)?;

        let headers = reader.headers().map_err(csv_err)?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| PipelineError::MissingColumn {
                    file: path.to_path_buf(),
                    column: name.to_string(),
                })
        };
        let pep_idx = position(PEPTIDE_COL)?;
        let gene_idx = position(GENE_COL)?;

        let mut map = IdentifierMap::new(policy);
        let mut skipped = 0usize;

        for (i, row) in reader.records().enumerate() {
            let line = i + 2;
            let row = row.map_err(csv_err)?;
            let gene = row.get(gene_idx).unwrap_or("");
            let peptide = match normalize_peptide(row.get(pep_idx).unwrap_or("")) {
                Ok(p) if !gene.is_empty() => p,
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            map.insert(&peptide, gene)
                .map_err(|first| PipelineError::AmbiguousMapping {
                    file: path.to_path_buf(),
                    row: line,
                    peptide: peptide.clone(),
                    first,
                    second: gene.to_string(),
                })?;
        }

        if skipped > 0 {
            log::warn!("{}: skipped {skipped} unusable rows", path.display());
        }
        if map.ambiguous > 0 {
            log::warn!(
                "{}: {} peptides map to more than one gene ({:?} policy)",
                path.display(),
                map.ambiguous,
                policy
            );
        }
        log::info!("{}: {} peptide mappings", path.display(), map.len());
        Ok(map)
    }

    /// Gene for `peptide` (case-insensitive), shaped by the policy.
    pub fn get(&self, peptide: &str) -> Option<String> {
        let genes = self.genes.get(&peptide.to_ascii_uppercase())?;
        match self.policy {
            AmbiguityPolicy::KeepAll => Some(genes.join(",")),
            _ => genes.first().cloned(),
        }
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Number of insertions that hit an already-mapped peptide with a new gene.
    pub fn ambiguous(&self) -> usize {
        self.ambiguous
    }
}

// ---------------------------------------------------------------------------
// IdentifierJoiner
// ---------------------------------------------------------------------------

/// Annotates records with gene IDs from an [`IdentifierMap`].
#[derive(Debug, Clone, Copy)]
pub struct IdentifierJoiner<'a> {
    map: &'a IdentifierMap,
}

impl<'a> IdentifierJoiner<'a> {
    pub fn new(map: &'a IdentifierMap) -> Self {
        IdentifierJoiner { map }
    }

    /// Set `source_gene_id` when the map knows the peptide. Unknown peptides
    /// keep whatever the input carried. Returns whether the record was mapped.
    pub fn annotate(&self, record: &mut PeptideRecord) -> bool {
        match self.map.get(&record.peptide) {
            Some(gene) => {
                record.source_gene_id = Some(gene);
                true
            }
            None => false,
        }
    }

    /// Annotate every record, returning how many were mapped.
    pub fn annotate_all(&self, records: &mut [PeptideRecord]) -> usize {
        records.iter_mut().map(|r| self.annotate(r)).filter(|&mapped| mapped).count()
    }
}

// ---------------------------------------------------------------------------
// Mapping artifact
// ---------------------------------------------------------------------------

/// Write one `peptide<TAB>gene_id` row per distinct peptide, sorted by
/// peptide. The gene is the first one seen among the peptide's records and is
/// left empty when none is known.
pub fn write_mapping(records: &[PeptideRecord], path: &Path) -> Result<usize> {
    let mut genes: BTreeMap<&str, Option<&str>> = BTreeMap::new();
    for rec in records {
        let slot = genes.entry(rec.peptide.as_str()).or_insert(None);
        if slot.is_none() {
            *slot = rec.source_gene_id.as_deref();
        }
    }

    let write_err = |source: std::io::Error| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| write_err(e.into()))?;
    writer
        .write_record([PEPTIDE_COL, GENE_COL])
        .map_err(|e| write_err(e.into()))?;
    for (peptide, gene) in &genes {
        writer
            .write_record([*peptide, gene.unwrap_or("")])
            .map_err(|e| write_err(e.into()))?;
    }
    writer.flush().map_err(write_err)?;

    log::info!("{}: wrote {} peptide mappings", path.display(), genes.len());
    Ok(genes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(peptide: &str, gene: Option<&str>) -> PeptideRecord {
        PeptideRecord::new(peptide, "HLA-A*02:01", "s1", 0.5, gene).unwrap()
    }

    fn write_map(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.tsv");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    const AMBIGUOUS: &str = "peptide\tgene_id\tsource\nSIINFEKL\tENSG1\tx\nsiinfekl\tENSG2\ty\nKLLLLL\tENSG3\tz\n";

    #[test]
    fn first_seen_wins_by_default() {
        let (_dir, path) = write_map(AMBIGUOUS);
        let map = IdentifierMap::load(&path, AmbiguityPolicy::default()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("SIINFEKL").as_deref(), Some("ENSG1"));
        assert_eq!(map.get("siinfekl").as_deref(), Some("ENSG1"));
        assert_eq!(map.ambiguous(), 1);
    }

    #[test]
    fn keep_all_joins_genes() {
        let (_dir, path) = write_map(AMBIGUOUS);
        let map = IdentifierMap::load(&path, AmbiguityPolicy::KeepAll).unwrap();
        assert_eq!(map.get("SIINFEKL").as_deref(), Some("ENSG1,ENSG2"));
    }

    #[test]
    fn error_policy_rejects_ambiguity() {
        let (_dir, path) = write_map(AMBIGUOUS);
        let err = IdentifierMap::load(&path, AmbiguityPolicy::Error).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::AmbiguousMapping { row: 3, ref first, ref second, .. }
                if first == "ENSG1" && second == "ENSG2"
        ));
    }

    #[test]
    fn repeated_identical_mapping_is_not_ambiguous() {
        let mut map = IdentifierMap::new(AmbiguityPolicy::Error);
        map.insert("AAA", "G1").unwrap();
        map.insert("AAA", "G1").unwrap();
        assert_eq!(map.ambiguous(), 0);
    }

    #[test]
    fn inserted_peptides_are_case_insensitive() {
        let mut map = IdentifierMap::new(AmbiguityPolicy::Error);
        map.insert(" siinfekl", "ENSG1").unwrap();
        map.insert("SIINFEKL", "ENSG1").unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("SIINFEKL").as_deref(), Some("ENSG1"));
        assert_eq!(map.get("siinfekl").as_deref(), Some("ENSG1"));
    }

    #[test]
    fn joiner_leaves_unknown_peptides_alone() {
        let mut map = IdentifierMap::new(AmbiguityPolicy::FirstSeen);
        map.insert("SIINFEKL", "ENSG1").unwrap();

        let mut records = vec![
            rec("SIINFEKL", None),
            rec("KLLLLL", None),
            rec("GILGFVFTL", Some("FROM_INPUT")),
        ];
        let mapped = IdentifierJoiner::new(&map).annotate_all(&mut records);

        assert_eq!(mapped, 1);
        assert_eq!(records[0].source_gene_id.as_deref(), Some("ENSG1"));
        assert_eq!(records[1].source_gene_id, None);
        assert_eq!(records[2].source_gene_id.as_deref(), Some("FROM_INPUT"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn mapping_artifact_is_sorted_and_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.tsv");
        let records = vec![
            rec("KLLLLL", None),
            rec("AAAGGG", Some("G1")),
            rec("KLLLLL", Some("G2")),
            rec("AAAGGG", Some("G3")),
            rec("CCCC", None),
        ];
        assert_eq!(write_mapping(&records, &path).unwrap(), 3);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "peptide\tgene_id\nAAAGGG\tG1\nCCCC\t\nKLLLLL\tG2\n");
    }
}
