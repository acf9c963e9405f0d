use std::collections::HashMap;

use super::model::{PeptideRecord, RecordKey};

/// Keeps one record per (peptide, allele, sample) key.
///
/// On a key collision the strictly higher score replaces the stored record;
/// on a tie the record seen first stays. Records must therefore be fed in
/// input order. Output preserves the position at which each key first
/// appeared.
#[derive(Debug, Default)]
pub struct Merger {
    records: Vec<PeptideRecord>,
    index: HashMap<RecordKey, usize>,
    seen: usize,
    replaced: usize,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: PeptideRecord) {
        self.seen += 1;
        let key = record.key();
        if let Some(&slot) = self.index.get(&key) {
            if record.binding_score > self.records[slot].binding_score {
                self.records[slot] = record;
                self.replaced += 1;
            }
        } else {
            self.index.insert(key, self.records.len());
            self.records.push(record);
        }
    }

    pub fn extend<I: IntoIterator<Item = PeptideRecord>>(&mut self, records: I) {
        for rec in records {
            self.push(rec);
        }
    }

    /// Records received so far, duplicates included.
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Records dropped as duplicates.
    pub fn collapsed(&self) -> usize {
        self.seen - self.records.len()
    }

    /// Collisions where the later record won.
    pub fn replaced(&self) -> usize {
        self.replaced
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<PeptideRecord> {
        self.records
    }
}

/// Reduce per-sample partial results, in the given order, into one set.
pub fn merge_partials<I>(partials: I) -> Merger
where
    I: IntoIterator<Item = Vec<PeptideRecord>>,
{
    let mut merger = Merger::new();
    for part in partials {
        merger.extend(part);
    }
    merger
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn rec(peptide: &str, allele: &str, sample: &str, score: f64) -> PeptideRecord {
        PeptideRecord::new(peptide, allele, sample, score, None).unwrap()
    }

    #[test]
    fn higher_score_wins() {
        let mut merger = Merger::new();
        merger.push(rec("AAAGGG", "HLA-A*02:01", "s1", 0.9));
        merger.push(rec("AAAGGG", "HLA-A*02:01", "s1", 0.95));
        assert_eq!(merger.collapsed(), 1);
        assert_eq!(merger.replaced(), 1);
        let out = merger.into_records();
        assert_eq!(out, vec![rec("AAAGGG", "HLA-A*02:01", "s1", 0.95)]);
    }

    #[test]
    fn lower_score_does_not_replace() {
        let mut merger = Merger::new();
        merger.push(rec("AAAGGG", "HLA-A*02:01", "s1", 0.95));
        merger.push(rec("AAAGGG", "HLA-A*02:01", "s1", 0.9));
        assert_eq!(merger.into_records()[0].binding_score, 0.95);
    }

    #[test]
    fn tie_keeps_first_seen() {
        let mut first = rec("AAAGGG", "HLA-A*02:01", "s1", 0.5);
        first.source_gene_id = Some("FIRST".into());
        let mut second = rec("aaaggg", "HLA-A*02:01", "s1", 0.5);
        second.source_gene_id = Some("SECOND".into());

        let mut merger = Merger::new();
        merger.extend([first, second]);
        let out = merger.into_records();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_gene_id.as_deref(), Some("FIRST"));
    }

    #[test]
    fn distinct_keys_are_kept() {
        let mut merger = Merger::new();
        merger.extend([
            rec("AAAGGG", "HLA-A*02:01", "s1", 0.1),
            rec("AAAGGG", "HLA-A*02:01", "s2", 0.1),
            rec("AAAGGG", "HLA-B*07:02", "s1", 0.1),
            rec("CCCGGG", "HLA-A*02:01", "s1", 0.1),
        ]);
        assert_eq!(merger.len(), 4);
        assert_eq!(merger.collapsed(), 0);
    }

    #[test]
    fn output_keys_unique_and_no_larger_than_input() {
        let peptides = ["AAA", "CCC", "DDD"];
        let alleles = ["HLA-A*01:01", "HLA-DRB1*01:01"];
        let mut input = Vec::new();
        for i in 0..60u32 {
            let p = peptides[(i % 3) as usize];
            let a = alleles[((i / 3) % 2) as usize];
            let s = if i % 5 == 0 { "s1" } else { "s2" };
            input.push(rec(p, a, s, ((i * 37) % 11) as f64));
        }

        let merger = merge_partials([input[..30].to_vec(), input[30..].to_vec()]);
        assert_eq!(merger.seen(), input.len());
        let out = merger.into_records();
        assert!(out.len() <= input.len());

        let keys: HashSet<_> = out.iter().map(|r| r.key()).collect();
        assert_eq!(keys.len(), out.len());

        for r in &out {
            let best = input
                .iter()
                .filter(|x| x.key() == r.key())
                .map(|x| x.binding_score)
                .fold(f64::MIN, f64::max);
            assert_eq!(r.binding_score, best);
        }
    }
}
