//! Writes a synthetic prediction table in the long layout, for trying out the
//! aggregator without running a predictor.
//!
//! Usage: `generate-sample [OUTPUT.parquet]`

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

const AMINO_ACIDS: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";
const SAMPLES: [&str; 3] = ["Sample_A", "Sample_B", "Sample_C"];
const CLASS_I: [&str; 3] = ["HLA-A*02:01", "HLA-B*07:02", "HLA-C*07:02"];
const CLASS_II: [&str; 2] = ["HLA-DRB1*01:01", "HLA-DQB1*06:02"];
const PEPTIDES_PER_SAMPLE: usize = 200;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }

    fn peptide(&mut self, min_len: usize, max_len: usize) -> String {
        let len = min_len + self.below(max_len - min_len + 1);
        (0..len)
            .map(|_| AMINO_ACIDS[self.below(AMINO_ACIDS.len())] as char)
            .collect()
    }
}

#[derive(Default)]
struct Columns {
    peptide: Vec<String>,
    allele: Vec<String>,
    sample: Vec<String>,
    score: Vec<f64>,
    gene: Vec<Option<String>>,
}

impl Columns {
    fn push(&mut self, peptide: &str, allele: &str, sample: &str, score: f64, gene: Option<String>) {
        self.peptide.push(peptide.to_string());
        self.allele.push(allele.to_string());
        self.sample.push(sample.to_string());
        self.score.push(score);
        self.gene.push(gene);
    }
}

fn main() -> Result<()> {
    let output_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sample_predictions.parquet".to_string());

    let mut rng = SimpleRng::new(42);
    let mut cols = Columns::default();

    for sample in SAMPLES {
        for i in 0..PEPTIDES_PER_SAMPLE {
            let class_ii = i % 4 == 0;
            let (peptide, alleles): (String, &[&str]) = if class_ii {
                (rng.peptide(13, 17), &CLASS_II)
            } else {
                (rng.peptide(8, 11), &CLASS_I)
            };
            let gene = (rng.below(3) > 0).then(|| format!("ENSG{:011}", rng.below(50_000)));

            for allele in alleles {
                let score = rng.next_f64();
                cols.push(&peptide, allele, sample, score, gene.clone());
                // every tenth prediction is repeated, as when two predictor runs overlap
                if rng.below(10) == 0 {
                    cols.push(&peptide, allele, sample, rng.next_f64(), gene.clone());
                }
            }
        }
    }
    // an allele neither class accepts
    cols.push("SIINFEKL", "H-2-Kb", SAMPLES[0], 0.9, None);

    let schema = Arc::new(Schema::new(vec![
        Field::new("peptide", DataType::Utf8, false),
        Field::new("allele", DataType::Utf8, false),
        Field::new("sample_id", DataType::Utf8, false),
        Field::new("binding_score", DataType::Float64, false),
        Field::new("gene_id", DataType::Utf8, true),
    ]));

    let rows = cols.score.len();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(cols.peptide)),
            Arc::new(StringArray::from(cols.allele)),
            Arc::new(StringArray::from(cols.sample)),
            Arc::new(Float64Array::from(cols.score)),
            Arc::new(StringArray::from(cols.gene)),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(&output_path)
        .with_context(|| format!("creating {output_path}"))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;

    println!("Wrote {rows} predictions for {} samples to {output_path}", SAMPLES.len());
    Ok(())
}
