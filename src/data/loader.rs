use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{Array, ArrayRef, AsArray, Float32Array, Float64Array, Int32Array, Int64Array};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Serialize;

use super::model::{parse_score, PeptideRecord, SampleMetadata};
use super::schema::{Layout, RecordSchema};
use crate::error::{PipelineError, Result};

/// How many malformed rows are kept verbatim per file for the run report.
const MAX_EXAMPLES: usize = 5;

type RecordIter = Box<dyn Iterator<Item = Result<PeptideRecord>>>;

// ---------------------------------------------------------------------------
// RecordReader
// ---------------------------------------------------------------------------

/// Reads predictions from one file according to a [`RecordSchema`].
///
/// `records()` reopens the file on every call, so a reader can be iterated
/// any number of times.
#[derive(Debug, Clone)]
pub struct RecordReader {
    path: PathBuf,
    schema: RecordSchema,
}

/// Row accounting for one input file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReadSummary {
    pub path: PathBuf,
    /// Rows (wide tables: cells) seen, malformed ones included.
    pub total: usize,
    pub malformed: usize,
    /// The first few malformed-row messages.
    pub examples: Vec<String>,
}

impl RecordReader {
    pub fn new(path: impl Into<PathBuf>, schema: RecordSchema) -> Self {
        RecordReader {
            path: path.into(),
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lazily parse the file. Malformed rows come out as
    /// `Err(PipelineError::MalformedRecord)`; any other error is fatal.
    pub fn records(&self) -> Result<RecordIter> {
        if is_parquet(&self.path) {
            self.parquet_records()
        } else {
            self.delimited_records()
        }
    }

    /// Read the whole file, skipping and counting malformed rows.
    ///
    /// Fails with `ThresholdExceeded` when the malformed share is above
    /// `max_malformed_ratio`.
    pub fn read_all(&self, max_malformed_ratio: f64) -> Result<(Vec<PeptideRecord>, ReadSummary)> {
        let mut records = Vec::new();
        let mut summary = ReadSummary {
            path: self.path.clone(),
            ..Default::default()
        };

        for item in self.records()? {
            summary.total += 1;
            match item {
                Ok(rec) => records.push(rec),
                Err(e) if e.is_recoverable() => {
                    log::debug!("{e}");
                    summary.malformed += 1;
                    if summary.examples.len() < MAX_EXAMPLES {
                        summary.examples.push(e.to_string());
                    }
                }
                Err(e) => return Err(e),
            }
        }

        if summary.malformed > 0 {
            log::warn!(
                "{}: skipped {} of {} malformed rows",
                self.path.display(),
                summary.malformed,
                summary.total
            );
        }

        if summary.total > 0
            && summary.malformed as f64 / summary.total as f64 > max_malformed_ratio
        {
            return Err(PipelineError::ThresholdExceeded {
                file: self.path.clone(),
                malformed: summary.malformed,
                total: summary.total,
                threshold: max_malformed_ratio,
            });
        }

        log::info!(
            "{}: read {} records",
            self.path.display(),
            records.len()
        );
        Ok((records, summary))
    }

    fn malformed(&self, row: usize, reason: impl Into<String>) -> PipelineError {
        PipelineError::MalformedRecord {
            file: self.path.clone(),
            row,
            reason: reason.into(),
        }
    }

    // -----------------------------------------------------------------------
    // CSV / TSV
    // -----------------------------------------------------------------------

    fn delimited_records(&self) -> Result<RecordIter> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.schema.delimiter_for(&self.path))
            .flexible(true)
            .from_path(&self.path)
            .map_err(|source| PipelineError::Csv {
                path: self.path.clone(),
                source,
            })?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| PipelineError::Csv {
                path: self.path.clone(),
                source,
            })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let columns = Columns::resolve(&headers, &self.schema, &self.path)?;
        let this = self.clone();

        let rows = reader.into_records().enumerate().map(move |(i, row)| {
            // header is line 1
            let line = match &row {
                Ok(r) => r.position().map(|p| p.line() as usize).unwrap_or(i + 2),
                Err(_) => i + 2,
            };
            (line, row)
        });

        let iter: RecordIter = Box::new(rows.flat_map(move |(line, row)| {
            let row = match row {
                Ok(row) => row,
                Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                    return vec![Err(PipelineError::Csv {
                        path: this.path.clone(),
                        source: e,
                    })];
                }
                Err(e) => return vec![Err(this.malformed(line, e.to_string()))],
            };
            let cells: Vec<&str> = row.iter().collect();
            this.parse_row(&columns, line, &cells)
        }));

        Ok(iter)
    }

    /// Turn one table row into one (long) or several (wide) records.
    fn parse_row(&self, columns: &Columns, line: usize, cells: &[&str]) -> Vec<Result<PeptideRecord>> {
        let cell = |idx: usize| cells.get(idx).copied().map(str::trim).unwrap_or("");

        // a wide row stands for one record per allele column
        let width = match &columns.scores {
            ScoreColumns::Long { .. } => 1,
            ScoreColumns::Wide(alleles) => alleles.len(),
        };
        let reject = |reason: &str| -> Vec<Result<PeptideRecord>> {
            (0..width).map(|_| Err(self.malformed(line, reason))).collect()
        };

        let peptide = cell(columns.peptide);
        if peptide.is_empty() {
            return reject("missing peptide");
        }

        let sample = columns
            .sample
            .map(|idx| cell(idx).to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| columns.default_sample.clone());

        let gene = columns.gene.map(cell).filter(|g| !g.is_empty());

        match &columns.scores {
            ScoreColumns::Long { allele, score } => {
                let allele = match allele {
                    AlleleSource::Column(idx) => cell(*idx),
                    AlleleSource::Fixed(name) => name.as_str(),
                };
                if allele.is_empty() {
                    return vec![Err(self.malformed(line, "missing allele"))];
                }
                let result = parse_score(cell(*score))
                    .and_then(|s| PeptideRecord::new(peptide, allele, &sample, s, gene))
                    .map_err(|reason| self.malformed(line, reason));
                vec![result]
            }
            ScoreColumns::Wide(alleles) => {
                // FRED2 lists every source gene in one cell
                let gene = gene.and_then(|g| g.split(',').map(str::trim).find(|g| !g.is_empty()));
                if let Err(reason) = super::model::normalize_peptide(peptide) {
                    return reject(reason.as_str());
                }
                alleles
                    .iter()
                    .map(|(idx, allele)| {
                        parse_score(cell(*idx))
                            .map_err(|reason| format!("{allele}: {reason}"))
                            .and_then(|s| PeptideRecord::new(peptide, allele, &sample, s, gene))
                            .map_err(|reason| self.malformed(line, reason))
                    })
                    .collect()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Parquet
    // -----------------------------------------------------------------------

    /// Parquet tables are read in the long layout, one record batch at a time.
    fn parquet_records(&self) -> Result<RecordIter> {
        if self.schema.layout != Layout::Long {
            return Err(PipelineError::Config(format!(
                "{}: parquet input supports the long layout only",
                self.path.display()
            )));
        }

        let file = File::open(&self.path).map_err(|source| PipelineError::Io {
            path: self.path.clone(),
            source,
        })?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|source| {
            PipelineError::Parquet {
                path: self.path.clone(),
                source,
            }
        })?;

        let fields = builder.schema().fields().clone();
        let headers: Vec<String> = fields.iter().map(|f| f.name().trim().to_string()).collect();
        let columns = Columns::resolve(&headers, &self.schema, &self.path)?;

        // nested or binary cells would otherwise read as empty
        for idx in columns.used() {
            let data_type = fields[idx].data_type();
            if !is_textual(data_type) {
                return Err(PipelineError::UnsupportedColumnType {
                    file: self.path.clone(),
                    column: headers[idx].clone(),
                    data_type: data_type.to_string(),
                });
            }
        }

        let reader = builder.build().map_err(|source| PipelineError::Parquet {
            path: self.path.clone(),
            source,
        })?;

        let this = self.clone();
        let mut offset = 0usize;

        let iter: RecordIter = Box::new(reader.flat_map(move |batch| {
            let batch = match batch {
                Ok(b) => b,
                Err(source) => {
                    return vec![Err(PipelineError::Arrow {
                        path: this.path.clone(),
                        source,
                    })]
                }
            };
            let out = this.parse_batch(&columns, &batch, offset);
            offset += batch.num_rows();
            out
        }));

        Ok(iter)
    }

    fn parse_batch(&self, columns: &Columns, batch: &RecordBatch, offset: usize) -> Vec<Result<PeptideRecord>> {
        let text_at = |idx: usize, row: usize| string_at(batch.column(idx), row);

        (0..batch.num_rows())
            .map(|row| {
                let cells: Vec<String> = (0..batch.num_columns())
                    .map(|idx| {
                        if columns.is_score(idx) {
                            f64_at(batch.column(idx), row)
                                .map(|v| v.to_string())
                                .or_else(|| text_at(idx, row))
                                .unwrap_or_default()
                        } else {
                            text_at(idx, row).unwrap_or_default()
                        }
                    })
                    .collect();
                let cells: Vec<&str> = cells.iter().map(String::as_str).collect();
                // rows are 1-based
                let mut parsed = self.parse_row(columns, offset + row + 1, &cells);
                parsed.pop().unwrap_or_else(|| Err(self.malformed(offset + row + 1, "empty row")))
            })
            .collect()
    }
}

fn is_parquet(path: &Path) -> bool {
    matches!(
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("parquet" | "pq")
    )
}

// -- Arrow helpers --

/// Strings, plus numbers and booleans (integer sample or Entrez gene ids).
fn is_textual(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Utf8 | DataType::LargeUtf8 | DataType::Boolean)
        || data_type.is_primitive()
}

fn string_at(col: &ArrayRef, row: usize) -> Option<String> {
    if col.is_null(row) {
        return None;
    }
    match col.data_type() {
        DataType::Utf8 => Some(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Some(col.as_string::<i64>().value(row).to_string()),
        dt if is_textual(dt) => array_value_to_string(col.as_ref(), row).ok(),
        _ => None,
    }
}

fn f64_at(col: &ArrayRef, row: usize) -> Option<f64> {
    if col.is_null(row) {
        return None;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Float64 => any.downcast_ref::<Float64Array>().map(|a| a.value(row)),
        DataType::Float32 => any.downcast_ref::<Float32Array>().map(|a| a.value(row) as f64),
        DataType::Int64 => any.downcast_ref::<Int64Array>().map(|a| a.value(row) as f64),
        DataType::Int32 => any.downcast_ref::<Int32Array>().map(|a| a.value(row) as f64),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Column resolution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum AlleleSource {
    Column(usize),
    Fixed(String),
}

#[derive(Debug, Clone)]
enum ScoreColumns {
    Long { allele: AlleleSource, score: usize },
    /// (column index, allele name)
    Wide(Vec<(usize, String)>),
}

/// Header positions for one file.
#[derive(Debug, Clone)]
struct Columns {
    peptide: usize,
    sample: Option<usize>,
    gene: Option<usize>,
    default_sample: String,
    scores: ScoreColumns,
}

impl Columns {
    fn resolve(headers: &[String], schema: &RecordSchema, path: &Path) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name.trim());
        let missing = |name: &str| PipelineError::MissingColumn {
            file: path.to_path_buf(),
            column: name.to_string(),
        };

        let peptide = find(&schema.peptide_column).ok_or_else(|| missing(&schema.peptide_column))?;
        let sample = schema.sample_column.as_deref().and_then(find);
        let gene = schema.gene_column.as_deref().and_then(find);

        let scores = match schema.layout {
            Layout::Long => {
                let allele = match (schema.allele_column.as_deref().and_then(find), &schema.fixed_allele) {
                    (Some(idx), _) => AlleleSource::Column(idx),
                    (None, Some(fixed)) => AlleleSource::Fixed(fixed.trim().to_string()),
                    (None, None) => {
                        return Err(missing(schema.allele_column.as_deref().unwrap_or("allele")))
                    }
                };
                let score = find(&schema.score_column).ok_or_else(|| missing(&schema.score_column))?;
                ScoreColumns::Long { allele, score }
            }
            Layout::Wide => {
                let reserved = |idx: usize| {
                    Some(idx) == Some(peptide) || Some(idx) == sample || Some(idx) == gene
                };
                let alleles: Vec<(usize, String)> = headers
                    .iter()
                    .enumerate()
                    .filter(|(idx, h)| {
                        !h.is_empty()
                            && !reserved(*idx)
                            && !schema.ignored_columns.iter().any(|c| c.trim() == h.as_str())
                    })
                    .map(|(idx, h)| (idx, h.clone()))
                    .collect();
                if alleles.is_empty() {
                    return Err(missing("<allele score columns>"));
                }
                ScoreColumns::Wide(alleles)
            }
        };

        Ok(Columns {
            peptide,
            sample,
            gene,
            default_sample: schema.sample_for(path),
            scores,
        })
    }

    /// Every column a record is built from.
    fn used(&self) -> Vec<usize> {
        let mut used = vec![self.peptide];
        used.extend(self.sample);
        used.extend(self.gene);
        match &self.scores {
            ScoreColumns::Long { allele, score } => {
                if let AlleleSource::Column(idx) = allele {
                    used.push(*idx);
                }
                used.push(*score);
            }
            ScoreColumns::Wide(cols) => used.extend(cols.iter().map(|(idx, _)| *idx)),
        }
        used
    }

    fn is_score(&self, idx: usize) -> bool {
        match &self.scores {
            ScoreColumns::Long { score, .. } => *score == idx,
            ScoreColumns::Wide(cols) => cols.iter().any(|(i, _)| *i == idx),
        }
    }
}

// ---------------------------------------------------------------------------
// Samplesheet
// ---------------------------------------------------------------------------

/// Load `sample_id`, `condition`, `condition_group` rows keyed by sample id.
/// Fields must be non-empty and sample ids unique.
pub fn load_samplesheet(path: &Path) -> Result<BTreeMap<String, SampleMetadata>> {
    let invalid = |reason: String| PipelineError::InvalidSampleSheet {
        file: path.to_path_buf(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(super::schema::delimiter_from_extension(path))
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| PipelineError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

    let mut samples = BTreeMap::new();
    for (i, row) in reader.deserialize::<SampleMetadata>().enumerate() {
        let line = i + 2;
        let meta = row.map_err(|e| invalid(format!("line {line}: {e}")))?;
        if meta.sample_id.is_empty() || meta.condition.is_empty() || meta.condition_group.is_empty() {
            return Err(invalid(format!("line {line}: empty field")));
        }
        // groups become directory names
        let group = meta.condition_group.as_str();
        if group == "." || group == ".." || group.contains(['/', '\\']) {
            return Err(invalid(format!(
                "line {line}: condition group '{group}' is not a valid directory name"
            )));
        }
        if samples.contains_key(&meta.sample_id) {
            return Err(invalid(format!(
                "line {line}: duplicate sample '{}'",
                meta.sample_id
            )));
        }
        samples.insert(meta.sample_id.clone(), meta);
    }

    log::info!("{}: {} samples", path.display(), samples.len());
    Ok(samples)
}
