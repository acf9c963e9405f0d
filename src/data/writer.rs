use std::path::Path;

use super::classes::Column;
use super::model::PeptideRecord;
use crate::error::{PipelineError, Result};

/// Writes result tables with a fixed column order and sorted rows, so the same
/// records always produce the same bytes.
#[derive(Debug, Clone, Copy)]
pub struct ResultWriter {
    delimiter: u8,
}

impl Default for ResultWriter {
    fn default() -> Self {
        ResultWriter { delimiter: b'\t' }
    }
}

impl ResultWriter {
    pub fn new(delimiter: u8) -> Self {
        ResultWriter { delimiter }
    }

    /// Write `records` to `path`, sorted by peptide, allele, sample id.
    /// Returns the number of rows written.
    pub fn write(&self, path: &Path, records: &[PeptideRecord], columns: &[Column]) -> Result<usize> {
        let write_err = |source: std::io::Error| PipelineError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut sorted: Vec<&PeptideRecord> = records.iter().collect();
        sorted.sort_by(|a, b| {
            a.cmp_output_order(b)
                .then_with(|| a.binding_score.total_cmp(&b.binding_score))
                .then_with(|| a.source_gene_id.cmp(&b.source_gene_id))
        });

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_path(path)
            .map_err(|e| write_err(e.into()))?;

        writer
            .write_record(columns.iter().map(|c| c.name()))
            .map_err(|e| write_err(e.into()))?;

        for rec in &sorted {
            writer
                .write_record(columns.iter().map(|c| c.value(rec).into_owned()))
                .map_err(|e| write_err(e.into()))?;
        }
        writer.flush().map_err(write_err)?;

        log::info!("{}: wrote {} rows", path.display(), sorted.len());
        Ok(sorted.len())
    }
}
