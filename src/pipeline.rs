use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::data::classes::{output_columns, partition_by_class};
use crate::data::idmap::{write_mapping, IdentifierJoiner, IdentifierMap};
use crate::data::loader::{ReadSummary, RecordReader};
use crate::data::merge::merge_partials;
use crate::data::model::{MhcClass, PeptideRecord, SampleMetadata};
use crate::data::writer::ResultWriter;
use crate::error::{PipelineError, Result};
use crate::provenance::Provenance;
use crate::tool::ExternalTool;

/// Group that collects samples missing from the samplesheet.
pub const UNASSIGNED_GROUP: &str = "unassigned";
const WORK_DIR: &str = "work";

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// What happened to one input file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileReport {
    pub read: ReadSummary,
    /// Output of the external predictor, when one ran.
    pub tool_output: Option<PathBuf>,
    pub length_filtered: usize,
    pub mapped: usize,
}

/// Counts for every place a record can be dropped, plus the files written.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub files: Vec<FileReport>,
    pub records_read: usize,
    pub malformed: usize,
    pub length_filtered: usize,
    pub mapped: usize,
    pub duplicates_collapsed: usize,
    pub merged: usize,
    pub class_i: usize,
    pub class_ii: usize,
    pub unknown_alleles: BTreeMap<String, usize>,
    pub unassigned_samples: Vec<String>,
    pub outputs: Vec<PathBuf>,
}

impl RunReport {
    fn add_file(&mut self, file: FileReport) {
        self.records_read += file.read.total - file.read.malformed;
        self.malformed += file.read.malformed;
        self.length_filtered += file.length_filtered;
        self.mapped += file.mapped;
        self.files.push(file);
    }

    pub fn unknown_class(&self) -> usize {
        self.unknown_alleles.values().sum()
    }

    /// Summary for the end of a run.
    pub fn log(&self) {
        log::info!(
            "{} files, {} records read, {} merged ({} duplicates collapsed), {} Class I, {} Class II",
            self.files.len(),
            self.records_read,
            self.merged,
            self.duplicates_collapsed,
            self.class_i,
            self.class_ii
        );
        if self.malformed > 0 {
            log::warn!("{} malformed rows skipped", self.malformed);
            for file in self.files.iter().filter(|f| f.read.malformed > 0) {
                for example in &file.read.examples {
                    log::warn!("  {example}");
                }
            }
        }
        if self.length_filtered > 0 {
            log::info!("{} records outside the peptide length window", self.length_filtered);
        }
        if !self.unknown_alleles.is_empty() {
            log::warn!(
                "{} records with unclassifiable alleles: {:?}",
                self.unknown_class(),
                self.unknown_alleles
            );
        }
        if !self.unassigned_samples.is_empty() {
            log::warn!(
                "samples missing from the samplesheet went to '{UNASSIGNED_GROUP}': {}",
                self.unassigned_samples.join(", ")
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Read → filter → join → merge → split → write.
///
/// The per-file stages run in parallel; the merge consumes their results in
/// input order so output never depends on scheduling.
pub struct Pipeline {
    config: PipelineConfig,
    id_map: Option<IdentifierMap>,
    id_map_path: Option<PathBuf>,
    samples: Option<BTreeMap<String, SampleMetadata>>,
    samplesheet_path: Option<PathBuf>,
    tool: Option<Box<dyn ExternalTool>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline {
            config,
            id_map: None,
            id_map_path: None,
            samples: None,
            samplesheet_path: None,
            tool: None,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn with_identifier_map(mut self, map: IdentifierMap, source: Option<PathBuf>) -> Self {
        self.id_map = Some(map);
        self.id_map_path = source;
        self
    }

    pub fn with_samples(
        mut self,
        samples: BTreeMap<String, SampleMetadata>,
        source: Option<PathBuf>,
    ) -> Self {
        self.samples = Some(samples);
        self.samplesheet_path = source;
        self
    }

    pub fn with_tool(mut self, tool: Box<dyn ExternalTool>) -> Self {
        self.tool = Some(tool);
        self
    }

    /// Full run: writes the Class I / Class II tables (per condition group when
    /// a samplesheet is set) and the provenance file under `outdir`.
    pub fn aggregate(&self, inputs: &[PathBuf], outdir: &Path) -> Result<RunReport> {
        let mut provenance = self.provenance(inputs);
        create_dir(outdir)?;

        let (partials, mut report) = self.read_inputs(inputs, outdir)?;

        let merger = merge_partials(partials);
        report.duplicates_collapsed = merger.collapsed();
        report.merged = merger.len();

        let classes = partition_by_class(merger.into_records());
        report.class_i = classes.class_i.len();
        report.class_ii = classes.class_ii.len();
        report.unknown_alleles = classes.unknown.clone();

        let writer = ResultWriter::default();
        for class in [MhcClass::ClassI, MhcClass::ClassII] {
            let columns = output_columns(class, self.config.class_ii_gene_ids);
            let routed = self.route(classes.get(class), outdir, &mut report.unassigned_samples);
            for (dir, records) in routed {
                create_dir(&dir)?;
                let path = dir.join(format!(
                    "{}.{}.tsv",
                    self.config.output_prefix,
                    class.file_tag()
                ));
                writer.write(&path, &records, &columns)?;
                report.outputs.push(path);
            }
        }
        report.unassigned_samples.sort();
        report.unassigned_samples.dedup();

        report.log();
        provenance.finish(report.clone());
        provenance.write(&outdir.join(format!("{}.provenance.json", self.config.output_prefix)))?;
        Ok(report)
    }

    /// Standalone join: writes the peptide → gene mapping artifact to `output`
    /// and its provenance next to it.
    pub fn join(&self, inputs: &[PathBuf], output: &Path) -> Result<RunReport> {
        let mut provenance = self.provenance(inputs);
        let work_root = output.parent().unwrap_or_else(|| Path::new("."));

        let (partials, mut report) = self.read_inputs(inputs, work_root)?;
        let records: Vec<PeptideRecord> = partials.into_iter().flatten().collect();

        write_mapping(&records, output)?;
        report.outputs.push(output.to_path_buf());

        report.log();
        provenance.finish(report.clone());
        provenance.write(&output.with_extension("provenance.json"))?;
        Ok(report)
    }

    fn provenance(&self, inputs: &[PathBuf]) -> Provenance {
        let mut provenance = Provenance::new(&self.config, inputs);
        provenance.identifier_map = self.id_map_path.clone();
        provenance.samplesheet = self.samplesheet_path.clone();
        if let Some(tool) = &self.tool {
            let version = tool.version().unwrap_or_else(|e| {
                log::warn!("{e}");
                "unknown".to_string()
            });
            provenance.external_tools.insert(tool.name().to_string(), version);
        }
        provenance
    }

    /// Per-file stages for every input, in parallel, results in input order.
    fn read_inputs(
        &self,
        inputs: &[PathBuf],
        work_root: &Path,
    ) -> Result<(Vec<Vec<PeptideRecord>>, RunReport)> {
        if inputs.is_empty() {
            return Err(PipelineError::Config("no input files".to_string()));
        }

        let work_dir = work_root.join(WORK_DIR);

        let run = || -> Result<Vec<(Vec<PeptideRecord>, FileReport)>> {
            inputs
                .par_iter()
                .enumerate()
                .map(|(i, path)| self.process_file(path, &work_dir.join(i.to_string())))
                .collect()
        };

        let outcomes = match self.config.threads {
            Some(n) => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| PipelineError::Config(format!("thread pool: {e}")))?
                .install(run)?,
            None => run()?,
        };

        let mut report = RunReport::default();
        let mut partials = Vec::with_capacity(outcomes.len());
        for (records, file) in outcomes {
            report.add_file(file);
            partials.push(records);
        }
        Ok((partials, report))
    }

    fn process_file(&self, path: &Path, work_dir: &Path) -> Result<(Vec<PeptideRecord>, FileReport)> {
        let mut file = FileReport::default();

        let source = match &self.tool {
            Some(tool) => {
                // inputs from different directories may share a file name
                create_dir(work_dir)?;
                let out = tool.run(path, work_dir)?;
                file.tool_output = Some(out.clone());
                out
            }
            None => path.to_path_buf(),
        };

        let mut schema = self.config.schema.clone();
        // a predictor's output is named after the tool; keep the sample
        // named after the original input
        if schema.fixed_sample.is_none() && self.tool.is_some() {
            schema.fixed_sample = Some(self.config.schema.sample_for(path));
        }

        let reader = RecordReader::new(&source, schema);
        let (mut records, summary) = reader.read_all(self.config.max_malformed_ratio)?;
        file.read = summary;

        file.length_filtered = self.config.lengths.retain(&mut records);

        if let Some(map) = &self.id_map {
            file.mapped = IdentifierJoiner::new(map).annotate_all(&mut records);
        }

        Ok((records, file))
    }

    /// Split records into output directories by condition group.
    fn route(
        &self,
        records: &[PeptideRecord],
        outdir: &Path,
        unassigned: &mut Vec<String>,
    ) -> BTreeMap<PathBuf, Vec<PeptideRecord>> {
        let mut routed: BTreeMap<PathBuf, Vec<PeptideRecord>> = BTreeMap::new();

        let Some(samples) = &self.samples else {
            routed.insert(outdir.to_path_buf(), records.to_vec());
            return routed;
        };

        // every declared group gets a table, even an empty one
        let groups: BTreeSet<&str> = samples.values().map(|m| m.condition_group.as_str()).collect();
        for group in groups {
            routed.entry(outdir.join(group)).or_default();
        }

        for rec in records {
            let group = match samples.get(&rec.sample_id) {
                Some(meta) => meta.condition_group.as_str(),
                None => {
                    unassigned.push(rec.sample_id.clone());
                    UNASSIGNED_GROUP
                }
            };
            routed.entry(outdir.join(group)).or_default().push(rec.clone());
        }
        routed
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|source| PipelineError::Write {
        path: dir.to_path_buf(),
        source,
    })
}
