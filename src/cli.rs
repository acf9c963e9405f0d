use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::PipelineConfig;
use crate::data::idmap::{AmbiguityPolicy, IdentifierMap};
use crate::data::loader::load_samplesheet;
use crate::data::schema::{Preset, RecordSchema};
use crate::pipeline::Pipeline;
use crate::tool::CommandTool;

#[derive(Parser, Debug)]
#[command(name = "epitope-aggregator", version)]
#[command(about = "Merge MHC binding predictions into deduplicated Class I / Class II tables")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read, join, merge and split predictions into per-class tables
    Aggregate(AggregateArgs),
    /// Only map peptides to gene ids and write the mapping table
    Join(JoinArgs),
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct InputArgs {
    #[arg(
        short = 'i',
        long = "input",
        required = true,
        value_name = "PATHS",
        value_delimiter = ',',
        num_args = 1..,
        help = "Prediction tables (.tsv, .csv, .parquet), comma-delimited"
    )]
    pub inputs: Vec<PathBuf>,

    /// JSON config file; flags below override it
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Input layout preset
    #[arg(short = 'p', long, value_enum)]
    pub preset: Option<Preset>,

    /// Peptide → gene id table with `peptide` and `gene_id` columns
    #[arg(short = 'm', long = "id-map", value_name = "PATH")]
    pub id_map: Option<PathBuf>,

    /// How to resolve peptides mapped to several genes
    #[arg(long, value_enum)]
    pub ambiguity: Option<AmbiguityPolicy>,

    /// Allele for tables without an allele column
    #[arg(long, value_name = "ALLELE")]
    pub allele: Option<String>,

    /// Sample id for tables without a sample column (default: file stem)
    #[arg(long, value_name = "SAMPLE")]
    pub sample: Option<String>,

    /// Field delimiter of the inputs (default: from extension)
    #[arg(long)]
    pub delimiter: Option<char>,

    #[arg(long = "min-length", value_name = "N")]
    pub min_length: Option<usize>,

    #[arg(long = "max-length", value_name = "N")]
    pub max_length: Option<usize>,

    /// Abort a file when more than this share of its rows is malformed
    #[arg(long = "max-malformed-ratio", value_name = "RATIO")]
    pub max_malformed_ratio: Option<f64>,

    #[arg(short = 't', long, value_name = "THREADS")]
    pub threads: Option<usize>,
}

#[derive(Args, Debug)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[arg(short = 'o', long, value_name = "DIR")]
    pub outdir: PathBuf,

    /// Samplesheet with `sample_id`, `condition`, `condition_group` columns
    #[arg(short = 's', long, value_name = "PATH")]
    pub samplesheet: Option<PathBuf>,

    /// Output file name prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Also write gene ids into the Class II table
    #[arg(long = "class-ii-gene-ids")]
    pub class_ii_gene_ids: bool,
}

#[derive(Args, Debug)]
pub struct JoinArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Mapping table to write
    #[arg(short = 'o', long, value_name = "PATH")]
    pub output: PathBuf,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Aggregate(args) => aggregate(args),
        Commands::Join(args) => join(args),
    }
}

fn aggregate(args: AggregateArgs) -> Result<()> {
    let mut config = args.input.resolve_config()?;
    if let Some(prefix) = args.prefix {
        config.output_prefix = prefix;
    }
    config.class_ii_gene_ids |= args.class_ii_gene_ids;

    let mut pipeline = args.input.build_pipeline(config)?;
    if let Some(sheet) = &args.samplesheet {
        validate(sheet)?;
        let samples = load_samplesheet(sheet)?;
        pipeline = pipeline.with_samples(samples, Some(sheet.clone()));
    }

    pipeline
        .aggregate(&args.input.inputs, &args.outdir)
        .with_context(|| format!("aggregation into {} failed", args.outdir.display()))?;
    Ok(())
}

fn join(args: JoinArgs) -> Result<()> {
    if args.input.id_map.is_none() {
        log::warn!("No identifier map provided; only gene ids carried by the inputs will be written");
    }
    let config = args.input.resolve_config()?;
    let pipeline = args.input.build_pipeline(config)?;
    pipeline
        .join(&args.input.inputs, &args.output)
        .with_context(|| format!("writing {} failed", args.output.display()))?;
    Ok(())
}

impl InputArgs {
    /// Config file (or defaults), then preset, then individual flags.
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(preset) = self.preset {
            config.schema = RecordSchema::preset(preset);
        }
        if let Some(allele) = &self.allele {
            config.schema.fixed_allele = Some(allele.clone());
        }
        if let Some(sample) = &self.sample {
            config.schema.fixed_sample = Some(sample.clone());
        }
        if let Some(delimiter) = self.delimiter {
            if !delimiter.is_ascii() {
                bail!("delimiter must be a single ASCII character, got {delimiter:?}");
            }
            config.schema.delimiter = Some(delimiter);
        }
        if let Some(policy) = self.ambiguity {
            config.ambiguity = policy;
        }
        if self.min_length.is_some() {
            config.lengths.min = self.min_length;
        }
        if self.max_length.is_some() {
            config.lengths.max = self.max_length;
        }
        if let Some(ratio) = self.max_malformed_ratio {
            config.max_malformed_ratio = ratio;
        }
        if self.threads.is_some() {
            config.threads = self.threads;
        }

        config.validate()?;
        Ok(config)
    }

    fn build_pipeline(&self, config: PipelineConfig) -> Result<Pipeline> {
        for input in &self.inputs {
            validate(input)?;
        }

        let id_map = match &self.id_map {
            Some(path) => {
                validate(path)?;
                Some((IdentifierMap::load(path, config.ambiguity)?, path.clone()))
            }
            None => None,
        };
        let tool = config.predictor.clone().map(CommandTool::new).transpose()?;

        let mut pipeline = Pipeline::new(config)?;
        if let Some((map, path)) = id_map {
            pipeline = pipeline.with_identifier_map(map, Some(path));
        }
        if let Some(tool) = tool {
            pipeline = pipeline.with_tool(Box::new(tool));
        }
        Ok(pipeline)
    }
}

/// An input must be an existing, non-empty file.
fn validate(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("{} does not exist", path.display());
    }
    if !path.is_file() {
        bail!("{} is not a file", path.display());
    }
    let metadata = std::fs::metadata(path).with_context(|| format!("reading {}", path.display()))?;
    if metadata.len() == 0 {
        bail!("file {} is empty", path.display());
    }
    Ok(())
}
