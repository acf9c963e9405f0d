use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::RunReport;

pub const TOOL_NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where an output came from: this tool's version, the inputs, the effective
/// configuration, the versions of any external tools that ran, and what
/// happened to every record.
#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    pub tool: String,
    pub version: String,
    pub started_at: u64,
    pub finished_at: u64,
    pub inputs: Vec<PathBuf>,
    pub identifier_map: Option<PathBuf>,
    pub samplesheet: Option<PathBuf>,
    pub config: PipelineConfig,
    pub external_tools: BTreeMap<String, String>,
    pub report: RunReport,
}

impl Provenance {
    pub fn new(config: &PipelineConfig, inputs: &[PathBuf]) -> Self {
        Provenance {
            tool: TOOL_NAME.to_string(),
            version: VERSION.to_string(),
            started_at: unix_now(),
            finished_at: 0,
            inputs: inputs.to_vec(),
            identifier_map: None,
            samplesheet: None,
            config: config.clone(),
            external_tools: BTreeMap::new(),
            report: RunReport::default(),
        }
    }

    /// Stamp the finish time and attach the report.
    pub fn finish(&mut self, report: RunReport) {
        self.finished_at = unix_now();
        self.report = report;
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let write_err = |source: std::io::Error| PipelineError::Write {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(write_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| write_err(e.into()))?;
        writer.flush().map_err(write_err)?;
        log::info!("{}: provenance written", path.display());
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
