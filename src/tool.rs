use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output}";

// ---------------------------------------------------------------------------
// ExternalTool
// ---------------------------------------------------------------------------

/// An external program (predictor, converter, ...) that turns one input file
/// into one output file. The pipeline only sees this interface, so tests can
/// swap in fakes.
pub trait ExternalTool: Send + Sync {
    fn name(&self) -> &str;

    /// Version string recorded in the provenance file.
    fn version(&self) -> Result<String>;

    /// Process `input`, writing the result somewhere under `work_dir`, and
    /// return the result's path.
    fn run(&self, input: &Path, work_dir: &Path) -> Result<PathBuf>;
}

/// Command line of an external tool. `{input}` and `{output}` in `command`
/// are replaced with the actual paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub version_command: Vec<String>,
    #[serde(default = "default_output_extension")]
    pub output_extension: String,
}

fn default_output_extension() -> String {
    "csv".to_string()
}

impl ToolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PipelineError::Config("tool name is empty".to_string()));
        }
        if self.command.is_empty() {
            return Err(PipelineError::Config(format!(
                "tool '{}' has no command",
                self.name
            )));
        }
        if !self.command.iter().any(|a| a.contains(OUTPUT_PLACEHOLDER)) {
            return Err(PipelineError::Config(format!(
                "command of tool '{}' never mentions {OUTPUT_PLACEHOLDER}",
                self.name
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CommandTool
// ---------------------------------------------------------------------------

/// Runs a [`ToolConfig`] through `std::process::Command`.
#[derive(Debug, Clone)]
pub struct CommandTool {
    config: ToolConfig,
}

impl CommandTool {
    pub fn new(config: ToolConfig) -> Result<Self> {
        config.validate()?;
        Ok(CommandTool { config })
    }

    fn failure(&self, reason: impl Into<String>) -> PipelineError {
        PipelineError::Tool {
            tool: self.config.name.clone(),
            reason: reason.into(),
        }
    }

    fn output_path(&self, input: &Path, work_dir: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("input");
        work_dir.join(format!(
            "{stem}.{}.{}",
            self.config.name, self.config.output_extension
        ))
    }

    fn execute(&self, argv: &[String]) -> Result<std::process::Output> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| self.failure("empty command"))?;
        log::debug!("running {}", argv.join(" "));
        Command::new(program)
            .args(args)
            .output()
            .map_err(|e| self.failure(format!("cannot start {program}: {e}")))
    }
}

impl ExternalTool for CommandTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn version(&self) -> Result<String> {
        if self.config.version_command.is_empty() {
            return Ok("unknown".to_string());
        }
        let out = self.execute(&self.config.version_command)?;
        if !out.status.success() {
            return Err(self.failure(format!("version command exited with {}", out.status)));
        }
        // some tools print their version on stderr
        let text = if out.stdout.is_empty() {
            out.stderr
        } else {
            out.stdout
        };
        Ok(String::from_utf8_lossy(&text)
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .to_string())
    }

    fn run(&self, input: &Path, work_dir: &Path) -> Result<PathBuf> {
        let output = self.output_path(input, work_dir);
        let input_str = input.to_string_lossy();
        let output_str = output.to_string_lossy();

        let argv: Vec<String> = self
            .config
            .command
            .iter()
            .map(|a| {
                a.replace(INPUT_PLACEHOLDER, &input_str)
                    .replace(OUTPUT_PLACEHOLDER, &output_str)
            })
            .collect();

        // a leftover from an earlier run must not pass for this run's output
        if output.exists() {
            std::fs::remove_file(&output).map_err(|source| PipelineError::Write {
                path: output.clone(),
                source,
            })?;
        }

        let out = self.execute(&argv)?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(self.failure(format!(
                "exited with {} on {}: {}",
                out.status,
                input.display(),
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            )));
        }
        if !output.is_file() {
            return Err(self.failure(format!(
                "finished but {} was not written",
                output.display()
            )));
        }

        log::info!("{}: {} -> {}", self.config.name, input.display(), output.display());
        Ok(output)
    }
}
