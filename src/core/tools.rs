// tools.rs - External tool invocation: paths, pipelines, logs

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RsdError};

/// Lines of the tool log reported when a tool fails
const LOG_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Bwa,
    Minimap2,
    Samtools,
    Freebayes,
    Bcftools,
    Samclip,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Bwa => "bwa",
            Tool::Minimap2 => "minimap2",
            Tool::Samtools => "samtools",
            Tool::Freebayes => "freebayes",
            Tool::Bcftools => "bcftools",
            Tool::Samclip => "samclip",
        }
    }
}

/// Executable for each tool; bare names are resolved through PATH
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub bwa: String,
    pub minimap2: String,
    pub samtools: String,
    pub freebayes: String,
    pub bcftools: String,
    pub samclip: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            bwa: "bwa".to_string(),
            minimap2: "minimap2".to_string(),
            samtools: "samtools".to_string(),
            freebayes: "freebayes".to_string(),
            bcftools: "bcftools".to_string(),
            samclip: "samclip".to_string(),
        }
    }
}

impl ToolPaths {
    pub fn get(&self, tool: Tool) -> &str {
        match tool {
            Tool::Bwa => &self.bwa,
            Tool::Minimap2 => &self.minimap2,
            Tool::Samtools => &self.samtools,
            Tool::Freebayes => &self.freebayes,
            Tool::Bcftools => &self.bcftools,
            Tool::Samclip => &self.samclip,
        }
    }
}

/// Runs tools and pipelines of tools, sending their stderr to one log file
#[derive(Debug, Clone)]
pub struct ToolRunner {
    paths: ToolPaths,
    log_path: PathBuf,
}

/// One process of a pipeline
pub struct Stage {
    tool: Tool,
    cmd: Command,
}

impl Stage {
    pub fn new(tool: Tool, cmd: Command) -> Self {
        Self { tool, cmd }
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn describe(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

fn reap(children: Vec<(Tool, Child)>) {
    for (_, mut child) in children {
        let _ = child.kill();
        let _ = child.wait();
    }
}

impl ToolRunner {
    pub fn new(paths: ToolPaths, log_path: impl Into<PathBuf>) -> Self {
        Self {
            paths,
            log_path: log_path.into(),
        }
    }

    /// A `Command` for `tool` using the configured executable
    pub fn command(&self, tool: Tool) -> Command {
        Command::new(self.paths.get(tool))
    }

    fn log_stdio(&self) -> Result<Stdio> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| RsdError::io(&self.log_path, e))?;
        Ok(Stdio::from(file))
    }

    fn log_tail(&self) -> String {
        let content = std::fs::read_to_string(&self.log_path).unwrap_or_default();
        let lines: Vec<&str> = content.lines().collect();
        let start = lines.len().saturating_sub(LOG_TAIL_LINES);
        let mut tail = lines[start..].join("\n");
        if tail.is_empty() {
            tail = format!("(no output in {})", self.log_path.display());
        }
        tail
    }

    /// Run a single tool, discarding stdout
    pub fn run(&self, message: &str, tool: Tool, cmd: Command) -> Result<()> {
        self.run_pipeline(message, vec![Stage::new(tool, cmd)], None)
    }

    /// Run stages connected stdout-to-stdin; the last stage writes to `stdout_file` when given
    pub fn run_pipeline(&self, message: &str, stages: Vec<Stage>, stdout_file: Option<&Path>) -> Result<()> {
        let pb = spinner(message);
        let n = stages.len();
        let mut children: Vec<(Tool, Child)> = Vec::with_capacity(n);
        let mut upstream: Option<ChildStdout> = None;

        for (i, Stage { tool, mut cmd }) in stages.into_iter().enumerate() {
            debug!("$ {}", describe(&cmd));
            match upstream.take() {
                Some(out) => cmd.stdin(Stdio::from(out)),
                None => cmd.stdin(Stdio::null()),
            };
            let stdout = if i + 1 < n {
                Ok(Stdio::piped())
            } else if let Some(path) = stdout_file {
                File::create(path)
                    .map(Stdio::from)
                    .map_err(|e| RsdError::io(path, e))
            } else {
                self.log_stdio()
            };
            let (stdout, stderr) = match (stdout, self.log_stdio()) {
                (Ok(out), Ok(err)) => (out, err),
                (Err(e), _) | (_, Err(e)) => {
                    pb.finish_and_clear();
                    reap(children);
                    return Err(e);
                }
            };
            cmd.stdout(stdout).stderr(stderr);

            match cmd.spawn() {
                Ok(mut child) => {
                    upstream = child.stdout.take();
                    children.push((tool, child));
                }
                Err(source) => {
                    pb.finish_and_clear();
                    reap(children);
                    return Err(RsdError::ToolLaunch {
                        tool: tool.name().to_string(),
                        source,
                    });
                }
            }
        }

        let mut failure = None;
        for (tool, mut child) in children {
            let status = child.wait().map_err(|e| RsdError::io(&self.log_path, e))?;
            if !status.success() && failure.is_none() {
                failure = Some((tool, status));
            }
        }
        pb.finish_and_clear();

        match failure {
            Some((tool, status)) => Err(RsdError::ToolFailed {
                tool: tool.name().to_string(),
                status: status.to_string(),
                log_tail: self.log_tail(),
            }),
            None => Ok(()),
        }
    }

    /// Run a tool and hand its stdout to `consume` while it runs
    pub fn stream_stdout<T, F>(&self, message: &str, tool: Tool, mut cmd: Command, consume: F) -> Result<T>
    where
        F: FnOnce(ChildStdout) -> Result<T>,
    {
        debug!("$ {}", describe(&cmd));
        let pb = spinner(message);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(self.log_stdio()?);
        let mut child = cmd.spawn().map_err(|source| RsdError::ToolLaunch {
            tool: tool.name().to_string(),
            source,
        })?;
        let Some(stdout) = child.stdout.take() else {
            reap(vec![(tool, child)]);
            pb.finish_and_clear();
            return Err(RsdError::ToolFailed {
                tool: tool.name().to_string(),
                status: "no stdout".to_string(),
                log_tail: String::new(),
            });
        };

        let result = consume(stdout);
        if result.is_err() {
            reap(vec![(tool, child)]);
            pb.finish_and_clear();
            return result;
        }

        let status = child.wait().map_err(|e| RsdError::io(&self.log_path, e))?;
        pb.finish_and_clear();
        if !status.success() {
            return Err(RsdError::ToolFailed {
                tool: tool.name().to_string(),
                status: status.to_string(),
                log_tail: self.log_tail(),
            });
        }
        result
    }
}
