//! Dialect classifier running as an external process.

use crate::classify::dialect::DialectClassifier;
use crate::error::{CorpusError, Result};
use std::io::Write;
use std::process::{Command, Stdio};

/// Runs a classifier program once per batch.
///
/// The program gets one input text per line on stdin and must print one
/// class index per line on stdout, in the same order, then exit with status 0.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
    model_name: String,
}

impl CommandClassifier {
    /// Builds a classifier from a program and its arguments.
    pub fn new(program: &str, args: &[String]) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
            model_name: program.to_string(),
        }
    }

    /// Builds a classifier from a command line split into words, program first.
    pub fn from_command_line(command: &[String]) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            return Err(CorpusError::ConfigInvalidValue {
                key: "classification.command".to_string(),
                message: "no classifier command configured".to_string(),
            });
        };
        Ok(Self::new(program, args))
    }

    pub fn with_model_name(mut self, name: &str) -> Self {
        self.model_name = name.to_string();
        self
    }

    fn failure(&self, message: impl std::fmt::Display) -> CorpusError {
        CorpusError::Classification {
            message: format!("{}: {}", self.program, message),
        }
    }
}

fn parse_predictions(stdout: &str) -> std::result::Result<Vec<usize>, String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<usize>()
                .map_err(|e| format!("invalid class index '{}': {}", line, e))
        })
        .collect()
}

impl DialectClassifier for CommandClassifier {
    fn predict(&self, texts: &[String]) -> Result<Vec<usize>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failure(format!("failed to start: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.failure("failed to capture stdin"))?;

        // Feed stdin from its own thread so a child writing early cannot block on a full pipe.
        let (written, output) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || -> std::io::Result<()> {
                for text in texts {
                    writeln!(stdin, "{}", text.replace(['\n', '\r'], " "))?;
                }
                stdin.flush()
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (written, output)
        });

        let output = output.map_err(|e| self.failure(e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format!("exited with {}: {}", output.status, stderr.trim())));
        }
        written.map_err(|e| self.failure(format!("failed to write input: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let predictions = parse_predictions(&stdout).map_err(|message| self.failure(message))?;
        tracing::debug!("{} classified {} texts", self.model_name, predictions.len());
        Ok(predictions)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
