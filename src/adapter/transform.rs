//! Built-in worker stages

use std::process::Stdio;

use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, process::Command as TokioCommand};
use tracing::{Level, event};

use crate::{
    domain::constant::worker_client,
    port::transform::{Transform, TransformOutcome}
};

/// Acknowledges every dataset and never changes it
#[derive(Debug, Clone)]
pub struct NoUpdateTransform {
    label: String
}

impl NoUpdateTransform {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

#[async_trait]
impl Transform for NoUpdateTransform {
    async fn apply(&self, dataset: &str) -> TransformOutcome {
        TransformOutcome::unchanged(format!("{}: received {} bytes, no changes", self.label, dataset.len()))
    }
}

/// Pipes the dataset through an external program
///
/// The dataset goes to stdin. A successful exit with non-empty stdout replaces
/// the dataset; anything else leaves it as it was.
#[derive(Debug, Clone)]
pub struct CommandTransform {
    program: String,
    args:    Vec<String>
}

impl CommandTransform {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    async fn run(&self, dataset: &str) -> Result<std::process::Output, std::io::Error> {
        let mut child = TokioCommand::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = dataset.as_bytes().to_vec();
            // Feed stdin in its own task so a child that writes before reading cannot deadlock us
            tokio::spawn(async move {
                let _ = stdin.write_all(&input).await;
                let _ = stdin.shutdown().await;
            });
        }

        child.wait_with_output().await
    }
}

#[async_trait]
impl Transform for CommandTransform {
    async fn apply(&self, dataset: &str) -> TransformOutcome {
        let output = match self.run(dataset).await {
            Ok(output) => output,
            Err(e) => {
                event!(
                    Level::WARN,
                    event = worker_client::COMMAND_FAILED,
                    program = %self.program,
                    error = %e
                );
                return TransformOutcome::unchanged(format!("Error: failed to run {}: {}", self.program, e));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            event!(
                Level::WARN,
                event = worker_client::COMMAND_FAILED,
                program = %self.program,
                status = %output.status,
                stderr = %stderr.trim()
            );
            return TransformOutcome::unchanged(format!("Error: {} exited with {}", self.program, output.status));
        }

        match String::from_utf8(output.stdout) {
            Ok(stdout) if !stdout.trim().is_empty() => {
                let status = format!("{}: produced {} bytes", self.program, stdout.len());
                TransformOutcome::updated(status, stdout)
            }
            Ok(_) => TransformOutcome::unchanged(format!("{}: no output, dataset unchanged", self.program)),
            Err(_) => TransformOutcome::unchanged(format!("Error: {} wrote non UTF-8 output", self.program))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_update_transform_keeps_dataset() {
        let outcome = NoUpdateTransform::new("Validator").apply("a,b\n1,2\n").await;
        assert!(outcome.updated.is_none());
        assert!(outcome.status.starts_with("Validator"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_transform_uses_stdout() {
        let transform = CommandTransform::new("tr", vec!["a-z".into(), "A-Z".into()]);
        let outcome = transform.apply("text,label\nhello,1\n").await;
        assert_eq!(outcome.updated.as_deref(), Some("TEXT,LABEL\nHELLO,1\n"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_transform_failure_is_unchanged() {
        let failing = CommandTransform::new("false", vec![]);
        assert!(failing.apply("x").await.updated.is_none());

        let missing = CommandTransform::new("definitely-not-a-real-program-4242", vec![]);
        let outcome = missing.apply("x").await;
        assert!(outcome.updated.is_none());
        assert!(outcome.status.starts_with("Error"));
    }
}
