//! Classifier service hosted in an external process.
//!
//! # Protocol
//!
//! Newline-delimited JSON over the child's stdin/stdout:
//!
//! ```text
//! <- {"status":"ready"}                                       (once, on startup)
//! -> {"op":"predict","context_features":[[..]],"context_labels":[..],"queries":[[..]]}
//! <- {"predictions":[..]}  |  {"error":".."}
//! -> {"op":"release"}
//! <- {"status":"ok"}
//! ```
//!
//! Stderr is inherited so the service's own diagnostics reach the console.

use super::{ContextSnapshot, InContextClassifier};
use crate::error::{LocalizerError, Result};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Predict {
        context_features: Vec<Vec<f64>>,
        context_labels: &'a [usize],
        queries: Vec<Vec<f64>>,
    },
    Release,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    predictions: Option<Vec<usize>>,
    #[serde(default)]
    error: Option<String>,
}

/// Classifier backed by a long-lived child process.
pub struct ProcessClassifier {
    name: String,
    command_line: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessClassifier {
    /// Spawn `command args..` and wait for its ready handshake.
    pub fn spawn(command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| LocalizerError::ServiceUnavailable(format!("failed to spawn `{command}`: {e}")))?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                shutdown(&mut child);
                return Err(LocalizerError::ServiceUnavailable(format!(
                    "`{command}` did not expose stdin/stdout pipes"
                )));
            }
        };

        let mut classifier = Self {
            name: format!("process:{command}"),
            command_line: std::iter::once(command)
                .chain(args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" "),
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };

        let ready = classifier
            .read_reply()
            .map_err(|e| LocalizerError::ServiceUnavailable(format!("no handshake from `{command}`: {e}")))?;
        if ready.status.as_deref() != Some("ready") {
            return Err(LocalizerError::ServiceUnavailable(format!(
                "`{command}` did not report ready"
            )));
        }

        log::info!("Classifier service `{command}` ready (pid {})", classifier.child.id());
        Ok(classifier)
    }

    fn send(&mut self, request: &Request<'_>) -> Result<()> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.flush()?;
        Ok(())
    }

    fn read_reply(&mut self) -> Result<Reply> {
        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(LocalizerError::ServiceUnavailable(
                "service closed its output".to_string(),
            ));
        }
        let reply: Reply = serde_json::from_str(line.trim())?;
        Ok(reply)
    }
}

fn rows(view: ArrayView2<'_, f64>) -> Vec<Vec<f64>> {
    view.rows().into_iter().map(|r| r.to_vec()).collect()
}

impl InContextClassifier for ProcessClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> String {
        format!("process({})", self.command_line)
    }

    fn predict(&mut self, context: &ContextSnapshot, queries: ArrayView2<'_, f64>) -> Result<Vec<usize>> {
        self.send(&Request::Predict {
            context_features: rows(context.features()),
            context_labels: context.labels(),
            queries: rows(queries),
        })?;

        let reply = self.read_reply()?;
        match (reply.predictions, reply.error) {
            (_, Some(error)) => Err(LocalizerError::ServiceUnavailable(format!(
                "service reported: {error}"
            ))),
            (Some(predictions), None) => Ok(predictions),
            (None, None) => Err(LocalizerError::ServiceUnavailable(
                "reply carried neither predictions nor error".to_string(),
            )),
        }
    }

    fn release_memory(&mut self) -> Result<()> {
        self.send(&Request::Release)?;
        let reply = self.read_reply()?;
        match reply.status.as_deref() {
            Some("ok") => Ok(()),
            _ => Err(LocalizerError::ServiceUnavailable(format!(
                "release not acknowledged: {}",
                reply.error.unwrap_or_else(|| "unexpected reply".to_string())
            ))),
        }
    }
}

impl Drop for ProcessClassifier {
    fn drop(&mut self) {
        shutdown(&mut self.child);
    }
}

/// Kill and reap a child so it does not linger as a zombie.
fn shutdown(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
