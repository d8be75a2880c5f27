//! Adapter for the external document-conversion engine.
//!
//! The engine is a black-box CLI that merges a template with a data payload
//! and writes the converted artifact to a path we choose. The adapter owns
//! outcome normalization only; admission and retries live elsewhere.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{RenderFailure, TargetFormat};

const MAX_STDERR_DETAIL: usize = 512;

/// The unit of work submitted to the admission scheduler.
///
/// All paths point inside the owning request's workspace; the scheduler holds
/// a reference only and never copies or mutates job content.
#[derive(Debug)]
pub struct EngineJob {
    pub request_id: Uuid,
    pub input: PathBuf,
    pub data: PathBuf,
    pub output: PathBuf,
    pub format: TargetFormat,
    pub deadline: Instant,
}

impl EngineJob {
    /// Time left before the request's overall deadline.
    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Uniform interface to the conversion engine.
#[async_trait]
pub trait ConvertEngine: Send + Sync {
    /// Run one conversion, writing the artifact to `job.output`.
    ///
    /// Invoked at most once per job. Implementations must stop waiting at the
    /// job deadline; an abandoned call must not outlive its future.
    async fn convert(&self, job: &EngineJob) -> Result<(), RenderFailure>;
}

/// Production engine adapter that spawns the configured converter CLI.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    command: PathBuf,
}

impl CommandEngine {
    pub fn new(command: PathBuf) -> Self {
        Self { command }
    }
}

#[async_trait]
impl ConvertEngine for CommandEngine {
    async fn convert(&self, job: &EngineJob) -> Result<(), RenderFailure> {
        let started_at = Instant::now();

        let mut command = Command::new(&self.command);
        command
            .arg("--template")
            .arg(&job.input)
            .arg("--data")
            .arg(&job.data)
            .arg("--convert-to")
            .arg(job.format.as_str())
            .arg("--output")
            .arg(&job.output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // Dropping the future on deadline expiry must also reap the child;
            // a wedged converter cannot be left running unsupervised.
            .kill_on_drop(true);

        let output = match timeout(job.remaining(), command.output()).await {
            Ok(result) => result.map_err(|err| {
                warn!(
                    target = "application::engine",
                    op = "engine::convert",
                    result = "error",
                    request_id = %job.request_id,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error_code = "spawn_cli",
                    error = %err,
                    "Failed to spawn conversion engine"
                );
                if err.kind() == ErrorKind::NotFound {
                    RenderFailure::render("conversion engine executable not found")
                } else {
                    RenderFailure::io(err.to_string())
                }
            })?,
            Err(_) => {
                warn!(
                    target = "application::engine",
                    op = "engine::convert",
                    result = "timeout",
                    request_id = %job.request_id,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Conversion abandoned at deadline"
                );
                return Err(RenderFailure::Timeout);
            }
        };

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            let detail = if detail.is_empty() {
                "engine reported a rendering failure".to_string()
            } else {
                detail.chars().take(MAX_STDERR_DETAIL).collect()
            };
            warn!(
                target = "application::engine",
                op = "engine::convert",
                result = "error",
                request_id = %job.request_id,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                stderr = %detail,
                "Conversion engine invocation failed"
            );
            return Err(RenderFailure::render(detail));
        }

        info!(
            target = "application::engine",
            op = "engine::convert",
            result = "ok",
            request_id = %job.request_id,
            format = job.format.as_str(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Conversion completed"
        );
        Ok(())
    }
}
