//! End-to-end drive of one render request.
//!
//! Stage the input, pass through admission, collect and persist the engine
//! output, then hand the bytes to the transport boundary. Whatever the
//! outcome, the workspace is torn down before the result leaves this module;
//! transmission after that point is best-effort and never reopens the
//! pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::domain::{RenderFailure, RenderRequest, RenderedDocument};

use super::engine::EngineJob;
use super::scheduler::AdmissionScheduler;
use super::workspace::{Workspace, WorkspaceStore};

pub const COMPLETED_COUNTER: &str = "stampa_render_completed_total";
pub const FAILED_COUNTER: &str = "stampa_render_failed_total";
pub const DURATION_HISTOGRAM: &str = "stampa_render_duration_ms";

pub struct RenderOrchestrator {
    workspaces: WorkspaceStore,
    scheduler: Arc<AdmissionScheduler>,
    render_deadline: Duration,
}

impl RenderOrchestrator {
    pub fn new(
        workspaces: WorkspaceStore,
        scheduler: Arc<AdmissionScheduler>,
        render_deadline: Duration,
    ) -> Self {
        Self {
            workspaces,
            scheduler,
            render_deadline,
        }
    }

    /// Render one request to completion.
    ///
    /// The workspace is destroyed exactly once on every terminal path; if the
    /// caller's future is cancelled mid-flight the workspace guard still runs.
    pub async fn render(
        &self,
        request: RenderRequest,
    ) -> Result<RenderedDocument, RenderFailure> {
        let started_at = Instant::now();
        let deadline = started_at + self.render_deadline;
        let mut workspace = self.workspaces.create(request.id).await?;

        // One clock bounds the whole pipeline: staging and persisting count
        // against the same deadline as the conversion itself.
        let result = match timeout(
            self.render_deadline,
            self.drive(&request, &workspace, deadline),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RenderFailure::Timeout),
        };
        workspace.destroy().await;

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        histogram!(DURATION_HISTOGRAM).record(elapsed_ms as f64);
        match &result {
            Ok(document) => {
                counter!(COMPLETED_COUNTER).increment(1);
                info!(
                    target = "application::orchestrator",
                    op = "orchestrator::render",
                    result = "ok",
                    request_id = %request.id,
                    format = request.format.as_str(),
                    output_bytes = document.bytes.len(),
                    elapsed_ms,
                    "Render completed"
                );
            }
            Err(failure) => {
                counter!(FAILED_COUNTER, "kind" => failure.kind().as_str()).increment(1);
                warn!(
                    target = "application::orchestrator",
                    op = "orchestrator::render",
                    result = "error",
                    request_id = %request.id,
                    format = request.format.as_str(),
                    kind = failure.kind().as_str(),
                    error = %failure,
                    elapsed_ms,
                    "Render failed"
                );
            }
        }
        result
    }

    async fn drive(
        &self,
        request: &RenderRequest,
        workspace: &Workspace,
        deadline: Instant,
    ) -> Result<RenderedDocument, RenderFailure> {
        // Staging
        let input = workspace
            .stage_input(&request.template, &request.template_ext)
            .await?;
        let data = workspace.stage_data(&request.data).await?;
        let output = workspace.scratch_output()?;
        debug!(
            target = "application::orchestrator",
            request_id = %request.id,
            stage = "staging",
            template_bytes = request.template.len(),
            "Input staged"
        );

        // Queued → Converting; the only stage that may wait on concurrency.
        let job = EngineJob {
            request_id: request.id,
            input,
            data,
            output,
            format: request.format,
            deadline,
        };
        self.scheduler.submit(&job).await?;

        // Persisting
        let bytes = workspace.collect_output().await?;
        workspace.persist_output(&bytes, request.format).await?;

        Ok(RenderedDocument {
            bytes,
            content_type: request.format.content_type(),
            file_name: request.attachment_name(),
        })
    }
}
