//! Request-scoped artifact workspaces.
//!
//! Every render request owns exactly one workspace: a directory under the
//! configured root named by the request id. Client-supplied filenames never
//! become storage keys, so concurrent requests with identical uploads cannot
//! collide. Teardown is attempted on every exit path: the orchestrator calls
//! [`Workspace::destroy`] on each terminal transition, and a `Drop` backstop
//! covers futures that are cancelled mid-flight (client disconnects).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{RenderFailure, TargetFormat};

const INPUT_STEM: &str = "template";
const OUTPUT_STEM: &str = "output";
const SCRATCH_NAME: &str = "render.out";
const DATA_NAME: &str = "data.json";

/// Factory for per-request workspaces rooted at a single directory.
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    root: PathBuf,
}

impl WorkspaceStore {
    /// Initialise the store, creating the root directory if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Allocate a fresh workspace keyed by the request id.
    pub async fn create(&self, id: Uuid) -> Result<Workspace, RenderFailure> {
        let dir = self.root.join(id.to_string());
        fs::create_dir_all(&dir).await?;
        debug!(
            target = "application::workspace",
            request_id = %id,
            dir = %dir.display(),
            "Workspace created"
        );
        Ok(Workspace { id, dir: Some(dir) })
    }
}

/// Exclusive filesystem region owned by one render request.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: Option<PathBuf>,
}

impl Workspace {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Write the template payload under the fixed internal input name.
    pub async fn stage_input(&self, template: &Bytes, ext: &str) -> Result<PathBuf, RenderFailure> {
        let path = self.dir()?.join(format!("{INPUT_STEM}.{ext}"));
        fs::write(&path, template).await?;
        Ok(path)
    }

    /// Write the request data payload for consumption by the engine.
    pub async fn stage_data(&self, data: &serde_json::Value) -> Result<PathBuf, RenderFailure> {
        let path = self.dir()?.join(DATA_NAME);
        let payload =
            serde_json::to_vec(data).map_err(|err| RenderFailure::io(err.to_string()))?;
        fs::write(&path, payload).await?;
        Ok(path)
    }

    /// Scratch path the engine writes its raw result to.
    pub fn scratch_output(&self) -> Result<PathBuf, RenderFailure> {
        Ok(self.dir()?.join(SCRATCH_NAME))
    }

    /// Read the engine's scratch output back into memory.
    ///
    /// A successful engine exit without a scratch file is an engine defect,
    /// not an I/O failure of ours.
    pub async fn collect_output(&self) -> Result<Bytes, RenderFailure> {
        let path = self.scratch_output()?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(RenderFailure::render("engine produced no output"))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Persist the rendered artifact under the fixed internal output name.
    pub async fn persist_output(
        &self,
        bytes: &Bytes,
        format: TargetFormat,
    ) -> Result<PathBuf, RenderFailure> {
        let path = self
            .dir()?
            .join(format!("{OUTPUT_STEM}.{}", format.extension()));
        fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Remove every artifact under the workspace.
    ///
    /// Idempotent: a second call, or a partially-missing workspace, is not an
    /// error. Failures are logged and swallowed so cleanup can never mask the
    /// primary result.
    pub async fn destroy(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(
                    target = "application::workspace",
                    request_id = %self.id,
                    "Workspace destroyed"
                );
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(
                    target = "application::workspace",
                    request_id = %self.id,
                    dir = %dir.display(),
                    error = %err,
                    "Failed to destroy workspace"
                );
            }
        }
    }

    fn dir(&self) -> Result<&Path, RenderFailure> {
        self.dir
            .as_deref()
            .ok_or_else(|| RenderFailure::io("workspace already destroyed"))
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let id = self.id;
        // A cancelled handler future drops on a runtime worker, so hand the
        // blocking removal to the blocking pool instead of stalling it.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_dir_logged(id, &dir));
            }
            Err(_) => remove_dir_logged(id, &dir),
        }
    }
}

fn remove_dir_logged(id: Uuid, dir: &Path) {
    if let Err(err) = std::fs::remove_dir_all(dir) {
        if err.kind() != ErrorKind::NotFound {
            warn!(
                target = "application::workspace",
                request_id = %id,
                dir = %dir.display(),
                error = %err,
                "Failed to destroy workspace on drop"
            );
        }
    }
}
