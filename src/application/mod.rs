pub mod engine;
pub mod orchestrator;
pub mod scheduler;
pub mod workspace;

pub use engine::{CommandEngine, ConvertEngine, EngineJob};
pub use orchestrator::RenderOrchestrator;
pub use scheduler::AdmissionScheduler;
pub use workspace::{Workspace, WorkspaceStore};
