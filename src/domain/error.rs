use thiserror::Error;

/// Stable failure classification surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Io,
    Render,
    Timeout,
    Overloaded,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Io => "io_error",
            FailureKind::Render => "render_error",
            FailureKind::Timeout => "timeout",
            FailureKind::Overloaded => "overloaded",
        }
    }
}

/// Normalized failure for one render request.
///
/// Every variant carries a best-effort human-readable detail; internal paths
/// and engine stack traces stop here.
#[derive(Debug, Error)]
pub enum RenderFailure {
    #[error("workspace I/O failed: {message}")]
    Io { message: String },
    #[error("engine rendering failed: {message}")]
    Render { message: String },
    #[error("render deadline exceeded")]
    Timeout,
    #[error("admission queue is full")]
    Overloaded,
}

impl RenderFailure {
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            RenderFailure::Io { .. } => FailureKind::Io,
            RenderFailure::Render { .. } => FailureKind::Render,
            RenderFailure::Timeout => FailureKind::Timeout,
            RenderFailure::Overloaded => FailureKind::Overloaded,
        }
    }
}

impl From<std::io::Error> for RenderFailure {
    fn from(err: std::io::Error) -> Self {
        RenderFailure::io(err.to_string())
    }
}
