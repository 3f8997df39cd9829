use crate::gfx::ShaderStage;

/// Result alias used across the pipeline runtime.
pub type GraphResult<T> = Result<T, GraphError>;

/// Result alias used by `Gfx` backends.
pub type GfxResult<T> = Result<T, GfxError>;

/// Pipeline-level error taxonomy.
///
/// Transient "not ready" conditions are not errors; they are reported by `Atom::is_ready`
/// returning `false` and retried on the next tick.
#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    /// Missing or invalid static configuration. Fatal to pipeline assembly.
    #[error("configuration error: {0}")]
    Config(String),

    /// No common format for an edge. The edge is dropped.
    #[error("negotiation error: {0}")]
    Negotiation(String),

    /// Unrecoverable packet format mismatch on a received packet. The edge is dropped.
    #[error("format error: {0}")]
    Format(String),

    /// Backend failure (shader compile/link, resource creation).
    #[error("backend error: {0}")]
    Backend(#[from] GfxError),

    /// Invalid stage access or a stage initialized twice with different layouts.
    #[error("stage error: {0}")]
    Stage(String),

    /// Credit protocol violation on a routed edge.
    #[error("credit error: {0}")]
    Credit(String),

    /// Invalid pipeline description.
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GraphError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn negotiation(msg: impl Into<String>) -> Self {
        Self::Negotiation(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub fn stage(msg: impl Into<String>) -> Self {
        Self::Stage(msg.into())
    }

    pub fn credit(msg: impl Into<String>) -> Self {
        Self::Credit(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether this error only drops the edge it happened on.
    pub fn is_edge_local(&self) -> bool {
        matches!(self, Self::Negotiation(_) | Self::Format(_))
    }

    /// Whether the pipeline's own bookkeeping is broken. Anything else raised while ticking is
    /// contained to the node or edge it came from.
    pub fn is_pipeline_fatal(&self) -> bool {
        matches!(self, Self::Credit(_) | Self::Validation(_))
    }
}

/// Errors reported across the `Gfx` boundary.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GfxError {
    #[error("{stage:?} shader compile failed: {log}")]
    Compile { stage: ShaderStage, log: String },

    #[error("program link failed: {0}")]
    Link(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid handle: {0}")]
    InvalidHandle(String),
}

impl GfxError {
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn invalid_handle(msg: impl Into<String>) -> Self {
        Self::InvalidHandle(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
