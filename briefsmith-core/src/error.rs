//! Error types for the Briefsmith core.
//!
//! Uses `thiserror` for public API error types with structured variants covering
//! planning, merging, collaborator calls, configuration and whole-run failures.

use crate::brief::Brief;
use crate::refinement::Diagnostic;
use crate::registry::SourceRegistry;

/// Top-level error type for the Briefsmith core library.
#[derive(Debug, thiserror::Error)]
pub enum BriefsmithError {
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Run error: {0}")]
    Run(Box<RunError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<RunError> for BriefsmithError {
    fn from(err: RunError) -> Self {
        BriefsmithError::Run(Box::new(err))
    }
}

/// A record that failed structural validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {record}: {reason}")]
pub struct SchemaError {
    pub record: &'static str,
    pub reason: String,
}

impl SchemaError {
    pub fn new(record: &'static str, reason: impl Into<String>) -> Self {
        Self {
            record,
            reason: reason.into(),
        }
    }
}

/// Errors raised while turning a subject into a skeleton brief.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Plan generation failed: {0}")]
    Generation(#[source] CollaboratorError),

    #[error("Plan is structurally invalid: {0}")]
    Invalid(#[from] SchemaError),
}

/// Errors from the merge engine. Both are reported, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("Node not found: {title}")]
    NodeNotFound { title: String },

    #[error("Rejected update: {0}")]
    InvalidUpdate(#[from] SchemaError),
}

/// Errors reported by external collaborators (plan generator, research provider, evaluator).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: String,
        message: String,
    },

    #[error("{collaborator} returned a malformed response: {message}")]
    Malformed {
        collaborator: String,
        message: String,
    },

    #[error("{collaborator} timed out after {timeout_secs}s")]
    Timeout {
        collaborator: String,
        timeout_secs: u64,
    },

    #[error("No active node to evaluate")]
    NoActiveNode,
}

impl CollaboratorError {
    pub fn unavailable(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    pub fn malformed(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the run.
    ///
    /// Malformed responses and a missing ACTIVE node only void the current pass.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A refinement run aborted by a fatal collaborator failure.
///
/// Carries the brief and registry as they stood after the last completed
/// iteration so the caller can inspect or resume them.
#[derive(Debug, thiserror::Error)]
#[error("Refinement run aborted after {iterations} iteration(s): {source}")]
pub struct RunError {
    #[source]
    pub source: CollaboratorError,
    pub iterations: usize,
    /// Iteration ceiling the run was started with.
    pub budget: usize,
    pub brief: Box<Brief>,
    pub registry: Box<SourceRegistry>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A type alias for results using the top-level `BriefsmithError`.
pub type Result<T> = std::result::Result<T, BriefsmithError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_merge() {
        let err = BriefsmithError::Merge(MergeError::NodeNotFound {
            title: "Origins".into(),
        });
        assert_eq!(err.to_string(), "Merge error: Node not found: Origins");
    }

    #[test]
    fn test_error_display_schema() {
        let err = MergeError::InvalidUpdate(SchemaError::new(
            "node update",
            "fact 'fp_1' has an empty description",
        ));
        assert_eq!(
            err.to_string(),
            "Rejected update: Invalid node update: fact 'fp_1' has an empty description"
        );
    }

    #[test]
    fn test_collaborator_error_fatality() {
        assert!(CollaboratorError::unavailable("research provider", "503").is_fatal());
        assert!(
            CollaboratorError::Timeout {
                collaborator: "evaluator".into(),
                timeout_secs: 30
            }
            .is_fatal()
        );
        assert!(!CollaboratorError::malformed("evaluator", "bad json").is_fatal());
        assert!(!CollaboratorError::NoActiveNode.is_fatal());
    }

    #[test]
    fn test_error_display_collaborator() {
        let err = CollaboratorError::Timeout {
            collaborator: "research provider".into(),
            timeout_secs: 30,
        };
        assert_eq!(err.to_string(), "research provider timed out after 30s");
    }

    #[test]
    fn test_run_error_converts_boxed() {
        let err = RunError {
            source: CollaboratorError::unavailable("evaluator", "connection refused"),
            iterations: 2,
            budget: 6,
            brief: Box::new(Brief::empty("subject")),
            registry: Box::new(SourceRegistry::new()),
            diagnostics: Vec::new(),
        };
        let top: BriefsmithError = err.into();
        assert!(matches!(top, BriefsmithError::Run(_)));
        assert!(top.to_string().contains("after 2 iteration(s)"));
    }

    #[test]
    fn test_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: BriefsmithError = serde_err.into();
        assert!(matches!(err, BriefsmithError::Serialization(_)));
    }
}
