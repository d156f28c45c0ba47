use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Failures raised while reading a class file or extracting its references.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("malformed class file: {0}")]
    MalformedClassFile(String),

    #[error("invalid signature `{signature}` at offset {position}: {reason}")]
    InvalidSignature {
        signature: String,
        position: usize,
        reason: String,
    },

    #[error("unsupported annotation element tag {tag:#04x}")]
    UnsupportedAnnotationTag { tag: u8 },
}

impl AnalysisError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        AnalysisError::MalformedClassFile(reason.into())
    }
}

/// Failures raised while compiling dependency rules, before any matching.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("unknown placeholder: {0}")]
    UnknownPlaceholder(String),

    #[error("duplicate rule for {0}")]
    DuplicateRule(String),

    #[error("invalid pattern `{0}`")]
    InvalidPattern(String),
}
