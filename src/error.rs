use thiserror::Error;

/// Failures that abort a single candidate sketch. The batch driver logs them
/// and moves on to the next candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("class not found: {name}")]
    ClassNotFound { name: String },

    #[error("no method or constructor matches {signature}")]
    MethodOrConstructorNotFound { signature: String },

    #[error("generic arity mismatch for {type_name}: expected {expected}, got {actual}")]
    GenericTypeVariableMismatch {
        type_name: String,
        expected: usize,
        actual: usize,
    },

    #[error("malformed sketch: {message}")]
    MalformedSketch { message: String },

    #[error("no expression of type {target} within search bounds")]
    SearchExhausted { target: String },
}

impl SynthesisError {
    pub fn class_not_found(name: impl Into<String>) -> Self {
        SynthesisError::ClassNotFound { name: name.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        SynthesisError::MalformedSketch {
            message: message.into(),
        }
    }

    pub fn exhausted(target: impl Into<String>) -> Self {
        SynthesisError::SearchExhausted {
            target: target.into(),
        }
    }
}

/// Failures that are fatal to a whole request (one source file, many sketches).
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("no hole found in source")]
    NoHoleFound,

    #[error("more than one hole in source ({count} found)")]
    MultipleHoles { count: usize },

    #[error("cannot parse source: {message}")]
    SourceParse { message: String },

    #[error("cannot load type index: {0}")]
    Classpath(String),

    #[error("cannot read sketches: {0}")]
    Sketches(#[from] serde_json::Error),

    #[error("malformed sketch batch: {0}")]
    Batch(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
