/// Error types for loading, decoding and annotating
use thiserror::Error;

/// Reasons an STL payload could not be decoded
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StlError {
    #[error("input is neither a binary nor a textual STL resource")]
    Unrecognized,

    #[error("binary STL is {actual} bytes but {triangles} triangles require {expected}")]
    LengthMismatch {
        expected: usize,
        actual: usize,
        triangles: u32,
    },

    #[error("line {line}: cannot parse `{content}`")]
    InvalidLine { line: usize, content: String },

    #[error("line {line}: facet has fewer than 3 vertices")]
    TruncatedFacet { line: usize },

    #[error("line {line}: facet has more than 3 vertices")]
    ExtraVertex { line: usize },
}

/// Failures while retrieving the raw resource
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request for {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request for {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Annotation store rejections
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("annotation text is empty")]
    EmptyText,
}

/// Main error type for viewer operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to load STL: {0}")]
    Fetch(#[from] FetchError),

    #[error("malformed STL: {0}")]
    Format(#[from] StlError),

    #[error("annotation text is empty")]
    EmptyInput,

    #[error("the model was replaced before the annotation was committed")]
    StaleSession,

    #[error("no model is loaded")]
    NoSession,
}

impl From<AnnotationError> for Error {
    fn from(e: AnnotationError) -> Self {
        match e {
            AnnotationError::EmptyText => Error::EmptyInput,
        }
    }
}

/// Result type alias for viewer operations
pub type Result<T> = std::result::Result<T, Error>;
