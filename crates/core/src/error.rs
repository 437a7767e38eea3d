use std::path::PathBuf;

/// Errors from the identifier codec (job tokens and masked identifiers).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid mask key: k1 must be non-zero")]
    InvalidKey,

    #[error("Value {0} is not a masked identifier for this key")]
    InvalidMaskedValue(i128),

    #[error("Invalid job token: {0:?}")]
    InvalidToken(String),
}

/// Bad or missing submission parameters. Always raised before any process starts.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("At least one detection method must be enabled")]
    NoDetectionMethodSelected,

    #[error("Path escapes the configured roots: {0}")]
    PathTraversal(PathBuf),

    #[error("Invalid value for '{name}': {value:?}")]
    InvalidParameter { name: &'static str, value: String },

    #[error("Unsupported input file type: {0}")]
    UnsupportedInputType(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Workspace allocation and disk I/O failures.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Workspace already exists: {0}")]
    WorkspaceExists(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ResourceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures while reducing a finished workspace to a result set.
///
/// These never change the state of the job that produced the workspace.
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    #[error("No results table found in workspace")]
    MissingResultsTable,

    #[error("More than one results table found: {}", .0.join(", "))]
    AmbiguousResultsTable(Vec<String>),

    #[error("Results table has no header line starting with 'Sample'")]
    MissingHeader,

    #[error("Malformed table at line {line}: expected {expected} fields, found {found}")]
    MalformedTable {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Results table has no column '{0}'")]
    MissingColumn(String),

    #[error("Invalid chromosome value at line {line}: {value:?}")]
    InvalidChromosomeValue { line: usize, value: String },

    #[error("Invalid score value at line {line}: {value:?}")]
    InvalidScoreValue { line: usize, value: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Thumbnail generation failed for {path}: {source}")]
    Thumbnail {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl AggregationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Umbrella error for the core crate, one variant per error category.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),
}

impl From<CodecError> for CoreError {
    fn from(err: CodecError) -> Self {
        Self::Validation(ValidationError::Codec(err))
    }
}
