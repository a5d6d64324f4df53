use thiserror::Error;

/// Failure taxonomy for the import/export pipeline.
///
/// Every import-time failure is recovered at the pipeline boundary: it aborts
/// the current import, is recorded on the upload history row and surfaced to
/// the caller as one of these kinds. Export-time failures abort only the
/// current format's export.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Corrupt, empty or wrong-subtype file content.
    #[error("unreadable file: {0}")]
    UnreadableFile(String),

    /// Extension or export target not recognized.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// An optional processing toolkit is not present for this operation.
    #[error("missing capability: {0}")]
    MissingCapability(String),

    /// A Shapefile is missing one of its companion files.
    #[error("shapefile is missing its companion file: .{extension}")]
    MissingCompanionFile { extension: &'static str },

    /// An archive contained no recognizable geometry file, or a feature set
    /// normalized down to zero features.
    #[error("no geometry found: {0}")]
    NoGeometryFound(String),

    #[error("too many features: {count} (max: {max})")]
    TooManyFeatures { count: usize, max: usize },

    #[error("unsupported geometry type: {0}")]
    UnsupportedGeometryType(String),

    /// Generic catch-all from lower parser layers.
    #[error(transparent)]
    Validation(#[from] anyhow::Error),
}

impl PipelineError {
    /// Stable kind tag, recorded on upload history rows.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::UnreadableFile(_) => "UnreadableFile",
            PipelineError::UnsupportedFormat(_) => "UnsupportedFormat",
            PipelineError::MissingCapability(_) => "MissingCapability",
            PipelineError::MissingCompanionFile { .. } => "MissingCompanionFile",
            PipelineError::NoGeometryFound(_) => "NoGeometryFound",
            PipelineError::TooManyFeatures { .. } => "TooManyFeatures",
            PipelineError::UnsupportedGeometryType(_) => "UnsupportedGeometryType",
            PipelineError::Validation(_) => "ValidationFailed",
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
