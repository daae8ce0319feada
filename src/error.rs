use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("no gene ids given (expected a comma-separated list)")]
    EmptyGeneList,

    #[error("too many gene ids: {count} given, at most {max} allowed")]
    TooManyGeneIds { count: usize, max: usize },

    #[error("invalid sample name: {0}")]
    InvalidSampleName(String),

    #[error("unknown sample: {0}")]
    UnknownSample(String),

    #[error("gene annotation file not found at {0}")]
    MissingAnnotation(Utf8PathBuf),

    #[error("failed to parse gene annotation {path}: {message}")]
    AnnotationParse { path: Utf8PathBuf, message: String },

    #[error("malformed expression table {path}: {reason}")]
    MalformedTable { path: Utf8PathBuf, reason: String },

    #[error("unparsable time-point column `{column}` in {path}")]
    InvalidTimePointColumn { path: Utf8PathBuf, column: String },

    #[error("store for sample {0} has not been built")]
    StoreNotFound(String),

    #[error("failed to open store for sample {sample}: {message}")]
    StoreOpen { sample: String, message: String },

    #[error("store read failed for sample {sample}: {message}")]
    StoreRead { sample: String, message: String },

    #[error("store write failed for sample {sample}: {message}")]
    StoreWrite { sample: String, message: String },

    #[error("corrupt record for gene {gene_id}: {reason}")]
    CorruptRecord { gene_id: String, reason: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl KiraError {
    /// Errors caused by the caller's input rather than by the stores.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            KiraError::EmptyGeneList
                | KiraError::TooManyGeneIds { .. }
                | KiraError::InvalidSampleName(_)
                | KiraError::UnknownSample(_)
        )
    }
}
