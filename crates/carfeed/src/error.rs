//! Error types for feed extraction and output

use std::path::PathBuf;

use carfeed_repo::RepoError;

/// Result type alias for feed operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Errors from turning an archive into feed documents
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum FeedError {
    /// The archive could not be read or walked
    #[error(transparent)]
    #[diagnostic(transparent)]
    Repo(#[from] RepoError),

    /// Reading the input or writing an output file failed
    #[error("I/O error on {}", path.display())]
    #[diagnostic(code(carfeed::io))]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// URL template without a subject placeholder
    #[error("invalid URL template {template:?}")]
    #[diagnostic(
        code(carfeed::url_template),
        help("templates must contain a `{{subject}}` placeholder, e.g. https://bsky.app/profile/{{subject}}/rss")
    )]
    InvalidTemplate {
        /// The rejected template
        template: String,
    },

    /// Batch size of zero
    #[error("batch size must be at least 1")]
    #[diagnostic(code(carfeed::batch_size))]
    InvalidBatchSize,
}

impl FeedError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
