//! Reading archives from and writing documents to disk

use std::path::{Path, PathBuf};

use crate::error::{FeedError, Result};
use crate::feed::FeedList;
use crate::opml::{self, OpmlDocument};

/// Where and how OPML documents are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    /// Output directory, created if missing
    pub dir: PathBuf,
    /// File name stem: `<stem>.opml` and `<stem>_<a>_to_<b>.opml`
    pub stem: String,
    /// Feeds per batch document
    pub batch_size: usize,
    /// Document title
    pub title: String,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            stem: "feeds".to_string(),
            batch_size: opml::DEFAULT_BATCH_SIZE,
            title: opml::DEFAULT_TITLE.to_string(),
        }
    }
}

/// Read a whole archive into memory
pub async fn read_archive(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| FeedError::io(path, e))?;
    tracing::debug!(path = %path.display(), len = bytes.len(), "read archive");
    Ok(bytes)
}

/// Write the full document, plus batch documents when the list is long
///
/// Returns the paths written, full document first.
pub async fn write_documents(feeds: &FeedList, options: &OutputOptions) -> Result<Vec<PathBuf>> {
    if options.batch_size == 0 {
        return Err(FeedError::InvalidBatchSize);
    }

    tokio::fs::create_dir_all(&options.dir)
        .await
        .map_err(|e| FeedError::io(&options.dir, e))?;

    let urls = feeds.urls();
    let mut written = Vec::new();

    let full = options.dir.join(format!("{}.opml", options.stem));
    let doc = OpmlDocument::new(&urls).with_title(&options.title).render();
    write_file(&full, doc).await?;
    written.push(full);

    if opml::needs_batches(urls.len(), options.batch_size) {
        for range in opml::batch_ranges(urls.len(), options.batch_size) {
            let path = options
                .dir
                .join(opml::batch_file_name(&options.stem, &range));
            let doc = OpmlDocument::new(&urls[range])
                .with_title(&options.title)
                .render();
            write_file(&path, doc).await?;
            written.push(path);
        }
    }

    tracing::info!(files = written.len(), dir = %options.dir.display(), "wrote OPML documents");
    Ok(written)
}

async fn write_file(path: &Path, contents: String) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| FeedError::io(path, e))?;
    tracing::debug!(path = %path.display(), "wrote file");
    Ok(())
}
