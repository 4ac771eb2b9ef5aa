//! OPML subscription list rendering
//!
//! Output is deterministic: the same URLs in the same order always render to
//! the same text. Large lists can be split into fixed-size batches, since some
//! feed readers time out importing hundreds of subscriptions at once.

use std::ops::Range;

/// Default document and outline title
pub const DEFAULT_TITLE: &str = "RSS Feeds";

/// Default number of feeds per batch document
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// An OPML 1.0 subscription document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpmlDocument<'a> {
    title: &'a str,
    urls: &'a [&'a str],
}

impl<'a> OpmlDocument<'a> {
    /// A document listing `urls`, titled [`DEFAULT_TITLE`]
    pub fn new(urls: &'a [&'a str]) -> Self {
        Self {
            title: DEFAULT_TITLE,
            urls,
        }
    }

    /// Set the document title
    pub fn with_title(mut self, title: &'a str) -> Self {
        self.title = title;
        self
    }

    /// Number of feed outlines
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Whether the document lists no feeds
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Render to text
    pub fn render(&self) -> String {
        let title = escape(self.title);
        let mut out = String::with_capacity(200 + self.urls.len() * 120);
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str("<opml version=\"1.0\">\n");
        out.push_str("<head>\n");
        out.push_str(&format!("    <title>{}</title>\n", title));
        out.push_str("</head>\n");
        out.push_str("<body>\n");
        out.push_str(&format!("    <outline text=\"{}\">", title));
        for url in self.urls {
            let url = escape(url);
            out.push_str(&format!(
                "\n        <outline type=\"rss\" text=\"{}\" xmlUrl=\"{}\"/>",
                url, url
            ));
        }
        out.push_str("\n    </outline>\n");
        out.push_str("</body>\n");
        out.push_str("</opml>");
        out
    }
}

/// Render `urls` as one document
pub fn serialize(urls: &[&str]) -> String {
    OpmlDocument::new(urls).render()
}

/// Render the part of `urls` covered by `range`
///
/// The range is clamped to the list, so a range reaching past the end renders
/// whatever remains.
pub fn serialize_batch(urls: &[&str], range: Range<usize>) -> String {
    serialize(clamp(urls, range))
}

fn clamp<'a, T>(items: &'a [T], range: Range<usize>) -> &'a [T] {
    let end = range.end.min(items.len());
    let start = range.start.min(end);
    &items[start..end]
}

/// Split `total` items into consecutive ranges of at most `batch_size`
///
/// Returns no ranges for an empty list or a zero batch size.
pub fn batch_ranges(total: usize, batch_size: usize) -> Vec<Range<usize>> {
    if batch_size == 0 {
        return Vec::new();
    }
    (0..total)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(total))
        .collect()
}

/// Whether a list of `total` feeds is long enough to also be written in batches
pub fn needs_batches(total: usize, batch_size: usize) -> bool {
    batch_size > 0 && total > batch_size
}

/// File name for a batch document: `<stem>_<first>_to_<last>.opml`, 1-based
pub fn batch_file_name(stem: &str, range: &Range<usize>) -> String {
    format!("{}_{}_to_{}.opml", stem, range.start + 1, range.end)
}

/// Escape text for use in an XML attribute or element
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
