use carfeed::{
    FOLLOW_COLLECTION, FeedConfig, OutputOptions, UrlTemplate, extract_feeds, opml, read_archive,
    write_documents,
};
use clap::Parser;
use miette::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Build OPML feed subscriptions from an AT Protocol repository export"
)]
struct Args {
    /// Repository export (CAR file)
    input: PathBuf,

    /// Directory to write OPML files into
    #[arg(short = 'o', long, default_value = ".")]
    output: PathBuf,

    /// Collection whose records become feeds
    #[arg(long, default_value = FOLLOW_COLLECTION)]
    collection: String,

    /// Feed URL template; `{subject}` is replaced with each record's subject
    #[arg(long, default_value_t = UrlTemplate::default())]
    url_template: UrlTemplate,

    /// Feeds per batch file; batches are written when there are more feeds than this
    #[arg(long, default_value_t = opml::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Output file name stem
    #[arg(long, default_value = "feeds")]
    stem: String,

    /// OPML document title
    #[arg(long, default_value = opml::DEFAULT_TITLE)]
    title: String,

    /// Skip checking blocks against their CIDs
    #[arg(long)]
    no_verify: bool,

    /// Print feed URLs to stdout instead of writing files
    #[arg(long)]
    list: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_env("CARFEED_LOG")
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let bytes = read_archive(&args.input).await?;

    let config = FeedConfig {
        collection: args.collection.into(),
        url_template: args.url_template,
        verify_blocks: !args.no_verify,
    };
    let feeds = extract_feeds(bytes, &config)?;

    if feeds.is_empty() {
        tracing::warn!(collection = %config.collection, "no feeds found in archive");
    }
    if feeds.skipped > 0 {
        tracing::warn!(skipped = feeds.skipped, "some records had no usable subject");
    }

    if args.list {
        for url in feeds.urls() {
            println!("{}", url);
        }
        return Ok(());
    }

    let options = OutputOptions {
        dir: args.output,
        stem: args.stem,
        batch_size: args.batch_size,
        title: args.title,
    };
    let written = write_documents(&feeds, &options).await?;

    for path in &written {
        println!("Wrote {}", path.display());
    }
    println!("{} feeds", feeds.len());

    Ok(())
}
