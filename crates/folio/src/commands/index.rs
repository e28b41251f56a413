//! Index page and feed command.

use anyhow::Result;
use folio_static::{BuildConfig, SiteBuilder};

/// Rebuild the index page and the RSS feed.
pub fn run(config: BuildConfig) -> Result<()> {
    let output_dir = config.output_dir.clone();
    let listed = SiteBuilder::new(config).build_index()?;

    tracing::info!(
        "Listed {} articles in {}",
        listed,
        output_dir.join("index.html").display()
    );
    Ok(())
}
