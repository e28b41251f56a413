//! Full site build command.

use anyhow::Result;
use folio_static::{BuildConfig, SiteBuilder};

/// Run the build command.
pub fn run(config: BuildConfig) -> Result<()> {
    tracing::info!("Building blog from {}", config.content_dir.display());

    let result = SiteBuilder::new(config).build()?;

    tracing::info!(
        "Built {} pages, listed {} articles in {}ms",
        result.pages,
        result.listed,
        result.duration_ms
    );
    tracing::info!("Output: {}", result.output_dir.display());

    Ok(())
}
