//! Single article build command.

use std::path::Path;

use anyhow::{Context, Result};
use folio_static::{BuildConfig, SiteBuilder};

/// Build one article page. Drafts are built too.
pub fn run(config: BuildConfig, dir: &Path) -> Result<()> {
    let output = SiteBuilder::new(config)
        .build_article(dir)
        .with_context(|| format!("Failed to build {}", dir.display()))?;

    tracing::info!("Wrote {}", output.display());
    Ok(())
}
