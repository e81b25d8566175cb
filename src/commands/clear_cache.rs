use crate::cache::StageCache;
use crate::config::ImpactConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Remove every cached stage; returns the number of entries removed.
pub fn clear_cache(config_path: Option<&Path>) -> Result<usize> {
    let config = ImpactConfig::resolve(config_path).context("Failed to load configuration")?;
    let cache = StageCache::new(config.cache_dir());
    let removed = cache
        .clear()
        .with_context(|| format!("Failed to clear {}", cache.dir().display()))?;

    println!(
        "Removed {} cache entries from {}",
        removed,
        cache.dir().display()
    );
    Ok(removed)
}
