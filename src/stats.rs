//! Store statistics for `docrag stats`.
//!
//! Shows where the store lives, how large it is, the recorded dimension and
//! embedding model, and how many entries each source contributed.

use anyhow::Result;

use crate::config::Config;
use crate::store::SqliteStore;

/// Run the stats command: open the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let path = config.store.path();

    println!("docrag store stats");
    println!("==================");
    println!();
    println!("  Store:       {}", path.display());

    if !path.exists() {
        println!("  Entries:     0 (not built yet)");
        println!();
        return Ok(());
    }

    let store = SqliteStore::open_existing(&config.store).await?;
    let summary = store.summary().await?;
    let size = std::fs::metadata(store.path()).map(|m| m.len()).unwrap_or(0);

    println!("  Size:        {}", format_bytes(size));
    println!();
    println!(
        "  Dimension:   {}",
        summary.dims.map_or_else(|| "-".to_string(), |d| d.to_string())
    );
    println!("  Model:       {}", summary.model.as_deref().unwrap_or("-"));
    println!(
        "  Created:     {}",
        summary
            .created_at
            .as_deref()
            .map_or_else(|| "-".to_string(), format_created)
    );
    println!("  Entries:     {}", summary.entries);

    if !summary.per_source.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<48} {:>8}", "SOURCE", "ENTRIES");
        println!("  {}", "-".repeat(57));
        for (source, count) in &summary.per_source {
            println!("  {:<48} {:>8}", source, count);
        }
    }

    println!();
    store.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// RFC 3339 timestamp as `YYYY-MM-DD HH:MM` UTC; unparsable values pass through.
fn format_created(raw: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc).format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|_| raw.to_string())
}
