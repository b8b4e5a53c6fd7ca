use anyhow::{Context, Result};
use std::path::PathBuf;

use bookfleet::storage::WorkerStats;

/// Print per-worker contribution counters, largest first
pub async fn stats(dir: PathBuf) -> Result<()> {
    let stats = WorkerStats::new(dir);
    let mut totals = stats
        .all()
        .with_context(|| format!("Failed to read stats from {}", stats.dir().display()))?;
    totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    println!("Worker Contributions");
    println!("====================");
    if totals.is_empty() {
        println!("  (no workers recorded in {})", stats.dir().display());
        return Ok(());
    }

    let width = totals.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, total) in &totals {
        println!("  {name:<width$}  {total:>12}");
    }
    println!();
    println!("  Total: {}", totals.iter().map(|(_, t)| t).sum::<i64>());

    Ok(())
}
