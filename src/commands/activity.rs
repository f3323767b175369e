use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use colored::*;

use chat_archive_search::core::timeline::activity_by_day;
use chat_archive_search::Archive;

const BAR_WIDTH: usize = 40;

/// Day → message count, keyed by `YYYY-MM-DD`
pub fn activity_map(archive: &Archive) -> BTreeMap<String, usize> {
    activity_by_day(archive)
        .into_iter()
        .map(|(day, count)| (day.to_string(), count))
        .collect()
}

pub fn run(archive_path: &Path, json: bool) -> Result<()> {
    let archive = Archive::load(archive_path)?;
    let activity = activity_map(&archive);

    if json {
        println!("{}", serde_json::to_string_pretty(&activity)?);
        return Ok(());
    }

    let peak = activity.values().copied().max().unwrap_or(0).max(1);
    println!("{}", "Daily Activity".bold());
    println!("{}", "=".repeat(60));
    for (day, count) in &activity {
        let bar = "█".repeat((count * BAR_WIDTH).div_ceil(peak));
        println!("{} {:>5} {}", day, count, bar.green());
    }

    Ok(())
}
